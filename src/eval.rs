use error::Result;
use interpreter::Interpreter;
use lexer::{self, Cursor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use value::{self, Value};
use vars::{Place, VarKey, DEFAULT_ARRAY_SIZE};

// Intrinsics are resolved before variables, so an identifier on this
// list followed by '(' is always a call, never an array subscript.
const FUNCTIONS: &[&str] = &[
    "SIN", "COS", "TAN", "ATN", "ABS", "INT", "SQR", "SGN", "EXP", "LOG", "RND", "VAL", "STR",
    "STR$", "CHR", "CHR$", "ASC", "LEN", "LEFT$", "RIGHT$", "MID$", "INSTR", "TAB", "POS", "FRE",
    "NOT",
];

// What a stock C64 reports free after power-on
const FRE_BYTES: f64 = 38861.0;

// Upper bound on array growth; larger subscripts report exhaustion
// instead of aborting in the allocator
pub(crate) const MAX_ARRAY_LEN: usize = 1 << 20;

fn is_function(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

fn bool_num(b: bool) -> Value {
    Value::Num(if b { -1.0 } else { 0.0 })
}

impl Interpreter {
    // or_expr := and_expr ( OR and_expr )*
    pub(crate) fn eval_expr(&mut self, cur: &mut Cursor) -> Result<Value> {
        let mut left = self.eval_and_expr(cur)?;
        loop {
            cur.skip_spaces();
            if cur.match_kw("OR") {
                let right = self.eval_and_expr(cur)?;
                let a = self.as_num(left)?;
                let b = self.as_num(right)?;
                left = Value::Num(((a as i64) | (b as i64)) as f64);
            } else {
                return Ok(left);
            }
        }
    }

    // and_expr := comparison ( AND comparison )*
    fn eval_and_expr(&mut self, cur: &mut Cursor) -> Result<Value> {
        let mut left = self.eval_compare(cur)?;
        loop {
            cur.skip_spaces();
            if cur.match_kw("AND") {
                let right = self.eval_compare(cur)?;
                let a = self.as_num(left)?;
                let b = self.as_num(right)?;
                left = Value::Num(((a as i64) & (b as i64)) as f64);
            } else {
                return Ok(left);
            }
        }
    }

    // comparison := addsub ( ( "=" | "<>" | "<=" | ">=" | "<" | ">" ) addsub )?
    //
    // True is -1 and false is 0, so comparison results compose with the
    // bitwise AND/OR above.
    fn eval_compare(&mut self, cur: &mut Cursor) -> Result<Value> {
        let left = self.eval_addsub(cur)?;
        cur.skip_spaces();
        let op = match (cur.la(), cur.la2()) {
            ('<', '>') => "<>",
            ('<', '=') => "<=",
            ('>', '=') => ">=",
            ('<', _) => "<",
            ('>', _) => ">",
            ('=', _) => "=",
            _ => return Ok(left),
        };
        for _ in 0..op.len() {
            cur.consume();
        }
        let right = self.eval_addsub(cur)?;

        if left.is_str() || right.is_str() {
            let a = self.as_str(left)?;
            let b = self.as_str(right)?;
            Ok(bool_num(match op {
                "<>" => a != b,
                "<=" => a <= b,
                ">=" => a >= b,
                "<" => a < b,
                ">" => a > b,
                _ => a == b,
            }))
        } else {
            let a = self.as_num(left)?;
            let b = self.as_num(right)?;
            Ok(bool_num(match op {
                "<>" => a != b,
                "<=" => a <= b,
                ">=" => a >= b,
                "<" => a < b,
                ">" => a > b,
                _ => a == b,
            }))
        }
    }

    // addsub := muldiv ( ( "+" | "-" ) muldiv )*
    fn eval_addsub(&mut self, cur: &mut Cursor) -> Result<Value> {
        let mut left = self.eval_term(cur)?;
        loop {
            cur.skip_spaces();
            match cur.la() {
                '+' => {
                    cur.consume();
                    let right = self.eval_term(cur)?;
                    if left.is_str() || right.is_str() {
                        let a = self.as_str(left)?;
                        let b = self.as_str(right)?;
                        left = Value::str_from(&format!("{}{}", a, b));
                    } else {
                        let a = self.as_num(left)?;
                        let b = self.as_num(right)?;
                        left = Value::Num(a + b);
                    }
                }
                '-' => {
                    cur.consume();
                    let right = self.eval_term(cur)?;
                    let a = self.as_num(left)?;
                    let b = self.as_num(right)?;
                    left = Value::Num(a - b);
                }
                _ => return Ok(left),
            }
        }
    }

    // muldiv := power ( ( "*" | "/" ) power )*
    //
    // Division by zero follows IEEE-754; infinities and NaN print as
    // "inf" and "nan".
    fn eval_term(&mut self, cur: &mut Cursor) -> Result<Value> {
        let mut left = self.eval_power(cur)?;
        loop {
            cur.skip_spaces();
            let op = cur.la();
            if op != '*' && op != '/' {
                return Ok(left);
            }
            cur.consume();
            let right = self.eval_power(cur)?;
            let a = self.as_num(left)?;
            let b = self.as_num(right)?;
            left = Value::Num(if op == '*' { a * b } else { a / b });
        }
    }

    // power := factor ( "^" power )?   -- right-associative
    fn eval_power(&mut self, cur: &mut Cursor) -> Result<Value> {
        let left = self.eval_factor(cur)?;
        cur.skip_spaces();
        if cur.la() != '^' {
            return Ok(left);
        }
        cur.consume();
        let right = self.eval_power(cur)?;
        let a = self.as_num(left)?;
        let b = self.as_num(right)?;
        Ok(Value::Num(a.powf(b)))
    }

    // factor := number | string | "(" or_expr ")" | ("+"|"-") factor
    //         | function_call | variable_ref
    fn eval_factor(&mut self, cur: &mut Cursor) -> Result<Value> {
        cur.skip_spaces();

        if cur.la() == '(' {
            cur.consume();
            let v = self.eval_expr(cur)?;
            self.expect(cur, ')', "Missing ')'")?;
            return Ok(v);
        }

        if cur.la() == '"' {
            return match cur.string_literal() {
                Some(s) => Ok(Value::str_from(&s)),
                None => Err(self.serr("Unterminated string")),
            };
        }

        if cur.la().is_ascii_alphabetic() {
            let start = cur.pos();
            let name = cur.identifier().to_ascii_uppercase();
            if is_function(&name) {
                return self.eval_function(&name, cur);
            }
            cur.set_pos(start);
            let place = self.parse_place(cur)?;
            return self.read_place(&place);
        }

        // Unary sign binds tighter than '^'
        if cur.la() == '+' || cur.la() == '-' {
            let sign = cur.la();
            cur.consume();
            let inner = self.eval_factor(cur)?;
            let n = self.as_num(inner)?;
            return Ok(Value::Num(if sign == '-' { -n } else { n }));
        }

        if let Some(n) = cur.number() {
            return Ok(Value::Num(n));
        }

        Err(self.serr("Syntax error in expression"))
    }

    fn eval_function(&mut self, name: &str, cur: &mut Cursor) -> Result<Value> {
        cur.skip_spaces();
        if cur.la() != '(' {
            return Err(self.serr("Function requires '('"));
        }
        cur.consume();

        let v = match name {
            "SIN" => Value::Num(self.num_expr(cur)?.sin()),
            "COS" => Value::Num(self.num_expr(cur)?.cos()),
            "TAN" => Value::Num(self.num_expr(cur)?.tan()),
            "ATN" => Value::Num(self.num_expr(cur)?.atan()),
            "ABS" => Value::Num(self.num_expr(cur)?.abs()),
            "INT" => Value::Num(self.num_expr(cur)?.floor()),
            "SQR" => Value::Num(self.num_expr(cur)?.sqrt()),
            "EXP" => Value::Num(self.num_expr(cur)?.exp()),
            "LOG" => Value::Num(self.num_expr(cur)?.ln()),
            "SGN" => {
                let n = self.num_expr(cur)?;
                Value::Num(if n > 0.0 {
                    1.0
                } else if n < 0.0 {
                    -1.0
                } else {
                    0.0
                })
            }
            "RND" => {
                let n = self.num_expr(cur)?;
                if n < 0.0 {
                    self.rng = StdRng::seed_from_u64((-n) as u64);
                }
                Value::Num(self.rng.gen::<f64>())
            }
            "NOT" => {
                let n = self.num_expr(cur)?;
                Value::Num(!(n as i64) as f64)
            }
            "VAL" => {
                let s = self.str_expr(cur)?;
                Value::Num(lexer::atof(&s))
            }
            "STR" | "STR$" => {
                let n = self.num_expr(cur)?;
                Value::str_from(&value::fmt_num(n))
            }
            "CHR" | "CHR$" => {
                let n = self.num_expr(cur)?;
                let b = ((n as i64) & 0xff) as u8;
                Value::Str((b as char).to_string())
            }
            "ASC" => {
                let s = self.str_expr(cur)?;
                Value::Num(s.chars().next().map(|c| c as u32 as f64).unwrap_or(0.0))
            }
            "LEN" => {
                let s = self.str_expr(cur)?;
                Value::Num(s.chars().count() as f64)
            }
            "LEFT$" => {
                let s = self.str_expr(cur)?;
                self.expect(cur, ',', "Syntax error in expression")?;
                let n = self.num_expr(cur)?;
                Value::Str(left_str(&s, n as i64))
            }
            "RIGHT$" => {
                let s = self.str_expr(cur)?;
                self.expect(cur, ',', "Syntax error in expression")?;
                let n = self.num_expr(cur)?;
                Value::Str(right_str(&s, n as i64))
            }
            "MID$" => {
                let s = self.str_expr(cur)?;
                self.expect(cur, ',', "Syntax error in expression")?;
                let start = self.num_expr(cur)?;
                cur.skip_spaces();
                let len = if cur.la() == ',' {
                    cur.consume();
                    Some(self.num_expr(cur)? as i64)
                } else {
                    None
                };
                Value::Str(mid_str(&s, start as i64, len))
            }
            "INSTR" => {
                let hay = self.str_expr(cur)?;
                self.expect(cur, ',', "Syntax error in expression")?;
                let needle = self.str_expr(cur)?;
                Value::Num(instr(&hay, &needle))
            }
            "TAB" => {
                let n = self.num_expr(cur)?;
                self.fn_tab(n);
                Value::Str(String::new())
            }
            "POS" => {
                let _ = self.eval_expr(cur)?;
                Value::Num((self.print_column() + 1) as f64)
            }
            "FRE" => {
                let _ = self.eval_expr(cur)?;
                Value::Num(FRE_BYTES)
            }
            _ => return Err(self.serr("Unknown function")),
        };

        self.expect(cur, ')', "Missing ')'")?;
        Ok(v)
    }

    // Variable reference: identifier plus optional subscript. Arrays
    // come to life on first subscript with max(i+1, 11) slots and grow
    // to fit larger subscripts later.
    pub(crate) fn parse_place(&mut self, cur: &mut Cursor) -> Result<Place> {
        cur.skip_spaces();
        if !cur.la().is_ascii_alphabetic() {
            return Err(self.serr("Expected variable"));
        }
        let name = cur.identifier();
        let key = VarKey::from_name(&name);

        cur.skip_spaces();
        let mut index = None;
        if cur.la() == '(' {
            cur.consume();
            let n = self.num_expr(cur)?;
            self.expect(cur, ')', "Missing ')'")?;
            // Tolerate accumulated float error in the subscript
            let i = (n + 0.00001).floor();
            if i < 0.0 {
                return Err(self.rerr("Negative array index"));
            }
            if i > MAX_ARRAY_LEN as f64 {
                return Err(self.rerr("Out of memory"));
            }
            index = Some(i as usize);
        }

        let var = match self.vars.find_or_create(key) {
            Some(i) => i,
            None => return Err(self.rerr("Variable table full")),
        };
        if let Some(i) = index {
            let min_len = if i + 1 < DEFAULT_ARRAY_SIZE {
                DEFAULT_ARRAY_SIZE
            } else {
                i + 1
            };
            self.vars.touch_array(var, min_len);
        }

        Ok(Place {
            var: var,
            key: key,
            index: index,
        })
    }

    pub(crate) fn read_place(&mut self, place: &Place) -> Result<Value> {
        Ok(self.vars.slot_mut(place.var, place.index).clone())
    }

    pub(crate) fn store_place(&mut self, place: &Place, v: Value) {
        *self.vars.slot_mut(place.var, place.index) = v;
    }

    // Condition truthiness: any non-zero number or non-empty string
    pub(crate) fn eval_condition(&mut self, cur: &mut Cursor) -> Result<bool> {
        let v = self.eval_expr(cur)?;
        Ok(match v {
            Value::Num(n) => n != 0.0,
            Value::Str(ref s) => !s.is_empty(),
        })
    }

    pub(crate) fn num_expr(&mut self, cur: &mut Cursor) -> Result<f64> {
        let v = self.eval_expr(cur)?;
        self.as_num(v)
    }

    pub(crate) fn str_expr(&mut self, cur: &mut Cursor) -> Result<String> {
        let v = self.eval_expr(cur)?;
        self.as_str(v)
    }

    pub(crate) fn as_num(&self, v: Value) -> Result<f64> {
        match v {
            Value::Num(n) => Ok(n),
            Value::Str(_) => Err(self.rerr("Numeric value required")),
        }
    }

    pub(crate) fn as_str(&self, v: Value) -> Result<String> {
        match v {
            Value::Str(s) => Ok(s),
            Value::Num(_) => Err(self.rerr("String value required")),
        }
    }

    pub(crate) fn expect(&self, cur: &mut Cursor, ch: char, msg: &str) -> Result<()> {
        cur.skip_spaces();
        if cur.la() != ch {
            return Err(self.serr(msg));
        }
        cur.consume();
        Ok(())
    }
}

fn left_str(s: &str, n: i64) -> String {
    if n <= 0 {
        String::new()
    } else {
        s.chars().take(n as usize).collect()
    }
}

fn right_str(s: &str, n: i64) -> String {
    let len = s.chars().count() as i64;
    if n <= 0 {
        String::new()
    } else if n >= len {
        String::from(s)
    } else {
        s.chars().skip((len - n) as usize).collect()
    }
}

// 1-indexed, clamped to the string bounds; no length means "to end"
fn mid_str(s: &str, start: i64, len: Option<i64>) -> String {
    let start = if start < 1 { 1 } else { start };
    let tail = s.chars().skip((start - 1) as usize);
    match len {
        None => tail.collect(),
        Some(n) if n <= 0 => String::new(),
        Some(n) => tail.take(n as usize).collect(),
    }
}

// 1-indexed position of needle in hay, 0 when absent
fn instr(hay: &str, needle: &str) -> f64 {
    match hay.find(needle) {
        Some(b) => (hay[..b].chars().count() + 1) as f64,
        None => 0.0,
    }
}
