use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use error::{Error, Result};
use lexer::Cursor;
use program::Program;
use value::Value;
use vars::{VarKey, VarTable};

pub const PRINT_WIDTH: usize = 80;
pub const TAB_ZONE: usize = 10;
pub const MAX_GOSUB: usize = 32;
pub const MAX_FOR: usize = 16;

// Saved return point for RETURN: a mid-line cursor lets
// GOSUB 100 : PRINT "done" continue after the subroutine
#[derive(Debug, Clone)]
struct GosubFrame {
    line: usize,
    pos: usize,
}

// FOR frame. Holds the loop variable key, not a slot reference, so
// NEXT re-resolves the slot even if the table reallocated meanwhile.
#[derive(Debug, Clone)]
struct ForFrame {
    key: VarKey,
    end: f64,
    step: f64,
    line: usize,
    resume: usize,
}

// How the driver proceeds after a statement: fall through to the next
// statement on the line, or follow a control transfer the handler
// already recorded in (current, cursor).
enum Flow {
    Next,
    Jump,
}

// Main interpreter. Owns every piece of run-time state; the driver and
// all handlers take it by exclusive reference.
pub struct Interpreter {
    program: Program,
    pub(crate) vars: VarTable,
    gosubs: Vec<GosubFrame>,
    fors: Vec<ForFrame>,
    current: usize,
    cursor: Option<usize>,
    halted: bool,
    col: usize,
    pub(crate) rng: StdRng,
    out: Box<dyn Write>,
    inp: Box<dyn BufRead>,
}

impl Interpreter {
    pub fn new(program: Program) -> Self {
        Interpreter::with_io(
            program,
            Box::new(io::BufReader::new(io::stdin())),
            Box::new(io::stdout()),
        )
    }

    pub fn with_io(program: Program, inp: Box<dyn BufRead>, out: Box<dyn Write>) -> Self {
        Interpreter {
            program: program,
            vars: VarTable::new(),
            gosubs: Vec::new(),
            fors: Vec::new(),
            current: 0,
            cursor: None,
            halted: false,
            col: 0,
            rng: StdRng::from_entropy(),
            out: out,
            inp: inp,
        }
    }

    // Execution driver. The intra-line cursor is the program counter
    // between statements; None means "start of the current line".
    pub fn run(&mut self) -> Result<()> {
        self.halted = false;
        self.current = 0;
        self.cursor = None;
        self.col = 0;

        debug!("run      : {} lines", self.program.len());

        while !self.halted && self.current < self.program.len() {
            let text = self.program.line(self.current).text.clone();
            let mut cur = Cursor::new(&text);
            cur.set_pos(self.cursor.unwrap_or(0));

            cur.skip_spaces();
            if cur.at_end() {
                self.current = self.current + 1;
                self.cursor = None;
                continue;
            }

            let flow = self.exec_statement(&mut cur)?;
            if self.halted {
                break;
            }

            match flow {
                Flow::Next => self.advance_cursor(&mut cur),
                Flow::Jump => {
                    // RETURN and NEXT resume mid-line; the separator
                    // check runs against the target line
                    let pos = match self.cursor {
                        Some(p) => p,
                        None => continue,
                    };
                    let text = self.program.line(self.current).text.clone();
                    let mut cur = Cursor::new(&text);
                    cur.set_pos(pos);
                    self.advance_cursor(&mut cur);
                }
            }
        }

        Ok(())
    }

    // Statement separator / end-of-line stage of the state machine.
    // Leaving the cursor on a non-separator lets IF ... THEN <stmt>
    // execute the inline statement on the next driver pass.
    fn advance_cursor(&mut self, cur: &mut Cursor) {
        cur.skip_spaces();
        if cur.la() == ':' {
            cur.consume();
            self.cursor = Some(cur.pos());
        } else if cur.at_end() {
            self.current = self.current + 1;
            self.cursor = None;
        } else {
            self.cursor = Some(cur.pos());
        }
    }

    // Dispatch on the leading keyword; a bare identifier is an
    // implicit LET
    fn exec_statement(&mut self, cur: &mut Cursor) -> Result<Flow> {
        cur.skip_spaces();
        debug!("exec     : {:?}: {}", self.line_no(), cur.rest());

        if cur.match_kw("REM") || cur.la() == '\'' {
            cur.seek_end();
            return Ok(Flow::Next);
        }
        if cur.la() == '?' {
            cur.consume();
            return self.exec_print(cur);
        }
        if cur.match_kw("PRINT") {
            return self.exec_print(cur);
        }
        if cur.match_kw("INPUT") {
            return self.exec_input(cur);
        }
        if cur.match_kw("LET") {
            return self.exec_let(cur);
        }
        if cur.match_kw("GOTO") {
            return self.exec_goto(cur);
        }
        if cur.match_kw("GOSUB") {
            return self.exec_gosub(cur);
        }
        if cur.match_kw("RETURN") {
            return self.exec_return(cur);
        }
        if cur.match_kw("IF") {
            return self.exec_if(cur);
        }
        if cur.match_kw("FOR") {
            return self.exec_for(cur);
        }
        if cur.match_kw("NEXT") {
            return self.exec_next(cur);
        }
        if cur.match_kw("DIM") {
            return self.exec_dim(cur);
        }
        if cur.match_kw("END") || cur.match_kw("STOP") {
            self.halted = true;
            cur.seek_end();
            return Ok(Flow::Next);
        }
        if cur.match_kw("SLEEP") {
            return self.exec_sleep(cur);
        }
        if cur.la().is_ascii_alphabetic() {
            return self.exec_let(cur);
        }

        Err(self.serr("Unknown statement"))
    }

    // PRINT: ';' emits one column-tracked space, ',' advances to the
    // next ten-column tab zone, a trailing separator suppresses the
    // newline
    fn exec_print(&mut self, cur: &mut Cursor) -> Result<Flow> {
        let mut newline = true;
        loop {
            cur.skip_spaces();
            if cur.at_end() || cur.la() == ':' {
                break;
            }
            let v = self.eval_expr(cur)?;
            self.print_value(&v);
            cur.skip_spaces();
            if cur.la() == ';' {
                newline = false;
                cur.consume();
                self.print_spaces(1);
            } else if cur.la() == ',' {
                newline = false;
                cur.consume();
                let pad = ((self.col / TAB_ZONE) + 1) * TAB_ZONE - self.col;
                self.print_spaces(pad);
            } else {
                newline = true;
                break;
            }
        }
        if newline {
            self.put_newline();
        }
        self.flush();
        Ok(Flow::Next)
    }

    // INPUT ["prompt";] var [, var ...] -- the prompt prints once,
    // every variable gets its own "? " and input line
    fn exec_input(&mut self, cur: &mut Cursor) -> Result<Flow> {
        let mut prompt = String::new();
        cur.skip_spaces();
        if cur.la() == '"' {
            match cur.string_literal() {
                Some(s) => prompt = s,
                None => return Err(self.serr("Unterminated string")),
            }
            cur.skip_spaces();
            if cur.la() == ';' || cur.la() == ',' {
                cur.consume();
            }
        }

        let mut first = true;
        loop {
            cur.skip_spaces();
            if cur.at_end() || cur.la() == ':' {
                break;
            }
            if !cur.la().is_ascii_alphabetic() {
                return Err(self.serr("Expected variable in INPUT"));
            }
            let place = self.parse_place(cur)?;

            if first && !prompt.is_empty() {
                let p = prompt.clone();
                self.write_text(&p);
            }
            self.write_text("? ");
            self.flush();

            let line = self.read_line()?;
            let v = if place.key.string {
                Value::str_from(&line)
            } else {
                Value::Num(::lexer::atof(&line))
            };
            self.store_place(&place, v);

            cur.skip_spaces();
            if cur.la() == ',' {
                cur.consume();
                first = false;
                continue;
            }
            break;
        }
        Ok(Flow::Next)
    }

    // [LET] var = expr -- the target's namespace dictates the coercion
    fn exec_let(&mut self, cur: &mut Cursor) -> Result<Flow> {
        let place = self.parse_place(cur)?;
        cur.skip_spaces();
        if cur.la() != '=' {
            return Err(self.serr("Expected '='"));
        }
        cur.consume();

        let v = self.eval_expr(cur)?;
        let v = if place.key.string {
            Value::Str(self.as_str(v)?)
        } else {
            Value::Num(self.as_num(v)?)
        };
        self.store_place(&place, v);
        Ok(Flow::Next)
    }

    fn exec_goto(&mut self, cur: &mut Cursor) -> Result<Flow> {
        cur.skip_spaces();
        let target = cur.line_number().unwrap_or(0);
        self.jump_to(target)?;
        Ok(Flow::Jump)
    }

    fn exec_gosub(&mut self, cur: &mut Cursor) -> Result<Flow> {
        if self.gosubs.len() >= MAX_GOSUB {
            return Err(self.rerr("GOSUB stack overflow"));
        }
        cur.skip_spaces();
        let target = cur.line_number().unwrap_or(0);
        self.gosubs.push(GosubFrame {
            line: self.current,
            pos: cur.pos(),
        });
        self.jump_to(target)?;
        Ok(Flow::Jump)
    }

    fn exec_return(&mut self, _cur: &mut Cursor) -> Result<Flow> {
        match self.gosubs.pop() {
            Some(frame) => {
                self.current = frame.line;
                self.cursor = Some(frame.pos);
                Ok(Flow::Jump)
            }
            None => Err(self.rerr("RETURN without GOSUB")),
        }
    }

    // IF cond THEN: false skips the whole rest of the line, a digit
    // after THEN is an implicit GOTO, anything else runs inline
    fn exec_if(&mut self, cur: &mut Cursor) -> Result<Flow> {
        let cond = self.eval_condition(cur)?;
        cur.skip_spaces();
        if !cur.match_kw("THEN") {
            return Err(self.serr("Missing THEN"));
        }
        cur.skip_spaces();

        if !cond {
            cur.seek_end();
            return Ok(Flow::Next);
        }
        if cur.la().is_ascii_digit() {
            let target = cur.line_number().unwrap_or(0);
            self.jump_to(target)?;
            return Ok(Flow::Jump);
        }
        Ok(Flow::Next)
    }

    // FOR v = start TO end [STEP s]. The resume cursor sits right
    // after the statement; the body always runs at least once.
    fn exec_for(&mut self, cur: &mut Cursor) -> Result<Flow> {
        if self.fors.len() >= MAX_FOR {
            return Err(self.rerr("FOR stack overflow"));
        }

        let place = self.parse_place(cur)?;
        if place.index.is_some() {
            return Err(self.rerr("FOR variable must be scalar"));
        }
        if place.key.string {
            return Err(self.rerr("FOR variable must be numeric"));
        }

        cur.skip_spaces();
        if cur.la() != '=' {
            return Err(self.serr("Expected '='"));
        }
        cur.consume();
        let start = self.num_expr(cur)?;

        cur.skip_spaces();
        if !cur.match_kw("TO") {
            return Err(self.serr("Expected TO in FOR"));
        }
        let end = self.num_expr(cur)?;

        cur.skip_spaces();
        let step = if cur.match_kw("STEP") {
            self.num_expr(cur)?
        } else {
            1.0
        };

        self.store_place(&place, Value::Num(start));

        let frame = ForFrame {
            key: place.key,
            end: end,
            step: step,
            line: self.current,
            resume: cur.pos(),
        };
        debug!("for      : {} to {} step {}", frame.key, frame.end, frame.step);
        self.fors.push(frame);
        Ok(Flow::Next)
    }

    // NEXT [v]: unnamed pops the innermost frame; a name discards
    // inner frames until it matches
    fn exec_next(&mut self, cur: &mut Cursor) -> Result<Flow> {
        cur.skip_spaces();
        let key = if cur.la().is_ascii_alphabetic() {
            let name = cur.identifier();
            Some(VarKey::from_name(&name))
        } else {
            None
        };

        let idx = match key {
            None => {
                if self.fors.is_empty() {
                    None
                } else {
                    Some(self.fors.len() - 1)
                }
            }
            Some(k) => self.fors.iter().rposition(|f| f.key.same_name(&k)),
        };
        let idx = match idx {
            Some(i) => i,
            None => return Err(self.rerr("NEXT without FOR")),
        };
        self.fors.truncate(idx + 1);
        let frame = self.fors[idx].clone();

        let var = match self.vars.find(frame.key) {
            Some(i) => i,
            None => return Err(self.rerr("Loop variable missing")),
        };
        let slot = self.vars.slot_mut(var, None);
        let v = match *slot {
            Value::Num(n) => n + frame.step,
            _ => frame.step,
        };
        *slot = Value::Num(v);

        if (frame.step >= 0.0 && v <= frame.end) || (frame.step < 0.0 && v >= frame.end) {
            self.current = frame.line;
            self.cursor = Some(frame.resume);
            Ok(Flow::Jump)
        } else {
            self.fors.pop();
            Ok(Flow::Next)
        }
    }

    // DIM name(size) [, ...] -- allocates or grows to size+1 elements
    fn exec_dim(&mut self, cur: &mut Cursor) -> Result<Flow> {
        loop {
            cur.skip_spaces();
            if !cur.la().is_ascii_alphabetic() {
                return Err(self.serr("Expected variable"));
            }
            let name = cur.identifier();
            let key = VarKey::from_name(&name);

            cur.skip_spaces();
            if cur.la() != '(' {
                return Err(self.serr("DIM requires size"));
            }
            cur.consume();
            let n = self.num_expr(cur)?;
            let size = (n as i64) + 1;
            if size <= 0 {
                return Err(self.rerr("Invalid array size"));
            }
            if size > ::eval::MAX_ARRAY_LEN as i64 {
                return Err(self.rerr("Out of memory"));
            }
            self.expect(cur, ')', "Missing ')'")?;

            let var = match self.vars.find_or_create(key) {
                Some(i) => i,
                None => return Err(self.rerr("Variable table full")),
            };
            self.vars.touch_array(var, size as usize);

            cur.skip_spaces();
            if cur.la() == ',' {
                cur.consume();
                continue;
            }
            break;
        }
        Ok(Flow::Next)
    }

    // SLEEP t -- t ticks of 1/60 s
    fn exec_sleep(&mut self, cur: &mut Cursor) -> Result<Flow> {
        let ticks = self.num_expr(cur)?;
        if ticks > 0.0 && ticks.is_finite() {
            // Duration::from_secs_f64 panics on overflow
            let secs = (ticks / 60.0).min(86_400.0);
            debug!("sleep    : {} ticks", ticks);
            thread::sleep(Duration::from_secs_f64(secs));
        }
        Ok(Flow::Next)
    }

    fn jump_to(&mut self, number: u32) -> Result<()> {
        let idx = if number <= 65535 {
            self.program.find_index(number as u16)
        } else {
            None
        };
        match idx {
            Some(i) => {
                debug!("jump     : line {}", number);
                self.current = i;
                self.cursor = None;
                Ok(())
            }
            None => Err(self.rerr("Target line not found")),
        }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut s = String::new();
        let res = self.inp.read_line(&mut s);
        match res {
            Ok(0) | Err(_) => Err(self.rerr("Unexpected end of input")),
            Ok(_) => {
                if s.ends_with('\n') {
                    s.pop();
                }
                if s.ends_with('\r') {
                    s.pop();
                }
                // the echoed Enter moved the terminal cursor
                self.col = 0;
                Ok(s)
            }
        }
    }

    // -- terminal output with column tracking ------------------------

    fn emit(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        self.out.write_all(ch.encode_utf8(&mut buf).as_bytes()).ok();
    }

    fn put_newline(&mut self) {
        self.emit('\n');
        self.col = 0;
    }

    // Column counter stays in [0, PRINT_WIDTH); overflow wraps with an
    // automatic newline
    fn write_text(&mut self, s: &str) {
        for ch in s.chars() {
            if ch == '\n' {
                self.put_newline();
            } else {
                self.emit(ch);
                self.col = self.col + 1;
                if self.col >= PRINT_WIDTH {
                    self.put_newline();
                }
            }
        }
    }

    fn print_spaces(&mut self, count: usize) {
        for _ in 0..count {
            self.emit(' ');
            self.col = self.col + 1;
            if self.col >= PRINT_WIDTH {
                self.put_newline();
            }
        }
    }

    fn print_value(&mut self, v: &Value) {
        let s = format!("{}", v);
        self.write_text(&s);
    }

    fn flush(&mut self) {
        self.out.flush().ok();
    }

    // TAB(n) moves to column n mod width, on a fresh line if already
    // past it
    pub(crate) fn fn_tab(&mut self, n: f64) {
        let width = PRINT_WIDTH as i64;
        let mut target = (n as i64) % width;
        if target < 0 {
            target = target + width;
        }
        let target = target as usize;
        if target < self.col {
            self.put_newline();
        }
        while self.col < target {
            self.emit(' ');
            self.col = self.col + 1;
        }
    }

    pub(crate) fn print_column(&self) -> usize {
        self.col
    }

    // -- error context -----------------------------------------------

    pub(crate) fn line_no(&self) -> Option<u16> {
        if self.current < self.program.len() {
            Some(self.program.line(self.current).number)
        } else {
            None
        }
    }

    pub(crate) fn rerr(&self, msg: &str) -> Error {
        Error::Runtime(self.line_no(), String::from(msg))
    }

    pub(crate) fn serr(&self, msg: &str) -> Error {
        Error::Syntax(self.line_no(), String::from(msg))
    }
}

#[cfg(test)]
mod tests {
    use error::Result;
    use interpreter::*;
    use program::Program;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    struct Sink(Rc<RefCell<Vec<u8>>>);

    impl io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run_with_input(src: &str, input: &str) -> (String, Result<()>) {
        let captured = Rc::new(RefCell::new(Vec::new()));
        let program = Program::parse(src).unwrap();
        let mut interpreter = Interpreter::with_io(
            program,
            Box::new(io::Cursor::new(String::from(input).into_bytes())),
            Box::new(Sink(captured.clone())),
        );
        let res = interpreter.run();
        drop(interpreter);
        let out = String::from_utf8(captured.borrow().clone()).unwrap();
        (out, res)
    }

    fn run_ok(src: &str) -> String {
        let (out, res) = run_with_input(src, "");
        res.unwrap();
        out
    }

    fn run_err(src: &str) -> String {
        let (_, res) = run_with_input(src, "");
        format!("{}", res.unwrap_err())
    }

    #[test]
    fn can_print_hello_world() {
        assert_eq!(run_ok("10 PRINT \"HELLO, WORLD!\"\n"), "HELLO, WORLD!\n");
    }

    #[test]
    fn can_run_a_counted_loop() {
        let src = "10 FOR I=1 TO 3\n20 PRINT I;\n30 NEXT I\n40 PRINT\n";
        assert_eq!(run_ok(src), "1 2 3 \n");
    }

    #[test]
    fn can_run_fibonacci() {
        let src = "10 A=0:B=1\n20 FOR I=1 TO 5\n30 PRINT A;\n40 C=A+B:A=B:B=C\n50 NEXT I\n60 PRINT\n";
        assert_eq!(run_ok(src), "0 1 1 2 3 \n");
    }

    #[test]
    fn can_slice_and_search_strings() {
        let src = "10 A$=\"HELLO WORLD\"\n20 PRINT LEFT$(A$,5)\n30 PRINT MID$(A$,7,5)\n40 PRINT INSTR(A$,\"O\")\n";
        assert_eq!(run_ok(src), "HELLO\nWORLD\n5\n");
    }

    #[test]
    fn gosub_returns_to_the_middle_of_a_line() {
        let src = "10 X=5:GOSUB 100:X=10:GOSUB 100:END\n100 PRINT \"X IS\";X\n110 RETURN\n";
        assert_eq!(run_ok(src), "X IS 5\nX IS 10\n");
    }

    #[test]
    fn boolean_operators_compose_in_conditions() {
        let src = "10 IF 5>3 AND 2<4 THEN PRINT \"YES\"\n20 PRINT NOT(0)\n";
        assert_eq!(run_ok(src), "YES\n-1\n");
    }

    #[test]
    fn false_condition_skips_the_whole_line_tail() {
        let src = "10 IF 0 THEN PRINT \"a\" : PRINT \"b\"\n20 PRINT \"c\"\n";
        assert_eq!(run_ok(src), "c\n");
    }

    #[test]
    fn then_with_digits_is_an_implicit_goto() {
        let src = "10 IF -1 THEN 30\n20 PRINT \"no\"\n30 PRINT \"yes\"\n";
        assert_eq!(run_ok(src), "yes\n");
    }

    #[test]
    fn for_body_runs_at_least_once() {
        let src = "10 FOR I=1 TO 0\n20 PRINT I\n30 NEXT\n";
        assert_eq!(run_ok(src), "1\n");
    }

    #[test]
    fn negative_step_counts_down() {
        let src = "10 FOR I=3 TO 1 STEP -1\n20 PRINT I;\n30 NEXT\n40 PRINT\n";
        assert_eq!(run_ok(src), "3 2 1 \n");
    }

    #[test]
    fn named_next_discards_inner_frames() {
        let src = "10 FOR J=1 TO 2\n20 FOR I=1 TO 9\n30 NEXT J\n40 PRINT \"OK\"\n";
        assert_eq!(run_ok(src), "OK\n");
    }

    #[test]
    fn arrays_default_grow_and_zero_fill() {
        let src = "10 A(0)=5\n20 A(10)=7\n30 A(100)=1\n40 PRINT A(0);A(10);A(100);A(55)\n";
        assert_eq!(run_ok(src), "5 7 1 0\n");
    }

    #[test]
    fn scalar_array_and_string_namespaces_coexist() {
        let src = "10 A=1:A(3)=2:A$=\"X\"\n20 PRINT A;A(3);A$\n";
        assert_eq!(run_ok(src), "1 2 X\n");
    }

    #[test]
    fn multi_statement_lines_execute_in_order() {
        assert_eq!(run_ok("10 A=1:B=2:PRINT A+B\n"), "3\n");
    }

    #[test]
    fn let_keyword_is_optional() {
        assert_eq!(run_ok("10 LET A=3\n20 B=4\n30 PRINT A*B\n"), "12\n");
    }

    #[test]
    fn rem_and_apostrophe_skip_the_line() {
        let src = "10 REM NOTHING : PRINT \"X\"\n20 ' ALSO NOTHING\n30 PRINT \"Z\"\n";
        assert_eq!(run_ok(src), "Z\n");
    }

    #[test]
    fn question_mark_is_print() {
        assert_eq!(run_ok("10 ?\"HI\"\n"), "HI\n");
    }

    #[test]
    fn end_skips_the_rest_of_the_line() {
        assert_eq!(run_ok("10 PRINT \"A\":END:PRINT \"B\"\n"), "A\n");
    }

    #[test]
    fn stop_halts_the_run() {
        assert_eq!(run_ok("10 STOP\n20 PRINT \"X\"\n"), "");
    }

    #[test]
    fn goto_abandons_the_rest_of_the_line() {
        assert_eq!(run_ok("10 GOTO 30:PRINT \"X\"\n30 PRINT \"Y\"\n"), "Y\n");
    }

    #[test]
    fn nested_gosubs_unwind_in_order() {
        let src = "10 GOSUB 100:PRINT \"END\"\n100 GOSUB 200:RETURN\n200 RETURN\n";
        assert_eq!(run_ok(src), "END\n");
    }

    #[test]
    fn comma_advances_to_the_next_tab_zone() {
        assert_eq!(run_ok("10 PRINT 1,22\n"), "1         22\n");
    }

    #[test]
    fn tab_and_pos_track_the_column() {
        assert_eq!(run_ok("10 PRINT TAB(5);\"X\"\n"), "      X\n");
        assert_eq!(run_ok("10 PRINT \"AB\";POS(0)\n"), "AB 4\n");
    }

    #[test]
    fn long_output_wraps_at_print_width() {
        let src = format!("10 PRINT \"{}\"\n", "A".repeat(81));
        let expected = format!("{}\nA\n", "A".repeat(80));
        assert_eq!(run_ok(&src), expected);
    }

    #[test]
    fn numbers_print_in_g_format() {
        assert_eq!(run_ok("10 PRINT 1000000\n"), "1e+06\n");
        assert_eq!(run_ok("10 PRINT 2.5\n"), "2.5\n");
        assert_eq!(run_ok("10 PRINT 1/0\n"), "inf\n");
    }

    #[test]
    fn val_of_str_round_trips() {
        assert_eq!(run_ok("10 PRINT VAL(STR$(3.25))\n"), "3.25\n");
    }

    #[test]
    fn left_plus_mid_reassembles_the_string() {
        let src = "10 A$=\"ABCDEF\"\n20 PRINT LEFT$(A$,2)+MID$(A$,3)\n";
        assert_eq!(run_ok(src), "ABCDEF\n");
    }

    #[test]
    fn concatenation_truncates_silently() {
        let src = format!(
            "10 A$=\"{}\"\n20 B$=A$+A$\n30 PRINT LEN(B$)\n",
            "Q".repeat(100)
        );
        assert_eq!(run_ok(&src), "127\n");
    }

    #[test]
    fn rnd_with_seed_is_reproducible() {
        let src = "10 X=RND(-9)\n20 PRINT RND(1);RND(1)\n";
        assert_eq!(run_ok(src), run_ok(src));
    }

    #[test]
    fn dim_allocates_and_lists() {
        let src = "10 DIM A(5), B$(2)\n20 A(5)=1:B$(2)=\"X\"\n30 PRINT A(5);B$(2)\n";
        assert_eq!(run_ok(src), "1 X\n");
    }

    #[test]
    fn dim_with_negative_size_errors() {
        assert_eq!(run_err("10 DIM A(-1)\n"), "Error at line 10: Invalid array size");
    }

    #[test]
    fn input_reads_prompted_values() {
        let src = "10 INPUT \"NAME\";N$\n20 INPUT A\n30 PRINT N$;A\n";
        let (out, res) = run_with_input(src, "BOB\n4.5\n");
        res.unwrap();
        assert_eq!(out, "NAME? ? BOB 4.5\n");
    }

    #[test]
    fn input_parses_numbers_like_atof() {
        let (out, res) = run_with_input("10 INPUT A\n20 PRINT A\n", "junk\n");
        res.unwrap();
        assert_eq!(out, "? 0\n");
    }

    #[test]
    fn input_with_comma_reads_each_variable() {
        let src = "10 INPUT A, B\n20 PRINT A+B\n";
        let (out, res) = run_with_input(src, "2\n3\n");
        res.unwrap();
        assert_eq!(out, "? ? 5\n");
    }

    #[test]
    fn input_at_eof_is_an_error() {
        let (_, res) = run_with_input("10 INPUT A\n", "");
        assert_eq!(
            format!("{}", res.unwrap_err()),
            "Error at line 10: Unexpected end of input"
        );
    }

    #[test]
    fn sleep_zero_and_negative_do_not_block() {
        assert_eq!(run_ok("10 SLEEP 0\n20 SLEEP -5\n30 PRINT \"OK\"\n"), "OK\n");
    }

    #[test]
    fn control_flow_errors_name_the_line() {
        assert_eq!(run_err("10 GOTO 99\n"), "Error at line 10: Target line not found");
        assert_eq!(run_err("10 RETURN\n"), "Error at line 10: RETURN without GOSUB");
        assert_eq!(run_err("10 NEXT\n"), "Error at line 10: NEXT without FOR");
        assert_eq!(run_err("10 NEXT Z\n"), "Error at line 10: NEXT without FOR");
    }

    #[test]
    fn gosub_stack_overflow_is_detected() {
        assert_eq!(
            run_err("10 GOSUB 10\n"),
            "Error at line 10: GOSUB stack overflow"
        );
    }

    #[test]
    fn for_stack_overflow_is_detected() {
        let src = "10 FOR I=1 TO 2\n20 GOTO 10\n";
        assert_eq!(run_err(src), "Error at line 10: FOR stack overflow");
    }

    #[test]
    fn for_loop_variable_must_be_plain_numeric() {
        assert_eq!(
            run_err("10 FOR A$=1 TO 2\n"),
            "Error at line 10: FOR variable must be numeric"
        );
        assert_eq!(
            run_err("10 FOR A(1)=1 TO 2\n"),
            "Error at line 10: FOR variable must be scalar"
        );
        assert_eq!(
            run_err("10 FOR I=1 UNTIL 2\n"),
            "Error at line 10: Expected TO in FOR"
        );
    }

    #[test]
    fn assignment_enforces_the_namespace() {
        assert_eq!(run_err("10 A$=5\n"), "Error at line 10: String value required");
        assert_eq!(
            run_err("10 A=\"X\"\n"),
            "Error at line 10: Numeric value required"
        );
    }

    #[test]
    fn syntax_errors_name_the_line() {
        assert_eq!(run_err("10 #!\n"), "Error at line 10: Unknown statement");
        assert_eq!(run_err("10 X 5\n"), "Error at line 10: Expected '='");
        assert_eq!(run_err("10 IF 1 PRINT\n"), "Error at line 10: Missing THEN");
        assert_eq!(
            run_err("10 A=1/\n"),
            "Error at line 10: Syntax error in expression"
        );
    }

    #[test]
    fn empty_program_completes_quietly() {
        assert_eq!(run_ok(""), "");
    }
}
