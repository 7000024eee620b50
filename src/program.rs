use error::{Error, Result};

pub const MAX_LINES: usize = 512;
pub const MAX_LINE_LEN: usize = 256;

// One stored program line
#[derive(Debug, Clone)]
pub struct Line {
    pub number: u16,
    pub text: String,
}

// Program store: lines sorted by number after load, addressed by index.
// Lookups go through a binary search with a one-slot cache for
// repeated jumps.
pub struct Program {
    lines: Vec<Line>,
    cache: Option<(u16, usize)>,
}

impl Program {
    pub fn parse(source: &str) -> Result<Program> {
        let mut lines: Vec<Line> = Vec::new();

        for raw in source.lines() {
            if raw.len() >= MAX_LINE_LEN {
                return Err(Error::Load(format!(
                    "Line too long (max {} chars)",
                    MAX_LINE_LEN
                )));
            }

            let mut p = raw.trim_start_matches(|c: char| c == ' ' || c == '\t');
            p = p.strip_prefix('\u{feff}').unwrap_or(p);
            if p.is_empty() {
                continue;
            }

            if !p.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(Error::Load(format!("Line missing number: {}", raw)));
            }

            let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
            let number = match digits.parse::<u32>() {
                Ok(n) if n <= 65535 => n as u16,
                _ => {
                    return Err(Error::Load(format!(
                        "Line number out of range: {}",
                        digits
                    )))
                }
            };

            let text = p[digits.len()..]
                .trim_start_matches(|c: char| c == ' ' || c == '\t')
                .to_string();

            match lines.iter_mut().find(|l| l.number == number) {
                Some(line) => line.text = text,
                None => {
                    if lines.len() >= MAX_LINES {
                        return Err(Error::Load(String::from("Program too large")));
                    }
                    lines.push(Line {
                        number: number,
                        text: text,
                    });
                }
            }
        }

        lines.sort_by_key(|l| l.number);
        Ok(Program {
            lines: lines,
            cache: None,
        })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> &Line {
        &self.lines[index]
    }

    pub fn find_index(&mut self, number: u16) -> Option<usize> {
        if let Some((n, i)) = self.cache {
            if n == number {
                return Some(i);
            }
        }
        match self.lines.binary_search_by_key(&number, |l| l.number) {
            Ok(i) => {
                self.cache = Some((number, i));
                Some(i)
            }
            Err(_) => None,
        }
    }
}
