use std::error;
use std::fmt;
use std::result;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Clone)]
pub enum Error {
    Load(String),
    Syntax(Option<u16>, String),
    Runtime(Option<u16>, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Error::Load(ref e) => write!(f, "{}", e),
            &Error::Syntax(Some(l), ref e) | &Error::Runtime(Some(l), ref e) => {
                write!(f, "Error at line {}: {}", l, e)
            }
            &Error::Syntax(None, ref e) | &Error::Runtime(None, ref e) => {
                write!(f, "Error: {}", e)
            }
        }
    }
}

impl error::Error for Error {}
