use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::process;

extern crate clap;
use clap::{App, Arg};

extern crate env_logger;
#[macro_use]
extern crate log;
extern crate rand;
extern crate serde;
extern crate serde_json;

#[macro_use]
extern crate serde_derive;

mod error;
mod eval;
mod interpreter;
mod lexer;
mod library;
mod program;
mod value;
mod vars;

use interpreter::Interpreter;
use library::Library;
use program::Program;

fn main() {
    env_logger::init();

    let matches = App::new("minibasic")
        .version("0.1")
        .about("CBM BASIC v2 interpreter")
        .arg(
            Arg::with_name("FILE")
                .help("File path of BASIC program")
                .required_unless_one(&["list", "play"])
                .index(1),
        )
        .arg(
            Arg::with_name("list")
                .short("l")
                .long("list")
                .help("List bundled example programs"),
        )
        .arg(
            Arg::with_name("play")
                .short("p")
                .long("play")
                .takes_value(true)
                .value_name("NAME")
                .help("Run a bundled example program"),
        )
        .get_matches();

    if matches.is_present("list") {
        print!("{}", Library::new());
        process::exit(0);
    }

    let source = if let Some(name) = matches.value_of("play") {
        match Library::new().get(name) {
            Some(source) => source,
            None => {
                eprintln!("Program '{}' not found", name);
                process::exit(1);
            }
        }
    } else {
        let filename = matches.value_of("FILE").unwrap();
        let path = Path::new(filename);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(why) => {
                eprintln!("Cannot open {}: {}", filename, why);
                process::exit(1);
            }
        };
        let mut source = String::new();
        if let Err(why) = file.read_to_string(&mut source) {
            eprintln!("Cannot read {}: {}", filename, why);
            process::exit(1);
        }
        source
    };

    let program = match Program::parse(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    debug!("loaded {} lines", program.len());

    let mut interpreter = Interpreter::new(program);
    if let Err(e) = interpreter.run() {
        eprintln!("{}", e);
        process::exit(1);
    }
}
