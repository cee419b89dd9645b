use std::fs;
use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use lox::interpreter::Interpreter;

mod tracing_setup;

const USAGE: &str = "Usage: lox [--help|-h] [<file>]";

fn main() -> Result<()> {
    tracing_setup::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => run_prompt(),
        [flag] if flag == "--help" || flag == "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        [path] => run_file(path),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(64);
        }
    }
}

fn run_file(path: &str) -> Result<()> {
    let source = fs::read_to_string(path).with_context(|| format!("Reading {path}"))?;
    let mut interp = Interpreter::new(io::stdout());
    if interp.run(&source) {
        std::process::exit(1);
    }
    Ok(())
}

fn run_prompt() -> Result<()> {
    let stdin = io::stdin();
    let mut interp = Interpreter::new(io::stdout());

    let mut input = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        input.clear();
        let nbytes = stdin.lock().read_line(&mut input)?;
        if nbytes == 0 || input.trim() == "exit" {
            break;
        }
        interp.run_repl_line(&input);
    }

    Ok(())
}
