use std::process;

use lasm::cli::{help_text, parse_args, CliArgs, ParseArgsResult};
use lasm::{ExecValue, InterpBackend, Program};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(ParseArgsResult::Help) => {
            print!("{}", help_text());
            return;
        }
        Ok(ParseArgsResult::ShowWordSize) => {
            println!("{}", usize::BITS);
            return;
        }
        Ok(ParseArgsResult::Args(args)) => args,
        Err(msg) => {
            eprintln!("lasm: {}", msg);
            process::exit(1);
        }
    };

    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<(), lasm::Error> {
    let mut program = Program::new(args.opts, Box::new(InterpBackend::new()));

    if args.random > 0 {
        program.assemble_random(args.random, args.seed)?;
    } else {
        // parse_args guarantees a filename when --random is absent.
        let filename = args.filename.as_deref().unwrap_or_default();
        let source = std::fs::read_to_string(filename)?;
        program.assemble(&source)?;
    }

    for warning in program.warnings() {
        eprintln!("warning: {}", warning);
    }

    if args.execute {
        match program.run("main")? {
            ExecValue::Exited(line) => println!("Exited block on line: {}", line),
            value => println!("Output is: {}", value),
        }
    }
    Ok(())
}
