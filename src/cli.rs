//! CLI argument parsing, exported from the library so integration tests can
//! exercise it.

use crate::AsmOptions;

/// Fully-parsed CLI arguments for an assembly request.
#[derive(Debug)]
pub struct CliArgs {
    /// IR source file; `None` when `--random` is given.
    pub filename: Option<String>,
    /// Generate this many random instructions instead of reading a file.
    pub random: usize,
    /// Seed for `--random`, so failures can be replayed.
    pub seed: u64,
    pub execute: bool,
    pub opts: AsmOptions,
}

/// Result of `parse_args`.
#[derive(Debug)]
pub enum ParseArgsResult {
    /// Normal assembly request.
    Args(CliArgs),
    /// `--help` was present; caller should print usage and exit 0.
    Help,
    /// `--show-word-size`: print the pointer width in bits and exit 0.
    ShowWordSize,
}

fn optional_count(args: &[String], i: &mut usize, default: usize) -> Result<usize, String> {
    if let Some(next) = args.get(*i + 1) {
        if let Ok(n) = next.parse::<usize>() {
            *i += 1;
            if n == 0 {
                return Err("instruction count must be greater than zero".to_owned());
            }
            return Ok(n);
        }
    }
    Ok(default)
}

/// Parses command-line arguments (the full `std::env::args()` slice
/// including `argv[0]`).
pub fn parse_args(args: &[String]) -> Result<ParseArgsResult, String> {
    let mut filename: Option<String> = None;
    let mut random = 0usize;
    let mut seed = 0u64;
    let mut execute = false;
    let mut opts = AsmOptions::default();
    let mut i = 1usize;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Ok(ParseArgsResult::Help),
            "--show-word-size" => return Ok(ParseArgsResult::ShowWordSize),
            "--execute" => execute = true,
            "--optimize" => opts.optimize = true,
            "--no-optimize" => opts.optimize = false,
            "--soft-float" => opts.soft_float = true,
            "-v" | "--verbose" => opts.verbose = true,
            "--random" => {
                random = optional_count(args, &mut i, 100)?;
            }
            "--seed" => {
                i += 1;
                let text = args
                    .get(i)
                    .ok_or_else(|| "--seed requires an argument".to_owned())?;
                seed = text
                    .parse::<u64>()
                    .map_err(|_| format!("bad seed: '{}'", text))?;
            }
            arg if !arg.starts_with('-') => {
                if filename.is_some() {
                    return Err("you can only specify one filename".to_owned());
                }
                filename = Some(arg.to_owned());
            }
            arg => return Err(format!("bad option: {}", arg)),
        }
        i += 1;
    }

    if (random == 0) == filename.is_none() {
        return Err(
            "you must specify either a filename or --random (but not both)".to_owned(),
        );
    }

    Ok(ParseArgsResult::Args(CliArgs {
        filename,
        random,
        seed,
        execute,
        opts,
    }))
}

pub fn help_text() -> String {
    "\
Usage: lasm [options] [filename]

Options:
  -h, --help            show this message and exit
  -v, --verbose         disassemble instructions as they are emitted
  --execute             run the fragment named 'main' and print its result
  --optimize            enable the CSE and expression-folding filters
  --no-optimize         disable them (the default)
  --random [N]          generate a random program of N instructions
                        (default 100) instead of reading a file
  --seed N              RNG seed for --random (default 0)
  --soft-float          lower double-precision ops to helper calls
  --show-word-size      print the pointer width in bits and exit

Exactly one of a filename or --random must be given.
"
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(rest: &[&str]) -> Vec<String> {
        let mut v = vec!["lasm".to_owned()];
        v.extend(rest.iter().map(|s| s.to_string()));
        v
    }

    #[test]
    fn file_and_random_are_exclusive() {
        assert!(parse_args(&argv(&[])).is_err());
        assert!(parse_args(&argv(&["a.lir", "--random", "5"])).is_err());
        assert!(parse_args(&argv(&["a.lir", "b.lir"])).is_err());
    }

    #[test]
    fn random_count_is_optional() {
        match parse_args(&argv(&["--random"])) {
            Ok(ParseArgsResult::Args(args)) => assert_eq!(args.random, 100),
            other => panic!("unexpected: {:?}", other),
        }
        match parse_args(&argv(&["--random", "7", "--seed", "42"])) {
            Ok(ParseArgsResult::Args(args)) => {
                assert_eq!(args.random, 7);
                assert_eq!(args.seed, 42);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn flags_set_options() {
        match parse_args(&argv(&["--execute", "--optimize", "-v", "t.lir"])) {
            Ok(ParseArgsResult::Args(args)) => {
                assert!(args.execute);
                assert!(args.opts.optimize);
                assert!(args.opts.verbose);
                assert_eq!(args.filename.as_deref(), Some("t.lir"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn bad_option_is_reported() {
        assert!(parse_args(&argv(&["--bogus", "t.lir"])).is_err());
    }
}
