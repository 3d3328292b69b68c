//! The random generator must always produce a program that assembles,
//! compiles, and runs to its final `reti`.

use lasm::{AsmOptions, ExecValue, InterpBackend, Program};

fn run_random(n_ins: usize, seed: u64, optimize: bool) -> ExecValue {
    let opts = AsmOptions {
        optimize,
        ..AsmOptions::default()
    };
    let mut program = Program::new(opts, Box::new(InterpBackend::new()));
    program.assemble_random(n_ins, seed).expect("generation failed");
    program.run("main").expect("execution failed")
}

#[test]
fn generated_fragments_run_to_completion() {
    for seed in 0..4 {
        assert_eq!(run_random(100, seed, false), ExecValue::I32(0));
    }
}

#[test]
fn larger_fragments_also_complete() {
    assert_eq!(run_random(1000, 7, false), ExecValue::I32(0));
}

#[test]
fn optimized_generation_completes() {
    for seed in 0..4 {
        assert_eq!(run_random(200, seed, true), ExecValue::I32(0));
    }
}

#[test]
fn same_seed_reproduces_the_same_program() {
    let generate = |seed: u64| {
        let mut program = Program::new(AsmOptions::default(), Box::new(InterpBackend::new()));
        program.assemble_random(300, seed).unwrap();
        let len = program.buf.borrow().len();
        len
    };
    assert_eq!(generate(42), generate(42));
}
