//! Guard side exits, `.patch` rewiring, and fragment-to-fragment calls.

use lasm::{assemble, AsmOptions, ExecValue};

#[test]
fn unpatched_guard_reports_its_line() {
    let src = "\
zero = immi 0
one = immi 1
xt one
reti zero
";
    let mut program = assemble(src, AsmOptions::default()).unwrap();
    assert_eq!(program.run("main").unwrap(), ExecValue::Exited(3));
}

#[test]
fn guard_that_does_not_fire_falls_through() {
    let src = "\
zero = immi 0
seven = immi 7
xt zero
xf seven
reti seven
";
    let mut program = assemble(src, AsmOptions::default()).unwrap();
    assert_eq!(program.run("main").unwrap(), ExecValue::I32(7));
}

#[test]
fn overflow_guard_exits_on_overflow() {
    let src = "\
big = immi 2000000000
sum = addxovi big big
reti sum
";
    let mut program = assemble(src, AsmOptions::default()).unwrap();
    assert_eq!(program.run("main").unwrap(), ExecValue::Exited(2));
}

#[test]
fn overflow_branch_takes_the_target() {
    let src = "\
big = immi 2000000000
one = immi 1
sum = addjovi big big over
reti one
over: two = immi 2
reti two
";
    let mut program = assemble(src, AsmOptions::default()).unwrap();
    assert_eq!(program.run("main").unwrap(), ExecValue::I32(2));
}

#[test]
fn patched_guard_transfers_to_another_fragment() {
    let src = "\
.begin target
v = immi 42
reti v
.end
.begin source
one = immi 1
g = xt one
zero = immi 0
reti zero
.end
.patch source.g -> target
";
    let mut program = assemble(src, AsmOptions::default()).unwrap();
    assert_eq!(program.run("source").unwrap(), ExecValue::I32(42));
}

#[test]
fn patch_requires_a_guard_instruction() {
    let src = "\
.begin a
v = immi 1
reti v
.end
.begin b
w = immi 2
reti w
.end
.patch a.v -> b
";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn patch_syntax_is_checked() {
    assert!(assemble(".patch nodot -> x\n", AsmOptions::default()).is_err());
    assert!(assemble(".patch a.g x\n", AsmOptions::default()).is_err());
}

#[test]
fn patch_unknown_fragment_is_rejected() {
    assert!(assemble(".patch a.g -> b\n", AsmOptions::default()).is_err());
}

#[test]
fn fragment_calls_return_their_value() {
    let src = "\
.begin inner
v = immi 7
reti v
.end
.begin main
r = calli inner cdecl
ten = immi 10
s = addi r ten
reti s
.end
";
    let mut program = assemble(src, AsmOptions::default()).unwrap();
    assert_eq!(program.run("main").unwrap(), ExecValue::I32(17));
}

#[test]
fn builtins_shadow_fragments() {
    // A fragment named after a built-in is unreachable from call sites;
    // the built-in's signature check still applies.
    let src = "\
.begin sin
v = immi 1
reti v
.end
.begin main
x = immi 0
r = calli sin cdecl x
reti r
.end
";
    assert!(assemble(src, AsmOptions::default()).is_err());
}
