//! End-to-end assembly of textual IR through the interpreter backend.

use lasm::{assemble, AsmOptions, ExecValue};

fn run_src(source: &str) -> ExecValue {
    let mut program = assemble(source, AsmOptions::default()).expect("assembly failed");
    program.run("main").expect("execution failed")
}

#[test]
fn immediate_return() {
    assert_eq!(run_src("five = immi 5\nreti five\n"), ExecValue::I32(5));
}

#[test]
fn integer_arithmetic() {
    let src = "\
a = immi 6
b = immi 7
p = muli a b
q = immi 2
r = subi p q
reti r
";
    assert_eq!(run_src(src), ExecValue::I32(40));
}

#[test]
fn hex_immediates() {
    assert_eq!(run_src("v = immi 0xff\nreti v\n"), ExecValue::I32(255));
    assert_eq!(
        run_src("v = immq 0x100000000\nretq v\n"),
        ExecValue::I64(1 << 32)
    );
}

#[test]
fn negative_immediates() {
    assert_eq!(run_src("v = immi -5\nreti v\n"), ExecValue::I32(-5));
}

#[test]
fn double_arithmetic() {
    let src = "\
a = immd 1.5
b = immd 2.25
c = addd a b
retd c
";
    assert_eq!(run_src(src), ExecValue::Double(3.75));
}

#[test]
fn comments_are_ignored() {
    let src = "v = immi 3 ; almost the answer\nreti v ; done\n";
    assert_eq!(run_src(src), ExecValue::I32(3));
}

#[test]
fn forward_jump_skips_statements() {
    let src = "\
dead = immi 1
j over
reti dead
over: live = immi 10
reti live
";
    assert_eq!(run_src(src), ExecValue::I32(10));
}

#[test]
fn backward_jump_loops() {
    let src = "\
zero = immi 0
one = immi 1
lim = immi 5
cell = allocp 8
sti zero cell 0
top: cur = ldi cell 0
next = addi cur one
sti next cell 0
done = gei next lim
jf done top
reti next
";
    assert_eq!(run_src(src), ExecValue::I32(5));
}

#[test]
fn explicit_fragments() {
    let src = "\
.begin one
a = immi 1
reti a
.end
.begin two
b = immi 2
reti b
.end
";
    let mut program = assemble(src, AsmOptions::default()).expect("assembly failed");
    assert_eq!(program.run("one").unwrap(), ExecValue::I32(1));
    assert_eq!(program.run("two").unwrap(), ExecValue::I32(2));
}

#[test]
fn stray_opcode_after_a_fragment_is_rejected() {
    // a bare instruction stream is only legal as the leading content
    let src = "\
.begin f
a = immi 1
reti a
.end
b = immi 2
reti b
";
    let err = assemble(src, AsmOptions::default()).unwrap_err();
    assert!(err.to_string().contains("stray opcode 'b'"));
}

#[test]
fn missing_return_warns() {
    let program = assemble("a = immi 1\n", AsmOptions::default()).unwrap();
    assert_eq!(program.warnings().len(), 1);
    assert_eq!(program.warnings()[0], "no return type in fragment 'main'");
}

#[test]
fn mixed_return_kinds_warn() {
    let src = "\
a = immi 1
q = i2q a
retq q
reti a
";
    let mut program = assemble(src, AsmOptions::default()).unwrap();
    assert_eq!(program.warnings().len(), 1);
    assert_eq!(
        program.warnings()[0],
        "multiple return types in fragment 'main'"
    );
    assert_eq!(program.run("main").unwrap(), ExecValue::I64(1));
}

#[test]
fn duplicate_value_label_is_rejected() {
    let src = "a = immi 1\na = immi 2\nreti a\n";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn unknown_value_label_is_rejected() {
    let src = "b = addi a a\nreti b\n";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn duplicate_jump_label_is_rejected() {
    let src = "\
t: a = immi 1
t: b = immi 2
reti a
";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn unresolved_jump_is_rejected() {
    let src = "a = immi 1\nj nowhere\nreti a\n";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn explicit_start_is_rejected() {
    assert!(assemble("start\n", AsmOptions::default()).is_err());
}

#[test]
fn load_displacement_must_be_literal() {
    let src = "\
p = allocp 8
d = immi 0
v = ldi p d
reti v
";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn operand_kinds_are_checked() {
    let src = "\
a = immi 1
b = immd 2.0
c = addd a b
retd c
";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn builtin_call() {
    let src = "\
x = immd 0.5
y = calld sin cdecl x
retd y
";
    match run_src(src) {
        ExecValue::Double(v) => assert!((v - 0.5f64.sin()).abs() < 1e-12),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn builtin_abi_must_match() {
    let src = "x = immd 0.5\ny = calld sin fastcall x\nretd y\n";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn builtin_arg_count_must_match() {
    let src = "x = immd 0.5\ny = calld sin cdecl x x\nretd y\n";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn unknown_callee_is_rejected() {
    let src = "y = calli nosuch cdecl\nreti y\n";
    assert!(assemble(src, AsmOptions::default()).is_err());
}

#[test]
fn puts_builtin_returns_the_printed_length() {
    // a fresh allocation is all zero, so puts sees the empty string
    let src = "\
p = allocp 8
n = calli puts cdecl p
reti n
";
    assert_eq!(run_src(src), ExecValue::I32(0));
}

#[test]
fn packed_float_builtin() {
    let src = "\
i = immi 1
j = immi 2
k = immi 3
x = immf4 6.0 12.0 18.0 24.0
r = callf4 callif4_2 cdecl i j k x
retf4 r
";
    assert_eq!(run_src(src), ExecValue::Float4([1.0, 2.0, 3.0, 4.0]));
}

#[test]
fn mixed_type_packed_float_builtin() {
    // scale = f + g/d + e - i*j = 2 + 1 + 2 - 3 = 2
    let src = "\
f = immf 2.0
i = immi 3
d = immd 1.0
x = immf4 2.0 4.0 6.0 8.0
j = immi 1
e = immd 2.0
g = immf 1.0
r = callf4 callf4_mt cdecl f i d x j e g x
retf4 r
";
    assert_eq!(run_src(src), ExecValue::Float4([2.0, 4.0, 6.0, 8.0]));
}
