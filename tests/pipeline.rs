//! Filter pipeline behavior: CSE, expression simplification, soft-float
//! lowering, and the validation stages.

use lasm::{assemble, AsmOptions, ExecValue};

fn opts(optimize: bool) -> AsmOptions {
    AsmOptions {
        optimize,
        ..AsmOptions::default()
    }
}

const REDUNDANT: &str = "\
a = immi 3
b = immi 4
c = addi a b
d = addi a b
e = addi c d
reti e
";

#[test]
fn cse_removes_duplicate_expressions() {
    let plain = assemble(REDUNDANT, opts(false)).unwrap();
    let opt = assemble(REDUNDANT, opts(true)).unwrap();
    assert!(opt.buf.borrow().len() < plain.buf.borrow().len());
}

#[test]
fn optimized_result_matches_unoptimized() {
    let mut plain = assemble(REDUNDANT, opts(false)).unwrap();
    let mut opt = assemble(REDUNDANT, opts(true)).unwrap();
    assert_eq!(plain.run("main").unwrap(), ExecValue::I32(14));
    assert_eq!(opt.run("main").unwrap(), ExecValue::I32(14));
}

#[test]
fn folding_preserves_values() {
    let src = "\
a = immi 21
two = immi 2
one = immi 1
zero = immi 0
m = muli a two
n = muli m one
o = addi n zero
reti o
";
    let mut opt = assemble(src, opts(true)).unwrap();
    assert_eq!(opt.run("main").unwrap(), ExecValue::I32(42));
}

#[test]
fn folding_produces_infinities() {
    let src = "\
.begin pos
one = immd 1.0
zero = immd 0.0
inf = divd one zero
big = addd inf one
retd big
.end
.begin neg
mone = immd -1.0
zero = immd 0.0
ninf = divd mone zero
retd ninf
.end
";
    let mut plain = assemble(src, opts(false)).unwrap();
    let mut opt = assemble(src, opts(true)).unwrap();
    for p in [&mut plain, &mut opt] {
        assert_eq!(p.run("pos").unwrap(), ExecValue::Double(f64::INFINITY));
        assert_eq!(p.run("neg").unwrap(), ExecValue::Double(f64::NEG_INFINITY));
    }
}

#[test]
fn folding_preserves_nan() {
    // divd folds to NaN, muld by 1.0 and addd must carry it through
    let src = "\
zero = immd 0.0
one = immd 1.0
nan = divd zero zero
m = muld nan one
s = addd m nan
retd s
";
    let mut plain = assemble(src, opts(false)).unwrap();
    let mut opt = assemble(src, opts(true)).unwrap();
    let bits = |v: ExecValue| match v {
        ExecValue::Double(d) => d.to_bits(),
        other => panic!("expected a double, got {:?}", other),
    };
    let plain_bits = bits(plain.run("main").unwrap());
    let opt_bits = bits(opt.run("main").unwrap());
    assert!(f64::from_bits(opt_bits).is_nan());
    assert_eq!(opt_bits, plain_bits);
}

#[test]
fn nan_comparisons_fold_to_false() {
    let src = "\
zero = immd 0.0
one = immd 1.0
nan = divd zero zero
eq = eqd nan nan
lt = ltd nan one
any = ori eq lt
reti any
";
    let mut plain = assemble(src, opts(false)).unwrap();
    let mut opt = assemble(src, opts(true)).unwrap();
    assert_eq!(plain.run("main").unwrap(), ExecValue::I32(0));
    assert_eq!(opt.run("main").unwrap(), ExecValue::I32(0));
}

#[test]
fn cse_respects_label_boundaries() {
    // The second addi sits after a label, so CSE must not merge across
    // the join point in a way that changes the result.
    let src = "\
a = immi 3
b = immi 4
c = addi a b
j over
over: d = addi a b
e = addi c d
reti e
";
    let mut plain = assemble(src, opts(false)).unwrap();
    let mut opt = assemble(src, opts(true)).unwrap();
    assert_eq!(plain.run("main").unwrap(), ExecValue::I32(14));
    assert_eq!(opt.run("main").unwrap(), ExecValue::I32(14));
}

#[test]
fn soft_float_matches_hardware_doubles() {
    let src = "\
a = immd 1.5
b = immd 2.25
s = addd a b
q = muld s s
retd q
";
    let mut hard = assemble(src, AsmOptions::default()).unwrap();
    let soft_opts = AsmOptions {
        soft_float: true,
        ..AsmOptions::default()
    };
    let mut soft = assemble(src, soft_opts).unwrap();
    let hard_result = hard.run("main").unwrap();
    assert_eq!(hard_result, ExecValue::Double(14.0625));
    assert_eq!(soft.run("main").unwrap(), hard_result);
}

#[test]
fn soft_float_comparisons_yield_integers() {
    let src = "\
a = immd 1.5
b = immd 2.25
lt = ltd a b
reti lt
";
    let soft_opts = AsmOptions {
        soft_float: true,
        ..AsmOptions::default()
    };
    let mut soft = assemble(src, soft_opts).unwrap();
    assert_eq!(soft.run("main").unwrap(), ExecValue::I32(1));
}

#[test]
fn verbose_tracing_does_not_disturb_results() {
    let verbose_opts = AsmOptions {
        verbose: true,
        ..AsmOptions::default()
    };
    let mut program = assemble("v = immi 9\nreti v\n", verbose_opts).unwrap();
    assert_eq!(program.run("main").unwrap(), ExecValue::I32(9));
}

#[test]
fn validation_names_the_pipeline_stage() {
    let src = "\
a = immi 1
b = immd 2.0
c = addd a b
retd c
";
    let err = assemble(src, AsmOptions::default()).unwrap_err();
    assert!(err.to_string().contains("start of writer pipeline"));
}
