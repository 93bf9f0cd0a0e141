//! A miniature detector built on the observer API: it flags calls of pure
//! `Math` functions whose argument is a constant, where the whole
//! computation could have been a literal.

mod common;

use common::record;
use opcode_stack_analyzer::{
    analyzer::Analyzer,
    context::{AnalysisContext, Config},
    error::Result,
    method::{opcode, BodyBuilder, MethodBody, Operand},
    value::{Constant, SpecialKind, Source},
};

const ZERO_METHODS: &[&str] = &[
    "acos", "asin", "atan", "atan2", "cbrt", "cos", "cosh", "exp", "expm1", "log", "log10",
    "pow", "sin", "sinh", "sqrt", "tan", "tanh", "toDegrees", "toRadians",
];
const ONE_METHODS: &[&str] = &[
    "acos", "asin", "atan", "cbrt", "exp", "log", "log10", "pow", "sqrt", "toDegrees",
];
const ANY_METHODS: &[&str] = &["abs", "ceil", "floor", "rint", "round"];

/// Finds the pcs of `Math` calls whose argument was a known constant that
/// makes the call foldable.
fn find_unnecessary_math(body: &MethodBody) -> Vec<u32> {
    let mut findings = Vec::new();
    let mut analyzer = Analyzer::new(body, AnalysisContext::new(Config::default()));
    let mut constant_before: Option<f64> = None;

    analyzer.analyze_with(|instruction, state| {
        if instruction.opcode == opcode::INVOKESTATIC {
            if let (Some(value), Operand::Method(method)) =
                (constant_before, &instruction.operand)
            {
                if method.class_name == "java/lang/Math" {
                    let name = method.name.as_str();
                    let foldable = value == 0.0 && ZERO_METHODS.contains(&name)
                        || value == 1.0 && ONE_METHODS.contains(&name)
                        || ANY_METHODS.contains(&name);
                    if foldable {
                        findings.push(instruction.pc);
                    }
                }
            }
        }
        // Remember a constant the instruction just pushed for the next
        // opcode, the way the call site sees it.
        constant_before = (state.stack_depth() > 0)
            .then(|| state.item_at(0))
            .and_then(|item| item.constant().and_then(Constant::as_f64));
    });
    findings
}

#[test]
fn a_math_call_on_a_constant_is_flagged() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Um", "waste", "()D");
    let body = builder
        .static_method()
        .op(opcode::DCONST_0)
        .invoke(opcode::INVOKESTATIC, "java/lang/Math", "cos", "(D)D")
        .op(opcode::DRETURN)
        .build()?;

    let call_pc = body.instructions[1].pc;
    assert_eq!(find_unnecessary_math(&body), vec![call_pc]);

    // The abstract state agrees: the result is float math from Math.cos.
    let recorded = record(&body);
    let result = recorded.top_of_stack(call_pc);
    assert_eq!(result.signature(), "D");
    assert_eq!(result.special_kind(), SpecialKind::FLOAT_MATH);
    match result.source() {
        Some(Source::Method(method)) => {
            assert_eq!(method.class_name, "java/lang/Math");
            assert_eq!(method.name, "cos");
        }
        other => panic!("expected Math.cos as the source, got {other:?}"),
    }

    Ok(())
}

#[test]
fn a_math_call_on_an_unknown_argument_is_not_flagged() -> Result<()> {
    // static double f(double d) { return Math.cos(d); }
    let mut builder = BodyBuilder::new("com/example/Um", "fine", "(D)D");
    let body = builder
        .static_method()
        .op_reg(opcode::DLOAD, 0)
        .invoke(opcode::INVOKESTATIC, "java/lang/Math", "cos", "(D)D")
        .op(opcode::DRETURN)
        .build()?;

    assert_eq!(find_unnecessary_math(&body), Vec::<u32>::new());

    Ok(())
}

#[test]
fn one_only_methods_are_not_flagged_on_other_constants() -> Result<()> {
    // Math.sin(1.0) is not foldable by the one-methods rule and sin is not
    // an any-method; but Math.sqrt(1.0) is flagged.
    let mut builder = BodyBuilder::new("com/example/Um", "mixed", "()D");
    let body = builder
        .static_method()
        .op(opcode::DCONST_1)
        .invoke(opcode::INVOKESTATIC, "java/lang/Math", "sin", "(D)D")
        .op(opcode::POP2)
        .op(opcode::DCONST_1)
        .invoke(opcode::INVOKESTATIC, "java/lang/Math", "sqrt", "(D)D")
        .op(opcode::DRETURN)
        .build()?;

    let sqrt_pc = body.instructions[4].pc;
    assert_eq!(find_unnecessary_math(&body), vec![sqrt_pc]);

    Ok(())
}

#[test]
fn abs_is_flagged_for_any_constant_argument() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Um", "abs", "()D");
    let body = builder
        .static_method()
        .ldc_double(2.5)
        .invoke(opcode::INVOKESTATIC, "java/lang/Math", "abs", "(D)D")
        .op(opcode::DRETURN)
        .build()?;

    let call_pc = body.instructions[1].pc;
    assert_eq!(find_unnecessary_math(&body), vec![call_pc]);

    Ok(())
}
