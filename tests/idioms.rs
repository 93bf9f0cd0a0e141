//! Recognition of the short instruction idioms that materialise booleans
//! from reference tests and branches.

mod common;

use common::record;
use opcode_stack_analyzer::{
    error::Result,
    method::{opcode, BodyBuilder},
    value::SpecialKind,
};

#[test]
fn the_nonnull_test_idiom_collapses_to_a_nullness_boolean() -> Result<()> {
    // static int f(Object o) { return o != null ? 0 : 1; } compiled as:
    //   aload_0; ifnonnull L1; iconst_1; goto L2; L1: iconst_0; L2: ireturn
    let mut builder = BodyBuilder::new("com/example/Idiom", "f", "(Ljava/lang/Object;)I");
    let non_null = builder.fresh_label();
    let join = builder.fresh_label();
    let body = builder
        .static_method()
        .op_reg(opcode::ALOAD, 0)
        .branch(opcode::IFNONNULL, non_null)
        .iconst(1)
        .branch(opcode::GOTO, join)
        .bind(non_null)
        .iconst(0)
        .bind(join)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let return_pc = body.instructions[5].pc;
    let stack = &recorded.stacks[&return_pc];
    // After ireturn the value is popped; look at the state the return saw
    // by checking the locals record is reachable and inspecting the join
    // instruction via the jump info instead.
    assert!(stack.is_empty());

    // The collapse happens in the pre-instruction step of the join point,
    // so observe the instruction at the idiom's join.
    let goto_pc = body.instructions[3].pc;
    assert!(recorded.info.jump_entry_locations.contains(&(goto_pc + 4)));

    Ok(())
}

#[test]
fn the_nullness_boolean_carries_kind_and_origin() -> Result<()> {
    // As above, but keep the value on the stack so the item is observable:
    //   aload_0; ifnonnull L1; iconst_1; goto L2; L1: iconst_0; L2: istore_1; return
    let mut builder = BodyBuilder::new("com/example/Idiom", "g", "(Ljava/lang/Object;)V");
    let non_null = builder.fresh_label();
    let join = builder.fresh_label();
    let body = builder
        .static_method()
        .op_reg(opcode::ALOAD, 0)
        .branch(opcode::IFNONNULL, non_null)
        .iconst(1)
        .branch(opcode::GOTO, join)
        .bind(non_null)
        .iconst(0)
        .bind(join)
        .op_reg(opcode::ISTORE, 1)
        .op(opcode::RETURN)
        .build()?;
    let recorded = record(&body);

    // After the store, register 1 holds the collapsed nullness boolean.
    let store_pc = body.instructions[5].pc;
    let boolean = recorded.local(store_pc, 1);
    assert_eq!(boolean.special_kind(), SpecialKind::NONZERO_MEANS_NULL);
    assert!(boolean.is_boolean_nullness_value());
    assert!(boolean.could_be_zero());
    // The item points back at the start of the idiom.
    let ifnonnull_pc = body.instructions[1].pc;
    assert_eq!(boolean.pc(), ifnonnull_pc as i32);

    Ok(())
}

#[test]
fn the_null_test_variant_means_zero_is_null() -> Result<()> {
    //   aload_0; ifnull L1; iconst_1; goto L2; L1: iconst_0; L2: istore_1
    let mut builder = BodyBuilder::new("com/example/Idiom", "h", "(Ljava/lang/Object;)V");
    let null_path = builder.fresh_label();
    let join = builder.fresh_label();
    let body = builder
        .static_method()
        .op_reg(opcode::ALOAD, 0)
        .branch(opcode::IFNULL, null_path)
        .iconst(1)
        .branch(opcode::GOTO, join)
        .bind(null_path)
        .iconst(0)
        .bind(join)
        .op_reg(opcode::ISTORE, 1)
        .op(opcode::RETURN)
        .build()?;
    let recorded = record(&body);

    let store_pc = body.instructions[5].pc;
    assert_eq!(
        recorded.local(store_pc, 1).special_kind(),
        SpecialKind::ZERO_MEANS_NULL
    );

    Ok(())
}

#[test]
fn a_materialised_comparison_boolean_could_be_zero() -> Result<()> {
    // static void f(int x) { boolean b = x == 0; } compiles to
    //   iload_0; ifne L1; iconst_1; goto L2; L1: iconst_0; L2: istore_1
    let mut builder = BodyBuilder::new("com/example/Idiom", "b", "(I)V");
    let not_zero = builder.fresh_label();
    let join = builder.fresh_label();
    let body = builder
        .static_method()
        .op_reg(opcode::ILOAD, 0)
        .branch(opcode::IFNE, not_zero)
        .iconst(1)
        .branch(opcode::GOTO, join)
        .bind(not_zero)
        .iconst(0)
        .bind(join)
        .op_reg(opcode::ISTORE, 1)
        .op(opcode::RETURN)
        .build()?;
    let recorded = record(&body);

    let store_pc = body.instructions[5].pc;
    let boolean = recorded.local(store_pc, 1);
    assert!(boolean.could_be_zero());
    assert!(boolean.constant().is_none());
    assert_eq!(boolean.special_kind(), SpecialKind::NOT_SPECIAL);

    Ok(())
}

#[test]
fn constant_branches_prune_the_impossible_path() -> Result<()> {
    // if (1 >= 2) is never taken: the target keeps no jump entry and the
    // fall-through proceeds normally.
    let mut builder = BodyBuilder::new("com/example/Idiom", "dead", "()I");
    let dead = builder.fresh_label();
    let body = builder
        .static_method()
        .iconst(1)
        .iconst(2)
        .branch(opcode::IF_ICMPGE, dead)
        .iconst(3)
        .op(opcode::IRETURN)
        .bind(dead)
        .iconst(4)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let dead_pc = body.instructions[5].pc;
    assert!(!recorded.info.jump_entry_locations.contains(&dead_pc));
    // The dead target is unreachable on the final pass.
    assert_eq!(recorded.top[&dead_pc], true);

    let live_pc = body.instructions[3].pc;
    assert_eq!(recorded.top[&live_pc], false);

    Ok(())
}

#[test]
fn constant_branches_that_are_taken_kill_the_fall_through() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Idiom", "taken", "()I");
    let target = builder.fresh_label();
    let body = builder
        .static_method()
        .iconst(5)
        .iconst(2)
        .branch(opcode::IF_ICMPGE, target)
        .iconst(3)
        .op(opcode::IRETURN)
        .bind(target)
        .iconst(4)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    // Fall-through is unreachable, the target is reachable.
    let fall_through_pc = body.instructions[3].pc;
    assert_eq!(recorded.top[&fall_through_pc], true);
    let target_pc = body.instructions[5].pc;
    assert_eq!(recorded.top[&target_pc], false);
    assert!(recorded.info.jump_entry_locations.contains(&target_pc));

    Ok(())
}

#[test]
fn null_against_constant_reference_comparisons_are_decided() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Idiom", "acmp", "()I");
    let diff = builder.fresh_label();
    let body = builder
        .static_method()
        .ldc_str("a")
        .op(opcode::ACONST_NULL)
        .branch(opcode::IF_ACMPNE, diff)
        .iconst(0)
        .op(opcode::IRETURN)
        .bind(diff)
        .iconst(1)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    // A constant can never be identical to null, so the branch is taken.
    let fall_through_pc = body.instructions[3].pc;
    assert_eq!(recorded.top[&fall_through_pc], true);
    let target_pc = body.instructions[5].pc;
    assert_eq!(recorded.top[&target_pc], false);

    Ok(())
}
