//! Propagation of the provenance labels through calls, arithmetic and
//! branches.

mod common;

use std::rc::Rc;

use common::{record, record_with};
use opcode_stack_analyzer::{
    context::{AnalysisContext, ClassHierarchy, Config, FieldSummary},
    error::Result,
    method::{opcode, BodyBuilder, FieldRef},
    value::{Constant, Item, SpecialKind, Source},
};

#[test]
fn random_next_int_is_labelled_random() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Kinds", "rand", "()I");
    let body = builder
        .static_method()
        .new_object("java/util/Random")
        .op(opcode::DUP)
        .invoke(opcode::INVOKESPECIAL, "java/util/Random", "<init>", "()V")
        .invoke(opcode::INVOKEVIRTUAL, "java/util/Random", "nextInt", "()I")
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let call_pc = body.instructions[3].pc;
    let value = recorded.top_of_stack(call_pc);
    assert_eq!(value.special_kind(), SpecialKind::RANDOM_INT);
    assert!(value.value_could_be_negative());
    assert!(value.check_for_integer_min_value());

    Ok(())
}

#[test]
fn abs_of_random_keeps_the_random_pedigree() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Kinds", "absRand", "()I");
    let body = builder
        .static_method()
        .new_object("java/util/Random")
        .op(opcode::DUP)
        .invoke(opcode::INVOKESPECIAL, "java/util/Random", "<init>", "()V")
        .invoke(opcode::INVOKEVIRTUAL, "java/util/Random", "nextInt", "()I")
        .invoke(opcode::INVOKESTATIC, "java/lang/Math", "abs", "(I)I")
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let abs_pc = body.instructions[4].pc;
    let value = recorded.top_of_stack(abs_pc);
    assert_eq!(value.special_kind(), SpecialKind::MATH_ABS_OF_RANDOM);
    assert!(value.might_rarely_be_negative());
    match value.source() {
        Some(Source::Method(method)) => {
            assert_eq!(method.class_name, "java/lang/Math");
            assert_eq!(method.name, "abs");
        }
        other => panic!("expected a method source, got {other:?}"),
    }

    Ok(())
}

#[test]
fn hashcode_remainder_is_labelled_unless_the_divisor_masks() -> Result<()> {
    // this.hashCode() % 10 keeps the label...
    let mut builder = BodyBuilder::new("com/example/Kinds", "h", "()I");
    let body = builder
        .op_reg(opcode::ALOAD, 0)
        .invoke(opcode::INVOKEVIRTUAL, "com/example/Kinds", "hashCode", "()I")
        .iconst(10)
        .op(opcode::IREM)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);
    let rem_pc = body.instructions[3].pc;
    assert_eq!(
        recorded.top_of_stack(rem_pc).special_kind(),
        SpecialKind::HASHCODE_INT_REMAINDER
    );

    // ...but % 8 is a mask and drops it.
    let mut builder = BodyBuilder::new("com/example/Kinds", "h8", "()I");
    let body = builder
        .op_reg(opcode::ALOAD, 0)
        .invoke(opcode::INVOKEVIRTUAL, "com/example/Kinds", "hashCode", "()I")
        .iconst(8)
        .op(opcode::IREM)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);
    let rem_pc = body.instructions[3].pc;
    assert_eq!(
        recorded.top_of_stack(rem_pc).special_kind(),
        SpecialKind::NOT_SPECIAL
    );

    Ok(())
}

#[test]
fn adding_two_unknowns_is_an_integer_sum_and_halving_it_an_average() -> Result<()> {
    // static int f(int a, int b) { return (a + b) / 2; }
    let mut builder = BodyBuilder::new("com/example/Kinds", "avg", "(II)I");
    let body = builder
        .static_method()
        .op_reg(opcode::ILOAD, 0)
        .op_reg(opcode::ILOAD, 1)
        .op(opcode::IADD)
        .iconst(2)
        .op(opcode::IDIV)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let add_pc = body.instructions[2].pc;
    assert_eq!(
        recorded.top_of_stack(add_pc).special_kind(),
        SpecialKind::INTEGER_SUM
    );
    let div_pc = body.instructions[4].pc;
    assert_eq!(
        recorded.top_of_stack(div_pc).special_kind(),
        SpecialKind::AVERAGE_COMPUTED_USING_DIVISION
    );

    Ok(())
}

#[test]
fn masking_with_a_clear_low_byte_is_labelled() -> Result<()> {
    // static int f(int x) { return x & 0xff00; }
    let mut builder = BodyBuilder::new("com/example/Kinds", "mask", "(I)I");
    let body = builder
        .static_method()
        .op_reg(opcode::ILOAD, 0)
        .iconst(0xff00)
        .op(opcode::IAND)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let and_pc = body.instructions[2].pc;
    assert_eq!(
        recorded.top_of_stack(and_pc).special_kind(),
        SpecialKind::LOW_8_BITS_CLEAR
    );

    Ok(())
}

#[test]
fn masking_with_a_small_positive_constant_is_non_negative() -> Result<()> {
    // static int f(int x) { return x & 0x7f; }
    let mut builder = BodyBuilder::new("com/example/Kinds", "mask7f", "(I)I");
    let body = builder
        .static_method()
        .op_reg(opcode::ILOAD, 0)
        .iconst(0x7f)
        .op(opcode::IAND)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let and_pc = body.instructions[2].pc;
    assert_eq!(
        recorded.top_of_stack(and_pc).special_kind(),
        SpecialKind::NON_NEGATIVE
    );

    Ok(())
}

#[test]
fn a_signed_comparison_promotes_the_tested_register() -> Result<()> {
    // static int f(int x) { if (x < 0) return 0; return x; }
    let mut builder = BodyBuilder::new("com/example/Kinds", "nn", "(I)I");
    let negative = builder.fresh_label();
    let body = builder
        .static_method()
        .op_reg(opcode::ILOAD, 0)
        .branch(opcode::IFLT, negative)
        .op_reg(opcode::ILOAD, 0)
        .op(opcode::IRETURN)
        .bind(negative)
        .iconst(0)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    // On the fall-through path the register was just proven non-negative.
    let reload_pc = body.instructions[2].pc;
    assert_eq!(
        recorded.top_of_stack(reload_pc).special_kind(),
        SpecialKind::NON_NEGATIVE
    );
    assert_eq!(recorded.local(reload_pc, 0).special_kind(), SpecialKind::NON_NEGATIVE);

    Ok(())
}

#[test]
fn comparing_abs_against_integer_min_value_clears_the_label() -> Result<()> {
    // The guard `if (h == Integer.MIN_VALUE)` proves the label useless
    // everywhere once it is checked.
    let mut builder = BodyBuilder::new("com/example/Kinds", "guard", "()I");
    let guarded = builder.fresh_label();
    let body = builder
        .op_reg(opcode::ALOAD, 0)
        .invoke(opcode::INVOKEVIRTUAL, "com/example/Kinds", "hashCode", "()I")
        .invoke(opcode::INVOKESTATIC, "java/lang/Math", "abs", "(I)I")
        .op_reg(opcode::ISTORE, 1)
        .op_reg(opcode::ILOAD, 1)
        .iconst(i32::MIN)
        .branch(opcode::IF_ICMPEQ, guarded)
        .op_reg(opcode::ILOAD, 1)
        .op(opcode::IRETURN)
        .bind(guarded)
        .iconst(0)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let abs_pc = body.instructions[2].pc;
    assert_eq!(
        recorded.top_of_stack(abs_pc).special_kind(),
        SpecialKind::MATH_ABS_OF_HASHCODE
    );
    let reload_pc = body.instructions[7].pc;
    assert_eq!(
        recorded.top_of_stack(reload_pc).special_kind(),
        SpecialKind::NOT_SPECIAL
    );

    Ok(())
}

#[test]
fn boxing_preserves_the_constant_and_unboxing_recovers_it() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Kinds", "boxed", "()I");
    let body = builder
        .static_method()
        .iconst(1000)
        .invoke(
            opcode::INVOKESTATIC,
            "java/lang/Integer",
            "valueOf",
            "(I)Ljava/lang/Integer;",
        )
        .invoke(opcode::INVOKEVIRTUAL, "java/lang/Integer", "intValue", "()I")
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let box_pc = body.instructions[1].pc;
    let boxed = recorded.top_of_stack(box_pc);
    assert_eq!(boxed.signature(), "Ljava/lang/Integer;");
    assert_eq!(boxed.constant(), Some(&Constant::Int(1000)));

    let unbox_pc = body.instructions[2].pc;
    let unboxed = recorded.top_of_stack(unbox_pc);
    assert_eq!(unboxed.signature(), "I");
    assert_eq!(unboxed.constant(), Some(&Constant::Int(1000)));

    Ok(())
}

#[test]
fn collection_size_is_non_negative_under_the_hierarchy_oracle() -> Result<()> {
    #[derive(Debug)]
    struct ListsAreCollections;
    impl ClassHierarchy for ListsAreCollections {
        fn is_subtype(&self, class_name: &str, supertype: &str) -> bool {
            class_name == "java.util.ArrayList" && supertype == "java.util.Collection"
        }
    }

    // static int f(ArrayList l) { return l.size(); }
    let mut builder = BodyBuilder::new("com/example/Kinds", "size", "(Ljava/util/ArrayList;)I");
    let body = builder
        .static_method()
        .op_reg(opcode::ALOAD, 0)
        .invoke(opcode::INVOKEVIRTUAL, "java/util/ArrayList", "size", "()I")
        .op(opcode::IRETURN)
        .build()?;

    let context =
        AnalysisContext::new(Config::default()).with_hierarchy(Rc::new(ListsAreCollections));
    let recorded = record_with(&body, context);

    let size_pc = body.instructions[1].pc;
    assert_eq!(
        recorded.top_of_stack(size_pc).special_kind(),
        SpecialKind::NON_NEGATIVE
    );

    // Without the oracle, nothing is known about the callee.
    let recorded = record(&body);
    assert_eq!(
        recorded.top_of_stack(size_pc).special_kind(),
        SpecialKind::NOT_SPECIAL
    );

    Ok(())
}

#[test]
fn file_separator_loads_are_recognised() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Kinds", "sep", "()Ljava/lang/String;");
    let body = builder
        .static_method()
        .field(
            opcode::GETSTATIC,
            "java/io/File",
            "separator",
            "Ljava/lang/String;",
            true,
        )
        .op(opcode::ARETURN)
        .build()?;
    let recorded = record(&body);

    let load_pc = body.instructions[0].pc;
    let separator = recorded.top_of_stack(load_pc);
    assert_eq!(separator.special_kind(), SpecialKind::FILE_SEPARATOR_STRING);
    assert!(separator.field().is_some());

    Ok(())
}

#[test]
fn complete_field_summaries_are_reused_for_nonpublic_fields() -> Result<()> {
    #[derive(Debug)]
    struct CountSummary;
    impl FieldSummary for CountSummary {
        fn is_complete(&self) -> bool {
            true
        }
        fn summary(&self, field: &FieldRef) -> Option<Item> {
            (field.name == "count").then(|| Item::with_constant("I", 7))
        }
    }

    let mut builder = BodyBuilder::new("com/example/Kinds", "count", "()I");
    let body = builder
        .static_method()
        .field(opcode::GETSTATIC, "com/example/Kinds", "count", "I", false)
        .op(opcode::IRETURN)
        .build()?;

    let context =
        AnalysisContext::new(Config::default()).with_field_summary(Rc::new(CountSummary));
    let recorded = record_with(&body, context);

    let load_pc = body.instructions[0].pc;
    let value = recorded.top_of_stack(load_pc);
    assert_eq!(value.constant(), Some(&Constant::Int(7)));
    assert!(value.field().is_some());

    Ok(())
}

#[test]
fn storing_to_a_field_erases_knowledge_of_it() -> Result<()> {
    // Load a field twice, store to it in between: the first loaded value
    // must forget its field provenance.
    let mut builder = BodyBuilder::new("com/example/Kinds", "erase", "()V");
    let body = builder
        .static_method()
        .field(opcode::GETSTATIC, "com/example/Kinds", "f", "I", false)
        .iconst(1)
        .field(opcode::PUTSTATIC, "com/example/Kinds", "f", "I", false)
        .op(opcode::POP)
        .op(opcode::RETURN)
        .build()?;
    let recorded = record(&body);

    let put_pc = body.instructions[2].pc;
    // The remaining stack item was loaded from the field but the store
    // invalidated the link.
    assert!(recorded.top_of_stack(put_pc).field().is_none());

    Ok(())
}

#[test]
fn file_streams_opened_for_append_are_tracked_through_buffering() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Kinds", "open", "()Ljava/io/OutputStream;");
    let body = builder
        .static_method()
        .new_object("java/io/FileOutputStream")
        .op(opcode::DUP)
        .ldc_str("app.log")
        .iconst(1)
        .invoke(
            opcode::INVOKESPECIAL,
            "java/io/FileOutputStream",
            "<init>",
            "(Ljava/lang/String;Z)V",
        )
        .op_reg(opcode::ASTORE, 0)
        .new_object("java/io/BufferedOutputStream")
        .op(opcode::DUP)
        .op_reg(opcode::ALOAD, 0)
        .invoke(
            opcode::INVOKESPECIAL,
            "java/io/BufferedOutputStream",
            "<init>",
            "(Ljava/io/OutputStream;)V",
        )
        .op(opcode::ARETURN)
        .build()?;
    let recorded = record(&body);

    let ctor_pc = body.instructions[4].pc;
    assert_eq!(
        recorded.top_of_stack(ctor_pc).special_kind(),
        SpecialKind::FILE_OPENED_IN_APPEND_MODE
    );

    let wrap_pc = body.instructions[9].pc;
    assert_eq!(
        recorded.top_of_stack(wrap_pc).special_kind(),
        SpecialKind::FILE_OPENED_IN_APPEND_MODE
    );

    Ok(())
}

#[test]
fn collection_factories_reveal_their_hidden_types() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Kinds", "lists", "()Ljava/util/List;");
    let body = builder
        .static_method()
        .iconst(0)
        .anewarray("java/lang/String")
        .invoke(
            opcode::INVOKESTATIC,
            "java/util/Arrays",
            "asList",
            "([Ljava/lang/Object;)Ljava/util/List;",
        )
        .invoke(
            opcode::INVOKESTATIC,
            "java/util/Collections",
            "unmodifiableList",
            "(Ljava/util/List;)Ljava/util/List;",
        )
        .op(opcode::ARETURN)
        .build()?;
    let recorded = record(&body);

    let as_list_pc = body.instructions[2].pc;
    assert_eq!(
        recorded.top_of_stack(as_list_pc).signature(),
        "Ljava/util/Arrays$ArrayList;"
    );

    // Wrapping the array view picks the random-access wrapper type.
    let wrap_pc = body.instructions[3].pc;
    assert_eq!(
        recorded.top_of_stack(wrap_pc).signature(),
        "Ljava/util/Collections$UnmodifiableRandomAccessList;"
    );

    Ok(())
}

#[test]
fn require_non_null_passes_the_initial_parameter_through() -> Result<()> {
    // static Object f(Object o) { return Objects.requireNonNull(o); }
    let mut builder = BodyBuilder::new(
        "com/example/Kinds",
        "req",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
    );
    let body = builder
        .static_method()
        .op_reg(opcode::ALOAD, 0)
        .invoke(
            opcode::INVOKESTATIC,
            "java/util/Objects",
            "requireNonNull",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
        )
        .op(opcode::ARETURN)
        .build()?;
    let recorded = record(&body);

    let call_pc = body.instructions[1].pc;
    assert!(recorded.top_of_stack(call_pc).is_initial_parameter());

    Ok(())
}

#[test]
fn arraylength_of_a_fresh_array_knows_its_length() -> Result<()> {
    let mut builder = BodyBuilder::new("com/example/Kinds", "len", "()I");
    let body = builder
        .static_method()
        .iconst(16)
        .newarray(10) // int[]
        .op(opcode::ARRAYLENGTH)
        .op(opcode::IRETURN)
        .build()?;
    let recorded = record(&body);

    let new_pc = body.instructions[1].pc;
    let array = recorded.top_of_stack(new_pc);
    assert_eq!(array.signature(), "[I");
    assert!(array.is_newly_allocated());
    assert_eq!(array.constant(), Some(&Constant::Int(16)));

    let len_pc = body.instructions[2].pc;
    let length = recorded.top_of_stack(len_pc);
    assert_eq!(length.constant(), Some(&Constant::Int(16)));
    assert_eq!(length.special_kind(), SpecialKind::NON_NEGATIVE);

    Ok(())
}
