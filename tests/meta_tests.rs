//! Meta-variable forms: parameter array, result placeholder, signature
//! array, the special casts, proceed dispatch and context counters.

mod common;

use std::sync::Arc;

use common::{compile, count_opcode, field_refs, fixture_compiler, method_refs};
use weavec::ast::{Expr, Location};
use weavec::codegen::opcodes as op;
use weavec::codegen::CodeGen;
use weavec::meta::{CflowBinding, MetaBindings, ProceedHandler};
use weavec::typeck::TypeChecker;
use weavec::{Error, PoolEntry, TypeDesc, UnitConfig};

#[test]
fn args_snapshot_boxes_the_parameters() {
    let compiler = fixture_compiler();
    let bindings = MetaBindings::standard();
    let config = UnitConfig::new("demo.Target", TypeDesc::void())
        .param_types(vec![TypeDesc::int()])
        .is_static(true)
        .meta(&bindings);
    let (body, pool) = compile(&compiler, "{ Object[] a = $args; }", &config);
    assert_eq!(
        body.code,
        vec![
            op::ICONST_0 + 1,
            op::ANEWARRAY, 0, 1,
            op::DUP, op::ICONST_0, op::ILOAD_0,
            op::INVOKESTATIC, 0, 2,
            op::AASTORE,
            0x4c,
            op::RETURN,
        ]
    );
    assert!(method_refs(&pool).contains(&(
        "java/lang/Integer".to_string(),
        "valueOf".to_string(),
        "(I)Ljava/lang/Integer;".to_string()
    )));
}

#[test]
fn result_placeholder_gets_a_slot_and_returns() {
    let compiler = fixture_compiler();
    let bindings = MetaBindings::standard();
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .is_static(true)
        .meta(&bindings);
    let (body, _) = compile(&compiler, "{ $_ = 42; }", &config);
    assert_eq!(body.result_slot, Some(0));
    assert_eq!(
        body.code,
        vec![
            // placeholder initialized to the default value up front
            op::ICONST_0, 0x3b,
            op::BIPUSH, 42, 0x3b,
            op::ILOAD_0, op::IRETURN,
        ]
    );
}

#[test]
fn result_placeholder_increments_through_its_slot() {
    let compiler = fixture_compiler();
    let bindings = MetaBindings::standard();
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .is_static(true)
        .meta(&bindings);
    let (body, _) = compile(&compiler, "{ $_ = 1; $_++; return $_; }", &config);
    assert_eq!(body.result_slot, Some(0));
    assert_eq!(
        body.code,
        vec![
            op::ICONST_0, 0x3b,
            op::ICONST_0 + 1, 0x3b,
            op::IINC, 0, 1,
            op::ILOAD_0, op::IRETURN,
        ]
    );
}

#[test]
fn signature_array_mixes_primitive_and_class_entries() {
    let compiler = fixture_compiler();
    let bindings = MetaBindings::standard();
    let config = UnitConfig::new(
        "demo.Target",
        TypeDesc::array_of(TypeDesc::class("java.lang.Class"), 1),
    )
    .param_types(vec![TypeDesc::int(), TypeDesc::class("demo.Point")])
    .is_static(true)
    .meta(&bindings);
    let (body, pool) = compile(&compiler, "{ return $sig; }", &config);
    assert_eq!(count_opcode(&body.code, op::ANEWARRAY), 1);
    assert!(field_refs(&pool).contains(&(
        "java/lang/Integer".to_string(),
        "TYPE".to_string(),
        "Ljava/lang/Class;".to_string()
    )));
    assert!(pool
        .entries()
        .iter()
        .any(|(_, e)| *e == PoolEntry::Class("demo/Point".to_string())));
}

#[test]
fn wrapper_cast_boxes_a_primitive() {
    let compiler = fixture_compiler();
    let bindings = MetaBindings::standard();
    let config = UnitConfig::new("demo.Target", TypeDesc::void())
        .is_static(true)
        .meta(&bindings);
    let (body, pool) = compile(&compiler, "{ Object o = ($w) 5; }", &config);
    assert_eq!(
        body.code,
        vec![op::ICONST_0 + 5, op::INVOKESTATIC, 0, 1, 0x4b, op::RETURN]
    );
    assert!(method_refs(&pool).contains(&(
        "java/lang/Integer".to_string(),
        "valueOf".to_string(),
        "(I)Ljava/lang/Integer;".to_string()
    )));
}

#[test]
fn return_cast_unboxes_to_the_return_type() {
    let compiler = fixture_compiler();
    let bindings = MetaBindings::standard();
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .param_types(vec![TypeDesc::object()])
        .is_static(true)
        .meta(&bindings);
    let (body, pool) = compile(&compiler, "{ return ($r) $1; }", &config);
    assert_eq!(
        body.code,
        vec![
            op::ALOAD_0,
            op::CHECKCAST, 0, 1,
            op::INVOKEVIRTUAL, 0, 2,
            op::IRETURN,
        ]
    );
    assert!(method_refs(&pool).contains(&(
        "java/lang/Integer".to_string(),
        "intValue".to_string(),
        "()I".to_string()
    )));
}

struct ConstantProceed;

impl ProceedHandler for ConstantProceed {
    fn check(
        &self,
        _tc: &mut TypeChecker<'_>,
        args: &mut [Expr],
        loc: Location,
    ) -> weavec::Result<TypeDesc> {
        if !args.is_empty() {
            return Err(Error::compile(loc, "this proceed form takes no arguments"));
        }
        Ok(TypeDesc::int())
    }

    fn emit(&self, gen: &mut CodeGen<'_>, _args: &[Expr], _loc: Location) -> weavec::Result<()> {
        gen.code().op(op::ICONST_0 + 5, 1)
    }
}

#[test]
fn proceed_dispatches_through_the_handler() {
    let compiler = fixture_compiler();
    let bindings =
        MetaBindings::standard().with_proceed("proceed", Arc::new(ConstantProceed));
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .is_static(true)
        .meta(&bindings);
    let (body, _) = compile(&compiler, "{ return proceed(); }", &config);
    assert_eq!(body.code, vec![op::ICONST_0 + 5, op::IRETURN]);
}

#[test]
fn proceed_handler_errors_surface() {
    let compiler = fixture_compiler();
    let bindings =
        MetaBindings::standard().with_proceed("proceed", Arc::new(ConstantProceed));
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .is_static(true)
        .meta(&bindings);
    let mut pool = weavec::RecordingPool::new();
    let err = compiler
        .compile_body("{ return proceed(1); }", &config, &mut pool)
        .unwrap_err();
    assert!(matches!(err, Error::Compile { .. }), "unexpected: {}", err);
}

#[test]
fn cflow_reads_the_bound_counter() {
    let compiler = fixture_compiler();
    let bindings = MetaBindings::standard().with_cflow(CflowBinding {
        owner: "demo.Flow".to_string(),
        counter_class: "demo.Counter".to_string(),
    });
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .is_static(true)
        .meta(&bindings);
    let (body, pool) = compile(&compiler, "{ return $cflow(demo.Point.move); }", &config);
    assert_eq!(
        body.code,
        vec![op::GETSTATIC, 0, 1, op::INVOKEVIRTUAL, 0, 2, op::IRETURN]
    );
    assert!(field_refs(&pool).contains(&(
        "demo/Flow".to_string(),
        "cflow$demo$Point$move".to_string(),
        "Ldemo/Counter;".to_string()
    )));
    assert!(method_refs(&pool).contains(&(
        "demo/Counter".to_string(),
        "value".to_string(),
        "()I".to_string()
    )));
}

#[test]
fn parameter_spread_is_call_only() {
    let compiler = fixture_compiler();
    let bindings = MetaBindings::standard();
    let config = UnitConfig::new("demo.Target", TypeDesc::void())
        .is_static(true)
        .meta(&bindings);
    let mut pool = weavec::RecordingPool::new();
    let err = compiler
        .compile_body("{ Object o = $$; }", &config, &mut pool)
        .unwrap_err();
    match err {
        Error::Compile { message, .. } => {
            assert!(message.contains("parameter spread"), "{}", message)
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn meta_names_are_plain_identifiers_without_bindings() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void()).is_static(true);
    let mut pool = weavec::RecordingPool::new();
    let err = compiler
        .compile_body("{ Object o = $args; }", &config, &mut pool)
        .unwrap_err();
    match err {
        Error::Compile { message, .. } => {
            assert!(message.contains("no such field or variable"), "{}", message)
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn assigning_args_unpacks_into_the_slots() {
    let compiler = fixture_compiler();
    let bindings = MetaBindings::standard();
    let config = UnitConfig::new("demo.Target", TypeDesc::void())
        .param_types(vec![TypeDesc::int()])
        .is_static(true)
        .meta(&bindings);
    let (body, pool) = compile(&compiler, "{ Object[] a = $args; $args = a; }", &config);
    assert_eq!(count_opcode(&body.code, op::AALOAD), 1);
    let refs = method_refs(&pool);
    assert!(refs.contains(&(
        "java/lang/Integer".to_string(),
        "intValue".to_string(),
        "()I".to_string()
    )));
    assert!(refs.contains(&(
        "java/lang/Integer".to_string(),
        "valueOf".to_string(),
        "(I)Ljava/lang/Integer;".to_string()
    )));
}
