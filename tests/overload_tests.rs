//! Overload selection: exact signatures beat widening, scoring is stable,
//! and class-qualified static calls resolve through dotted paths.

mod common;

use common::{compile, count_opcode, fixture_compiler, method_refs};
use weavec::codegen::opcodes as op;
use weavec::{BaseType, Error, TypeDesc, UnitConfig};

#[test]
fn exact_string_overload_wins() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Overloads", TypeDesc::string());
    let (_, pool) = compile(&compiler, "{ return describe(\"hi\"); }", &config);
    let refs = method_refs(&pool);
    assert!(refs.contains(&(
        "demo/Overloads".to_string(),
        "describe".to_string(),
        "(Ljava/lang/String;)Ljava/lang/String;".to_string()
    )));
    assert!(!refs
        .iter()
        .any(|(_, _, d)| d == "(Ljava/lang/Object;)Ljava/lang/String;"));
}

#[test]
fn reference_widening_falls_back_to_object() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Overloads", TypeDesc::string())
        .param_types(vec![TypeDesc::class("demo.Point")]);
    let (_, pool) = compile(&compiler, "{ return describe($1); }", &config);
    assert!(method_refs(&pool).contains(&(
        "demo/Overloads".to_string(),
        "describe".to_string(),
        "(Ljava/lang/Object;)Ljava/lang/String;".to_string()
    )));
}

#[test]
fn int_literal_takes_the_int_overload() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Overloads", TypeDesc::int());
    let (_, pool) = compile(&compiler, "{ return add(3); }", &config);
    assert!(method_refs(&pool).contains(&(
        "demo/Overloads".to_string(),
        "add".to_string(),
        "(I)I".to_string()
    )));
}

#[test]
fn short_argument_widens_to_the_first_candidate() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Overloads", TypeDesc::int())
        .param_types(vec![TypeDesc::primitive(BaseType::Short)]);
    let (_, pool) = compile(&compiler, "{ return add($1); }", &config);
    assert!(method_refs(&pool).contains(&(
        "demo/Overloads".to_string(),
        "add".to_string(),
        "(I)I".to_string()
    )));
}

#[test]
fn long_argument_matches_exactly() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Overloads", TypeDesc::primitive(BaseType::Long))
        .param_types(vec![TypeDesc::primitive(BaseType::Long)]);
    let (_, pool) = compile(&compiler, "{ return add($1); }", &config);
    assert!(method_refs(&pool).contains(&(
        "demo/Overloads".to_string(),
        "add".to_string(),
        "(J)J".to_string()
    )));
}

#[test]
fn dotted_path_resolves_a_static_call() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::class("demo.Point")).is_static(true);
    let (body, pool) = compile(&compiler, "{ return demo.Point.origin(); }", &config);
    assert_eq!(count_opcode(&body.code, op::INVOKESTATIC), 1);
    assert!(method_refs(&pool).contains(&(
        "demo/Point".to_string(),
        "origin".to_string(),
        "()Ldemo/Point;".to_string()
    )));
}

#[test]
fn no_applicable_overload_is_reported() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Overloads", TypeDesc::int());
    let mut pool = weavec::RecordingPool::new();
    let err = compiler
        .compile_body("{ return add(\"s\"); }", &config, &mut pool)
        .unwrap_err();
    match err {
        Error::Compile { message, .. } => {
            assert!(message.contains("no matching method"), "{}", message)
        }
        other => panic!("unexpected error: {}", other),
    }
}
