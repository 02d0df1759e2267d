//! End-to-end compilation of expression and declaration units, asserting the
//! exact instruction streams and recorded pool entries.

mod common;

use common::{compile, count_opcode, field_refs, fixture_compiler, method_refs};
use weavec::codegen::opcodes as op;
use weavec::{BaseType, Error, TypeDesc, UnitConfig};

#[test]
fn constant_folding_reaches_the_initializer() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void()).is_static(true);
    let (body, _) = compile(&compiler, "{ int x = 1 + 2; }", &config);
    assert_eq!(body.code, vec![op::ICONST_0 + 3, 0x3b, op::RETURN]);
    assert_eq!(body.max_stack, 1);
    assert_eq!(body.max_locals, 1);
}

#[test]
fn parameter_arithmetic_and_return() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .param_types(vec![TypeDesc::int()])
        .is_static(true);
    let (body, _) = compile(&compiler, "{ return $1 + 1; }", &config);
    assert_eq!(
        body.code,
        vec![op::ILOAD_0, op::ICONST_0 + 1, op::IADD, op::IRETURN]
    );
    assert_eq!(body.max_stack, 2);
}

#[test]
fn instance_field_read_through_receiver() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Point", TypeDesc::int());
    let (body, pool) = compile(&compiler, "{ return $0.x; }", &config);
    assert_eq!(body.code, vec![op::ALOAD_0, op::GETFIELD, 0, 1, op::IRETURN]);
    assert!(field_refs(&pool).contains(&(
        "demo/Point".to_string(),
        "x".to_string(),
        "I".to_string()
    )));
}

#[test]
fn string_concat_lowers_to_builder_appends() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::string())
        .param_types(vec![TypeDesc::int()])
        .is_static(true);
    let (body, pool) = compile(&compiler, "{ return \"a\" + $1; }", &config);
    assert_eq!(
        body.code,
        vec![
            op::NEW, 0, 1,
            op::DUP,
            op::INVOKESPECIAL, 0, 2,
            op::LDC, 3,
            op::INVOKEVIRTUAL, 0, 4,
            op::ILOAD_0,
            op::INVOKEVIRTUAL, 0, 5,
            op::INVOKEVIRTUAL, 0, 6,
            op::ARETURN,
        ]
    );
    let refs = method_refs(&pool);
    assert!(refs.contains(&(
        "java/lang/StringBuilder".to_string(),
        "append".to_string(),
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;".to_string()
    )));
    assert!(refs.contains(&(
        "java/lang/StringBuilder".to_string(),
        "append".to_string(),
        "(I)Ljava/lang/StringBuilder;".to_string()
    )));
    assert_eq!(body.max_stack, 3);
}

#[test]
fn string_compound_append_on_a_local() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::string()).is_static(true);
    let (body, pool) = compile(
        &compiler,
        "{ String s = \"a\"; s += \"b\"; return s; }",
        &config,
    );
    assert_eq!(
        body.code,
        vec![
            op::LDC, 1, 0x4b,
            op::ALOAD_0,
            op::NEW, 0, 2,
            op::DUP,
            op::INVOKESPECIAL, 0, 3,
            op::SWAP,
            op::INVOKEVIRTUAL, 0, 4,
            op::LDC, 5,
            op::INVOKEVIRTUAL, 0, 4,
            op::INVOKEVIRTUAL, 0, 6,
            0x4b,
            op::ALOAD_0, op::ARETURN,
        ]
    );
    let refs = method_refs(&pool);
    assert!(refs.contains(&(
        "java/lang/StringBuilder".to_string(),
        "append".to_string(),
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;".to_string()
    )));
    assert_eq!(body.max_stack, 3);
}

#[test]
fn string_compound_append_reads_the_field_path_once() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void());
    let (body, _) = compile(&compiler, "{ $0.name += \"!\"; }", &config);
    // one receiver load feeds both the read and the write-back
    assert_eq!(count_opcode(&body.code, op::ALOAD_0), 1);
    assert_eq!(count_opcode(&body.code, op::GETFIELD), 1);
    assert_eq!(count_opcode(&body.code, op::PUTFIELD), 1);
}

#[test]
fn narrowing_cast_from_long() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void())
        .param_types(vec![TypeDesc::primitive(BaseType::Long)])
        .is_static(true);
    let (body, _) = compile(&compiler, "{ int x = (int) $1; }", &config);
    assert_eq!(body.code, vec![op::LLOAD_0, op::L2I, 0x3d, op::RETURN]);
    assert_eq!(body.max_locals, 3);
}

#[test]
fn widening_in_an_initializer_needs_no_cast() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void())
        .param_types(vec![TypeDesc::int()])
        .is_static(true);
    let (body, _) = compile(&compiler, "{ long x = $1; }", &config);
    assert_eq!(body.code, vec![op::ILOAD_0, op::I2L, 0x40, op::RETURN]);
    assert_eq!(body.max_stack, 2);
    assert_eq!(body.max_locals, 3);
}

#[test]
fn long_shift_count_narrows_to_int() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .param_types(vec![TypeDesc::int()])
        .is_static(true);
    let (body, _) = compile(&compiler, "{ return $1 << 2L; }", &config);
    assert_eq!(
        body.code,
        vec![op::ILOAD_0, op::LDC2_W, 0, 1, op::L2I, op::ISHL, op::IRETURN]
    );
}

#[test]
fn virtual_call_on_a_parameter() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .param_types(vec![TypeDesc::string()])
        .is_static(true);
    let (body, pool) = compile(&compiler, "{ return $1.length(); }", &config);
    assert_eq!(
        body.code,
        vec![op::ALOAD_0, op::INVOKEVIRTUAL, 0, 1, op::IRETURN]
    );
    assert!(method_refs(&pool).contains(&(
        "java/lang/String".to_string(),
        "length".to_string(),
        "()I".to_string()
    )));
}

#[test]
fn conditional_expression_branches() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .param_types(vec![TypeDesc::int()])
        .is_static(true);
    let (body, _) = compile(&compiler, "{ return $1 > 0 ? 1 : 2; }", &config);
    assert_eq!(
        body.code,
        vec![
            op::ILOAD_0,
            op::IFLE, 0, 7,
            op::ICONST_0 + 1,
            op::GOTO, 0, 4,
            op::ICONST_0 + 2,
            op::IRETURN,
        ]
    );
}

#[test]
fn primitive_array_allocate_store_load() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int()).is_static(true);
    let (body, _) = compile(
        &compiler,
        "{ int[] a = new int[3]; a[0] = 5; return a[0]; }",
        &config,
    );
    assert_eq!(
        body.code,
        vec![
            op::ICONST_0 + 3,
            op::NEWARRAY, op::atype::INT,
            0x4b,
            op::ALOAD_0, op::ICONST_0, op::ICONST_0 + 5, op::IASTORE,
            op::ALOAD_0, op::ICONST_0, op::IALOAD, op::IRETURN,
        ]
    );
    assert_eq!(body.max_stack, 3);
}

#[test]
fn unknown_name_is_a_compile_error() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int()).is_static(true);
    let mut pool = weavec::RecordingPool::new();
    let err = compiler
        .compile_body("{ return zzz; }", &config, &mut pool)
        .unwrap_err();
    match err {
        Error::Compile { message, .. } => {
            assert!(message.contains("no such field or variable"), "{}", message)
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn malformed_input_is_a_syntax_error() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void()).is_static(true);
    let mut pool = weavec::RecordingPool::new();
    let err = compiler
        .compile_body("{ int = 5; }", &config, &mut pool)
        .unwrap_err();
    assert!(matches!(err, Error::Syntax { .. }), "unexpected: {}", err);
}

#[test]
fn reference_to_primitive_initializer_is_rejected() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void()).is_static(true);
    let mut pool = weavec::RecordingPool::new();
    let err = compiler
        .compile_body("{ int x = \"abc\"; }", &config, &mut pool)
        .unwrap_err();
    assert!(matches!(err, Error::Compile { .. }), "unexpected: {}", err);
}
