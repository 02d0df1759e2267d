//! Control flow: loops, switches, try/finally copies, synchronized regions.

mod common;

use common::{compile, count_opcode, fixture_compiler};
use weavec::codegen::opcodes as op;
use weavec::{Error, TypeDesc, UnitConfig};

fn u32_at(code: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

#[test]
fn while_loop_tests_before_the_body() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int()).is_static(true);
    let (body, _) = compile(
        &compiler,
        "{ int i = 0; while (i < 10) i = i + 1; return i; }",
        &config,
    );
    assert_eq!(
        body.code,
        vec![
            op::ICONST_0, 0x3b,
            op::ILOAD_0, op::BIPUSH, 10,
            op::IF_ICMPGE, 0, 10,
            op::ILOAD_0, op::ICONST_0 + 1, op::IADD, 0x3b,
            op::GOTO, 0xff, 0xf6,
            op::ILOAD_0, op::IRETURN,
        ]
    );
}

#[test]
fn do_while_tests_after_the_body() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int()).is_static(true);
    let (body, _) = compile(
        &compiler,
        "{ int i = 0; do { i = i + 1; } while (i < 3); return i; }",
        &config,
    );
    assert_eq!(
        body.code,
        vec![
            op::ICONST_0, 0x3b,
            op::ILOAD_0, op::ICONST_0 + 1, op::IADD, 0x3b,
            op::ILOAD_0, op::ICONST_0 + 3,
            op::IF_ICMPLT, 0xff, 0xfa,
            op::ILOAD_0, op::IRETURN,
        ]
    );
}

#[test]
fn for_loop_with_break() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int()).is_static(true);
    let (body, _) = compile(
        &compiler,
        "{ int s = 0; for (int i = 0; i < 5; i++) { if (i == 3) break; s = s + i; } return s; }",
        &config,
    );
    // one loop-back jump, one break jump
    assert_eq!(count_opcode(&body.code, op::GOTO), 2);
    assert_eq!(count_opcode(&body.code, op::IINC), 1);
    assert_eq!(*body.code.last().unwrap(), op::IRETURN);
}

#[test]
fn switch_emits_a_lookup_table() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .param_types(vec![TypeDesc::int()])
        .is_static(true);
    let (body, _) = compile(
        &compiler,
        "{ switch ($1) { case 1: return 10; default: return 0; } }",
        &config,
    );
    let code = &body.code;
    assert_eq!(code[0], op::ILOAD_0);
    assert_eq!(code[1], op::LOOKUPSWITCH);
    // payload is aligned to a 4-byte boundary from the method start
    assert_eq!(u32_at(code, 4), 22, "default offset");
    assert_eq!(u32_at(code, 8), 1, "pair count");
    assert_eq!(u32_at(code, 12), 1, "match value");
    assert_eq!(u32_at(code, 16), 19, "match offset");
    assert_eq!(
        &code[20..],
        &[op::BIPUSH, 10, op::IRETURN, op::ICONST_0, op::IRETURN]
    );
}

#[test]
fn switch_rejects_duplicate_case_labels() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void())
        .param_types(vec![TypeDesc::int()])
        .is_static(true);
    let mut pool = weavec::RecordingPool::new();
    let err = compiler
        .compile_body(
            "{ switch ($1) { case 1: break; case 1: break; } }",
            &config,
            &mut pool,
        )
        .unwrap_err();
    match err {
        Error::Compile { message, .. } => {
            assert!(message.contains("duplicate case label"), "{}", message)
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn finally_body_runs_on_both_paths() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int())
        .param_types(vec![TypeDesc::int()])
        .is_static(true);
    let (body, _) = compile(&compiler, "{ try { return 1; } finally { $1 = 0; } }", &config);
    assert_eq!(
        body.code,
        vec![
            // return path: park the value, run the finally copy, return
            op::ICONST_0 + 1, 0x3c,
            op::ICONST_0, 0x3b,
            0x1b, op::IRETURN,
            // exceptional path: catch-all handler reruns the copy and rethrows
            0x4d,
            op::ICONST_0, 0x3b,
            0x2c, op::ATHROW,
        ]
    );
    assert_eq!(body.exception_table.len(), 1);
    let entry = &body.exception_table[0];
    assert_eq!(
        (entry.start_pc, entry.end_pc, entry.handler_pc, entry.catch_type),
        (0, 6, 6, 0)
    );
    assert_eq!(body.max_locals, 3);
}

#[test]
fn empty_protected_body_records_no_exception_range() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void())
        .param_types(vec![TypeDesc::int()])
        .is_static(true);
    let (body, _) = compile(&compiler, "{ try { ; } finally { $1 = 0; } }", &config);
    // nothing in the body can throw, so no entry may cover it; a
    // zero-length range would be rejected by the verifier
    assert!(body.exception_table.is_empty());
    assert_eq!(
        body.code,
        vec![
            op::ICONST_0, 0x3b,
            op::GOTO, 0, 8,
            0x4c, op::ICONST_0, 0x3b, 0x2b, op::ATHROW,
            op::RETURN,
        ]
    );
}

#[test]
fn catch_clause_binds_the_exception() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int()).is_static(true);
    let (body, pool) = compile(
        &compiler,
        "{ try { throw new RuntimeException(); } catch (Exception e) { return 1; } return 0; }",
        &config,
    );
    assert_eq!(
        body.code,
        vec![
            op::NEW, 0, 1,
            op::DUP,
            op::INVOKESPECIAL, 0, 2,
            op::ATHROW,
            0x4b, op::ICONST_0 + 1, op::IRETURN,
            op::ICONST_0, op::IRETURN,
        ]
    );
    assert_eq!(body.exception_table.len(), 1);
    let entry = &body.exception_table[0];
    assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc), (0, 8, 8));
    assert_eq!(
        pool.entry_at(entry.catch_type),
        Some(&weavec::PoolEntry::Class("java/lang/Exception".to_string()))
    );
}

#[test]
fn synchronized_releases_on_both_paths() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void())
        .param_types(vec![TypeDesc::object()])
        .is_static(true);
    let (body, _) = compile(&compiler, "{ synchronized ($1) { $1.hashCode(); } }", &config);
    assert_eq!(
        body.code,
        vec![
            op::ALOAD_0, op::DUP, 0x4c, op::MONITORENTER,
            op::ALOAD_0, op::INVOKEVIRTUAL, 0, 1, op::POP,
            0x2b, op::MONITOREXIT,
            op::GOTO, 0, 6,
            0x2b, op::MONITOREXIT, op::ATHROW,
            op::RETURN,
        ]
    );
    assert_eq!(body.exception_table.len(), 2);
    let body_entry = &body.exception_table[0];
    let rethrow_entry = &body.exception_table[1];
    assert_eq!(
        (body_entry.start_pc, body_entry.end_pc, body_entry.handler_pc, body_entry.catch_type),
        (4, 9, 14, 0)
    );
    assert_eq!(
        (rethrow_entry.start_pc, rethrow_entry.end_pc, rethrow_entry.handler_pc),
        (14, 16, 14)
    );
}

#[test]
fn break_outside_a_loop_is_rejected() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::void()).is_static(true);
    let mut pool = weavec::RecordingPool::new();
    let err = compiler
        .compile_body("{ break; }", &config, &mut pool)
        .unwrap_err();
    match err {
        Error::Compile { message, .. } => {
            assert!(message.contains("break outside"), "{}", message)
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn labeled_break_leaves_the_outer_loop() {
    let compiler = fixture_compiler();
    let config = UnitConfig::new("demo.Target", TypeDesc::int()).is_static(true);
    let (body, _) = compile(
        &compiler,
        "{ int n = 0; outer: while (true) { while (true) { n = 1; break outer; } } return n; }",
        &config,
    );
    assert_eq!(*body.code.last().unwrap(), op::IRETURN);
    assert!(count_opcode(&body.code, op::GOTO) >= 2);
}
