//! Shared fixtures: a hand-built metadata store describing a small class
//! graph, and compile helpers that capture the recorded constant pool.

#![allow(dead_code)]

use std::sync::Arc;

use weavec::metadata::access;
use weavec::{ClassBuilder, CompiledBody, Compiler, PoolEntry, RecordingPool, SimpleStore, UnitConfig};

pub fn fixture_compiler() -> Compiler {
    let mut store = SimpleStore::new();
    store.insert(
        ClassBuilder::new("java.lang.Object")
            .method("toString", "()Ljava/lang/String;", access::PUBLIC)
            .method("hashCode", "()I", access::PUBLIC)
            .method("equals", "(Ljava/lang/Object;)Z", access::PUBLIC)
            .build(),
    );
    store.insert(
        ClassBuilder::new("java.lang.String")
            .method("length", "()I", access::PUBLIC)
            .method("charAt", "(I)C", access::PUBLIC)
            .method("substring", "(II)Ljava/lang/String;", access::PUBLIC)
            .build(),
    );
    store.insert(ClassBuilder::new("java.lang.Throwable").build());
    store.insert(
        ClassBuilder::new("java.lang.Exception")
            .extends("java.lang.Throwable")
            .build(),
    );
    store.insert(
        ClassBuilder::new("java.lang.RuntimeException")
            .extends("java.lang.Exception")
            .method("<init>", "()V", access::PUBLIC)
            .method("<init>", "(Ljava/lang/String;)V", access::PUBLIC)
            .build(),
    );
    store.insert(
        ClassBuilder::new("demo.Point")
            .field("x", "I", access::PUBLIC)
            .field("y", "I", access::PUBLIC)
            .field("count", "I", access::PUBLIC | access::STATIC)
            .method("getX", "()I", access::PUBLIC)
            .method("move", "(II)V", access::PUBLIC)
            .method("origin", "()Ldemo/Point;", access::PUBLIC | access::STATIC)
            .build(),
    );
    store.insert(
        ClassBuilder::new("demo.Overloads")
            .method("describe", "(Ljava/lang/Object;)Ljava/lang/String;", access::PUBLIC)
            .method("describe", "(Ljava/lang/String;)Ljava/lang/String;", access::PUBLIC)
            .method("add", "(I)I", access::PUBLIC)
            .method("add", "(J)J", access::PUBLIC)
            .build(),
    );
    store.insert(
        ClassBuilder::new("demo.Target")
            .field("value", "I", access::PUBLIC)
            .field("name", "Ljava/lang/String;", access::PUBLIC)
            .build(),
    );
    Compiler::new(Arc::new(store))
}

pub fn compile(
    compiler: &Compiler,
    source: &str,
    config: &UnitConfig<'_>,
) -> (CompiledBody, RecordingPool) {
    let mut pool = RecordingPool::new();
    let body = compiler
        .compile_body(source, config, &mut pool)
        .unwrap_or_else(|e| panic!("compilation of {:?} failed: {}", source, e));
    (body, pool)
}

/// All `MethodRef`/`InterfaceMethodRef` entries as (class, name, descriptor)
pub fn method_refs(pool: &RecordingPool) -> Vec<(String, String, String)> {
    pool.entries()
        .iter()
        .filter_map(|(_, e)| match e {
            PoolEntry::MethodRef { class, name, descriptor }
            | PoolEntry::InterfaceMethodRef { class, name, descriptor } => {
                Some((class.clone(), name.clone(), descriptor.clone()))
            }
            _ => None,
        })
        .collect()
}

/// All `FieldRef` entries as (class, name, descriptor)
pub fn field_refs(pool: &RecordingPool) -> Vec<(String, String, String)> {
    pool.entries()
        .iter()
        .filter_map(|(_, e)| match e {
            PoolEntry::FieldRef { class, name, descriptor } => {
                Some((class.clone(), name.clone(), descriptor.clone()))
            }
            _ => None,
        })
        .collect()
}

pub fn count_opcode(code: &[u8], opcode: u8) -> usize {
    // byte scan; good enough when the opcode value cannot appear as an
    // operand in the fixture under test
    code.iter().filter(|&&b| b == opcode).count()
}
