//! weavec — an embedded compiler for method-body snippets
//!
//! Compiles a small Java-like statement/expression language into JVM
//! instructions, for containers that synthesize or patch method bodies at
//! load time. The caller supplies class metadata through a [`MetadataStore`],
//! a constant-pool seam through [`ConstPool`], and optionally a set of
//! reserved meta-variables through [`meta::MetaBindings`]; the compiler
//! answers with a [`CompiledBody`] holding the instruction stream, stack and
//! locals limits, exception table and any accessor members the emitted code
//! requires.
//!
//! ```no_run
//! use std::sync::Arc;
//! use weavec::{ClassBuilder, Compiler, RecordingPool, SimpleStore, TypeDesc, UnitConfig};
//!
//! let mut store = SimpleStore::new();
//! store.insert(ClassBuilder::new("demo.Target").build());
//! let compiler = Compiler::new(Arc::new(store));
//!
//! let config = UnitConfig::new("demo.Target", TypeDesc::void())
//!     .param_types(vec![TypeDesc::int()]);
//! let mut pool = RecordingPool::new();
//! let body = compiler.compile_body("{ int x = $1 * 2; }", &config, &mut pool)?;
//! # Ok::<(), weavec::Error>(())
//! ```

pub mod ast;
pub mod codegen;
pub mod error;
pub mod meta;
pub mod metadata;
pub mod parser;
pub mod resolver;
pub mod symtab;
pub mod typeck;
pub mod types;

use std::sync::Arc;

use log::debug;

use crate::meta::MetaResolver;
use crate::metadata::MethodDesc;
use crate::parser::Parser;
use crate::symtab::{Declarator, SymbolTable};
use crate::typeck::TypeChecker;

pub use crate::codegen::{
    BridgeKind, BridgeMember, CompiledBody, ConstPool, PoolEntry, RecordingPool,
};
pub use crate::error::{Error, Result};
pub use crate::metadata::{ClassBuilder, ClassDesc, MetadataStore, SimpleStore};
pub use crate::resolver::MemberResolver;
pub use crate::types::{BaseType, TypeDesc};

/// Static context one unit is compiled in: the class it will live in, the
/// signature it compiles against, and the optional meta-variable bindings
pub struct UnitConfig<'a> {
    /// Dotted name of the class the body is compiled into
    pub class: String,
    /// Method the body stands in for, used for private-access decisions
    pub method: Option<MethodDesc>,
    pub param_types: Vec<TypeDesc>,
    pub return_type: TypeDesc,
    pub is_static: bool,
    pub meta: Option<&'a dyn MetaResolver>,
}

impl<'a> UnitConfig<'a> {
    pub fn new(class: impl Into<String>, return_type: TypeDesc) -> Self {
        Self {
            class: class.into(),
            method: None,
            param_types: Vec::new(),
            return_type,
            is_static: false,
            meta: None,
        }
    }

    pub fn param_types(mut self, param_types: Vec<TypeDesc>) -> Self {
        self.param_types = param_types;
        self
    }

    pub fn method(mut self, method: MethodDesc) -> Self {
        self.method = Some(method);
        self
    }

    pub fn is_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn meta(mut self, meta: &'a dyn MetaResolver) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Compiler front door; owns the member resolver and its class cache, so one
/// instance amortizes metadata lookups across units
pub struct Compiler {
    resolver: MemberResolver,
}

impl Compiler {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            resolver: MemberResolver::new(store),
        }
    }

    pub fn resolver(&self) -> &MemberResolver {
        &self.resolver
    }

    /// Compile one body unit: parse, check and lower, then emit.
    ///
    /// The positional parameters are pre-registered as `$0` (the receiver,
    /// instance units only) and `$1`..`$n` with their real slots, so they
    /// parse as ordinary variables.
    pub fn compile_body(
        &self,
        source: &str,
        config: &UnitConfig<'_>,
        pool: &mut dyn ConstPool,
    ) -> Result<CompiledBody> {
        debug!(
            "compiling unit for {} ({} parameter(s))",
            config.class,
            config.param_types.len()
        );
        let current_class = self
            .resolver
            .resolve_class(&config.class, ast::Location::start())?;

        let mut symtab = SymbolTable::new();
        let mut seeded = Vec::new();
        let mut slot: u16 = 0;
        if !config.is_static {
            let id = symtab::DeclId(seeded.len());
            seeded.push(Declarator::with_slot(
                "$0",
                TypeDesc::class(current_class.name.clone()),
                0,
            ));
            symtab.append("$0", id);
            slot = 1;
        }
        let mut param_ids = Vec::with_capacity(config.param_types.len());
        for (i, ty) in config.param_types.iter().enumerate() {
            let name = format!("${}", i + 1);
            let id = symtab::DeclId(seeded.len());
            seeded.push(Declarator::with_slot(name.clone(), ty.clone(), slot));
            symtab.append(name, id);
            param_ids.push(id);
            slot = slot
                .checked_add(ty.width())
                .ok_or_else(|| Error::internal("too many parameter slots"))?;
        }
        let reserved = slot;

        let unit = Parser::new(source, symtab, seeded)?.parse_body()?;
        let ast::Unit { mut stmts, mut decls } = unit;

        let mut checker = TypeChecker::new(
            &self.resolver,
            current_class.clone(),
            config.method.as_ref(),
            config.meta,
            &mut decls,
            &param_ids,
            config.return_type.clone(),
            config.is_static,
        );
        checker.check(&mut stmts)?;
        let result_used = checker.result_used();
        drop(checker);

        let gen = codegen::CodeGen::new(
            pool,
            current_class,
            config.meta,
            &mut decls,
            param_ids,
            config.return_type.clone(),
            config.is_static,
            result_used,
            reserved,
        );
        let body = gen.generate(&stmts)?;
        debug!(
            "unit compiled: {} byte(s), max_stack {}, max_locals {}",
            body.code.len(),
            body.max_stack,
            body.max_locals
        );
        Ok(body)
    }
}
