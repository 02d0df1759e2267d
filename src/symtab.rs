//! Declarator arena and lexically scoped symbol table
//!
//! Declarators live in a flat arena owned by the compilation unit; AST nodes
//! refer to them by index. The symbol table is purely a compile-time
//! resolution structure: a stack of scopes pushed on block/for/catch entry,
//! popped when the block's compilation finishes, with innermost-first lookup
//! and shadowing.

use rustc_hash::FxHashMap;

use crate::types::TypeDesc;

/// Index of a declarator in the unit's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub usize);

/// A declared variable: source name, declared type, assigned local slot
#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    pub ty: TypeDesc,
    /// Local-variable slot; assigned at session setup for parameters and by
    /// the code generator for declarations
    pub slot: Option<u16>,
}

impl Declarator {
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            name: name.into(),
            ty,
            slot: None,
        }
    }

    pub fn with_slot(name: impl Into<String>, ty: TypeDesc, slot: u16) -> Self {
        Self {
            name: name.into(),
            ty,
            slot: Some(slot),
        }
    }
}

/// Chain of lexical scopes mapping identifier to declarator
pub struct SymbolTable {
    scopes: Vec<FxHashMap<String, DeclId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1);
        self.scopes.pop();
    }

    /// Add a binding to the innermost scope, shadowing any outer binding
    pub fn append(&mut self, name: impl Into<String>, decl: DeclId) {
        self.scopes
            .last_mut()
            .expect("symbol table always has a root scope")
            .insert(name.into(), decl);
    }

    /// Walk scopes from innermost to outermost; `None` means the name is to
    /// be treated as a member or class reference, not a local
    pub fn lookup(&self, name: &str) -> Option<DeclId> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_chain_with_shadowing() {
        let mut table = SymbolTable::new();
        table.append("x", DeclId(0));
        table.push_scope();
        table.append("y", DeclId(1));
        assert_eq!(table.lookup("x"), Some(DeclId(0)));
        assert_eq!(table.lookup("y"), Some(DeclId(1)));

        table.append("x", DeclId(2));
        assert_eq!(table.lookup("x"), Some(DeclId(2)));

        table.pop_scope();
        assert_eq!(table.lookup("x"), Some(DeclId(0)));
        assert_eq!(table.lookup("y"), None);
    }
}
