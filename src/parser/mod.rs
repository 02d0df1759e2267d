//! Lexical analysis and parsing
//!
//! Tokenizes one method-body unit and builds the AST with a recursive
//! descent parser. The symbol table is consulted during parsing so that
//! identifiers already declared (parameters, meta-variables, locals) become
//! variable references, while everything else stays an unclassified name for
//! the checker to resolve.

pub mod lexer;
#[allow(clippy::module_inception)]
mod parser;

pub use lexer::{Lexer, LexicalToken, Token};
pub use parser::Parser;
