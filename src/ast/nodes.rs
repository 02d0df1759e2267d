//! AST node definitions
//!
//! Expression nodes carry an optional type triple that the checker fills in;
//! lowered forms (`StringConcat`, resolved member references, meta forms) are
//! produced by the checker as replacement node kinds owning the original
//! operand subtrees, so the generator never depends on hidden mutation order.

use super::Location;
use crate::meta::MetaForm;
use crate::resolver::{FieldRef, MethodRef};
use crate::symtab::DeclId;
use crate::types::TypeDesc;

/// Binary operators, shared by expressions and compound assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    BitAnd,
    BitOr,
    BitXor,
    AndAnd,
    OrOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::AndAnd | BinOp::OrOr)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr | BinOp::Ushr)
    }
}

/// Prefix unary operators (unary plus is dropped during parsing)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

/// Receiver part of a method call
#[derive(Debug, Clone)]
pub enum CallTarget {
    /// `foo(...)` — implicit receiver (or the currently compiled method)
    Implicit,
    /// `expr.foo(...)`
    Expr(Box<Expr>),
    /// `a.b.foo(...)` where the prefix has not been classified yet
    Path(Vec<String>),
    /// `a.b#foo(...)` or a checker-classified static call
    Class(String),
    /// `super.foo(...)`
    Super,
}

/// Expression node with its source position and checker-assigned type
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: Location,
    /// Resolved type triple; `Some` on every node after type checking
    pub ty: Option<TypeDesc>,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: Location) -> Self {
        Self { kind, loc, ty: None }
    }

    /// Whether this node is a compile-time literal (post-folding)
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::IntLit(_)
                | ExprKind::LongLit(_)
                | ExprKind::FloatLit(_)
                | ExprKind::DoubleLit(_)
                | ExprKind::CharLit(_)
                | ExprKind::BoolLit(_)
                | ExprKind::StringLit(_)
                | ExprKind::NullLit
        )
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i32),
    LongLit(i64),
    FloatLit(f32),
    DoubleLit(f64),
    CharLit(char),
    BoolLit(bool),
    StringLit(String),
    NullLit,
    This,
    /// Reference to a declared local (parameter, declaration, catch variable)
    Variable(DeclId),
    /// Unclassified dotted name; the checker resolves it as a field chain,
    /// a static member behind a class-name prefix, or a meta form
    Name(Vec<String>),
    /// `expr.field`
    FieldAccess {
        target: Box<Expr>,
        name: String,
        resolved: Option<FieldRef>,
    },
    /// `Class#field` or a checker-classified static field
    StaticField {
        class: String,
        name: String,
        resolved: Option<FieldRef>,
    },
    /// `array.length`, produced by the checker
    ArrayLength(Box<Expr>),
    /// `array[index]`
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        target: CallTarget,
        name: String,
        args: Vec<Expr>,
        resolved: Option<MethodRef>,
    },
    New {
        class_name: String,
        args: Vec<Expr>,
        resolved: Option<MethodRef>,
    },
    /// `new T[e1][e2][]...` — `dim_exprs` are the sized dimensions
    NewArray {
        elem: TypeDesc,
        dim_exprs: Vec<Expr>,
        extra_dims: usize,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// `++e`, `--e`, `e++`, `e--`
    IncDec {
        inc: bool,
        postfix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        op: Option<BinOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_val: Box<Expr>,
        else_val: Box<Expr>,
    },
    Cast {
        to: TypeDesc,
        expr: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: TypeDesc,
    },

    // ---- checker-lowered forms ----
    /// String `+` chain lowered to buffer-append form
    StringConcat { pieces: Vec<Expr> },
    /// Reserved meta-variable in expression position
    Meta(MetaForm),
    /// `$args = expr` — unpack an Object[] back into the parameter slots
    AssignParams { value: Box<Expr> },
    /// Reserved proceed call, emitted through the injected strategy
    ProceedCall { args: Vec<Expr> },
    /// `$cflow(a.b)` call-depth counter lookup
    CflowLookup { key: String },
}

/// Statement nodes
#[derive(Debug, Clone)]
pub enum Stmt {
    Block(Vec<Stmt>),
    Expr(Expr),
    /// `int a = 1, b;` — declarator ids with optional initializers
    Decl {
        decls: Vec<(DeclId, Option<Expr>)>,
        loc: Location,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Vec<Stmt>,
        cond: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        selector: Expr,
        arms: Vec<SwitchArm>,
        loc: Location,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Synchronized {
        monitor: Expr,
        body: Vec<Stmt>,
    },
    Return {
        value: Option<Expr>,
        loc: Location,
    },
    Throw(Expr),
    Break {
        label: Option<String>,
        loc: Location,
    },
    Continue {
        label: Option<String>,
        loc: Location,
    },
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Empty,
}

/// One `case`/`default` arm of a switch
#[derive(Debug, Clone)]
pub struct SwitchArm {
    /// `None` marks the default arm
    pub value: Option<Expr>,
    pub body: Vec<Stmt>,
    pub loc: Location,
}

/// One `catch (Type name) { ... }` clause
#[derive(Debug, Clone)]
pub struct CatchClause {
    pub decl: DeclId,
    pub class_name: String,
    pub body: Vec<Stmt>,
    pub loc: Location,
}

/// A parsed unit: the statement sequence plus the declarator arena the
/// statements index into
#[derive(Debug)]
pub struct Unit {
    pub stmts: Vec<Stmt>,
    pub decls: Vec<crate::symtab::Declarator>,
}
