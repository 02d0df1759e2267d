//! Recursive descent parser for method-body units
//!
//! Operator precedence is handled by an iterative climb: a unary operand is
//! parsed first, then operators of equal-or-looser precedence are folded in a
//! loop, recursing only when the next operator binds tighter. Cast syntax is
//! disambiguated from parenthesized expressions by bounded lookahead that
//! never consumes tokens.

use super::lexer::{Lexer, LexicalToken, Token};
use crate::ast::*;
use crate::error::{Error, Result};
use crate::symtab::{DeclId, Declarator, SymbolTable};
use crate::types::{primitive_by_name, BaseType, TypeDesc};

/// Parser for one compilation unit
pub struct Parser {
    tokens: Vec<LexicalToken>,
    current: usize,
    symtab: SymbolTable,
    decls: Vec<Declarator>,
}

impl Parser {
    /// Create a parser over `source`, with the symbol table and declarator
    /// arena pre-seeded by the session (parameters, meta-variables)
    pub fn new(source: &str, symtab: SymbolTable, decls: Vec<Declarator>) -> Result<Self> {
        let tokens = Lexer::new(source)
            .tokenize()
            .map_err(|(message, loc)| Error::syntax(loc, message))?;
        Ok(Self {
            tokens,
            current: 0,
            symtab,
            decls,
        })
    }

    /// Parse the unit: either `{ stmt* }` or a bare statement sequence
    pub fn parse_body(mut self) -> Result<Unit> {
        let mut stmts = Vec::new();
        if self.match_token(&Token::LBrace) {
            while !self.check(&Token::RBrace) {
                if self.is_at_end() {
                    return Err(self.err_here("unexpected end of input, expected `}`"));
                }
                stmts.push(self.parse_statement()?);
            }
            self.advance();
        } else {
            while !self.is_at_end() {
                stmts.push(self.parse_statement()?);
            }
        }
        if !self.is_at_end() {
            return Err(self.err_here("trailing tokens after end of body"));
        }
        Ok(Unit {
            stmts,
            decls: self.decls,
        })
    }

    // ------------------------------------------------------------------
    // Cursor helpers
    // ------------------------------------------------------------------

    fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    fn peek(&self) -> Option<&LexicalToken> {
        self.tokens.get(self.current)
    }

    fn peek_at(&self, offset: usize) -> Option<&LexicalToken> {
        self.tokens.get(self.current + offset)
    }

    fn previous(&self) -> &LexicalToken {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn check(&self, token_type: &Token) -> bool {
        self.peek().map_or(false, |t| t.is(token_type))
    }

    fn check_at(&self, offset: usize, token_type: &Token) -> bool {
        self.peek_at(offset).map_or(false, |t| t.is(token_type))
    }

    fn advance(&mut self) -> &LexicalToken {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn match_token(&mut self, token_type: &Token) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, token_type: &Token, message: &str) -> Result<&LexicalToken> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(self.err_here(message))
        }
    }

    fn loc(&self) -> Location {
        match self.peek() {
            Some(t) => t.location,
            None => self
                .tokens
                .last()
                .map(|t| t.location)
                .unwrap_or_else(Location::start),
        }
    }

    fn err_here(&self, message: &str) -> Error {
        match self.peek() {
            Some(t) => Error::syntax(
                t.location,
                format!("{} (found `{}`)", message, t.lexeme),
            ),
            None => Error::syntax(
                self.loc(),
                format!("{} (found end of input)", message),
            ),
        }
    }

    fn add_decl(&mut self, decl: Declarator) -> DeclId {
        let id = DeclId(self.decls.len());
        self.symtab.append(decl.name.clone(), id);
        self.decls.push(decl);
        id
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Stmt> {
        let token = match self.peek() {
            Some(t) => t.token.clone(),
            None => return Err(self.err_here("unexpected end of input")),
        };
        match token {
            Token::LBrace => {
                self.advance();
                self.symtab.push_scope();
                let mut stmts = Vec::new();
                while !self.check(&Token::RBrace) {
                    if self.is_at_end() {
                        self.symtab.pop_scope();
                        return Err(self.err_here("unexpected end of input, expected `}`"));
                    }
                    stmts.push(self.parse_statement()?);
                }
                self.advance();
                self.symtab.pop_scope();
                Ok(Stmt::Block(stmts))
            }
            Token::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::Do => self.parse_do_while(),
            Token::For => self.parse_for(),
            Token::Switch => self.parse_switch(),
            Token::Try => self.parse_try(),
            Token::Synchronized => self.parse_synchronized(),
            Token::Return => {
                let loc = self.loc();
                self.advance();
                let value = if self.check(&Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume(&Token::Semicolon, "expected `;` after return")?;
                Ok(Stmt::Return { value, loc })
            }
            Token::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                self.consume(&Token::Semicolon, "expected `;` after throw")?;
                Ok(Stmt::Throw(value))
            }
            Token::Break => {
                let loc = self.loc();
                self.advance();
                let label = self.parse_optional_label()?;
                self.consume(&Token::Semicolon, "expected `;` after break")?;
                Ok(Stmt::Break { label, loc })
            }
            Token::Continue => {
                let loc = self.loc();
                self.advance();
                let label = self.parse_optional_label()?;
                self.consume(&Token::Semicolon, "expected `;` after continue")?;
                Ok(Stmt::Continue { label, loc })
            }
            Token::Identifier if self.check_at(1, &Token::Colon) => {
                let label = self.advance().lexeme.clone();
                self.advance();
                let body = self.parse_statement()?;
                Ok(Stmt::Labeled {
                    label,
                    body: Box::new(body),
                })
            }
            _ => self.parse_decl_or_expr_statement(),
        }
    }

    fn parse_optional_label(&mut self) -> Result<Option<String>> {
        if self.check(&Token::Identifier) {
            Ok(Some(self.advance().lexeme.clone()))
        } else {
            Ok(None)
        }
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.advance();
        self.consume(&Token::LParen, "expected `(` after `if`")?;
        let cond = self.parse_expression()?;
        self.consume(&Token::RParen, "expected `)` after condition")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.match_token(&Token::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        self.advance();
        self.consume(&Token::LParen, "expected `(` after `while`")?;
        let cond = self.parse_expression()?;
        self.consume(&Token::RParen, "expected `)` after condition")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> Result<Stmt> {
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.consume(&Token::While, "expected `while` after do-body")?;
        self.consume(&Token::LParen, "expected `(` after `while`")?;
        let cond = self.parse_expression()?;
        self.consume(&Token::RParen, "expected `)` after condition")?;
        self.consume(&Token::Semicolon, "expected `;` after do-while")?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.advance();
        self.consume(&Token::LParen, "expected `(` after `for`")?;
        self.symtab.push_scope();
        let result = self.parse_for_inner();
        self.symtab.pop_scope();
        result
    }

    fn parse_for_inner(&mut self) -> Result<Stmt> {
        let init = if self.match_token(&Token::Semicolon) {
            Vec::new()
        } else if self.looks_like_declaration() {
            vec![self.parse_declaration()?]
        } else {
            let mut exprs = Vec::new();
            loop {
                exprs.push(Stmt::Expr(self.parse_expression()?));
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
            self.consume(&Token::Semicolon, "expected `;` after for-init")?;
            exprs
        };
        let cond = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(&Token::Semicolon, "expected `;` after for-condition")?;
        let mut update = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                update.push(self.parse_expression()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.consume(&Token::RParen, "expected `)` after for-update")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt> {
        let loc = self.loc();
        self.advance();
        self.consume(&Token::LParen, "expected `(` after `switch`")?;
        let selector = self.parse_expression()?;
        self.consume(&Token::RParen, "expected `)` after selector")?;
        self.consume(&Token::LBrace, "expected `{` to open switch body")?;
        let mut arms = Vec::new();
        while !self.check(&Token::RBrace) {
            let arm_loc = self.loc();
            let value = if self.match_token(&Token::Case) {
                let v = self.parse_expression()?;
                self.consume(&Token::Colon, "expected `:` after case value")?;
                Some(v)
            } else if self.match_token(&Token::Default) {
                self.consume(&Token::Colon, "expected `:` after `default`")?;
                None
            } else {
                return Err(self.err_here("expected `case` or `default` in switch body"));
            };
            let mut body = Vec::new();
            while !self.check(&Token::Case)
                && !self.check(&Token::Default)
                && !self.check(&Token::RBrace)
            {
                body.push(self.parse_statement()?);
            }
            arms.push(SwitchArm {
                value,
                body,
                loc: arm_loc,
            });
        }
        self.advance();
        Ok(Stmt::Switch {
            selector,
            arms,
            loc,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        self.advance();
        let body = self.parse_braced_block()?;
        let mut catches = Vec::new();
        while self.check(&Token::Catch) {
            let loc = self.loc();
            self.advance();
            self.consume(&Token::LParen, "expected `(` after `catch`")?;
            let ty = self.parse_type()?;
            if ty.base != BaseType::Class || ty.dims > 0 {
                return Err(Error::compile(loc, "catch type must be a class type"));
            }
            let class_name = ty.class_name.clone().unwrap_or_default();
            let name = self
                .consume(&Token::Identifier, "expected exception variable name")?
                .lexeme
                .clone();
            self.consume(&Token::RParen, "expected `)` after catch declaration")?;
            self.symtab.push_scope();
            let decl = self.add_decl(Declarator::new(name, ty));
            let result = self.parse_braced_block();
            self.symtab.pop_scope();
            catches.push(CatchClause {
                decl,
                class_name,
                body: result?,
                loc,
            });
        }
        let finally = if self.match_token(&Token::Finally) {
            Some(self.parse_braced_block()?)
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            return Err(self.err_here("`try` requires at least one catch or finally"));
        }
        Ok(Stmt::Try {
            body,
            catches,
            finally,
        })
    }

    fn parse_synchronized(&mut self) -> Result<Stmt> {
        self.advance();
        self.consume(&Token::LParen, "expected `(` after `synchronized`")?;
        let monitor = self.parse_expression()?;
        self.consume(&Token::RParen, "expected `)` after monitor expression")?;
        let body = self.parse_braced_block()?;
        Ok(Stmt::Synchronized { monitor, body })
    }

    fn parse_braced_block(&mut self) -> Result<Vec<Stmt>> {
        self.consume(&Token::LBrace, "expected `{`")?;
        self.symtab.push_scope();
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.is_at_end() {
                self.symtab.pop_scope();
                return Err(self.err_here("unexpected end of input, expected `}`"));
            }
            match self.parse_statement() {
                Ok(s) => stmts.push(s),
                Err(e) => {
                    self.symtab.pop_scope();
                    return Err(e);
                }
            }
        }
        self.advance();
        self.symtab.pop_scope();
        Ok(stmts)
    }

    fn parse_decl_or_expr_statement(&mut self) -> Result<Stmt> {
        if self.looks_like_declaration() {
            self.parse_declaration()
        } else {
            let expr = self.parse_expression()?;
            self.consume(&Token::Semicolon, "expected `;` after expression")?;
            Ok(Stmt::Expr(expr))
        }
    }

    /// Bounded lookahead: does the upcoming token run shape like
    /// `Type name (= | , | ; | [)` ?
    fn looks_like_declaration(&self) -> bool {
        let mut i = 0;
        match self.peek_at(i) {
            Some(t) if t.token.is_primitive_type() => {
                i += 1;
            }
            Some(t) if t.is(&Token::Identifier) => {
                i += 1;
                while self.check_at(i, &Token::Dot) && self.check_at(i + 1, &Token::Identifier) {
                    i += 2;
                }
            }
            _ => return false,
        }
        while self.check_at(i, &Token::LBracket) && self.check_at(i + 1, &Token::RBracket) {
            i += 2;
        }
        if !self.check_at(i, &Token::Identifier) {
            return false;
        }
        i += 1;
        matches!(
            self.peek_at(i).map(|t| &t.token),
            Some(Token::Assign)
                | Some(Token::Comma)
                | Some(Token::Semicolon)
                | Some(Token::LBracket)
        )
    }

    /// `T a = e, b[], c;`
    fn parse_declaration(&mut self) -> Result<Stmt> {
        let loc = self.loc();
        let base_ty = self.parse_type()?;
        if base_ty.is_void() {
            return Err(Error::compile(loc, "cannot declare a variable of type void"));
        }
        let mut decls = Vec::new();
        loop {
            let name = self
                .consume(&Token::Identifier, "expected variable name")?
                .lexeme
                .clone();
            let mut ty = base_ty.clone();
            while self.check(&Token::LBracket) && self.check_at(1, &Token::RBracket) {
                self.advance();
                self.advance();
                ty.dims += 1;
            }
            let init = if self.match_token(&Token::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            let id = self.add_decl(Declarator::new(name, ty));
            decls.push((id, init));
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.consume(&Token::Semicolon, "expected `;` after declaration")?;
        Ok(Stmt::Decl { decls, loc })
    }

    /// Parse a type: primitive keyword or dotted class name, plus `[]` dims.
    /// Class names are left as written; the checker qualifies them.
    fn parse_type(&mut self) -> Result<TypeDesc> {
        let mut ty = match self.peek() {
            Some(t) if t.token.is_primitive_type() => {
                let base = primitive_by_name(&t.lexeme)
                    .ok_or_else(|| self.err_here("unknown primitive type"))?;
                self.advance();
                TypeDesc::primitive(base)
            }
            Some(t) if t.is(&Token::Identifier) => {
                let mut name = self.advance().lexeme.clone();
                while self.check(&Token::Dot) && self.check_at(1, &Token::Identifier) {
                    self.advance();
                    name.push('.');
                    name.push_str(&self.advance().lexeme);
                }
                TypeDesc::class(name)
            }
            _ => return Err(self.err_here("expected a type")),
        };
        while self.check(&Token::LBracket) && self.check_at(1, &Token::RBracket) {
            self.advance();
            self.advance();
            ty.dims += 1;
        }
        Ok(ty)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> Result<Expr> {
        let loc = self.loc();
        let lhs = self.parse_conditional()?;
        if let Some(op) = self.peek_assign_op() {
            self.advance();
            let value = self.parse_expression()?;
            return Ok(Expr::new(
                ExprKind::Assign {
                    op,
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                loc,
            ));
        }
        Ok(lhs)
    }

    /// Assignment operator at the cursor; `Some(None)` is plain `=`
    #[allow(clippy::option_option)]
    fn peek_assign_op(&self) -> Option<Option<BinOp>> {
        let op = match self.peek()?.token {
            Token::Assign => return Some(None),
            Token::AddAssign => BinOp::Add,
            Token::SubAssign => BinOp::Sub,
            Token::MulAssign => BinOp::Mul,
            Token::DivAssign => BinOp::Div,
            Token::ModAssign => BinOp::Rem,
            Token::AndAssign => BinOp::BitAnd,
            Token::OrAssign => BinOp::BitOr,
            Token::XorAssign => BinOp::BitXor,
            Token::LShiftAssign => BinOp::Shl,
            Token::RShiftAssign => BinOp::Shr,
            Token::URShiftAssign => BinOp::Ushr,
            _ => return None,
        };
        Some(Some(op))
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let loc = self.loc();
        let cond = self.parse_binary()?;
        if self.match_token(&Token::Question) {
            let then_val = self.parse_expression()?;
            self.consume(&Token::Colon, "expected `:` in conditional expression")?;
            let else_val = self.parse_conditional()?;
            return Ok(Expr::new(
                ExprKind::Conditional {
                    cond: Box::new(cond),
                    then_val: Box::new(then_val),
                    else_val: Box::new(else_val),
                },
                loc,
            ));
        }
        Ok(cond)
    }

    /// Binary operator and its precedence at the cursor (`instanceof` is a
    /// pseudo-operator at relational precedence)
    fn peek_binop(&self) -> Option<(u8, Option<BinOp>)> {
        let (prec, op) = match self.peek()?.token {
            Token::PipePipe => (1, BinOp::OrOr),
            Token::AndAnd => (2, BinOp::AndAnd),
            Token::Pipe => (3, BinOp::BitOr),
            Token::Caret => (4, BinOp::BitXor),
            Token::Amp => (5, BinOp::BitAnd),
            Token::Eq => (6, BinOp::Eq),
            Token::Ne => (6, BinOp::Ne),
            Token::Lt => (7, BinOp::Lt),
            Token::Le => (7, BinOp::Le),
            Token::Gt => (7, BinOp::Gt),
            Token::Ge => (7, BinOp::Ge),
            Token::InstanceOf => return Some((7, None)),
            Token::LShift => (8, BinOp::Shl),
            Token::RShift => (8, BinOp::Shr),
            Token::URShift => (8, BinOp::Ushr),
            Token::Plus => (9, BinOp::Add),
            Token::Minus => (9, BinOp::Sub),
            Token::Star => (10, BinOp::Mul),
            Token::Slash => (10, BinOp::Div),
            Token::Percent => (10, BinOp::Rem),
            _ => return None,
        };
        Some((prec, Some(op)))
    }

    fn parse_binary(&mut self) -> Result<Expr> {
        let lhs = self.parse_unary()?;
        self.parse_binary_rhs(lhs, 0)
    }

    fn parse_binary_rhs(&mut self, mut lhs: Expr, min_prec: u8) -> Result<Expr> {
        while let Some((prec, op)) = self.peek_binop() {
            if prec < min_prec {
                break;
            }
            let loc = self.loc();
            self.advance();
            let op = match op {
                Some(op) => op,
                None => {
                    // instanceof: the right operand is a type, not an expression
                    let ty = self.parse_type()?;
                    lhs = Expr::new(
                        ExprKind::InstanceOf {
                            expr: Box::new(lhs),
                            ty,
                        },
                        loc,
                    );
                    continue;
                }
            };
            let mut rhs = self.parse_unary()?;
            while let Some((next_prec, _)) = self.peek_binop() {
                if next_prec > prec {
                    rhs = self.parse_binary_rhs(rhs, prec + 1)?;
                } else {
                    break;
                }
            }
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                loc,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let loc = self.loc();
        match self.peek().map(|t| t.token.clone()) {
            Some(Token::Plus) => {
                // unary plus is the identity
                self.advance();
                self.parse_unary()
            }
            Some(Token::Minus) => {
                self.advance();
                // a minus applied directly to a numeric literal folds into a
                // negative literal
                if self.peek().map_or(false, |t| {
                    matches!(
                        t.token,
                        Token::DecimalInteger
                            | Token::HexInteger
                            | Token::OctalInteger
                            | Token::BinaryInteger
                            | Token::FloatingLiteral
                            | Token::ScientificFloat
                            | Token::TypedFloat
                    )
                }) {
                    return self.parse_numeric_literal(true);
                }
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::Neg,
                        operand: Box::new(operand),
                    },
                    loc,
                ))
            }
            Some(Token::Bang) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::Not,
                        operand: Box::new(operand),
                    },
                    loc,
                ))
            }
            Some(Token::Tilde) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::BitNot,
                        operand: Box::new(operand),
                    },
                    loc,
                ))
            }
            Some(Token::Inc) | Some(Token::Dec) => {
                let inc = self.check(&Token::Inc);
                self.advance();
                let target = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::IncDec {
                        inc,
                        postfix: false,
                        target: Box::new(target),
                    },
                    loc,
                ))
            }
            Some(Token::LParen) if self.peek_is_builtin_cast() || self.peek_is_class_cast() => {
                self.advance();
                let to = self.parse_type()?;
                self.consume(&Token::RParen, "expected `)` after cast type")?;
                let expr = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Cast {
                        to,
                        expr: Box::new(expr),
                    },
                    loc,
                ))
            }
            _ => self.parse_postfix(),
        }
    }

    /// Lookahead: `(` builtin-type `[]`* `)` is always a cast
    fn peek_is_builtin_cast(&self) -> bool {
        if !self.check(&Token::LParen) {
            return false;
        }
        let mut i = 1;
        match self.peek_at(i) {
            Some(t) if t.token.is_primitive_type() => i += 1,
            _ => return false,
        }
        while self.check_at(i, &Token::LBracket) && self.check_at(i + 1, &Token::RBracket) {
            i += 2;
        }
        self.check_at(i, &Token::RParen)
    }

    /// Lookahead: `(` dotted-name `[]`* `)` followed by a token that can
    /// start a unary expression is a class cast; anything else falls back to
    /// a parenthesized expression
    fn peek_is_class_cast(&self) -> bool {
        if !self.check(&Token::LParen) {
            return false;
        }
        let mut i = 1;
        if !self.check_at(i, &Token::Identifier) {
            return false;
        }
        i += 1;
        while self.check_at(i, &Token::Dot) && self.check_at(i + 1, &Token::Identifier) {
            i += 2;
        }
        let mut dims = 0;
        while self.check_at(i, &Token::LBracket) && self.check_at(i + 1, &Token::RBracket) {
            i += 2;
            dims += 1;
        }
        if !self.check_at(i, &Token::RParen) {
            return false;
        }
        if dims > 0 {
            // `(Name[])` can only be a cast
            return true;
        }
        self.peek_at(i + 1)
            .map_or(false, |t| t.token.starts_unary_expr())
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let loc = self.loc();
            if self.check(&Token::Dot) && self.check_at(1, &Token::Identifier) {
                self.advance();
                let name = self.advance().lexeme.clone();
                if self.check(&Token::LParen) {
                    let args = self.parse_arguments()?;
                    let target = match expr.kind {
                        ExprKind::Name(path) => CallTarget::Path(path),
                        _ => CallTarget::Expr(Box::new(expr)),
                    };
                    expr = Expr::new(
                        ExprKind::Call {
                            target,
                            name,
                            args,
                            resolved: None,
                        },
                        loc,
                    );
                } else if let ExprKind::Name(mut path) = expr.kind {
                    // still an unclassified dotted name
                    path.push(name);
                    expr = Expr::new(ExprKind::Name(path), expr.loc);
                } else {
                    expr = Expr::new(
                        ExprKind::FieldAccess {
                            target: Box::new(expr),
                            name,
                            resolved: None,
                        },
                        loc,
                    );
                }
            } else if self.check(&Token::Hash) {
                let class = match expr.kind {
                    ExprKind::Name(path) => path.join("."),
                    _ => {
                        return Err(Error::compile(
                            loc,
                            "`#` must follow a class name",
                        ))
                    }
                };
                self.advance();
                let name = self
                    .consume(&Token::Identifier, "expected member name after `#`")?
                    .lexeme
                    .clone();
                if self.check(&Token::LParen) {
                    let args = self.parse_arguments()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            target: CallTarget::Class(class),
                            name,
                            args,
                            resolved: None,
                        },
                        loc,
                    );
                } else {
                    expr = Expr::new(
                        ExprKind::StaticField {
                            class,
                            name,
                            resolved: None,
                        },
                        loc,
                    );
                }
            } else if self.check(&Token::LBracket) {
                self.advance();
                let index = self.parse_expression()?;
                self.consume(&Token::RBracket, "expected `]` after array index")?;
                expr = Expr::new(
                    ExprKind::Index {
                        array: Box::new(expr),
                        index: Box::new(index),
                    },
                    loc,
                );
            } else if self.check(&Token::Inc) || self.check(&Token::Dec) {
                let inc = self.check(&Token::Inc);
                self.advance();
                expr = Expr::new(
                    ExprKind::IncDec {
                        inc,
                        postfix: true,
                        target: Box::new(expr),
                    },
                    loc,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let loc = self.loc();
        let token = match self.peek() {
            Some(t) => t.token.clone(),
            None => return Err(self.err_here("unexpected end of input in expression")),
        };
        match token {
            Token::DecimalInteger
            | Token::HexInteger
            | Token::OctalInteger
            | Token::BinaryInteger
            | Token::FloatingLiteral
            | Token::ScientificFloat
            | Token::TypedFloat => self.parse_numeric_literal(false),
            Token::StringLiteral => {
                let lexeme = self.advance().lexeme.clone();
                let value = unescape(&lexeme[1..lexeme.len() - 1], loc)?;
                Ok(Expr::new(ExprKind::StringLit(value), loc))
            }
            Token::CharLiteral => {
                let lexeme = self.advance().lexeme.clone();
                let value = unescape(&lexeme[1..lexeme.len() - 1], loc)?;
                let mut chars = value.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Expr::new(ExprKind::CharLit(c), loc)),
                    _ => Err(Error::syntax(loc, "invalid character literal")),
                }
            }
            Token::True => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLit(true), loc))
            }
            Token::False => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLit(false), loc))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::NullLit, loc))
            }
            Token::This => {
                self.advance();
                Ok(Expr::new(ExprKind::This, loc))
            }
            Token::Super => {
                self.advance();
                self.consume(&Token::Dot, "expected `.` after `super`")?;
                let name = self
                    .consume(&Token::Identifier, "expected method name after `super.`")?
                    .lexeme
                    .clone();
                if !self.check(&Token::LParen) {
                    return Err(Error::compile(loc, "`super` is only valid as a call receiver"));
                }
                let args = self.parse_arguments()?;
                Ok(Expr::new(
                    ExprKind::Call {
                        target: CallTarget::Super,
                        name,
                        args,
                        resolved: None,
                    },
                    loc,
                ))
            }
            Token::New => self.parse_new(),
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(&Token::RParen, "expected `)` after expression")?;
                Ok(expr)
            }
            Token::Identifier => {
                let name = self.advance().lexeme.clone();
                if self.check(&Token::LParen) {
                    let args = self.parse_arguments()?;
                    return Ok(Expr::new(
                        ExprKind::Call {
                            target: CallTarget::Implicit,
                            name,
                            args,
                            resolved: None,
                        },
                        loc,
                    ));
                }
                match self.symtab.lookup(&name) {
                    Some(id) => Ok(Expr::new(ExprKind::Variable(id), loc)),
                    None => Ok(Expr::new(ExprKind::Name(vec![name]), loc)),
                }
            }
            _ => Err(self.err_here("expected an expression")),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        self.consume(&Token::LParen, "expected `(`")?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.consume(&Token::RParen, "expected `)` after arguments")?;
        Ok(args)
    }

    fn parse_new(&mut self) -> Result<Expr> {
        let loc = self.loc();
        self.advance();
        let is_primitive = self.peek().map_or(false, |t| t.token.is_primitive_type());
        let elem = match self.peek() {
            Some(t) if t.token.is_primitive_type() => {
                let base = primitive_by_name(&t.lexeme)
                    .ok_or_else(|| self.err_here("unknown primitive type"))?;
                self.advance();
                TypeDesc::primitive(base)
            }
            Some(t) if t.is(&Token::Identifier) => {
                let mut name = self.advance().lexeme.clone();
                while self.check(&Token::Dot) && self.check_at(1, &Token::Identifier) {
                    self.advance();
                    name.push('.');
                    name.push_str(&self.advance().lexeme);
                }
                TypeDesc::class(name)
            }
            _ => return Err(self.err_here("expected a type after `new`")),
        };
        if self.check(&Token::LParen) {
            if is_primitive {
                return Err(Error::compile(loc, "cannot instantiate a primitive type"));
            }
            let args = self.parse_arguments()?;
            return Ok(Expr::new(
                ExprKind::New {
                    class_name: elem.class_name.clone().unwrap_or_default(),
                    args,
                    resolved: None,
                },
                loc,
            ));
        }
        if !self.check(&Token::LBracket) {
            return Err(self.err_here("expected `(` or `[` after `new` type"));
        }
        if elem.is_void() {
            return Err(Error::compile(loc, "cannot create an array of void"));
        }
        let mut dim_exprs = Vec::new();
        while self.check(&Token::LBracket) && !self.check_at(1, &Token::RBracket) {
            self.advance();
            dim_exprs.push(self.parse_expression()?);
            self.consume(&Token::RBracket, "expected `]` after array dimension")?;
        }
        let mut extra_dims = 0;
        while self.check(&Token::LBracket) && self.check_at(1, &Token::RBracket) {
            self.advance();
            self.advance();
            extra_dims += 1;
        }
        if self.check(&Token::LBrace) {
            return Err(Error::compile(
                loc,
                "array initializers are not supported in method-body units",
            ));
        }
        if dim_exprs.is_empty() {
            return Err(Error::compile(loc, "array creation needs at least one sized dimension"));
        }
        Ok(Expr::new(
            ExprKind::NewArray {
                elem,
                dim_exprs,
                extra_dims,
            },
            loc,
        ))
    }

    fn parse_numeric_literal(&mut self, negated: bool) -> Result<Expr> {
        let loc = self.loc();
        let token = self.peek().map(|t| t.token.clone());
        let lexeme = self.advance().lexeme.clone();
        match token {
            Some(Token::DecimalInteger) => parse_int(&lexeme, 10, negated, loc),
            Some(Token::HexInteger) => parse_int(&lexeme[2..], 16, negated, loc),
            Some(Token::BinaryInteger) => parse_int(&lexeme[2..], 2, negated, loc),
            Some(Token::OctalInteger) => parse_int(&lexeme[1..], 8, negated, loc),
            Some(Token::FloatingLiteral) | Some(Token::ScientificFloat) | Some(Token::TypedFloat) => {
                parse_float(&lexeme, negated, loc)
            }
            _ => Err(Error::syntax(loc, "expected a numeric literal")),
        }
    }
}

fn parse_int(digits: &str, radix: u32, negated: bool, loc: Location) -> Result<Expr> {
    let mut text = digits.replace('_', "");
    let is_long = text.ends_with('l') || text.ends_with('L');
    if is_long {
        text.pop();
    }
    let magnitude = u64::from_str_radix(&text, radix)
        .map_err(|_| Error::syntax(loc, format!("invalid integer literal `{}`", digits)))?;
    if is_long {
        let value = if negated {
            (magnitude as i64).wrapping_neg()
        } else {
            magnitude as i64
        };
        return Ok(Expr::new(ExprKind::LongLit(value), loc));
    }
    // decimal literals must fit the int range; hex/octal/binary may use the
    // full 32-bit pattern
    let fits = if radix == 10 {
        magnitude <= i32::MAX as u64 + u64::from(negated)
    } else {
        magnitude <= u32::MAX as u64
    };
    if !fits {
        return Err(Error::syntax(loc, format!("integer literal `{}` out of range", digits)));
    }
    let value = if negated {
        (magnitude as i32).wrapping_neg()
    } else {
        magnitude as i32
    };
    Ok(Expr::new(ExprKind::IntLit(value), loc))
}

fn parse_float(lexeme: &str, negated: bool, loc: Location) -> Result<Expr> {
    let mut text = lexeme.to_string();
    let suffix = text.chars().last();
    let is_float = matches!(suffix, Some('f') | Some('F'));
    if matches!(suffix, Some('f') | Some('F') | Some('d') | Some('D')) {
        text.pop();
    }
    let value: f64 = text
        .parse()
        .map_err(|_| Error::syntax(loc, format!("invalid floating literal `{}`", lexeme)))?;
    let value = if negated { -value } else { value };
    if is_float {
        Ok(Expr::new(ExprKind::FloatLit(value as f32), loc))
    } else {
        Ok(Expr::new(ExprKind::DoubleLit(value), loc))
    }
}

/// Decode the standard escapes inside a string or character literal
fn unescape(raw: &str, loc: Location) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| Error::syntax(loc, "invalid unicode escape"))?;
                out.push(
                    char::from_u32(code)
                        .ok_or_else(|| Error::syntax(loc, "invalid unicode escape"))?,
                );
            }
            other => {
                return Err(Error::syntax(
                    loc,
                    format!("unknown escape `\\{}`", other.map(String::from).unwrap_or_default()),
                ))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Unit {
        Parser::new(source, SymbolTable::new(), Vec::new())
            .unwrap()
            .parse_body()
            .unwrap()
    }

    fn parse_expr(source: &str) -> Expr {
        let unit = parse(&format!("{};", source));
        match unit.stmts.into_iter().next() {
            Some(Stmt::Expr(e)) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn precedence_climb_binds_tighter_operators_first() {
        let e = parse_expr("1 + 2 * 3");
        match e.kind {
            ExprKind::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn left_associativity_of_same_precedence() {
        let e = parse_expr("10 - 4 - 3");
        match e.kind {
            ExprKind::Binary { op: BinOp::Sub, lhs, rhs } => {
                assert!(matches!(lhs.kind, ExprKind::Binary { op: BinOp::Sub, .. }));
                assert!(matches!(rhs.kind, ExprKind::IntLit(3)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn class_cast_vs_parenthesized_expression() {
        let e = parse_expr("(Foo) bar");
        assert!(matches!(e.kind, ExprKind::Cast { .. }));

        let e = parse_expr("(bar + 1)");
        assert!(matches!(e.kind, ExprKind::Binary { op: BinOp::Add, .. }));

        let e = parse_expr("(int) x");
        assert!(matches!(
            e.kind,
            ExprKind::Cast { to: TypeDesc { base: BaseType::Int, .. }, .. }
        ));
    }

    #[test]
    fn negative_literal_folds_at_parse_time() {
        let e = parse_expr("-5");
        assert!(matches!(e.kind, ExprKind::IntLit(-5)));
        let e = parse_expr("-5L");
        assert!(matches!(e.kind, ExprKind::LongLit(-5)));
        let e = parse_expr("-x");
        assert!(matches!(e.kind, ExprKind::Unary { op: UnOp::Neg, .. }));
    }

    #[test]
    fn declaration_registers_variable_in_scope() {
        let unit = parse("int x = 1; x = x + 2;");
        assert_eq!(unit.decls.len(), 1);
        assert_eq!(unit.decls[0].name, "x");
        match &unit.stmts[1] {
            Stmt::Expr(e) => match &e.kind {
                ExprKind::Assign { target, .. } => {
                    assert!(matches!(target.kind, ExprKind::Variable(DeclId(0))));
                }
                other => panic!("unexpected kind: {:?}", other),
            },
            other => panic!("unexpected stmt: {:?}", other),
        }
    }

    #[test]
    fn block_scope_ends_at_brace() {
        let err = Parser::new("{ int x = 1; } x = 2;", SymbolTable::new(), Vec::new())
            .unwrap()
            .parse_body()
            .unwrap();
        // `x` after the block is no longer a variable; it parses as a name
        match &err.stmts[1] {
            Stmt::Expr(e) => match &e.kind {
                ExprKind::Assign { target, .. } => {
                    assert!(matches!(&target.kind, ExprKind::Name(p) if p == &vec!["x".to_string()]));
                }
                other => panic!("unexpected kind: {:?}", other),
            },
            other => panic!("unexpected stmt: {:?}", other),
        }
    }

    #[test]
    fn try_catch_finally_shapes() {
        let unit = parse(
            "try { return; } catch (java.lang.Exception e) { throw e; } finally { ; }",
        );
        match &unit.stmts[0] {
            Stmt::Try { catches, finally, .. } => {
                assert_eq!(catches.len(), 1);
                assert_eq!(catches[0].class_name, "java.lang.Exception");
                assert!(finally.is_some());
            }
            other => panic!("unexpected stmt: {:?}", other),
        }

        // empty catch list with a finally is a single-armed try
        let unit = parse("try { ; } finally { ; }");
        match &unit.stmts[0] {
            Stmt::Try { catches, finally, .. } => {
                assert!(catches.is_empty());
                assert!(finally.is_some());
            }
            other => panic!("unexpected stmt: {:?}", other),
        }
    }

    #[test]
    fn static_member_qualifier() {
        let e = parse_expr("java.lang.Integer#MAX_VALUE");
        match e.kind {
            ExprKind::StaticField { class, name, .. } => {
                assert_eq!(class, "java.lang.Integer");
                assert_eq!(name, "MAX_VALUE");
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn dotted_name_stays_unclassified() {
        let e = parse_expr("a.b.c");
        assert!(matches!(&e.kind, ExprKind::Name(p) if p.len() == 3));
    }

    #[test]
    fn malformed_input_is_a_syntax_error() {
        let err = Parser::new("int = 4;", SymbolTable::new(), Vec::new())
            .unwrap()
            .parse_body()
            .unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn array_initializer_rejected() {
        let err = Parser::new("x = new int[]{1,2};", SymbolTable::new(), Vec::new())
            .unwrap()
            .parse_body()
            .unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
    }
}
