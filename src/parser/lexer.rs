use logos::Logos;

use crate::ast::Location;

/// Token types for the method-body language
#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token {
    // Keywords
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("for")]
    For,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("default")]
    Default,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("synchronized")]
    Synchronized,
    #[token("return")]
    Return,
    #[token("throw")]
    Throw,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("new")]
    New,
    #[token("instanceof")]
    InstanceOf,
    #[token("this")]
    This,
    #[token("super")]
    Super,
    #[token("void")]
    Void,
    #[token("boolean")]
    Boolean,
    #[token("byte")]
    Byte,
    #[token("short")]
    Short,
    #[token("int")]
    Int,
    #[token("long")]
    Long,
    #[token("char")]
    Char,
    #[token("float")]
    Float,
    #[token("double")]
    Double,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Operators
    #[token("=")]
    Assign,
    #[token("+=")]
    AddAssign,
    #[token("-=")]
    SubAssign,
    #[token("*=")]
    MulAssign,
    #[token("/=")]
    DivAssign,
    #[token("%=")]
    ModAssign,
    #[token("&=")]
    AndAssign,
    #[token("|=")]
    OrAssign,
    #[token("^=")]
    XorAssign,
    #[token("<<=")]
    LShiftAssign,
    #[token(">>=")]
    RShiftAssign,
    #[token(">>>=")]
    URShiftAssign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    Inc,
    #[token("--")]
    Dec,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("<<")]
    LShift,
    #[token(">>")]
    RShift,
    #[token(">>>")]
    URShift,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    PipePipe,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // Separators
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    /// Static-member qualifier (`java.lang.Integer#MAX_VALUE`)
    #[token("#")]
    Hash,

    // Literals
    #[regex(r#""([^"\\]|\\u[0-9a-fA-F]{4}|\\.)*""#)]
    StringLiteral,
    #[regex(r"'([^'\\]|\\u[0-9a-fA-F]{4}|\\.)'")]
    CharLiteral,
    #[regex(r"0[xX][0-9a-fA-F]+[lL]?")]
    HexInteger,
    #[regex(r"0[bB][01]+[lL]?")]
    BinaryInteger,
    #[regex(r"0[0-7]+[lL]?")]
    OctalInteger,
    #[regex(r"[0-9][0-9_]*[lL]?")]
    DecimalInteger,
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[fFdD]?")]
    FloatingLiteral,
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fFdD]?")]
    ScientificFloat,
    #[regex(r"[0-9]+[fFdD]")]
    TypedFloat,

    // Identifiers (meta-variables are `$`-prefixed identifiers)
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*")]
    Identifier,

    // Comments and whitespace
    #[regex(r"//[^\n]*")]
    LineComment,
    #[regex(r"/\*[^*]*\*+([^/*][^*]*\*+)*/", priority = 2)]
    BlockComment,
    #[regex(r"[ \t\n\r]+", priority = 2)]
    Whitespace,
}

impl Token {
    /// Check if this token is a primitive type keyword
    pub fn is_primitive_type(&self) -> bool {
        matches!(
            self,
            Token::Boolean
                | Token::Byte
                | Token::Short
                | Token::Int
                | Token::Long
                | Token::Char
                | Token::Float
                | Token::Double
                | Token::Void
        )
    }

    /// Check if this token is a literal
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Token::StringLiteral
                | Token::CharLiteral
                | Token::HexInteger
                | Token::BinaryInteger
                | Token::OctalInteger
                | Token::DecimalInteger
                | Token::FloatingLiteral
                | Token::ScientificFloat
                | Token::TypedFloat
                | Token::True
                | Token::False
                | Token::Null
        )
    }

    /// Check if this token can start a unary expression (used by the cast
    /// disambiguation lookahead)
    pub fn starts_unary_expr(&self) -> bool {
        self.is_literal()
            || matches!(
                self,
                Token::Identifier
                    | Token::This
                    | Token::Super
                    | Token::New
                    | Token::LParen
                    | Token::Bang
                    | Token::Tilde
            )
    }
}

/// Lexical token with location information
#[derive(Debug, Clone)]
pub struct LexicalToken {
    pub token: Token,
    pub lexeme: String,
    pub location: Location,
}

impl LexicalToken {
    pub fn new(token: Token, lexeme: String, location: Location) -> Self {
        Self { token, lexeme, location }
    }

    /// Check if this token matches the given token type
    pub fn is(&self, token_type: &Token) -> bool {
        std::mem::discriminant(&self.token) == std::mem::discriminant(token_type)
    }
}

/// Lexer producing a typed token stream with line tracking
pub struct Lexer<'a> {
    lexer: logos::Lexer<'a, Token>,
    current_line: usize,
    current_column: usize,
    current_offset: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Token::lexer(source),
            current_line: 1,
            current_column: 1,
            current_offset: 0,
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Option<Result<LexicalToken, (String, Location)>> {
        let token = self.lexer.next()?;
        let location = Location::new(self.current_line, self.current_column, self.current_offset);
        let lexeme = self.lexer.slice().to_string();
        self.update_position(&lexeme);

        match token {
            Ok(token) => Some(Ok(LexicalToken::new(token, lexeme, location))),
            Err(_) => Some(Err((
                format!("unexpected character `{}`", lexeme),
                location,
            ))),
        }
    }

    /// Update the current position based on the lexeme
    fn update_position(&mut self, lexeme: &str) {
        for ch in lexeme.chars() {
            if ch == '\n' {
                self.current_line += 1;
                self.current_column = 1;
            } else {
                self.current_column += 1;
            }
            self.current_offset += ch.len_utf8();
        }
    }

    /// Get all non-trivia tokens from the source
    pub fn tokenize(mut self) -> Result<Vec<LexicalToken>, (String, Location)> {
        let mut tokens = Vec::new();
        while let Some(result) = self.next_token() {
            let token = result?;
            if !matches!(
                token.token,
                Token::Whitespace | Token::LineComment | Token::BlockComment
            ) {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_keywords_and_idents() {
        let source = "try { return $1; } finally { x++; }";
        let tokens = Lexer::new(source).tokenize().expect("failed to tokenize");
        assert!(tokens[0].is(&Token::Try));
        assert!(tokens[1].is(&Token::LBrace));
        assert!(tokens[2].is(&Token::Return));
        assert!(tokens[3].is(&Token::Identifier));
        assert_eq!(tokens[3].lexeme, "$1");
        assert!(tokens[4].is(&Token::Semicolon));
        assert!(tokens[6].is(&Token::Finally));
    }

    #[test]
    fn test_lexer_literals() {
        let source = r#"42 42L 0x2a 3.5 3.5f "hi" 'a' true null"#;
        let tokens = Lexer::new(source).tokenize().expect("failed to tokenize");
        assert!(tokens[0].is(&Token::DecimalInteger));
        assert!(tokens[1].is(&Token::DecimalInteger));
        assert_eq!(tokens[1].lexeme, "42L");
        assert!(tokens[2].is(&Token::HexInteger));
        assert!(tokens[3].is(&Token::FloatingLiteral));
        assert!(tokens[4].is(&Token::FloatingLiteral));
        assert!(tokens[5].is(&Token::StringLiteral));
        assert!(tokens[6].is(&Token::CharLiteral));
        assert!(tokens[7].is(&Token::True));
        assert!(tokens[8].is(&Token::Null));
    }

    #[test]
    fn test_lexer_hash_and_operators() {
        let source = "a.b#c >>> >>= >= >";
        let tokens = Lexer::new(source).tokenize().expect("failed to tokenize");
        assert!(tokens[1].is(&Token::Dot));
        assert!(tokens[3].is(&Token::Hash));
        assert!(tokens[5].is(&Token::URShift));
        assert!(tokens[6].is(&Token::RShiftAssign));
        assert!(tokens[7].is(&Token::Ge));
        assert!(tokens[8].is(&Token::Gt));
    }

    #[test]
    fn test_lexer_comments_skipped() {
        let source = "x // trailing\n/* block */ y";
        let tokens = Lexer::new(source).tokenize().expect("failed to tokenize");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].location.line, 2);
    }

    #[test]
    fn test_lexer_error_position() {
        let source = "a \u{0}";
        let err = Lexer::new(source).tokenize().unwrap_err();
        assert_eq!(err.1.line, 1);
        assert_eq!(err.1.column, 3);
    }
}
