//! The token definition for the filter expression language.

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords
    And,   // "and" / "AND"
    Or,    // "or" / "OR"
    Not,   // "not" / "NOT"
    In,    // "in"
    True,  // "True"
    False, // "False"

    // Identifiers and literals
    Identifier(&'a str),
    QuotedIdentifier(&'a str), // Backtick-quoted name, without the backticks
    String(&'a str),           // Raw string contents, escapes still in place
    Number(f64),

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Dot,      // .

    // Operators
    EqEq,      // ==
    NotEq,     // !=
    Gt,        // >
    Lt,        // <
    Gte,       // >=
    Lte,       // <=
    Ampersand, // &
    Pipe,      // |
    Tilde,     // ~

    // Special
    Illegal, // An illegal/unknown character, or an unterminated quote
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
