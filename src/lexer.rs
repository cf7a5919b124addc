//! Lexer for filter expressions such as
//! ``kota == "Bandung" AND (`nama member`.isnull() OR harga_jual >= 5000)``.

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// Current byte offset into the input
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token { kind, span: Span::new(start, self.position) }
    }

    /// Reads an integer or decimal literal; a leading '-' was already consumed
    /// by the caller when present.
    fn read_number(&mut self, start: usize) -> Token<'a> {
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == '.' && !seen_dot {
                // `5.isnull()` is not a number followed by a method
                let after = self.input[self.position + 1..].chars().next();
                if !after.is_some_and(|n| n.is_ascii_digit()) {
                    break;
                }
                seen_dot = true;
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.position];
        match text.parse::<f64>() {
            Ok(value) => self.token(TokenKind::Number(value), start),
            Err(_) => self.token(TokenKind::Illegal, start),
        }
    }

    /// Reads a quoted string; the opening quote was consumed by the caller.
    /// Backslash escapes are kept verbatim for the parser to resolve.
    fn read_string(&mut self, start: usize, quote: char) -> Token<'a> {
        let content_start = self.position;
        let mut escaped = false;
        while let Some(c) = self.peek() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                let content = &self.input[content_start..self.position];
                self.bump();
                return self.token(TokenKind::String(content), start);
            }
            self.bump();
        }
        self.token(TokenKind::Illegal, start)
    }

    /// Reads a backtick-quoted identifier; the opening backtick was consumed.
    fn read_quoted_identifier(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        while let Some(c) = self.peek() {
            if c == '`' {
                let content = &self.input[content_start..self.position];
                self.bump();
                if content.is_empty() {
                    return self.token(TokenKind::Illegal, start);
                }
                return self.token(TokenKind::QuotedIdentifier(content), start);
            }
            self.bump();
        }
        self.token(TokenKind::Illegal, start)
    }

    /// Reads an identifier or keyword made of letters, digits and underscores
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        self.token(match_keyword(literal), start)
    }
}

/// Whether `s` lexes as a keyword rather than an identifier
pub fn is_keyword(s: &str) -> bool {
    !matches!(match_keyword(s), TokenKind::Identifier(_))
}

fn match_keyword(s: &str) -> TokenKind {
    match s.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => TokenKind::Identifier(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?;

        let token = match c {
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            '[' => self.token(TokenKind::LBracket, start),
            ']' => self.token(TokenKind::RBracket, start),
            ',' => self.token(TokenKind::Comma, start),
            '.' => self.token(TokenKind::Dot, start),
            '&' => self.token(TokenKind::Ampersand, start),
            '|' => self.token(TokenKind::Pipe, start),
            '~' => self.token(TokenKind::Tilde, start),
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::EqEq, start)
                } else {
                    self.token(TokenKind::Illegal, start)
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::NotEq, start)
                } else {
                    self.token(TokenKind::Illegal, start)
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Lte, start)
                } else {
                    self.token(TokenKind::Lt, start)
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Gte, start)
                } else {
                    self.token(TokenKind::Gt, start)
                }
            }
            '-' if self.peek().is_some_and(|n| n.is_ascii_digit()) => self.read_number(start),
            '"' | '\'' => self.read_string(start, c),
            '`' => self.read_quoted_identifier(start),
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
            _ => self.token(TokenKind::Illegal, start),
        };
        Some(token)
    }
}
