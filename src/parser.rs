//! Parser for filter expressions
//!
//! ## Parse flow
//!
//! ```text
//! parse()
//!   └─ parse_or_expression()
//!        ├─ parse_and_expression()
//!        │    ├─ parse_not_expression()
//!        │    │    └─ parse_primary_expression()
//!        │    │         ├─ "(" → grouped expression (recursive parse_or_expression)
//!        │    │         └─ parse_operand()
//!        │    │              ├─ field ".isnull()" / ".notnull()" / ".str.contains(s)" → method
//!        │    │              ├─ comparison operator → comparison with a second operand
//!        │    │              ├─ "in" / "not in" → list membership
//!        │    │              └─ otherwise → bare operand
//!        │    │
//!        │    └─ on AND / & keep parsing NOT expressions
//!        │
//!        └─ on OR / | keep parsing AND expressions
//! ```
//!
//! ## Precedence (highest first)
//!
//! 1. Grouping `(expression)`
//! 2. Comparisons, membership and predicate methods
//! 3. `NOT` / `~`
//! 4. `AND` / `&`
//! 5. `OR` / `|`
//!
//! Nesting is limited to [`MAX_DEPTH`] levels and a single expression to
//! [`MAX_CONNECTIVES`] connectives, so deep input fails with a `ParseError`
//! instead of exhausting the stack further down.

use thiserror::Error;

use crate::ast::{CompOp, Expr, Identifier, Literal, MethodCall, Operand};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

/// Deepest nesting of parentheses and `NOT` accepted
pub const MAX_DEPTH: usize = 256;

/// Most `AND` / `OR` connectives accepted in one expression
pub const MAX_CONNECTIVES: usize = 1024;

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    depth: usize,
    connectives: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self { message, span: Some(span) }
    }
}

/// Tokenizes and parses `input` in one step
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    let tokens: Vec<_> = Lexer::new(input).collect();
    Parser::new(&tokens).parse()
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self { tokens, position: 0, depth: 0, connectives: 0 }
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind<'a>> {
        self.tokens.get(self.position + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&Token<'a>> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Consumes a token of the expected kind or fails
    fn expect(&mut self, expected: TokenKind) -> Result<&Token<'a>, ParseError> {
        match self.tokens.get(self.position) {
            Some(token)
                if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) =>
            {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::at_position(
                format!("Expected {:?}, found {:?}", expected, token.kind),
                token.span,
            )),
            None => Err(ParseError::new(
                format!("Expected {:?}, but reached end of input", expected),
                None,
            )),
        }
    }

    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    /// Opens one level of parentheses or `NOT`
    fn enter(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(
                format!("Expression nested too deeply (limit {})", MAX_DEPTH),
                self.peek().map(|t| t.span),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Counts an `AND` / `OR`; chains build left-deep trees, so their length is bounded too
    fn connective(&mut self) -> Result<(), ParseError> {
        if self.connectives >= MAX_CONNECTIVES {
            return Err(ParseError::new(
                format!("Too many AND / OR connectives (limit {})", MAX_CONNECTIVES),
                self.peek().map(|t| t.span),
            ));
        }
        self.connectives += 1;
        Ok(())
    }

    /// Parses a complete expression; trailing tokens are an error
    pub fn parse(&mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression".to_string(), None));
        }
        let expr = self.parse_or_expression()?;
        if let Some(token) = self.peek() {
            return Err(ParseError::at_position(
                format!("Unexpected token: {:?}", token.kind),
                token.span,
            ));
        }
        Ok(expr)
    }

    /// `and_expr ((OR | "|") and_expr)*`
    fn parse_or_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expression()?;

        while self.match_token(&TokenKind::Or) || self.match_token(&TokenKind::Pipe) {
            self.connective()?;
            self.advance();
            let right = self.parse_and_expression()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    /// `not_expr ((AND | "&") not_expr)*`
    fn parse_and_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not_expression()?;

        while self.match_token(&TokenKind::And) || self.match_token(&TokenKind::Ampersand) {
            self.connective()?;
            self.advance();
            let right = self.parse_not_expression()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    /// `(NOT | "~")* primary`
    fn parse_not_expression(&mut self) -> Result<Expr, ParseError> {
        if self.match_token(&TokenKind::Not) || self.match_token(&TokenKind::Tilde) {
            self.enter()?;
            self.advance();
            let expr = self.parse_not_expression()?;
            self.depth -= 1;
            Ok(Expr::Not(Box::new(expr)))
        } else {
            self.parse_primary_expression()
        }
    }

    fn parse_primary_expression(&mut self) -> Result<Expr, ParseError> {
        if self.match_token(&TokenKind::LParen) {
            self.enter()?;
            self.advance();
            let expr = self.parse_or_expression()?;
            self.expect(TokenKind::RParen)?;
            self.depth -= 1;
            return Ok(Expr::Grouped(Box::new(expr)));
        }

        let operand = self.parse_operand()?;

        if let Operand::Field(field) = &operand {
            if self.match_token(&TokenKind::Dot) {
                let call = self.parse_method_call()?;
                return Ok(Expr::Method { field: field.clone(), call });
            }
        }

        if let Some(op) = self.peek().and_then(|t| comparison_operator(&t.kind)) {
            self.advance();
            let right = self.parse_operand()?;
            return Ok(Expr::Compare { left: operand, op, right });
        }

        if self.match_token(&TokenKind::In) {
            self.advance();
            let values = self.parse_list()?;
            return Ok(Expr::InList { operand, values, negated: false });
        }

        if self.match_token(&TokenKind::Not) && matches!(self.peek_kind_at(1), Some(TokenKind::In)) {
            self.advance();
            self.advance();
            let values = self.parse_list()?;
            return Ok(Expr::InList { operand, values, negated: true });
        }

        Ok(Expr::Operand(operand))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Identifier(name)) | Some(TokenKind::QuotedIdentifier(name)) => {
                let field = Identifier(name.to_string());
                self.advance();
                Ok(Operand::Field(field))
            }
            Some(_) => self.parse_literal().map(Operand::Literal),
            None => Err(ParseError::new("Unexpected end of input".to_string(), None)),
        }
    }

    /// `.isnull()`, `.notnull()` or `.str.contains("...")`
    fn parse_method_call(&mut self) -> Result<MethodCall, ParseError> {
        self.expect(TokenKind::Dot)?;
        let name_token = self.expect(TokenKind::Identifier(""))?;
        let span = name_token.span;
        let TokenKind::Identifier(name) = name_token.kind else {
            return Err(ParseError::at_position("Expected method name".to_string(), span));
        };

        let call = match name {
            "isnull" | "isna" => MethodCall::IsNull,
            "notnull" | "notna" => MethodCall::NotNull,
            "str" => {
                self.expect(TokenKind::Dot)?;
                let accessor = self.expect(TokenKind::Identifier(""))?;
                if accessor.kind != TokenKind::Identifier("contains") {
                    return Err(ParseError::at_position(
                        format!("Unsupported string method {:?}", accessor.kind),
                        accessor.span,
                    ));
                }
                self.expect(TokenKind::LParen)?;
                let needle = match self.parse_literal()? {
                    Literal::String(s) => s,
                    other => {
                        return Err(ParseError::new(
                            format!("str.contains expects a string, found {:?}", other),
                            None,
                        ))
                    }
                };
                self.expect(TokenKind::RParen)?;
                return Ok(MethodCall::Contains(needle));
            }
            other => {
                return Err(ParseError::at_position(
                    format!("Unsupported method '{}'", other),
                    span,
                ))
            }
        };

        self.expect(TokenKind::LParen)?;
        self.expect(TokenKind::RParen)?;
        Ok(call)
    }

    /// `[literal (, literal)*]`, possibly empty
    fn parse_list(&mut self) -> Result<Vec<Literal>, ParseError> {
        self.expect(TokenKind::LBracket)?;
        let mut values = Vec::new();

        if !self.match_token(&TokenKind::RBracket) {
            loop {
                values.push(self.parse_literal()?);
                if self.match_token(&TokenKind::RBracket) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }

        self.expect(TokenKind::RBracket)?;
        Ok(values)
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Expected literal value".to_string(), None));
        };
        match &token.kind {
            TokenKind::String(raw) => Ok(Literal::String(unescape(raw))),
            TokenKind::Number(n) => Ok(Literal::Number(*n)),
            TokenKind::True => Ok(Literal::Bool(true)),
            TokenKind::False => Ok(Literal::Bool(false)),
            _ => Err(ParseError::at_position(
                format!("Expected literal value, found {:?}", token.kind),
                token.span,
            )),
        }
    }
}

fn comparison_operator(kind: &TokenKind) -> Option<CompOp> {
    match kind {
        TokenKind::EqEq => Some(CompOp::Eq),
        TokenKind::NotEq => Some(CompOp::NotEq),
        TokenKind::Gt => Some(CompOp::Gt),
        TokenKind::Lt => Some(CompOp::Lt),
        TokenKind::Gte => Some(CompOp::Gte),
        TokenKind::Lte => Some(CompOp::Lte),
        _ => None,
    }
}

/// Resolves backslash escapes in a raw string literal
fn unescape(raw: &str) -> String {
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
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
