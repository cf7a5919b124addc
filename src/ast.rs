/// Root of a parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND
    And(Box<Expr>, Box<Expr>),
    /// Logical OR
    Or(Box<Expr>, Box<Expr>),
    /// Logical NOT
    Not(Box<Expr>),
    /// Parenthesised sub-expression
    Grouped(Box<Expr>),
    /// Binary comparison, e.g. `harga_jual >= 5000`
    Compare { left: Operand, op: CompOp, right: Operand },
    /// Set membership, e.g. `kota in ["Bandung", "Surabaya"]`
    InList { operand: Operand, values: Vec<Literal>, negated: bool },
    /// Predicate method on a field, e.g. `nama_member.isnull()`
    Method { field: Identifier, call: MethodCall },
    /// A lone operand used as a condition (`True`)
    Operand(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(Identifier),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

/// Predicate methods understood by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum MethodCall {
    IsNull,
    NotNull,
    /// `.str.contains("needle")`
    Contains(String),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,    // ==
    NotEq, // !=
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=
}

impl CompOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompOp::Eq => "==",
            CompOp::NotEq => "!=",
            CompOp::Gt => ">",
            CompOp::Lt => "<",
            CompOp::Gte => ">=",
            CompOp::Lte => "<=",
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
}
