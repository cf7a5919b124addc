//! Evaluation engine: binds a parsed filter expression to a schema and tests rows.
//!
//! Binding resolves every field reference to a column index and coerces literals
//! to the type of the column they are compared with, so that unknown fields and type
//! mismatches are reported once, before any row is touched.

use std::cmp::Ordering;
use thiserror::Error;
use tracing::debug;

use crate::ast::{CompOp, Expr, Identifier, Literal, MethodCall, Operand};
use crate::dataset::{parse_date, Value};
use crate::parser::parse_expression;
use crate::schema::{FieldType, Schema};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Syntax error, unknown field or type mismatch. Carries the offending string.
    #[error("invalid filter expression `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },
}

impl EvalError {
    fn invalid(expression: &str, reason: impl Into<String>) -> Self {
        EvalError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
enum Term {
    Column(usize),
    Value(Value),
}

#[derive(Debug, Clone)]
enum Predicate {
    Const(bool),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare { left: Term, op: CompOp, right: Term },
    InList { column: usize, values: Vec<Value>, negated: bool },
    IsNull(usize),
    NotNull(usize),
    Contains { column: usize, needle: String },
}

/// One side of a comparison after name resolution
enum Side<'e> {
    Column { index: usize, field_type: FieldType, name: &'e str },
    Literal(&'e Literal),
}

struct Binder<'s> {
    schema: &'s Schema,
}

impl<'s> Binder<'s> {
    fn bind(&self, expr: &Expr) -> Result<Predicate, String> {
        let predicate = match expr {
            Expr::And(left, right) => {
                Predicate::And(Box::new(self.bind(left)?), Box::new(self.bind(right)?))
            }
            Expr::Or(left, right) => {
                Predicate::Or(Box::new(self.bind(left)?), Box::new(self.bind(right)?))
            }
            Expr::Not(inner) => Predicate::Not(Box::new(self.bind(inner)?)),
            Expr::Grouped(inner) => self.bind(inner)?,
            Expr::Compare { left, op, right } => self.bind_comparison(left, *op, right)?,
            Expr::InList { operand, values, negated } => {
                let Side::Column { index, field_type, name } = self.resolve(operand)? else {
                    return Err("the left side of 'in' must be a field".to_string());
                };
                let values = values
                    .iter()
                    .map(|v| coerce(v, field_type, name))
                    .collect::<Result<Vec<_>, _>>()?;
                Predicate::InList { column: index, values, negated: *negated }
            }
            Expr::Method { field, call } => {
                let (index, field_type) = self.column(field)?;
                match call {
                    MethodCall::IsNull => Predicate::IsNull(index),
                    MethodCall::NotNull => Predicate::NotNull(index),
                    MethodCall::Contains(needle) => {
                        if !field_type.is_textual() {
                            return Err(format!(
                                "str.contains is not supported for {} field '{}'",
                                field_type, field.0
                            ));
                        }
                        Predicate::Contains { column: index, needle: needle.clone() }
                    }
                }
            }
            Expr::Operand(Operand::Literal(Literal::Bool(b))) => Predicate::Const(*b),
            Expr::Operand(Operand::Field(field)) => {
                self.column(field)?;
                return Err(format!("field '{}' is not a condition", field.0));
            }
            Expr::Operand(Operand::Literal(other)) => {
                return Err(format!("literal {:?} is not a condition", other));
            }
        };
        Ok(predicate)
    }

    fn column(&self, field: &Identifier) -> Result<(usize, FieldType), String> {
        let index = self
            .schema
            .index_of(&field.0)
            .ok_or_else(|| format!("unknown field '{}'", field.0))?;
        Ok((index, self.schema.fields()[index].field_type))
    }

    fn resolve<'e>(&self, operand: &'e Operand) -> Result<Side<'e>, String> {
        match operand {
            Operand::Field(field) => {
                let (index, field_type) = self.column(field)?;
                Ok(Side::Column { index, field_type, name: &field.0 })
            }
            Operand::Literal(literal) => Ok(Side::Literal(literal)),
        }
    }

    fn bind_comparison(&self, left: &Operand, op: CompOp, right: &Operand) -> Result<Predicate, String> {
        let ordering_op = !matches!(op, CompOp::Eq | CompOp::NotEq);
        let check_ordered = |field_type: FieldType, name: &str| {
            if ordering_op && !field_type.is_ordered() {
                Err(format!(
                    "operator '{}' is not supported for {} field '{}'",
                    op.symbol(),
                    field_type,
                    name
                ))
            } else {
                Ok(())
            }
        };

        match (self.resolve(left)?, self.resolve(right)?) {
            (
                Side::Column { index: a, field_type: ta, name: na },
                Side::Column { index: b, field_type: tb, name: nb },
            ) => {
                let compatible = ta == tb || (ta.is_textual() && tb.is_textual());
                if !compatible {
                    return Err(format!(
                        "cannot compare {} field '{}' with {} field '{}'",
                        ta, na, tb, nb
                    ));
                }
                check_ordered(ta, na)?;
                check_ordered(tb, nb)?;
                Ok(Predicate::Compare { left: Term::Column(a), op, right: Term::Column(b) })
            }
            (Side::Column { index, field_type, name }, Side::Literal(literal)) => {
                check_ordered(field_type, name)?;
                let value = coerce(literal, field_type, name)?;
                Ok(Predicate::Compare { left: Term::Column(index), op, right: Term::Value(value) })
            }
            (Side::Literal(literal), Side::Column { index, field_type, name }) => {
                check_ordered(field_type, name)?;
                let value = coerce(literal, field_type, name)?;
                Ok(Predicate::Compare { left: Term::Value(value), op, right: Term::Column(index) })
            }
            (Side::Literal(a), Side::Literal(b)) => {
                let (a, b) = (literal_value(a), literal_value(b));
                match a.compare(&b) {
                    Some(ordering) => Ok(Predicate::Const(test_ordering(op, ordering))),
                    None => Err(format!("cannot compare {} with {}", a, b)),
                }
            }
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::String(s) => Value::Text(s.clone()),
        Literal::Number(n) => Value::Number(*n),
        Literal::Bool(b) => Value::Bool(*b),
    }
}

/// Converts a literal to the representation of a column of `field_type`
fn coerce(literal: &Literal, field_type: FieldType, name: &str) -> Result<Value, String> {
    let mismatch = || format!("cannot compare {} field '{}' with {:?}", field_type, name, literal);
    match (field_type, literal) {
        (FieldType::Number, Literal::Number(n)) => Ok(Value::Number(*n)),
        (FieldType::Date, Literal::String(s)) => parse_date(s).map(Value::Date).ok_or_else(mismatch),
        (FieldType::Text | FieldType::Select, Literal::String(s)) => Ok(Value::Text(s.clone())),
        _ => Err(mismatch()),
    }
}

fn test_ordering(op: CompOp, ordering: Ordering) -> bool {
    match op {
        CompOp::Eq => ordering == Ordering::Equal,
        CompOp::NotEq => ordering != Ordering::Equal,
        CompOp::Gt => ordering == Ordering::Greater,
        CompOp::Lt => ordering == Ordering::Less,
        CompOp::Gte => ordering != Ordering::Less,
        CompOp::Lte => ordering != Ordering::Greater,
    }
}

/// A bound, ready-to-run filter
#[derive(Debug, Clone)]
pub struct Evaluator {
    predicate: Predicate,
}

impl Evaluator {
    /// Parses and binds `expression` against `schema`
    pub fn compile(expression: &str, schema: &Schema) -> Result<Self, EvalError> {
        let expr = parse_expression(expression).map_err(|e| {
            let reason = match e.span {
                Some(span) => format!("{} at {}..{}", e.message, span.start, span.end),
                None => e.message,
            };
            EvalError::invalid(expression, reason)
        })?;
        let predicate = Binder { schema }
            .bind(&expr)
            .map_err(|reason| EvalError::invalid(expression, reason))?;
        debug!(expression, "bound filter expression");
        Ok(Self { predicate })
    }

    pub fn matches(&self, row: &[Value]) -> bool {
        eval(&self.predicate, row)
    }
}

fn term<'r>(term: &'r Term, row: &'r [Value]) -> &'r Value {
    match term {
        Term::Column(index) => &row[*index],
        Term::Value(value) => value,
    }
}

fn eval(predicate: &Predicate, row: &[Value]) -> bool {
    match predicate {
        Predicate::Const(b) => *b,
        Predicate::And(left, right) => eval(left, row) && eval(right, row),
        Predicate::Or(left, right) => eval(left, row) || eval(right, row),
        Predicate::Not(inner) => !eval(inner, row),
        Predicate::Compare { left, op, right } => {
            let (l, r) = (term(left, row), term(right, row));
            // Nulls compare unequal to everything, including other nulls
            match l.compare(r) {
                Some(ordering) => test_ordering(*op, ordering),
                None => *op == CompOp::NotEq,
            }
        }
        Predicate::InList { column, values, negated } => {
            let value = &row[*column];
            if value.is_null() {
                return *negated;
            }
            let found = values.iter().any(|v| value.compare(v) == Some(Ordering::Equal));
            found != *negated
        }
        Predicate::IsNull(column) => row[*column].is_null(),
        Predicate::NotNull(column) => !row[*column].is_null(),
        Predicate::Contains { column, needle } => match &row[*column] {
            Value::Text(s) => s.contains(needle.as_str()),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::schema::FieldSpec;

    fn dataset() -> Dataset {
        let schema = Schema::new(vec![
            FieldSpec::new("kota", FieldType::Select),
            FieldSpec::new("harga", FieldType::Number),
            FieldSpec::new("Col Name", FieldType::Text),
            FieldSpec::new("joined", FieldType::Date),
            FieldSpec::new("is_null_flag", FieldType::Number),
        ]);
        let date = |s: &str| Value::Date(parse_date(s).unwrap());
        let text = |s: &str| Value::Text(s.to_string());
        Dataset::new(
            schema,
            vec![
                vec![text("Bandung"), Value::Number(3000.0), text("Kopi Sachet"), date("2023-01-10"), Value::Number(1.0)],
                vec![text("Surabaya"), Value::Number(12000.0), Value::Null, Value::Null, Value::Number(0.0)],
                vec![text("Bandung"), Value::Null, text("Teh Kotak"), date("2024-06-01"), Value::Number(1.0)],
                vec![Value::Null, Value::Number(45000.0), text("Lipstik"), date("2022-12-31"), Value::Number(0.0)],
            ],
        )
        .unwrap()
    }

    fn count(expression: &str) -> usize {
        dataset().query(expression).unwrap().len()
    }

    fn reason(expression: &str) -> String {
        match dataset().query(expression).unwrap_err() {
            EvalError::InvalidExpression { expression: e, reason } => {
                assert_eq!(e, expression);
                reason
            }
        }
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(count(r#"kota == "Bandung""#), 2);
        assert_eq!(count("harga > 5000"), 2);
        assert_eq!(count("harga <= 3000"), 1);
        assert_eq!(count("5000 < harga"), 2);
        assert_eq!(count("is_null_flag == 1"), 2);
    }

    #[test]
    fn test_null_cells_follow_not_equal_semantics() {
        // Row 4 has a null kota, row 3 a null harga
        assert_eq!(count(r#"kota != "Bandung""#), 2);
        assert_eq!(count("harga != 3000"), 3);
        assert_eq!(count("harga >= 0"), 3);
    }

    #[test]
    fn test_null_predicates() {
        assert_eq!(count("harga.isnull()"), 1);
        assert_eq!(count("harga.notnull()"), 3);
        assert_eq!(count("`Col Name`.isnull()"), 1);
        assert_eq!(count("(kota.isnull()) OR (joined.isnull())"), 2);
    }

    #[test]
    fn test_boolean_structure() {
        assert_eq!(count(r#"kota == "Bandung" AND harga > 1000"#), 1);
        assert_eq!(count(r#"kota == "Bandung" or harga > 40000"#), 3);
        assert_eq!(count(r#"not (kota == "Bandung")"#), 2);
        assert_eq!(count(r#"~(kota == "Bandung") & harga.notnull()"#), 2);
        assert_eq!(count("True"), 4);
        assert_eq!(count("False"), 0);
    }

    #[test]
    fn test_membership_and_contains() {
        assert_eq!(count(r#"kota in ["Bandung", "Jakarta"]"#), 2);
        assert_eq!(count(r#"kota not in ["Bandung"]"#), 2);
        assert_eq!(count(r#"`Col Name`.str.contains("Ko")"#), 2);
        assert_eq!(count("harga in []"), 0);
    }

    #[test]
    fn test_dates_compare_with_text_literals() {
        assert_eq!(count(r#"joined >= "2023-01-01""#), 2);
        assert_eq!(count(r#"joined < "2023-01-10 00:00:01""#), 2);
    }

    #[test]
    fn test_zero_matches_is_not_an_error() {
        assert_eq!(count(r#"kota == "Medan""#), 0);
    }

    #[test]
    fn test_unknown_field_is_invalid() {
        assert!(reason("missing == 1").contains("unknown field 'missing'"));
        // An unrewritten null comparison refers to a field called `null`
        assert!(reason("kota == null").contains("unknown field 'null'"));
    }

    #[test]
    fn test_type_mismatches_are_invalid() {
        assert!(reason(r#"harga == "cheap""#).contains("cannot compare"));
        assert!(reason("kota > 3").contains("not supported"));
        assert!(reason(r#"kota > "A""#).contains("not supported for select field"));
        assert!(reason(r#"joined > "yesterday""#).contains("cannot compare"));
        assert!(reason(r#"harga.str.contains("1")"#).contains("str.contains"));
        assert!(reason("harga == kota").contains("cannot compare"));
    }

    #[test]
    fn test_syntax_errors_are_invalid() {
        assert!(reason("(harga > 1").contains("RParen"));
        assert!(reason("harga >").contains("end of input"));
        assert!(reason("harga").contains("not a condition"));
        assert!(reason("harga = 1").contains("Illegal"));
    }

    #[test]
    fn test_deep_nesting_is_invalid() {
        let deep = format!("{}harga == 1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(reason(&deep).contains("nested too deeply"));

        let negated = format!("{}harga == 1", "NOT ".repeat(10_000));
        assert!(reason(&negated).contains("nested too deeply"));

        let long = vec!["harga == 1"; 10_000].join(" OR ");
        assert!(reason(&long).contains("Too many"));

        let shallow = format!("{}harga == 3000{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(count(&shallow), 1);
    }
}
