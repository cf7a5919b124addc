//! Compiles a condition tree into a filter expression string.
//!
//! Output uses the evaluation engine's syntax for everything except null checks,
//! which are written as `field == null` / `field != null` and must go through
//! [`crate::rewrite::rewrite_null_checks`] before evaluation.

use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

use crate::condition::{Arity, ConditionNode, ConditionTree, Group, Operand, Operator, Rule};
use crate::dataset::parse_date;
use crate::lexer::is_keyword;
use crate::schema::{FieldSpec, FieldType, Schema};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("operator '{operator}' is not allowed for field '{field}'")]
    OperatorNotAllowed { field: String, operator: Operator },

    #[error("operator '{operator}' on field '{field}' expects {expected}, got {found}")]
    Arity { field: String, operator: Operator, expected: Arity, found: usize },

    #[error("value {value} is not valid for {field_type} field '{field}'")]
    OperandType { field: String, field_type: FieldType, value: String },
}

/// Validates a rule against the schema and returns the field it targets
pub(crate) fn check_rule<'s>(schema: &'s Schema, rule: &Rule) -> Result<&'s FieldSpec, CompileError> {
    let spec = schema
        .field(&rule.field)
        .ok_or_else(|| CompileError::UnknownField(rule.field.clone()))?;

    if !spec.allows(rule.operator) {
        return Err(CompileError::OperatorNotAllowed {
            field: rule.field.clone(),
            operator: rule.operator,
        });
    }

    let arity = rule.operator.arity();
    if !arity.accepts(rule.value.len()) {
        return Err(CompileError::Arity {
            field: rule.field.clone(),
            operator: rule.operator,
            expected: arity,
            found: rule.value.len(),
        });
    }

    for operand in &rule.value {
        check_operand(spec, rule.operator, operand)?;
    }

    Ok(spec)
}

fn check_operand(spec: &FieldSpec, operator: Operator, operand: &Operand) -> Result<(), CompileError> {
    let valid = match (spec.field_type, operand) {
        (FieldType::Number, Operand::Number(n)) => n.is_finite(),
        (FieldType::Date, Operand::Text(s)) => parse_date(s).is_some(),
        (FieldType::Text, Operand::Text(_)) => true,
        // Substring matches are free text even on categorical fields
        (FieldType::Select, Operand::Text(_)) if matches!(operator, Operator::Like | Operator::NotLike) => true,
        (FieldType::Select, Operand::Text(s)) => {
            spec.list_values.is_empty() || spec.list_values.iter().any(|v| v == s)
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(CompileError::OperandType {
            field: spec.name.clone(),
            field_type: spec.field_type,
            value: operand.to_string(),
        })
    }
}

/// Renders a field name, backtick-quoting anything that would not lex as a plain
/// identifier, keywords such as `in` or `not` included
pub fn quote_identifier(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !is_keyword(name);
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("`{}`", name))
    }
}

/// Renders a double-quoted string literal
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Integral values print without a fractional part
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn render_operand(operand: &Operand) -> String {
    match operand {
        Operand::Number(n) => format_number(*n),
        Operand::Text(s) => quote_string(s),
    }
}

/// Condition tree → filter expression compiler
pub struct QueryCompiler<'s> {
    schema: &'s Schema,
}

impl<'s> QueryCompiler<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Compiles `tree`; an empty tree yields an empty string
    pub fn compile(&self, tree: &ConditionTree) -> Result<String, CompileError> {
        let query = self.compile_group(tree.root())?.unwrap_or_default();
        debug!(query = %query, "compiled condition tree");
        Ok(query)
    }

    /// `None` when the group holds no rules at any depth
    fn compile_group(&self, group: &Group) -> Result<Option<String>, CompileError> {
        let mut parts = Vec::with_capacity(group.children.len());

        for child in &group.children {
            match child {
                ConditionNode::Rule(rule) => parts.push(self.compile_rule(rule)?),
                ConditionNode::Group(inner) => {
                    if let Some(compiled) = self.compile_group(inner)? {
                        // A negated group already carries its own parentheses
                        if inner.not {
                            parts.push(compiled);
                        } else {
                            parts.push(format!("({})", compiled));
                        }
                    }
                }
            }
        }

        if parts.is_empty() {
            return Ok(None);
        }

        let joined = parts.join(&format!(" {} ", group.conjunction.keyword()));
        if group.not {
            Ok(Some(format!("NOT ({})", joined)))
        } else {
            Ok(Some(joined))
        }
    }

    fn compile_rule(&self, rule: &Rule) -> Result<String, CompileError> {
        check_rule(self.schema, rule)?;

        let field = quote_identifier(&rule.field);
        let values = &rule.value;
        let compiled = match rule.operator {
            Operator::Equal => format!("{} == {}", field, render_operand(&values[0])),
            Operator::NotEqual => format!("{} != {}", field, render_operand(&values[0])),
            Operator::Less => format!("{} < {}", field, render_operand(&values[0])),
            Operator::LessOrEqual => format!("{} <= {}", field, render_operand(&values[0])),
            Operator::Greater => format!("{} > {}", field, render_operand(&values[0])),
            Operator::GreaterOrEqual => format!("{} >= {}", field, render_operand(&values[0])),
            Operator::Between => format!(
                "({f} >= {} AND {f} <= {})",
                render_operand(&values[0]),
                render_operand(&values[1]),
                f = field
            ),
            Operator::NotBetween => format!(
                "({f} < {} OR {f} > {})",
                render_operand(&values[0]),
                render_operand(&values[1]),
                f = field
            ),
            Operator::SelectAnyIn | Operator::SelectNotAnyIn => {
                let list = values.iter().map(render_operand).collect::<Vec<_>>().join(", ");
                let keyword = if rule.operator == Operator::SelectAnyIn { "in" } else { "not in" };
                format!("{} {} [{}]", field, keyword, list)
            }
            Operator::Like => format!("{}.str.contains({})", field, render_operand(&values[0])),
            Operator::NotLike => format!("NOT {}.str.contains({})", field, render_operand(&values[0])),
            Operator::IsNull => format!("{} == null", field),
            Operator::IsNotNull => format!("{} != null", field),
        };

        Ok(compiled)
    }
}
