//! Row-oriented in-memory table the segment filters run against.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::evaluator::{EvalError, Evaluator};
use crate::schema::Schema;

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Orders two non-null values of the same kind; `None` for anything else
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Parses `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub type Row = Vec<Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    #[error("row {row} has {found} values, the schema has {expected} fields")]
    RowWidth { row: usize, expected: usize, found: usize },
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    schema: Schema,
    rows: Vec<Row>,
}

impl Dataset {
    /// Every row must carry exactly one value per schema field
    pub fn new(schema: Schema, rows: Vec<Row>) -> Result<Self, DatasetError> {
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != schema.len()) {
            return Err(DatasetError::RowWidth { row, expected: schema.len(), found: r.len() });
        }
        Ok(Self { schema, rows })
    }

    /// Schema introspection
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Evaluates a (null-rewritten) filter expression and returns the matching rows.
    ///
    /// A blank expression selects everything.
    pub fn query(&self, expression: &str) -> Result<Selection<'_>, EvalError> {
        if expression.trim().is_empty() {
            return Ok(Selection {
                dataset: self,
                indices: (0..self.rows.len()).collect(),
            });
        }

        let evaluator = Evaluator::compile(expression, &self.schema)?;
        let indices = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| evaluator.matches(row))
            .map(|(i, _)| i)
            .collect();

        Ok(Selection { dataset: self, indices })
    }
}

/// Rows of a dataset selected by a query
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
}

impl<'a> Selection<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a Row> + '_ {
        let dataset = self.dataset;
        self.indices.iter().map(move |&i| &dataset.rows[i])
    }

    /// Sum of a numeric column over the selection, skipping nulls
    pub fn sum(&self, field: &str) -> Option<f64> {
        let column = self.dataset.schema.index_of(field)?;
        Some(self.rows().filter_map(|row| row[column].as_number()).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};

    fn small_dataset() -> Dataset {
        let schema = Schema::new(vec![
            FieldSpec::new("kota", FieldType::Select),
            FieldSpec::new("total", FieldType::Number),
        ]);
        Dataset::new(
            schema,
            vec![
                vec![Value::Text("Bandung".into()), Value::Number(10.0)],
                vec![Value::Text("Surabaya".into()), Value::Null],
                vec![Value::Text("Bandung".into()), Value::Number(5.5)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rows_must_match_schema_width() {
        let schema = Schema::new(vec![
            FieldSpec::new("kota", FieldType::Select),
            FieldSpec::new("total", FieldType::Number),
        ]);
        let err = Dataset::new(
            schema.clone(),
            vec![
                vec![Value::Text("Bandung".into()), Value::Number(1.0)],
                vec![Value::Text("Surabaya".into())],
            ],
        )
        .unwrap_err();
        assert_eq!(err, DatasetError::RowWidth { row: 1, expected: 2, found: 1 });

        assert!(Dataset::new(schema, vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_date_formats() {
        let d = parse_date("2024-03-01").unwrap();
        assert_eq!(d.to_string(), "2024-03-01 00:00:00");
        assert!(parse_date("2024-03-01 08:30:00").is_some());
        assert!(parse_date("2024-03-01T08:30:00").is_some());
        assert!(parse_date("01/03/2024").is_none());
    }

    #[test]
    fn test_compare_mismatched_kinds() {
        assert_eq!(Value::Number(1.0).compare(&Value::Number(2.0)), Some(Ordering::Less));
        assert_eq!(Value::Number(1.0).compare(&Value::Text("1".into())), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_blank_query_selects_everything() {
        let data = small_dataset();
        assert_eq!(data.query("").unwrap().len(), 3);
        assert_eq!(data.query("   ").unwrap().len(), 3);
    }

    #[test]
    fn test_selection_sum_skips_nulls() {
        let data = small_dataset();
        let all = data.query("").unwrap();
        assert_eq!(all.sum("total"), Some(15.5));
        assert_eq!(all.sum("missing"), None);

        let bandung = data.query(r#"kota == "Bandung""#).unwrap();
        assert_eq!(bandung.len(), 2);
        assert_eq!(bandung.sum("total"), Some(15.5));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(3.25).to_string(), "3.25");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
