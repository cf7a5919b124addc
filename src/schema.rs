//! Field schema the builder, compiler and evaluation engine agree on.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::condition::Operator;

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    /// Categorical field with an enumerated value list
    Select,
}

impl FieldType {
    /// Operators offered for a field of this type when the schema lists none
    pub fn default_operators(&self) -> &'static [Operator] {
        use Operator::*;
        match self {
            FieldType::Text => &[
                Equal, NotEqual, Like, NotLike, SelectAnyIn, SelectNotAnyIn, IsNull, IsNotNull,
            ],
            FieldType::Number | FieldType::Date => &[
                Equal, NotEqual, Less, LessOrEqual, Greater, GreaterOrEqual, Between, NotBetween,
                IsNull, IsNotNull,
            ],
            FieldType::Select => &[
                Equal, NotEqual, SelectAnyIn, SelectNotAnyIn, IsNull, IsNotNull,
            ],
        }
    }

    /// Whether `<`, `<=`, `>` and `>=` are meaningful for this type
    pub fn is_ordered(&self) -> bool {
        !matches!(self, FieldType::Select)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::Select)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Select => "select",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Explicit operator list; empty means the type's defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operators: Vec<Operator>,
    /// Allowed values of a categorical field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub list_values: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            operators: Vec::new(),
            list_values: Vec::new(),
        }
    }

    pub fn allowed_operators(&self) -> &[Operator] {
        if self.operators.is_empty() {
            self.field_type.default_operators()
        } else {
            &self.operators
        }
    }

    pub fn allows(&self, operator: Operator) -> bool {
        self.allowed_operators().contains(&operator)
    }
}

/// Ordered set of fields. Column `i` of a dataset row is described by field `i`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Replaces the enumerated values of `name`; unknown names are ignored
    pub fn set_list_values(&mut self, name: &str, values: Vec<String>) {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            field.list_values = values;
        }
    }

    /// Descriptor of the flattened retail transaction view
    pub fn retail() -> Self {
        use FieldType::*;
        Self::new(vec![
            FieldSpec::new("id_transaksi", Number),
            FieldSpec::new("waktu_transaksi", Date),
            FieldSpec::new("nama_toko", Select),
            FieldSpec::new("kota", Select),
            FieldSpec::new("nama_karyawan", Text),
            FieldSpec::new("posisi_karyawan", Select),
            FieldSpec::new("nama_produk", Text),
            FieldSpec::new("kategori_produk", Select),
            FieldSpec::new("harga_jual", Number),
            FieldSpec::new("jumlah_item", Number),
            FieldSpec::new("harga_saat_transaksi", Number),
            FieldSpec::new("total_harga_item", Number),
            FieldSpec::new("nama_member", Text),
            FieldSpec::new("tanggal_join_member", Date),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_operators_include_null_checks() {
        for ty in [FieldType::Text, FieldType::Number, FieldType::Date, FieldType::Select] {
            let ops = ty.default_operators();
            assert!(ops.contains(&Operator::IsNull), "{} lacks is_null", ty);
            assert!(ops.contains(&Operator::IsNotNull), "{} lacks is_not_null", ty);
        }
        assert!(!FieldType::Select.default_operators().contains(&Operator::Greater));
    }

    #[test]
    fn test_explicit_operators_override_defaults() {
        let mut spec = FieldSpec::new("kota", FieldType::Select);
        assert!(spec.allows(Operator::SelectAnyIn));
        spec.operators = vec![Operator::Equal];
        assert!(!spec.allows(Operator::SelectAnyIn));
    }

    #[test]
    fn test_retail_schema_lookup() {
        let schema = Schema::retail();
        assert_eq!(schema.len(), 14);
        assert_eq!(schema.index_of("kota"), Some(3));
        assert_eq!(schema.field("harga_jual").unwrap().field_type, FieldType::Number);
        assert!(schema.field("unknown").is_none());
    }

    #[test]
    fn test_schema_from_json() {
        let json = r#"{"fields":[
            {"name":"Col Name","type":"text"},
            {"name":"tier","type":"select","list_values":["gold","silver"],"operators":["equal"]}
        ]}"#;
        let schema: Schema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.len(), 2);
        let tier = schema.field("tier").unwrap();
        assert_eq!(tier.list_values, vec!["gold", "silver"]);
        assert_eq!(tier.allowed_operators(), &[Operator::Equal]);
    }

    #[test]
    fn test_set_list_values() {
        let mut schema = Schema::retail();
        schema.set_list_values("kota", vec!["Bandung".into()]);
        assert_eq!(schema.field("kota").unwrap().list_values, vec!["Bandung"]);
    }
}
