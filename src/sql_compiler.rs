//! Renders segments as PostgreSQL using sea-query.
//!
//! The relational store keeps transactions normalised across six tables; the
//! flattened transaction view is rebuilt as a sub-select and the segment's
//! condition tree becomes its outer `WHERE` clause.

use sea_query::{
    Alias, Asterisk, Expr, Iden, JoinType, LikeExpr, PostgresQueryBuilder, SelectStatement, SimpleExpr, Value,
};

use crate::condition::{ConditionNode, ConditionTree, Conjunction, Group, Operand, Operator, Rule};
use crate::query_compiler::{check_rule, CompileError};
use crate::schema::Schema;

/// Alias of the flattened transaction view in segment queries
pub const VIEW_ALIAS: &str = "sales";

/// Tables of the retail store
#[derive(Debug, Clone, Copy)]
pub enum TableName {
    Transaksi,
    DetailTransaksi,
    Produk,
    Toko,
    Karyawan,
    Member,
}

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let name = match self {
            TableName::Transaksi => "transaksi",
            TableName::DetailTransaksi => "detail_transaksi",
            TableName::Produk => "produk",
            TableName::Toko => "toko",
            TableName::Karyawan => "karyawan",
            TableName::Member => "member",
        };
        // fmt::Write into the query buffer does not fail
        let _ = s.write_str(name);
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl ColumnName {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

fn column(table: TableName, name: &str) -> Expr {
    Expr::col((table, ColumnName::new(name)))
}

fn key(left: TableName, left_col: &str, right: TableName, right_col: &str) -> SimpleExpr {
    Expr::col((left, ColumnName::new(left_col))).equals((right, ColumnName::new(right_col)))
}

/// The flattened transaction view: one row per line item, member columns null
/// for anonymous purchases.
pub fn transaction_view_query() -> SelectStatement {
    use TableName::*;

    let mut select = SelectStatement::new();
    select
        .expr_as(column(Transaksi, "id"), Alias::new("id_transaksi"))
        .expr_as(column(Transaksi, "waktu_transaksi"), Alias::new("waktu_transaksi"))
        .expr_as(column(Toko, "nama_toko"), Alias::new("nama_toko"))
        .expr_as(column(Toko, "kota"), Alias::new("kota"))
        .expr_as(column(Karyawan, "nama_karyawan"), Alias::new("nama_karyawan"))
        .expr_as(column(Karyawan, "posisi"), Alias::new("posisi_karyawan"))
        .expr_as(column(Produk, "nama_produk"), Alias::new("nama_produk"))
        .expr_as(column(Produk, "kategori"), Alias::new("kategori_produk"))
        .expr_as(column(Produk, "harga_jual"), Alias::new("harga_jual"))
        .expr_as(column(DetailTransaksi, "jumlah"), Alias::new("jumlah_item"))
        .expr_as(column(DetailTransaksi, "harga_saat_transaksi"), Alias::new("harga_saat_transaksi"))
        .expr_as(
            column(DetailTransaksi, "jumlah").mul(column(DetailTransaksi, "harga_saat_transaksi")),
            Alias::new("total_harga_item"),
        )
        .expr_as(column(Member, "nama_member"), Alias::new("nama_member"))
        .expr_as(column(Member, "tanggal_bergabung"), Alias::new("tanggal_join_member"))
        .from(Transaksi)
        .join(JoinType::InnerJoin, DetailTransaksi, key(Transaksi, "id", DetailTransaksi, "id_transaksi"))
        .join(JoinType::InnerJoin, Produk, key(DetailTransaksi, "id_produk", Produk, "id"))
        .join(JoinType::InnerJoin, Toko, key(Transaksi, "id_toko", Toko, "id"))
        .join(JoinType::InnerJoin, Karyawan, key(Transaksi, "id_karyawan", Karyawan, "id"))
        .join(JoinType::LeftJoin, Member, key(Transaksi, "id_member", Member, "id"));
    select
}

/// Condition tree → SQL compiler
pub struct SegmentSqlCompiler<'s> {
    schema: &'s Schema,
}

impl<'s> SegmentSqlCompiler<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// The `WHERE` expression of a tree, `None` when the tree holds no rules
    pub fn condition(&self, tree: &ConditionTree) -> Result<Option<SimpleExpr>, CompileError> {
        self.compile_group(tree.root())
    }

    /// Builds the segment query over the transaction view
    pub fn compile(&self, tree: &ConditionTree) -> Result<SelectStatement, CompileError> {
        let mut select = SelectStatement::new();
        select
            .column(Asterisk)
            .from_subquery(transaction_view_query(), Alias::new(VIEW_ALIAS));

        if let Some(condition) = self.condition(tree)? {
            select.and_where(condition);
        }
        Ok(select)
    }

    /// Renders the segment query as a PostgreSQL string with inlined values
    pub fn to_sql(&self, tree: &ConditionTree) -> Result<String, CompileError> {
        Ok(self.compile(tree)?.to_string(PostgresQueryBuilder))
    }

    fn compile_group(&self, group: &Group) -> Result<Option<SimpleExpr>, CompileError> {
        let mut conditions = Vec::with_capacity(group.children.len());
        for child in &group.children {
            let condition = match child {
                ConditionNode::Rule(rule) => Some(self.compile_rule(rule)?),
                ConditionNode::Group(inner) => self.compile_group(inner)?,
            };
            conditions.extend(condition);
        }

        let combined = conditions.into_iter().reduce(|acc, expr| match group.conjunction {
            Conjunction::And => acc.and(expr),
            Conjunction::Or => acc.or(expr),
        });

        Ok(if group.not { combined.map(SimpleExpr::not) } else { combined })
    }

    fn compile_rule(&self, rule: &Rule) -> Result<SimpleExpr, CompileError> {
        check_rule(self.schema, rule)?;

        let col = Expr::col(ColumnName(rule.field.clone()));
        let values = &rule.value;

        let expr = match rule.operator {
            Operator::Equal => col.eq(operand_to_value(&values[0])),
            Operator::NotEqual => col.ne(operand_to_value(&values[0])),
            Operator::Less => col.lt(operand_to_value(&values[0])),
            Operator::LessOrEqual => col.lte(operand_to_value(&values[0])),
            Operator::Greater => col.gt(operand_to_value(&values[0])),
            Operator::GreaterOrEqual => col.gte(operand_to_value(&values[0])),
            Operator::Between => col.between(operand_to_value(&values[0]), operand_to_value(&values[1])),
            Operator::NotBetween => col.not_between(operand_to_value(&values[0]), operand_to_value(&values[1])),
            Operator::SelectAnyIn => col.is_in(values.iter().map(operand_to_value)),
            Operator::SelectNotAnyIn => col.is_not_in(values.iter().map(operand_to_value)),
            Operator::Like => col.like(contains_pattern(&values[0])),
            Operator::NotLike => col.not_like(contains_pattern(&values[0])),
            Operator::IsNull => col.is_null(),
            Operator::IsNotNull => col.is_not_null(),
        };

        Ok(expr)
    }
}

/// Convert a rule operand to a sea-query Value
fn operand_to_value(operand: &Operand) -> Value {
    match operand {
        Operand::Number(n) => Value::Double(Some(*n)),
        Operand::Text(s) => Value::String(Some(Box::new(s.clone()))),
    }
}

/// `%needle%` with LIKE wildcards in the needle escaped
fn contains_pattern(operand: &Operand) -> LikeExpr {
    let needle = match operand {
        Operand::Text(s) => s.clone(),
        Operand::Number(n) => n.to_string(),
    };
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    LikeExpr::new(escaped).escape('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Operand {
        Operand::Text(s.to_string())
    }

    fn sql(tree: &ConditionTree) -> String {
        SegmentSqlCompiler::new(&Schema::retail()).to_sql(tree).unwrap()
    }

    #[test]
    fn test_transaction_view_joins() {
        let sql = transaction_view_query().to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#"FROM "transaksi""#));
        assert!(sql.contains(r#"INNER JOIN "detail_transaksi""#));
        assert!(sql.contains(r#"LEFT JOIN "member""#));
        assert!(sql.contains(r#"AS "total_harga_item""#));
        assert!(sql.contains(r#""karyawan"."posisi" AS "posisi_karyawan""#));
    }

    #[test]
    fn test_empty_tree_selects_whole_view() {
        let sql = sql(&ConditionTree::empty());
        assert!(sql.starts_with("SELECT * FROM (SELECT"));
        assert!(sql.contains(r#"AS "sales""#));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_simple_rule() {
        let tree = ConditionTree::empty().with_child(Rule::new("kota", Operator::Equal, vec![text("Bandung")]));
        let sql = sql(&tree);
        assert!(sql.contains(r#"WHERE "kota" = 'Bandung'"#));
    }

    #[test]
    fn test_nested_groups_and_null_checks() {
        let tree = ConditionTree::new(Group::and(vec![
            Rule::new("harga_jual", Operator::Between, vec![Operand::Number(1000.0), Operand::Number(5000.0)]).into(),
            Group::or(vec![
                Rule::new("nama_member", Operator::IsNull, vec![]).into(),
                Rule::new("kategori_produk", Operator::SelectAnyIn, vec![text("Makanan"), text("Minuman")]).into(),
            ])
            .into(),
        ]));
        let sql = sql(&tree);
        assert!(sql.contains(r#""harga_jual" BETWEEN 1000 AND 5000"#));
        assert!(sql.contains(r#""nama_member" IS NULL"#));
        assert!(sql.contains(r#""kategori_produk" IN ('Makanan', 'Minuman')"#));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn test_negation_and_like() {
        let tree = ConditionTree::new(
            Group::and(vec![Rule::new("nama_produk", Operator::Like, vec![text("50%")]).into()]).negated(),
        );
        let sql = sql(&tree);
        assert!(sql.contains("NOT"));
        assert!(sql.contains("LIKE"));
        assert!(sql.contains("ESCAPE"));
    }

    #[test]
    fn test_validation_is_shared_with_query_compiler() {
        let tree = ConditionTree::empty().with_child(Rule::new("loyalty", Operator::IsNull, vec![]));
        let err = SegmentSqlCompiler::new(&Schema::retail()).to_sql(&tree).unwrap_err();
        assert_eq!(err, CompileError::UnknownField("loyalty".into()));
    }
}
