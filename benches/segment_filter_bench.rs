use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use segment_builder::condition::{ConditionTree, Group, Operand, Operator, Rule};
use segment_builder::dataset::Dataset;
use segment_builder::generator::{generate, GeneratorConfig};
use segment_builder::lexer::Lexer;
use segment_builder::parser::Parser;
use segment_builder::query_compiler::QueryCompiler;
use segment_builder::rewrite::rewrite_null_checks;
use segment_builder::schema::Schema;
use segment_builder::sql_compiler::SegmentSqlCompiler;

fn text(s: &str) -> Operand {
    Operand::Text(s.to_string())
}

// Trees of increasing size over the retail schema
fn test_trees() -> Vec<(&'static str, ConditionTree)> {
    let simple = ConditionTree::empty().with_child(Rule::new("kota", Operator::Equal, vec![text("Bandung")]));

    let medium = simple
        .with_child(Rule::new("harga_jual", Operator::Between, vec![Operand::Number(5000.0), Operand::Number(20000.0)]))
        .with_child(Rule::new("nama_member", Operator::IsNotNull, vec![]));

    let complex = ConditionTree::new(Group::and(vec![
        Rule::new("kategori_produk", Operator::SelectAnyIn, vec![text("Makanan"), text("Minuman")]).into(),
        Group::or(vec![
            Rule::new("nama_member", Operator::IsNull, vec![]).into(),
            Rule::new("tanggal_join_member", Operator::Greater, vec![text("2023-01-01")]).into(),
        ])
        .into(),
        Group::and(vec![
            Rule::new("nama_produk", Operator::Like, vec![text("Kopi")]).into(),
            Rule::new("jumlah_item", Operator::GreaterOrEqual, vec![Operand::Number(2.0)]).into(),
        ])
        .negated()
        .into(),
    ]));

    vec![("simple", simple), ("medium", medium), ("complex", complex)]
}

fn dataset() -> Dataset {
    generate(&GeneratorConfig {
        days: 90,
        end_date: NaiveDate::from_ymd_opt(2024, 6, 1),
        ..GeneratorConfig::default()
    })
    .expect("generation should succeed")
}

// Condition tree → compiled query
fn benchmark_query_compiler(c: &mut Criterion) {
    let schema = Schema::retail();
    let compiler = QueryCompiler::new(&schema);
    let mut group = c.benchmark_group("query_compiler_performance");

    for (name, tree) in test_trees() {
        group.bench_with_input(BenchmarkId::new("compile", name), &tree, |b, tree| {
            b.iter(|| black_box(compiler.compile(black_box(tree)).expect("compile should succeed")))
        });
    }

    group.finish();
}

// Null-syntax rewriting
fn benchmark_rewrite(c: &mut Criterion) {
    let schema = Schema::retail();
    let compiler = QueryCompiler::new(&schema);
    let mut group = c.benchmark_group("rewrite_performance");

    for (name, tree) in test_trees() {
        let query = compiler.compile(&tree).expect("compile should succeed");
        group.bench_with_input(BenchmarkId::new("rewrite", name), &query, |b, query| {
            b.iter(|| black_box(rewrite_null_checks(black_box(query))))
        });
    }

    group.finish();
}

// Lexing and parsing of rewritten queries
fn benchmark_parser(c: &mut Criterion) {
    let schema = Schema::retail();
    let compiler = QueryCompiler::new(&schema);
    let mut group = c.benchmark_group("parser_performance");

    for (name, tree) in test_trees() {
        let query = rewrite_null_checks(&compiler.compile(&tree).expect("compile should succeed"));
        group.bench_with_input(BenchmarkId::new("parse", name), &query, |b, query| {
            b.iter(|| {
                let tokens: Vec<_> = Lexer::new(black_box(query)).collect();
                let mut parser = Parser::new(&tokens);
                black_box(parser.parse().expect("parse should succeed"))
            })
        });
    }

    group.finish();
}

// Compile, rewrite and evaluate against generated transactions
fn benchmark_end_to_end(c: &mut Criterion) {
    let data = dataset();
    let schema = data.schema().clone();
    let compiler = QueryCompiler::new(&schema);
    let mut group = c.benchmark_group("end_to_end_performance");
    group.sample_size(20);

    for (name, tree) in test_trees() {
        group.bench_with_input(BenchmarkId::new("apply", name), &tree, |b, tree| {
            b.iter(|| {
                let query = rewrite_null_checks(&compiler.compile(tree).expect("compile should succeed"));
                let selection = data.query(&query).expect("query should evaluate");
                black_box(selection.len())
            })
        });
    }

    group.finish();
}

// Segment SQL rendering
fn benchmark_sql_compiler(c: &mut Criterion) {
    let schema = Schema::retail();
    let compiler = SegmentSqlCompiler::new(&schema);
    let mut group = c.benchmark_group("sql_compiler_performance");

    for (name, tree) in test_trees() {
        group.bench_with_input(BenchmarkId::new("to_sql", name), &tree, |b, tree| {
            b.iter(|| black_box(compiler.to_sql(black_box(tree)).expect("compile should succeed")))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_query_compiler,
    benchmark_rewrite,
    benchmark_parser,
    benchmark_end_to_end,
    benchmark_sql_compiler
);
criterion_main!(benches);
