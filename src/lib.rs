pub mod ast;
pub mod condition;
pub mod config;
pub mod dataset;
pub mod evaluator;
pub mod generator;
pub mod lexer;
pub mod parser;
pub mod query_compiler;
pub mod rewrite;
pub mod schema;
pub mod session;
pub mod sql_compiler;
pub mod store;
pub mod token;
