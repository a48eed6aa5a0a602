//! # lattice-formula
//!
//! Formula language for lattice: lexing, parsing, evaluation, and the
//! dependency bookkeeping the calculation engine runs on.
//!
//! This crate provides:
//! - Tokenizer and parser (text → immutable AST)
//! - Evaluator (AST → value, with array broadcasting)
//! - Built-in worksheet functions behind a pluggable registry
//! - Formula arena and dependency graph for ordered recalculation
//!
//! ## Example
//!
//! ```rust,ignore
//! use lattice_formula::{evaluate, parse_formula, EvaluationContext, FunctionRegistry};
//!
//! let registry = FunctionRegistry::new();
//! let ctx = EvaluationContext::new(Some(&workbook), 0, 0, 0, &registry);
//! let ast = parse_formula("=SUM(A1:A10)")?;
//! let result = evaluate(&ast, &ctx)?;
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{union_by, BinaryOperator, FormulaExpr, UnaryOperator};
pub use dependency::{
    collect_reads, CellKey, DependencyGraph, FormulaArena, FormulaId, FormulaRecord, RangeRead,
};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{evaluate, EvaluationContext};
pub use functions::{contains_volatile, FunctionDef, FunctionRegistry};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::parse_formula;
pub use value::{apply_binary, apply_unary, compare_values, FormulaValue};
