//! Sandboxed expression language evaluated against variant records.
//!
//! This module provides:
//! - Lexing and parsing of Python-like expressions into an AST
//! - Whitelist validation and float literal coercion at compile time
//! - Tree-walking evaluation with NA semantics
//! - Builtin functions, value methods and genotype helpers

pub mod ast;
pub mod builtins;
pub mod compile;
pub mod error;
pub mod eval;
pub mod genotype;
pub mod lexer;
pub mod methods;
pub mod operator;
pub mod parser;
pub mod token;

pub use builtins::{Builtin, Builtins};
pub use compile::{compile, compile_with_variables, CompiledExpression};
pub use error::{EvalError, EvalResult};
pub use operator::{BinaryOperator, CompareOperator, UnaryOperator};
