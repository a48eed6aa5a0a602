//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur while lexing, parsing, or evaluating a formula
#[derive(Debug, Error)]
pub enum FormulaError {
    /// Formula lex error (bad character, unterminated string)
    #[error("Lex error at offset {pos}: {message}")]
    Lex { pos: usize, message: String },

    /// Formula parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Circular reference
    #[error("Circular reference detected")]
    CircularReference,
}
