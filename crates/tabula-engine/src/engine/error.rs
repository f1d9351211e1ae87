//! Syntax errors raised while turning formula text into an AST.

use thiserror::Error;

/// A tokenizer or parser failure. Offsets are byte offsets into the formula
/// text (without the leading `=`).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Number out of range at offset {offset}")]
    NumberOutOfRange { offset: usize },

    #[error("Unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("Unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("Unmatched '(' at offset {offset}")]
    UnmatchedParen { offset: usize },

    #[error("Unexpected {found} after end of formula at offset {offset}")]
    TrailingInput { found: String, offset: usize },

    #[error("Formula ended unexpectedly at offset {offset}")]
    UnexpectedEnd { offset: usize },
}

impl FormulaError {
    pub fn offset(&self) -> usize {
        match self {
            FormulaError::UnexpectedChar { offset, .. }
            | FormulaError::NumberOutOfRange { offset }
            | FormulaError::UnterminatedString { offset }
            | FormulaError::UnexpectedToken { offset, .. }
            | FormulaError::UnmatchedParen { offset }
            | FormulaError::TrailingInput { offset, .. }
            | FormulaError::UnexpectedEnd { offset } => *offset,
        }
    }
}
