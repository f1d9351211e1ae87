//! Error types for Tabula core.

use tabula_engine::engine::FormulaError;
use thiserror::Error;

/// Errors that can occur while driving a document
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    #[error("Invalid sheet name: {0:?}")]
    InvalidSheetName(String),

    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
