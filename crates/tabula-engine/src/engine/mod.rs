//! Formula engine API.
//!
//! This module provides the computation core of the spreadsheet:
//!
//! - [`CellAddress`], [`CellRange`], [`CellRef`] - A1 reference parsing and formatting
//! - [`tokenize`], [`parse_formula`], [`Expr`] - Formula text to AST and back
//! - [`Value`], [`ErrorKind`] - Evaluation results and coercion rules
//! - [`Evaluator`], [`CellSource`] - AST evaluation against host-supplied cells
//! - [`extract_dependencies`] - References a formula reads
//! - [`detect_cycle`] - Circular dependency search
//! - [`format_value`] - Format values for display

mod ast;
mod cell;
mod cell_ref;
mod cycle;
mod deps;
mod error;
mod eval;
mod format;
mod parser;
mod token;
mod value;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use cell::{CellInput, ValueGrid};
pub use cell_ref::{CellAddress, CellRange, CellRef, MAX_COLUMNS, MAX_ROWS, quote_sheet};
pub use cycle::detect_cycle;
pub use deps::{Reference, called_functions, extract_dependencies};
pub use error::FormulaError;
pub use eval::{CellSource, DEFAULT_MAX_RANGE_CELLS, Evaluator, evaluate_formula};
pub use format::{format_number, format_value};
pub use parser::{Parser, normalize_formula, parse_formula};
pub use token::{Operator, Token, TokenKind, is_cell_shaped, tokenize};
pub use value::{
    ErrorKind, Matrix, Value, compare_values, number_to_text, parse_numeric_text, to_bool,
    to_number, to_text, values_equal,
};
