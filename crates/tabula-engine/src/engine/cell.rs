//! Cell input classification and a simple concurrent value grid.
//!
//! - [`CellInput`] - What the user typed, classified (blank, number, text,
//!   boolean or formula)
//! - [`ValueGrid`] - Thread-safe sparse storage of plain values (backed by
//!   `DashMap`), usable as a [`CellSource`] for sheet-less evaluation

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::cell_ref::{CellAddress, CellRef};
use super::eval::CellSource;
use super::value::{ErrorKind, Value, number_to_text};

/// The type of content a raw input string describes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellInput {
    Blank,
    Number(f64),
    Text(String),
    Bool(bool),
    /// Formula source without the leading `=`.
    Formula(String),
}

impl CellInput {
    /// Parse user input and classify it.
    /// - Empty string or whitespace -> Blank
    /// - Starts with '=' -> Formula (without the '=')
    /// - Quoted string -> Text (without quotes)
    /// - Valid finite number -> Number
    /// - TRUE / FALSE (any case) -> Bool
    /// - Otherwise -> Text
    pub fn from_input(input: &str) -> CellInput {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return CellInput::Blank;
        }

        if let Some(formula) = trimmed.strip_prefix('=') {
            return CellInput::Formula(formula.to_string());
        }

        if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
            return CellInput::Text(trimmed[1..trimmed.len() - 1].to_string());
        }

        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return CellInput::Number(n);
            }
        }

        if trimmed.eq_ignore_ascii_case("TRUE") {
            return CellInput::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("FALSE") {
            return CellInput::Bool(false);
        }

        CellInput::Text(trimmed.to_string())
    }

    /// The value of a non-formula input; `None` for formulas.
    pub fn literal_value(&self) -> Option<Value> {
        match self {
            CellInput::Blank => Some(Value::Blank),
            CellInput::Number(n) => Some(Value::Number(*n)),
            CellInput::Text(s) => Some(Value::Text(s.clone())),
            CellInput::Bool(b) => Some(Value::Bool(*b)),
            CellInput::Formula(_) => None,
        }
    }

    /// Text that reclassifies to the same input (for editing).
    pub fn to_input_string(&self) -> String {
        match self {
            CellInput::Blank => String::new(),
            CellInput::Number(n) => number_to_text(*n),
            CellInput::Text(s) => {
                if CellInput::from_input(s) == CellInput::Text(s.clone()) {
                    s.clone()
                } else {
                    format!("\"{}\"", s)
                }
            }
            CellInput::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellInput::Formula(f) => format!("={}", f),
        }
    }
}

/// Thread-safe sparse value storage without sheets. Sheet-qualified
/// references against it are invalid.
#[derive(Debug, Default)]
pub struct ValueGrid {
    cells: DashMap<CellRef, Value>,
}

impl ValueGrid {
    pub fn new() -> Self {
        ValueGrid::default()
    }

    pub fn set(&self, cell: CellRef, value: impl Into<Value>) {
        let value = value.into();
        if value.is_blank() {
            self.cells.remove(&cell);
        } else {
            self.cells.insert(cell, value);
        }
    }

    pub fn get(&self, cell: CellRef) -> Value {
        self.cells
            .get(&cell)
            .map(|entry| entry.value().clone())
            .unwrap_or(Value::Blank)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl CellSource for ValueGrid {
    fn cell_value(&self, addr: &CellAddress) -> Value {
        if addr.sheet.is_some() {
            return Value::Error(ErrorKind::InvalidReference);
        }
        self.get(addr.cell_ref())
    }

    fn has_sheet(&self, sheet: Option<&str>) -> bool {
        sheet.is_none()
    }
}
