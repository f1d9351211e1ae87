//! Evaluation values and the coercion rules shared by operators and builtins.
//!
//! Formula results are a tagged union ([`Value`]); errors are ordinary values
//! ([`ErrorKind`]) that flow through expressions until something displays them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Formula-level error. Every variant maps 1:1 to a display token.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ErrorKind {
    DivideByZero,
    NameNotFound,
    InvalidReference,
    CircularReference,
    TypeMismatch,
    NotAvailable,
}

impl ErrorKind {
    pub fn as_code(self) -> &'static str {
        match self {
            ErrorKind::DivideByZero => "#DIV/0!",
            ErrorKind::NameNotFound => "#NAME?",
            ErrorKind::InvalidReference => "#REF!",
            ErrorKind::CircularReference => "#CYCLE!",
            ErrorKind::TypeMismatch => "#VALUE!",
            ErrorKind::NotAvailable => "#N/A",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Row-major block of scalar values produced by resolving a range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    values: Vec<Value>,
}

impl Matrix {
    /// Build a matrix; `values.len()` must equal `rows * cols`.
    pub fn new(rows: usize, cols: usize, values: Vec<Value>) -> Option<Matrix> {
        (rows.checked_mul(cols)? == values.len()).then_some(Matrix { rows, cols, values })
    }

    pub fn from_rows(rows: Vec<Vec<Value>>) -> Option<Matrix> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return None;
        }
        Matrix::new(height, width, rows.into_iter().flatten().collect())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 0-indexed access.
    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.values.get(row * self.cols + col)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn row(&self, row: usize) -> Option<&[Value]> {
        if row >= self.rows {
            return None;
        }
        Some(&self.values[row * self.cols..(row + 1) * self.cols])
    }

    pub fn column(&self, col: usize) -> Option<Vec<Value>> {
        if col >= self.cols {
            return None;
        }
        Some((0..self.rows).map(|r| self.values[r * self.cols + col].clone()).collect())
    }

    /// A single row or column, flattened; None for a 2-D block.
    pub fn as_vector(&self) -> Option<&[Value]> {
        (self.rows == 1 || self.cols == 1).then_some(self.values.as_slice())
    }
}

/// Result of evaluating an expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    /// An empty cell: 0 to numeric functions, "" to text functions.
    Blank,
    Matrix(Matrix),
    Error(ErrorKind),
}

impl Value {
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Blank)
    }

    pub fn error(&self) -> Option<ErrorKind> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    /// Unwrap a 1x1 matrix; larger matrices cannot stand in for a scalar.
    pub fn into_scalar(self) -> Value {
        match self {
            Value::Matrix(m) if m.len() == 1 => m.values.into_iter().next().unwrap_or(Value::Blank),
            Value::Matrix(_) => Value::Error(ErrorKind::TypeMismatch),
            other => other,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Value::Number(value)
        } else {
            Value::Error(ErrorKind::TypeMismatch)
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<ErrorKind> for Value {
    fn from(value: ErrorKind) -> Self {
        Value::Error(value)
    }
}

impl From<Result<Value, ErrorKind>> for Value {
    fn from(value: Result<Value, ErrorKind>) -> Self {
        value.unwrap_or_else(Value::Error)
    }
}

/// Parse numeric-looking text: surrounding whitespace, a leading currency
/// symbol, thousands separators and a trailing `%` are tolerated.
pub fn parse_numeric_text(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let rest = rest
        .strip_prefix(['$', '€', '£', '¥'])
        .unwrap_or(rest)
        .trim_start();
    let (rest, percent) = match rest.strip_suffix('%') {
        Some(r) => (r.trim_end(), true),
        None => (rest, false),
    };

    if rest.is_empty() || !rest.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if !valid_thousands_grouping(rest) {
        return None;
    }
    let cleaned: String = rest.chars().filter(|c| *c != ',').collect();
    let mut n = cleaned.parse::<f64>().ok().filter(|n| n.is_finite())?;
    if percent {
        n /= 100.0;
    }
    Some(if negative { -n } else { n })
}

/// Commas are only accepted as 3-digit group separators in the integer part.
fn valid_thousands_grouping(text: &str) -> bool {
    if !text.contains(',') {
        return true;
    }
    let int_part = text.split(['.', 'e', 'E']).next().unwrap_or("");
    if text[int_part.len()..].contains(',') {
        return false;
    }
    let mut groups = int_part.split(',');
    let first = groups.next().unwrap_or("");
    if first.is_empty() || first.len() > 3 {
        return false;
    }
    groups.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()))
}

/// Numeric coercion for operators and scalar function arguments.
pub fn to_number(value: &Value) -> Result<f64, ErrorKind> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Blank => Ok(0.0),
        Value::Text(s) => parse_numeric_text(s).ok_or(ErrorKind::TypeMismatch),
        Value::Error(e) => Err(*e),
        Value::Matrix(_) => to_number(&value.clone().into_scalar()),
    }
}

/// Text coercion; numbers use a fixed, locale-independent representation.
pub fn to_text(value: &Value) -> Result<String, ErrorKind> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        Value::Number(n) => Ok(number_to_text(*n)),
        Value::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Value::Blank => Ok(String::new()),
        Value::Error(e) => Err(*e),
        Value::Matrix(_) => to_text(&value.clone().into_scalar()),
    }
}

/// Truthiness: nonzero number, TRUE, or non-empty text other than "FALSE"/"0".
pub fn to_bool(value: &Value) -> Result<bool, ErrorKind> {
    match value {
        Value::Number(n) => Ok(*n != 0.0),
        Value::Bool(b) => Ok(*b),
        Value::Blank => Ok(false),
        Value::Text(s) => {
            let s = s.trim();
            Ok(!(s.is_empty() || s.eq_ignore_ascii_case("FALSE") || s == "0"))
        }
        Value::Error(e) => Err(*e),
        Value::Matrix(_) => to_bool(&value.clone().into_scalar()),
    }
}

/// Shortest text for a number, rounded to 15 significant digits so binary
/// noise (`0.1 + 0.2`) does not leak into text results.
pub fn number_to_text(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let rounded: f64 = format!("{:.14e}", n).parse().unwrap_or(n);
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) | Value::Blank => 0,
        Value::Text(_) => 1,
        Value::Bool(_) => 2,
        Value::Matrix(_) | Value::Error(_) => 3,
    }
}

/// Total order used by comparison operators and lookups: numbers before text
/// before booleans; numbers numerically, text case-insensitively, FALSE < TRUE.
/// A blank compares as 0 against numbers and as "" against text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Blank, Value::Text(t)) => "".cmp(t.to_lowercase().as_str()),
        (Value::Text(t), Value::Blank) => t.to_lowercase().as_str().cmp(""),
        (Value::Blank, Value::Bool(b)) => false.cmp(b),
        (Value::Bool(a), Value::Blank) => a.cmp(&false),
        _ => match type_rank(a).cmp(&type_rank(b)) {
            Ordering::Equal => match (a, b) {
                (Value::Text(x), Value::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
                (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                _ => {
                    let x = to_number(a).unwrap_or(0.0);
                    let y = to_number(b).unwrap_or(0.0);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            },
            other => other,
        },
    }
}

/// Equality under [`compare_values`]; values of different types are never equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_text() {
        assert_eq!(parse_numeric_text("42"), Some(42.0));
        assert_eq!(parse_numeric_text(" 1,234.5 "), Some(1234.5));
        assert_eq!(parse_numeric_text("$1,000"), Some(1000.0));
        assert_eq!(parse_numeric_text("-€3"), Some(-3.0));
        assert_eq!(parse_numeric_text("50%"), Some(0.5));
        assert_eq!(parse_numeric_text(".5"), Some(0.5));
        assert_eq!(parse_numeric_text("1,23"), None);
        assert_eq!(parse_numeric_text("abc"), None);
        assert_eq!(parse_numeric_text(""), None);
        assert_eq!(parse_numeric_text("inf"), None);
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(to_bool(&Value::Number(2.0)), Ok(true));
        assert_eq!(to_bool(&Value::Number(0.0)), Ok(false));
        assert_eq!(to_bool(&Value::text("false")), Ok(false));
        assert_eq!(to_bool(&Value::text("0")), Ok(false));
        assert_eq!(to_bool(&Value::text("no")), Ok(true));
        assert_eq!(to_bool(&Value::Blank), Ok(false));
        assert_eq!(
            to_bool(&Value::Error(ErrorKind::NotAvailable)),
            Err(ErrorKind::NotAvailable)
        );
    }

    #[test]
    fn test_number_to_text_is_fixed_representation() {
        assert_eq!(number_to_text(3.0), "3");
        assert_eq!(number_to_text(-2.5), "-2.5");
        assert_eq!(number_to_text(0.1 + 0.2), "0.3");
        assert_eq!(number_to_text(1e-7), "0.0000001");
    }

    #[test]
    fn test_compare_mixed_types() {
        assert_eq!(
            compare_values(&Value::Number(100.0), &Value::text("a")),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&Value::text("ABC"), &Value::text("abc")),
            Ordering::Equal
        );
        assert_eq!(
            compare_values(&Value::Bool(false), &Value::Bool(true)),
            Ordering::Less
        );
        assert!(!values_equal(&Value::Number(1.0), &Value::Bool(true)));
        assert!(values_equal(&Value::Blank, &Value::Number(0.0)));
        assert!(values_equal(&Value::Blank, &Value::text("")));
    }

    #[test]
    fn test_matrix_accessors() {
        let m = Matrix::from_rows(vec![
            vec![Value::Number(1.0), Value::Number(2.0)],
            vec![Value::Number(3.0), Value::Number(4.0)],
        ])
        .unwrap();
        assert_eq!(m.get(1, 0), Some(&Value::Number(3.0)));
        assert_eq!(m.column(1), Some(vec![Value::Number(2.0), Value::Number(4.0)]));
        assert!(m.as_vector().is_none());
        assert!(Matrix::from_rows(vec![vec![Value::Blank], vec![]]).is_none());
    }
}
