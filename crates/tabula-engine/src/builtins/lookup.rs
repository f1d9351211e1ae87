//! Positional lookups over range matrices.

use std::cmp::Ordering;

use super::conditional::wildcard_regex;
use super::{CallContext, matrix_arg, number_arg_or};
use crate::engine::{ErrorKind, Matrix, Value, compare_values, to_bool, values_equal};

/// Exact match, honoring `*`/`?` wildcards when the key is text.
fn exact_position(key: &Value, keys: &[Value]) -> Option<usize> {
    if let Value::Text(pattern) = key {
        if let Some(re) = wildcard_regex(pattern) {
            return keys
                .iter()
                .position(|v| matches!(v, Value::Text(s) if re.is_match(s)));
        }
    }
    keys.iter().position(|v| values_equal(v, key))
}

/// Last position whose key is <= `key`, assuming ascending order.
fn ascending_position(key: &Value, keys: &[Value]) -> Option<usize> {
    let end = keys.partition_point(|v| compare_values(v, key) != Ordering::Greater);
    end.checked_sub(1)
}

/// Last position whose key is >= `key`, assuming descending order.
fn descending_position(key: &Value, keys: &[Value]) -> Option<usize> {
    let end = keys.partition_point(|v| compare_values(v, key) != Ordering::Less);
    end.checked_sub(1)
}

/// Validated 1-based index argument. Zero is allowed only where `allow_zero`.
fn index_arg(args: &[Value], index: usize, default: f64, allow_zero: bool) -> Result<usize, ErrorKind> {
    let n = number_arg_or(args, index, default)?.trunc();
    if n < 0.0 || (n == 0.0 && !allow_zero) {
        return Err(ErrorKind::TypeMismatch);
    }
    Ok(n as usize)
}

enum Orientation {
    Vertical,
    Horizontal,
}

fn table_lookup(args: &[Value], orientation: Orientation) -> Result<Value, ErrorKind> {
    let key = args[0].clone().into_scalar();
    if let Value::Error(e) = key {
        return Err(e);
    }
    let table = matrix_arg(args, 1)?;
    let offset = index_arg(args, 2, 1.0, false)?;
    let approximate = match args.get(3) {
        Some(flag) => to_bool(flag)?,
        None => true,
    };

    let (keys, width) = match orientation {
        Orientation::Vertical => (table.column(0).unwrap_or_default(), table.cols()),
        Orientation::Horizontal => (table.row(0).map(<[Value]>::to_vec).unwrap_or_default(), table.rows()),
    };
    if offset > width {
        return Err(ErrorKind::InvalidReference);
    }

    let found = if approximate {
        ascending_position(&key, &keys)
    } else {
        exact_position(&key, &keys)
    };
    let hit = found.ok_or(ErrorKind::NotAvailable)?;
    let value = match orientation {
        Orientation::Vertical => table.get(hit, offset - 1),
        Orientation::Horizontal => table.get(offset - 1, hit),
    };
    value.cloned().ok_or(ErrorKind::InvalidReference)
}

pub fn vlookup(args: &[Value], _: &CallContext) -> Value {
    table_lookup(args, Orientation::Vertical).into()
}

pub fn hlookup(args: &[Value], _: &CallContext) -> Value {
    table_lookup(args, Orientation::Horizontal).into()
}

fn index_impl(args: &[Value]) -> Result<Value, ErrorKind> {
    let table = matrix_arg(args, 0)?;

    // A single index into a one-row or one-column block walks the vector.
    if args.len() == 2 && (table.rows() == 1 || table.cols() == 1) {
        let position = index_arg(args, 1, 0.0, true)?;
        return match position {
            0 => Ok(Value::Matrix(table)),
            p => table.values().get(p - 1).cloned().ok_or(ErrorKind::InvalidReference),
        };
    }

    let row = index_arg(args, 1, 0.0, true)?;
    let col = index_arg(args, 2, 0.0, true)?;
    if row > table.rows() || col > table.cols() {
        return Err(ErrorKind::InvalidReference);
    }
    match (row, col) {
        (0, 0) => Ok(Value::Matrix(table)),
        (0, c) => {
            let values = table.column(c - 1).ok_or(ErrorKind::InvalidReference)?;
            Matrix::new(values.len(), 1, values)
                .map(Value::Matrix)
                .ok_or(ErrorKind::InvalidReference)
        }
        (r, 0) => {
            let values = table.row(r - 1).ok_or(ErrorKind::InvalidReference)?.to_vec();
            Matrix::new(1, values.len(), values)
                .map(Value::Matrix)
                .ok_or(ErrorKind::InvalidReference)
        }
        (r, c) => table.get(r - 1, c - 1).cloned().ok_or(ErrorKind::InvalidReference),
    }
}

pub fn index(args: &[Value], _: &CallContext) -> Value {
    index_impl(args).into()
}

fn match_impl(args: &[Value]) -> Result<Value, ErrorKind> {
    let key = args[0].clone().into_scalar();
    if let Value::Error(e) = key {
        return Err(e);
    }
    let block = matrix_arg(args, 1)?;
    let keys = block.as_vector().ok_or(ErrorKind::NotAvailable)?;
    let match_type = number_arg_or(args, 2, 1.0)?;

    let found = if match_type == 0.0 {
        exact_position(&key, keys)
    } else if match_type > 0.0 {
        ascending_position(&key, keys)
    } else {
        descending_position(&key, keys)
    };
    found
        .map(|p| Value::Number((p + 1) as f64))
        .ok_or(ErrorKind::NotAvailable)
}

pub fn match_fn(args: &[Value], _: &CallContext) -> Value {
    match_impl(args).into()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::engine::{ErrorKind, Value};

    fn letters() -> Value {
        table(vec![
            vec![t("A"), n(1.0)],
            vec![t("B"), n(2.0)],
            vec![t("C"), n(3.0)],
        ])
    }

    #[test]
    fn test_vlookup_exact() {
        assert_eq!(
            call("VLOOKUP", vec![t("B"), letters(), n(2.0), Value::Bool(false)]),
            n(2.0)
        );
        assert_eq!(
            call("VLOOKUP", vec![t("Z"), letters(), n(2.0), Value::Bool(false)]),
            Value::Error(ErrorKind::NotAvailable)
        );
        assert_eq!(
            call("VLOOKUP", vec![t("b"), letters(), n(2.0), Value::Bool(false)]),
            n(2.0)
        );
    }

    #[test]
    fn test_vlookup_approximate_by_default() {
        let brackets = table(vec![
            vec![n(0.0), t("low")],
            vec![n(10.0), t("mid")],
            vec![n(100.0), t("high")],
        ]);
        assert_eq!(call("VLOOKUP", vec![n(55.0), brackets.clone(), n(2.0)]), t("mid"));
        assert_eq!(call("VLOOKUP", vec![n(100.0), brackets.clone(), n(2.0)]), t("high"));
        assert_eq!(
            call("VLOOKUP", vec![n(-1.0), brackets, n(2.0)]),
            Value::Error(ErrorKind::NotAvailable)
        );
    }

    #[test]
    fn test_vlookup_column_bounds() {
        assert_eq!(
            call("VLOOKUP", vec![t("A"), letters(), n(3.0), Value::Bool(false)]),
            Value::Error(ErrorKind::InvalidReference)
        );
        assert_eq!(
            call("VLOOKUP", vec![t("A"), letters(), n(0.0), Value::Bool(false)]),
            Value::Error(ErrorKind::TypeMismatch)
        );
    }

    #[test]
    fn test_vlookup_wildcards() {
        let names = table(vec![vec![t("apple"), n(1.0)], vec![t("banana"), n(2.0)]]);
        assert_eq!(
            call("VLOOKUP", vec![t("ban*"), names.clone(), n(2.0), Value::Bool(false)]),
            n(2.0)
        );
        assert_eq!(
            call("VLOOKUP", vec![t("?pple"), names, n(2.0), Value::Bool(false)]),
            n(1.0)
        );
    }

    #[test]
    fn test_hlookup() {
        let row_table = table(vec![
            vec![t("Q1"), t("Q2"), t("Q3")],
            vec![n(10.0), n(20.0), n(30.0)],
        ]);
        assert_eq!(
            call("HLOOKUP", vec![t("Q2"), row_table.clone(), n(2.0), Value::Bool(false)]),
            n(20.0)
        );
        assert_eq!(
            call("HLOOKUP", vec![t("Q4"), row_table, n(2.0), Value::Bool(false)]),
            Value::Error(ErrorKind::NotAvailable)
        );
    }

    #[test]
    fn test_index() {
        assert_eq!(call("INDEX", vec![letters(), n(3.0), n(2.0)]), n(3.0));
        assert_eq!(call("INDEX", vec![letters(), n(2.0), n(1.0)]), t("B"));
        assert_eq!(
            call("INDEX", vec![letters(), n(4.0), n(1.0)]),
            Value::Error(ErrorKind::InvalidReference)
        );
        assert_eq!(
            call("INDEX", vec![column(vec![n(5.0), n(6.0), n(7.0)]), n(2.0)]),
            n(6.0)
        );
        assert_eq!(
            call("INDEX", vec![letters(), n(0.0), n(2.0)]),
            column(vec![n(1.0), n(2.0), n(3.0)])
        );
        assert_eq!(
            call("INDEX", vec![letters(), n(-1.0), n(2.0)]),
            Value::Error(ErrorKind::TypeMismatch)
        );
    }

    #[test]
    fn test_match_types() {
        let ascending = column(vec![n(10.0), n(20.0), n(30.0)]);
        assert_eq!(call("MATCH", vec![n(20.0), ascending.clone(), n(0.0)]), n(2.0));
        assert_eq!(call("MATCH", vec![n(25.0), ascending.clone()]), n(2.0));
        assert_eq!(
            call("MATCH", vec![n(5.0), ascending.clone(), n(1.0)]),
            Value::Error(ErrorKind::NotAvailable)
        );
        let descending = column(vec![n(30.0), n(20.0), n(10.0)]);
        assert_eq!(call("MATCH", vec![n(25.0), descending, n(-1.0)]), n(1.0));
        assert_eq!(
            call("MATCH", vec![n(15.0), ascending, n(0.0)]),
            Value::Error(ErrorKind::NotAvailable)
        );
    }

    #[test]
    fn test_match_exact_text_wildcard() {
        let names = column(vec![t("north"), t("south"), t("east")]);
        assert_eq!(call("MATCH", vec![t("SOUTH"), names.clone(), n(0.0)]), n(2.0));
        assert_eq!(call("MATCH", vec![t("ea*"), names, n(0.0)]), n(3.0));
    }

    #[test]
    fn test_match_rejects_two_dimensional_blocks() {
        assert_eq!(
            call("MATCH", vec![t("A"), letters(), n(0.0)]),
            Value::Error(ErrorKind::NotAvailable)
        );
    }
}
