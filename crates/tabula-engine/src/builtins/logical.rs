//! Logical functions and the error-catching wrappers.
//!
//! `IF`, `IFS`, `IFERROR` and `IFNA` take their arguments raw: an error in a
//! branch that is not chosen must not poison the result. `IFERROR` and `IFNA`
//! are the only places an error is inspected as data.

use super::{CallContext, flatten};
use crate::engine::{ErrorKind, Value, to_bool};

fn branch(value: Option<&Value>, default: Value) -> Value {
    match value {
        // An omitted or blank branch reads as 0 when chosen.
        Some(Value::Blank) => Value::Number(0.0),
        Some(v) => v.clone().into_scalar(),
        None => default,
    }
}

pub fn if_fn(args: &[Value], _: &CallContext) -> Value {
    let condition = args[0].clone().into_scalar();
    match to_bool(&condition) {
        Ok(true) => branch(args.get(1), Value::Bool(true)),
        Ok(false) => branch(args.get(2), Value::Bool(false)),
        Err(e) => Value::Error(e),
    }
}

pub fn ifs(args: &[Value], _: &CallContext) -> Value {
    if args.len() % 2 != 0 {
        return Value::Error(ErrorKind::TypeMismatch);
    }
    for pair in args.chunks(2) {
        match to_bool(&pair[0].clone().into_scalar()) {
            Ok(true) => return branch(Some(&pair[1]), Value::Blank),
            Ok(false) => {}
            Err(e) => return Value::Error(e),
        }
    }
    Value::Error(ErrorKind::NotAvailable)
}

/// Logical values of all arguments; blanks and text inside ranges are skipped.
fn logicals(args: &[Value]) -> Result<Vec<bool>, ErrorKind> {
    let mut out = Vec::new();
    for (value, from_range) in flatten(args) {
        match value {
            Value::Blank => {}
            Value::Text(_) if from_range => {}
            other => out.push(to_bool(other)?),
        }
    }
    if out.is_empty() {
        return Err(ErrorKind::TypeMismatch);
    }
    Ok(out)
}

pub fn and(args: &[Value], _: &CallContext) -> Value {
    match logicals(args) {
        Ok(values) => Value::Bool(values.iter().all(|b| *b)),
        Err(e) => Value::Error(e),
    }
}

pub fn or(args: &[Value], _: &CallContext) -> Value {
    match logicals(args) {
        Ok(values) => Value::Bool(values.iter().any(|b| *b)),
        Err(e) => Value::Error(e),
    }
}

pub fn not(args: &[Value], _: &CallContext) -> Value {
    match to_bool(&args[0]) {
        Ok(b) => Value::Bool(!b),
        Err(e) => Value::Error(e),
    }
}

pub fn iferror(args: &[Value], _: &CallContext) -> Value {
    match args[0].clone().into_scalar() {
        Value::Error(_) => branch(args.get(1), Value::Blank),
        value => value,
    }
}

pub fn ifna(args: &[Value], _: &CallContext) -> Value {
    match args[0].clone().into_scalar() {
        Value::Error(ErrorKind::NotAvailable) => branch(args.get(1), Value::Blank),
        value => value,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::engine::{ErrorKind, Value};

    #[test]
    fn test_if_selects_branch() {
        assert_eq!(call("IF", vec![Value::Bool(true), t("Yes"), t("No")]), t("Yes"));
        assert_eq!(call("IF", vec![n(0.0), t("Yes"), t("No")]), t("No"));
        assert_eq!(call("IF", vec![n(0.0), t("Yes")]), Value::Bool(false));
    }

    #[test]
    fn test_if_ignores_error_in_untaken_branch() {
        let div0 = Value::Error(ErrorKind::DivideByZero);
        assert_eq!(call("IF", vec![Value::Bool(true), n(1.0), div0.clone()]), n(1.0));
        assert_eq!(call("IF", vec![Value::Bool(false), n(1.0), div0.clone()]), div0);
        assert_eq!(call("IF", vec![div0.clone(), n(1.0), n(2.0)]), div0);
    }

    #[test]
    fn test_truthiness_of_text_conditions() {
        assert_eq!(call("IF", vec![t("FALSE"), n(1.0), n(2.0)]), n(2.0));
        assert_eq!(call("IF", vec![t("0"), n(1.0), n(2.0)]), n(2.0));
        assert_eq!(call("IF", vec![t("anything"), n(1.0), n(2.0)]), n(1.0));
    }

    #[test]
    fn test_ifs_first_true_branch() {
        let args = vec![Value::Bool(false), t("a"), n(1.0), t("b"), Value::Bool(true), t("c")];
        assert_eq!(call("IFS", args), t("b"));
        assert_eq!(
            call("IFS", vec![Value::Bool(false), t("a")]),
            Value::Error(ErrorKind::NotAvailable)
        );
        assert_eq!(
            call("IFS", vec![Value::Bool(false), t("a"), Value::Bool(true)]),
            Value::Error(ErrorKind::TypeMismatch)
        );
    }

    #[test]
    fn test_and_or_not() {
        let range = column(vec![Value::Bool(true), Value::Blank, t("text"), n(1.0)]);
        assert_eq!(call("AND", vec![range.clone()]), Value::Bool(true));
        assert_eq!(call("AND", vec![range.clone(), n(0.0)]), Value::Bool(false));
        assert_eq!(call("OR", vec![n(0.0), Value::Bool(false)]), Value::Bool(false));
        assert_eq!(call("OR", vec![range, n(0.0)]), Value::Bool(true));
        assert_eq!(call("NOT", vec![n(0.0)]), Value::Bool(true));
        assert_eq!(
            call("AND", vec![column(vec![Value::Blank])]),
            Value::Error(ErrorKind::TypeMismatch)
        );
    }

    #[test]
    fn test_iferror_and_ifna() {
        let na = Value::Error(ErrorKind::NotAvailable);
        let div0 = Value::Error(ErrorKind::DivideByZero);
        assert_eq!(call("IFERROR", vec![div0.clone(), t("fallback")]), t("fallback"));
        assert_eq!(call("IFERROR", vec![n(5.0), t("fallback")]), n(5.0));
        assert_eq!(call("IFNA", vec![na, n(0.0)]), n(0.0));
        assert_eq!(call("IFNA", vec![div0.clone(), n(0.0)]), div0);
    }
}
