//! Criteria matching and the `*IF` aggregates.
//!
//! A criterion is either a plain value (equality), a comparison-prefixed
//! string such as `">=10"` or `"<>done"`, or text with `*`/`?` wildcards.
//! `~` escapes a literal wildcard character.

use regex::Regex;
use std::cmp::Ordering;

use super::{CallContext, matrix_arg};
use crate::engine::{ErrorKind, Matrix, Value, parse_numeric_text, to_text};

/// Case-insensitive whole-string regex for a glob pattern, or `None` when
/// the pattern has no unescaped wildcard.
pub(crate) fn wildcard_regex(pattern: &str) -> Option<Regex> {
    let mut body = String::new();
    let mut has_wildcard = false;
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '~' => match chars.next() {
                Some(escaped) => body.push_str(&regex::escape(&escaped.to_string())),
                None => body.push_str(&regex::escape("~")),
            },
            '*' => {
                has_wildcard = true;
                body.push_str(".*");
            }
            '?' => {
                has_wildcard = true;
                body.push('.');
            }
            other => body.push_str(&regex::escape(&other.to_string())),
        }
    }
    if !has_wildcard {
        return None;
    }
    Regex::new(&format!("(?is)^{body}$")).ok()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match self {
            Comparison::Eq => ordering == Some(Ordering::Equal),
            Comparison::Ne => ordering != Some(Ordering::Equal),
            Comparison::Lt => ordering == Some(Ordering::Less),
            Comparison::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Comparison::Gt => ordering == Some(Ordering::Greater),
            Comparison::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

#[derive(Debug)]
enum Criterion {
    Compare(Comparison, Value),
    Pattern { regex: Regex, negate: bool },
}

const PREFIXES: [(&str, Comparison); 6] = [
    (">=", Comparison::Ge),
    ("<=", Comparison::Le),
    ("<>", Comparison::Ne),
    (">", Comparison::Gt),
    ("<", Comparison::Lt),
    ("=", Comparison::Eq),
];

impl Criterion {
    fn parse(value: &Value) -> Result<Criterion, ErrorKind> {
        let text = match value {
            Value::Text(s) => s,
            Value::Error(e) => return Err(*e),
            Value::Matrix(_) => return Criterion::parse(&value.clone().into_scalar()),
            Value::Blank => return Ok(Criterion::Compare(Comparison::Eq, Value::text(""))),
            other => return Ok(Criterion::Compare(Comparison::Eq, other.clone())),
        };

        let (op, rest) = PREFIXES
            .iter()
            .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (*op, rest)))
            .unwrap_or((Comparison::Eq, text.as_str()));

        if matches!(op, Comparison::Eq | Comparison::Ne) {
            if let Some(regex) = wildcard_regex(rest) {
                return Ok(Criterion::Pattern {
                    regex,
                    negate: op == Comparison::Ne,
                });
            }
        }
        let operand = if let Some(n) = parse_numeric_text(rest) {
            Value::Number(n)
        } else if rest.eq_ignore_ascii_case("TRUE") {
            Value::Bool(true)
        } else if rest.eq_ignore_ascii_case("FALSE") {
            Value::Bool(false)
        } else {
            Value::text(rest)
        };
        Ok(Criterion::Compare(op, operand))
    }

    fn matches(&self, cell: &Value) -> bool {
        match self {
            Criterion::Pattern { regex, negate } => {
                let hit = match cell {
                    Value::Text(_) | Value::Number(_) | Value::Bool(_) => {
                        to_text(cell).is_ok_and(|s| regex.is_match(&s))
                    }
                    _ => false,
                };
                hit != *negate
            }
            Criterion::Compare(op, operand) => op.holds(order_against(cell, operand)),
        }
    }
}

/// How a cell orders against a criterion operand; `None` when the two are
/// not comparable (e.g. text cell against a numeric criterion).
fn order_against(cell: &Value, operand: &Value) -> Option<Ordering> {
    match (cell, operand) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Text(s), Value::Number(b)) => parse_numeric_text(s)?.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
        (Value::Blank, Value::Text(b)) => Some("".cmp(b.as_str())),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Criteria range, criterion, and the block whose values are aggregated.
fn conditional_args(args: &[Value]) -> Result<(Matrix, Criterion, Matrix), ErrorKind> {
    let criteria_range = matrix_arg(args, 0)?;
    let criterion = Criterion::parse(&args[1])?;
    let values = match args.get(2) {
        Some(_) => {
            let values = matrix_arg(args, 2)?;
            if values.rows() != criteria_range.rows() || values.cols() != criteria_range.cols() {
                return Err(ErrorKind::InvalidReference);
            }
            values
        }
        None => criteria_range.clone(),
    };
    Ok((criteria_range, criterion, values))
}

/// Numbers from `values` at positions where the criterion matches.
fn matched_numbers(args: &[Value]) -> Result<Vec<f64>, ErrorKind> {
    let (criteria_range, criterion, values) = conditional_args(args)?;
    let mut out = Vec::new();
    for (cell, value) in criteria_range.values().iter().zip(values.values()) {
        if !criterion.matches(cell) {
            continue;
        }
        match value {
            Value::Number(n) => out.push(*n),
            Value::Error(e) => return Err(*e),
            _ => {}
        }
    }
    Ok(out)
}

pub fn sumif(args: &[Value], _: &CallContext) -> Value {
    matched_numbers(args)
        .map(|ns| Value::Number(ns.iter().sum()))
        .into()
}

pub fn averageif(args: &[Value], _: &CallContext) -> Value {
    matched_numbers(args)
        .and_then(|ns| {
            if ns.is_empty() {
                Err(ErrorKind::DivideByZero)
            } else {
                Ok(Value::Number(ns.iter().sum::<f64>() / ns.len() as f64))
            }
        })
        .into()
}

pub fn countif(args: &[Value], _: &CallContext) -> Value {
    let count = || -> Result<Value, ErrorKind> {
        let range = matrix_arg(args, 0)?;
        let criterion = Criterion::parse(&args[1])?;
        let n = range.values().iter().filter(|cell| criterion.matches(cell)).count();
        Ok(Value::Number(n as f64))
    };
    count().into()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_wildcard_regex() {
        let re = wildcard_regex("a*c?").unwrap();
        assert!(re.is_match("ABBCD"));
        assert!(!re.is_match("abbc"));
        assert!(wildcard_regex("plain").is_none());
        let escaped = wildcard_regex("what~?*").unwrap();
        assert!(escaped.is_match("what? now"));
        assert!(!escaped.is_match("whatX now"));
    }

    #[test]
    fn test_criterion_parsing() {
        let c = Criterion::parse(&t(">=10")).unwrap();
        assert!(c.matches(&n(10.0)));
        assert!(c.matches(&t("12")));
        assert!(!c.matches(&n(9.0)));
        assert!(!c.matches(&t("abc")));

        let c = Criterion::parse(&t("<>done")).unwrap();
        assert!(c.matches(&t("open")));
        assert!(!c.matches(&t("DONE")));
        assert!(c.matches(&Value::Blank));

        let c = Criterion::parse(&n(3.0)).unwrap();
        assert!(c.matches(&n(3.0)));
        assert!(!c.matches(&Value::Blank));
    }

    #[test]
    fn test_sumif() {
        let range = column(vec![n(1.0), n(5.0), n(10.0), t("x")]);
        assert_eq!(call("SUMIF", vec![range.clone(), t(">4")]), n(15.0));

        let labels = column(vec![t("a"), t("b"), t("a"), t("c")]);
        let amounts = column(vec![n(1.0), n(2.0), n(3.0), n(4.0)]);
        assert_eq!(call("SUMIF", vec![labels.clone(), t("a"), amounts]), n(4.0));

        let short = column(vec![n(1.0)]);
        assert_eq!(
            call("SUMIF", vec![labels, t("a"), short]),
            Value::Error(ErrorKind::InvalidReference)
        );
    }

    #[test]
    fn test_countif() {
        let range = column(vec![t("apple"), t("apricot"), t("banana"), Value::Blank, n(3.0)]);
        assert_eq!(call("COUNTIF", vec![range.clone(), t("ap*")]), n(2.0));
        assert_eq!(call("COUNTIF", vec![range.clone(), t("?anana")]), n(1.0));
        assert_eq!(call("COUNTIF", vec![range.clone(), n(3.0)]), n(1.0));
        assert_eq!(call("COUNTIF", vec![range.clone(), t("")]), n(1.0));
        assert_eq!(call("COUNTIF", vec![range, t("<>")]), n(4.0));
    }

    #[test]
    fn test_averageif() {
        let range = column(vec![n(2.0), n(4.0), n(9.0)]);
        assert_eq!(call("AVERAGEIF", vec![range.clone(), t("<5")]), n(3.0));
        assert_eq!(
            call("AVERAGEIF", vec![range, t(">100")]),
            Value::Error(ErrorKind::DivideByZero)
        );
    }
}
