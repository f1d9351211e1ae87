//! Text functions. Positions and lengths count characters, not bytes.

use super::{CallContext, flatten, number_arg, number_arg_or, text_arg};
use crate::engine::{ErrorKind, Value, to_text};

/// A non-negative character count.
fn count_arg(args: &[Value], index: usize, default: f64) -> Result<usize, ErrorKind> {
    let n = number_arg_or(args, index, default)?.trunc();
    if n < 0.0 {
        return Err(ErrorKind::TypeMismatch);
    }
    Ok(n as usize)
}

fn text_result(result: Result<String, ErrorKind>) -> Value {
    match result {
        Ok(s) => Value::Text(s),
        Err(e) => Value::Error(e),
    }
}

pub fn concat(args: &[Value], _: &CallContext) -> Value {
    text_result(flatten(args).map(|(value, _)| to_text(value)).collect())
}

pub fn left(args: &[Value], _: &CallContext) -> Value {
    text_result((|| {
        let text = text_arg(args, 0)?;
        let n = count_arg(args, 1, 1.0)?;
        Ok(text.chars().take(n).collect())
    })())
}

pub fn right(args: &[Value], _: &CallContext) -> Value {
    text_result((|| {
        let text = text_arg(args, 0)?;
        let n = count_arg(args, 1, 1.0)?;
        let skip = text.chars().count().saturating_sub(n);
        Ok(text.chars().skip(skip).collect())
    })())
}

pub fn mid(args: &[Value], _: &CallContext) -> Value {
    text_result((|| {
        let text = text_arg(args, 0)?;
        let start = number_arg(args, 1)?.trunc();
        if start < 1.0 {
            return Err(ErrorKind::TypeMismatch);
        }
        let n = count_arg(args, 2, 0.0)?;
        Ok(text.chars().skip(start as usize - 1).take(n).collect())
    })())
}

pub fn len(args: &[Value], _: &CallContext) -> Value {
    match text_arg(args, 0) {
        Ok(text) => Value::Number(text.chars().count() as f64),
        Err(e) => Value::Error(e),
    }
}

/// Strip leading/trailing spaces and collapse interior runs to one space.
pub fn trim(args: &[Value], _: &CallContext) -> Value {
    text_result(text_arg(args, 0).map(|text| {
        text.split(' ')
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }))
}

pub fn upper(args: &[Value], _: &CallContext) -> Value {
    text_result(text_arg(args, 0).map(|text| text.to_uppercase()))
}

pub fn lower(args: &[Value], _: &CallContext) -> Value {
    text_result(text_arg(args, 0).map(|text| text.to_lowercase()))
}

/// Upper-case every letter that follows a non-letter, lower-case the rest.
pub fn proper(args: &[Value], _: &CallContext) -> Value {
    text_result(text_arg(args, 0).map(|text| {
        let mut out = String::with_capacity(text.len());
        let mut after_letter = false;
        for c in text.chars() {
            if c.is_alphabetic() {
                if after_letter {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                after_letter = true;
            } else {
                out.push(c);
                after_letter = false;
            }
        }
        out
    }))
}

/// Replace every occurrence of `old`, or only the `instance`-th one.
pub fn substitute(args: &[Value], _: &CallContext) -> Value {
    text_result((|| {
        let text = text_arg(args, 0)?;
        let old = text_arg(args, 1)?;
        let new = text_arg(args, 2)?;
        if old.is_empty() {
            return Ok(text);
        }
        if args.len() < 4 {
            return Ok(text.replace(&old, &new));
        }
        let instance = number_arg(args, 3)?.trunc();
        if instance < 1.0 {
            return Err(ErrorKind::TypeMismatch);
        }
        Ok(match text.match_indices(old.as_str()).nth(instance as usize - 1) {
            Some((at, _)) => format!("{}{}{}", &text[..at], new, &text[at + old.len()..]),
            None => text,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::engine::{ErrorKind, Value};

    #[test]
    fn test_concat_flattens_ranges() {
        let range = column(vec![t("a"), Value::Blank, n(1.5)]);
        assert_eq!(call("CONCAT", vec![range, t("-"), Value::Bool(true)]), t("a1.5-TRUE"));
        assert_eq!(call("CONCATENATE", vec![t("x"), n(2.0)]), t("x2"));
    }

    #[test]
    fn test_left_right_mid() {
        assert_eq!(call("LEFT", vec![t("héllo"), n(2.0)]), t("hé"));
        assert_eq!(call("LEFT", vec![t("hello")]), t("h"));
        assert_eq!(call("RIGHT", vec![t("hello"), n(3.0)]), t("llo"));
        assert_eq!(call("RIGHT", vec![t("hi"), n(10.0)]), t("hi"));
        assert_eq!(call("MID", vec![t("spreadsheet"), n(7.0), n(5.0)]), t("sheet"));
        assert_eq!(call("MID", vec![t("abc"), n(5.0), n(2.0)]), t(""));
        assert_eq!(
            call("MID", vec![t("abc"), n(0.0), n(2.0)]),
            Value::Error(ErrorKind::TypeMismatch)
        );
        assert_eq!(
            call("LEFT", vec![t("abc"), n(-1.0)]),
            Value::Error(ErrorKind::TypeMismatch)
        );
    }

    #[test]
    fn test_len_uses_number_text() {
        assert_eq!(call("LEN", vec![t("héllo")]), n(5.0));
        assert_eq!(call("LEN", vec![n(12.5)]), n(4.0));
    }

    #[test]
    fn test_trim_and_case() {
        assert_eq!(call("TRIM", vec![t("  a   b  c ")]), t("a b c"));
        assert_eq!(call("UPPER", vec![t("abc")]), t("ABC"));
        assert_eq!(call("LOWER", vec![t("AbC")]), t("abc"));
        assert_eq!(call("PROPER", vec![t("hello wORLD o'neil")]), t("Hello World O'Neil"));
    }

    #[test]
    fn test_substitute() {
        assert_eq!(call("SUBSTITUTE", vec![t("a-b-c"), t("-"), t("+")]), t("a+b+c"));
        assert_eq!(
            call("SUBSTITUTE", vec![t("a-b-c"), t("-"), t("+"), n(2.0)]),
            t("a-b+c")
        );
        assert_eq!(
            call("SUBSTITUTE", vec![t("a-b-c"), t("-"), t("+"), n(5.0)]),
            t("a-b-c")
        );
        assert_eq!(call("SUBSTITUTE", vec![t("abc"), t(""), t("x")]), t("abc"));
    }
}
