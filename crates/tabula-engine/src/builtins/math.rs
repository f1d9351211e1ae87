//! Numeric aggregates and scalar math.

use rand::Rng;

use super::{CallContext, collect_numbers, flatten, number_arg, number_arg_or, number_result};
use crate::engine::{ErrorKind, Value, parse_numeric_text};

/// `base ^ exp`, shared with the `^` operator.
pub(crate) fn checked_pow(base: f64, exp: f64) -> Result<f64, ErrorKind> {
    if base == 0.0 && exp < 0.0 {
        return Err(ErrorKind::DivideByZero);
    }
    let result = base.powf(exp);
    if result.is_finite() {
        Ok(result)
    } else {
        Err(ErrorKind::TypeMismatch)
    }
}

pub fn sum(args: &[Value], _: &CallContext) -> Value {
    number_result(collect_numbers(args).map(|ns| ns.iter().sum()))
}

pub fn average(args: &[Value], _: &CallContext) -> Value {
    number_result(collect_numbers(args).and_then(|ns| {
        if ns.is_empty() {
            Err(ErrorKind::DivideByZero)
        } else {
            Ok(ns.iter().sum::<f64>() / ns.len() as f64)
        }
    }))
}

pub fn count(args: &[Value], _: &CallContext) -> Value {
    let n = flatten(args)
        .filter(|(value, from_range)| match value {
            Value::Number(_) => true,
            Value::Text(s) => parse_numeric_text(s).is_some(),
            Value::Bool(_) => !from_range,
            _ => false,
        })
        .count();
    Value::Number(n as f64)
}

pub fn counta(args: &[Value], _: &CallContext) -> Value {
    let n = flatten(args)
        .filter(|(value, _)| match value {
            Value::Blank => false,
            Value::Text(s) => !s.is_empty(),
            _ => true,
        })
        .count();
    Value::Number(n as f64)
}

pub fn max(args: &[Value], _: &CallContext) -> Value {
    number_result(
        collect_numbers(args).map(|ns| ns.into_iter().reduce(f64::max).unwrap_or(0.0)),
    )
}

pub fn min(args: &[Value], _: &CallContext) -> Value {
    number_result(
        collect_numbers(args).map(|ns| ns.into_iter().reduce(f64::min).unwrap_or(0.0)),
    )
}

pub fn product(args: &[Value], _: &CallContext) -> Value {
    number_result(collect_numbers(args).map(|ns| {
        if ns.is_empty() {
            0.0
        } else {
            ns.iter().product()
        }
    }))
}

/// Round half away from zero. Negative `digits` round left of the point.
pub fn round(args: &[Value], _: &CallContext) -> Value {
    number_result((|| {
        let x = number_arg(args, 0)?;
        let digits = number_arg_or(args, 1, 0.0)?.trunc().clamp(-15.0, 15.0) as i32;
        if digits < 0 {
            let factor = 10f64.powi(-digits);
            return Ok((x / factor).round() * factor);
        }
        let factor = 10f64.powi(digits);
        // Strip representation noise first so 2.675 rounds to 2.68.
        let scaled: f64 = format!("{:.14e}", x * factor).parse().unwrap_or(x * factor);
        Ok(scaled.round() / factor)
    })())
}

pub fn abs(args: &[Value], _: &CallContext) -> Value {
    number_result(number_arg(args, 0).map(f64::abs))
}

pub fn power(args: &[Value], _: &CallContext) -> Value {
    number_result(number_arg(args, 0).and_then(|b| checked_pow(b, number_arg(args, 1)?)))
}

pub fn sqrt(args: &[Value], _: &CallContext) -> Value {
    number_result(number_arg(args, 0).and_then(|x| {
        if x < 0.0 {
            Err(ErrorKind::TypeMismatch)
        } else {
            Ok(x.sqrt())
        }
    }))
}

/// Remainder carrying the sign of the divisor.
pub fn modulo(args: &[Value], _: &CallContext) -> Value {
    number_result((|| {
        let a = number_arg(args, 0)?;
        let b = number_arg(args, 1)?;
        if b == 0.0 {
            return Err(ErrorKind::DivideByZero);
        }
        Ok(a - b * (a / b).floor())
    })())
}

pub fn rand(_: &[Value], _: &CallContext) -> Value {
    Value::Number(rand::thread_rng().r#gen::<f64>())
}

pub fn randbetween(args: &[Value], _: &CallContext) -> Value {
    number_result((|| {
        let low = number_arg(args, 0)?.ceil();
        let high = number_arg(args, 1)?.floor();
        if low > high {
            return Err(ErrorKind::TypeMismatch);
        }
        Ok(rand::thread_rng().gen_range(low as i64..=high as i64) as f64)
    })())
}
