//! Date functions over serial numbers.
//!
//! A date is a plain number of days since 1899-12-30 (so 1 is 1899-12-31 and
//! 45366 is 2024-03-15); a fractional part is the time of day. Text in ISO
//! `YYYY-MM-DD` form is accepted wherever a date argument is expected.

use chrono::{Datelike, NaiveDate, TimeDelta, Timelike};

use super::{CallContext, number_arg, number_result, text_arg};
use crate::engine::{ErrorKind, Value};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

pub fn date_to_serial(date: NaiveDate) -> f64 {
    (date - epoch()).num_days() as f64
}

/// The calendar date of a serial; `None` for negative or out-of-range input.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    epoch().checked_add_signed(TimeDelta::days(serial.floor() as i64))
}

fn date_arg(args: &[Value], index: usize) -> Result<NaiveDate, ErrorKind> {
    if let Some(Value::Text(s)) = args.get(index) {
        if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            return Ok(date);
        }
    }
    serial_to_date(number_arg(args, index)?).ok_or(ErrorKind::TypeMismatch)
}

pub fn today(_: &[Value], ctx: &CallContext) -> Value {
    Value::Number(date_to_serial(ctx.now.date()))
}

pub fn now(_: &[Value], ctx: &CallContext) -> Value {
    let seconds = ctx.now.time().num_seconds_from_midnight() as f64;
    Value::Number(date_to_serial(ctx.now.date()) + seconds / 86_400.0)
}

/// `DATE(year, month, day)`. Month and day overflow roll into the next unit
/// (`DATE(2024, 14, 1)` is 2025-02-01); years below 1900 are offset by 1900.
pub fn date(args: &[Value], _: &CallContext) -> Value {
    number_result((|| {
        let mut year = number_arg(args, 0)?.trunc() as i64;
        let month = bounded_part(number_arg(args, 1)?)?;
        let day = bounded_part(number_arg(args, 2)?)?;
        if (0..1900).contains(&year) {
            year += 1900;
        }
        if !(1900..=9999).contains(&year) {
            return Err(ErrorKind::TypeMismatch);
        }
        let months = year
            .checked_mul(12)
            .and_then(|m| m.checked_add(month - 1))
            .ok_or(ErrorKind::TypeMismatch)?;
        let first = NaiveDate::from_ymd_opt(
            months.div_euclid(12) as i32,
            (months.rem_euclid(12) + 1) as u32,
            1,
        )
        .ok_or(ErrorKind::TypeMismatch)?;
        let offset = TimeDelta::try_days(day - 1).ok_or(ErrorKind::TypeMismatch)?;
        let date = first
            .checked_add_signed(offset)
            .ok_or(ErrorKind::TypeMismatch)?;
        let serial = date_to_serial(date);
        if serial < 0.0 {
            return Err(ErrorKind::TypeMismatch);
        }
        Ok(serial)
    })())
}

/// Month and day arguments beyond this many units are rejected outright.
const MAX_DATE_PART: f64 = 1e7;

fn bounded_part(n: f64) -> Result<i64, ErrorKind> {
    let n = n.trunc();
    if n.abs() > MAX_DATE_PART {
        return Err(ErrorKind::TypeMismatch);
    }
    Ok(n as i64)
}

pub fn year(args: &[Value], _: &CallContext) -> Value {
    number_result(date_arg(args, 0).map(|d| d.year() as f64))
}

pub fn month(args: &[Value], _: &CallContext) -> Value {
    number_result(date_arg(args, 0).map(|d| d.month() as f64))
}

pub fn day(args: &[Value], _: &CallContext) -> Value {
    number_result(date_arg(args, 0).map(|d| d.day() as f64))
}

/// Whole months from `start` to `end`, not counting a partial last month.
fn whole_months(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut months = (end.year() - start.year()) as i64 * 12 + end.month() as i64 - start.month() as i64;
    if end.day() < start.day() {
        months -= 1;
    }
    months
}

pub fn datedif(args: &[Value], _: &CallContext) -> Value {
    number_result((|| {
        let start = date_arg(args, 0)?;
        let end = date_arg(args, 1)?;
        let unit = text_arg(args, 2)?;
        if start > end {
            return Err(ErrorKind::TypeMismatch);
        }
        match unit.trim().to_ascii_uppercase().as_str() {
            "D" => Ok((end - start).num_days() as f64),
            "M" => Ok(whole_months(start, end) as f64),
            "Y" => Ok((whole_months(start, end) / 12) as f64),
            _ => Err(ErrorKind::TypeMismatch),
        }
    })())
}
