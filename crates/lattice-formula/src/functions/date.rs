//! Date functions over 1900-system serial numbers
//!
//! Serial 1 is 1900-01-01. Serial 60 is the phantom 1900-02-29 kept for
//! Lotus 1-2-3 compatibility, so serials below 60 map one day later than
//! the plain day count from the epoch.

use super::number_arg;
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;
use chrono::{Datelike, Duration, Local, NaiveDate, Timelike};
use lattice_core::CellError;

/// Anchor for serial arithmetic; serial 61 and up are plain day offsets
/// from this date
fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("valid epoch")
}

fn leap_bug_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 3, 1).expect("valid cutoff")
}

/// Serial number of a calendar date
pub(crate) fn date_to_serial(date: NaiveDate) -> i64 {
    let days = (date - epoch()).num_days();
    if date < leap_bug_cutoff() {
        days - 1
    } else {
        days
    }
}

/// Calendar (year, month, day) of a serial number
///
/// Serial 60 reports the phantom 1900-02-29 directly since no real date
/// exists for it.
pub(crate) fn serial_to_ymd(serial: i64) -> (i32, u32, u32) {
    if serial == 60 {
        return (1900, 2, 29);
    }
    let date = if serial < 60 {
        epoch() + Duration::days(serial + 1)
    } else {
        epoch() + Duration::days(serial)
    };
    (date.year(), date.month(), date.day())
}

/// DATE(year, month, day)
///
/// Years below 1900 are offsets from 1900 (`DATE(99, ...)` is 1999).
/// Out-of-range months and days roll over, so `DATE(2020, 13, 1)` is
/// January 2021 and `DATE(2020, 1, 0)` is the last day of 2019.
pub fn fn_date(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let year = match number_arg(args, 0) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };
    let month = match number_arg(args, 1) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };
    let day = match number_arg(args, 2) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };

    let year = if (0..1900).contains(&year) {
        year + 1900
    } else {
        year
    };
    if !(1900..=9999).contains(&year) {
        return Ok(FormulaValue::Error(CellError::Num));
    }

    // Normalize month overflow, then let day offsets roll through chrono
    let months = year * 12 + (month - 1);
    let norm_year = months.div_euclid(12);
    let norm_month = months.rem_euclid(12) + 1;
    let Some(first) = NaiveDate::from_ymd_opt(norm_year as i32, norm_month as u32, 1) else {
        return Ok(FormulaValue::Error(CellError::Num));
    };
    let date = first + Duration::days(day - 1);

    let serial = date_to_serial(date);
    if serial < 0 {
        return Ok(FormulaValue::Error(CellError::Num));
    }
    Ok(FormulaValue::Number(serial as f64))
}

fn serial_component(
    args: &[FormulaValue],
    component: impl Fn((i32, u32, u32)) -> f64,
) -> FormulaResult<FormulaValue> {
    let serial = match number_arg(args, 0) {
        Ok(n) => n.floor() as i64,
        Err(v) => return Ok(v),
    };
    if serial < 0 {
        return Ok(FormulaValue::Error(CellError::Num));
    }
    Ok(FormulaValue::Number(component(serial_to_ymd(serial))))
}

/// YEAR
pub fn fn_year(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    serial_component(args, |(y, _, _)| y as f64)
}

/// MONTH
pub fn fn_month(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    serial_component(args, |(_, m, _)| m as f64)
}

/// DAY
pub fn fn_day(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    serial_component(args, |(_, _, d)| d as f64)
}

/// NOW() as a serial with a fractional time of day
pub fn fn_now(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let now = Local::now().naive_local();
    let serial = date_to_serial(now.date()) as f64;
    let seconds = now.time().num_seconds_from_midnight() as f64;
    Ok(FormulaValue::Number(serial + seconds / 86_400.0))
}

/// TODAY() as a whole-day serial
pub fn fn_today(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let today = Local::now().naive_local().date();
    Ok(FormulaValue::Number(date_to_serial(today) as f64))
}
