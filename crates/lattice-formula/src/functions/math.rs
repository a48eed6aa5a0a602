//! Math and aggregation functions

use super::criteria::CriteriaMatcher;
use super::{number_arg, number_arg_or};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;
use lattice_core::CellError;

/// Fold every numeric value in the arguments, descending into arrays
///
/// Errors stop the fold and surface as the result; text and booleans
/// inside ranges are skipped, matching Excel aggregation rules.
fn fold_numbers(
    args: &[FormulaValue],
    mut f: impl FnMut(f64),
) -> Option<CellError> {
    for arg in args {
        match arg {
            FormulaValue::Number(n) => f(*n),
            FormulaValue::Error(e) => return Some(*e),
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        match cell {
                            FormulaValue::Number(n) => f(*n),
                            FormulaValue::Error(e) => return Some(*e),
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// SUM
pub fn fn_sum(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut sum = 0.0;
    if let Some(e) = fold_numbers(args, |n| sum += n) {
        return Ok(FormulaValue::Error(e));
    }
    Ok(FormulaValue::Number(sum))
}

/// AVERAGE; no numeric values at all is `#DIV/0!`
pub fn fn_average(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut sum = 0.0;
    let mut count = 0u64;
    if let Some(e) = fold_numbers(args, |n| {
        sum += n;
        count += 1;
    }) {
        return Ok(FormulaValue::Error(e));
    }
    if count == 0 {
        Ok(FormulaValue::Error(CellError::Div0))
    } else {
        Ok(FormulaValue::Number(sum / count as f64))
    }
}

/// MIN; no numeric values yields 0
pub fn fn_min(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut min: Option<f64> = None;
    if let Some(e) = fold_numbers(args, |n| {
        min = Some(min.map_or(n, |m| m.min(n)));
    }) {
        return Ok(FormulaValue::Error(e));
    }
    Ok(FormulaValue::Number(min.unwrap_or(0.0)))
}

/// MAX; no numeric values yields 0
pub fn fn_max(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut max: Option<f64> = None;
    if let Some(e) = fold_numbers(args, |n| {
        max = Some(max.map_or(n, |m| m.max(n)));
    }) {
        return Ok(FormulaValue::Error(e));
    }
    Ok(FormulaValue::Number(max.unwrap_or(0.0)))
}

/// COUNT counts numeric values only and never propagates errors
pub fn fn_count(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut count = 0u64;
    for arg in args {
        match arg {
            FormulaValue::Number(_) => count += 1,
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        if matches!(cell, FormulaValue::Number(_)) {
                            count += 1;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(FormulaValue::Number(count as f64))
}

/// PRODUCT over numeric values; no numeric values yields 0
pub fn fn_product(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut product = 1.0;
    let mut any = false;
    if let Some(e) = fold_numbers(args, |n| {
        product *= n;
        any = true;
    }) {
        return Ok(FormulaValue::Error(e));
    }
    Ok(FormulaValue::Number(if any { product } else { 0.0 }))
}

/// ABS
pub fn fn_abs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let n = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    Ok(FormulaValue::Number(n.abs()))
}

/// INT rounds toward negative infinity
pub fn fn_int(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let n = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    Ok(FormulaValue::Number(n.floor()))
}

/// MOD; result takes the divisor's sign
pub fn fn_mod(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let number = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let divisor = match number_arg(args, 1) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    if divisor == 0.0 {
        return Ok(FormulaValue::Error(CellError::Div0));
    }
    Ok(FormulaValue::Number(
        number - divisor * (number / divisor).floor(),
    ))
}

/// ROUND, half away from zero
pub fn fn_round(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let number = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let digits = match number_arg_or(args, 1, 0.0) {
        Ok(n) => n as i32,
        Err(v) => return Ok(v),
    };
    let multiplier = 10_f64.powi(digits);
    let result = if number >= 0.0 {
        (number * multiplier + 0.5).floor() / multiplier
    } else {
        (number * multiplier - 0.5).ceil() / multiplier
    };
    Ok(FormulaValue::Number(result))
}

/// TRUNC rounds toward zero
pub fn fn_trunc(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let number = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let digits = match number_arg_or(args, 1, 0.0) {
        Ok(n) => n as i32,
        Err(v) => return Ok(v),
    };
    let multiplier = 10_f64.powi(digits);
    Ok(FormulaValue::Number((number * multiplier).trunc() / multiplier))
}

/// SIGN
pub fn fn_sign(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let n = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let sign = if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        0.0
    };
    Ok(FormulaValue::Number(sign))
}

/// SQRT; negative input is `#NUM!`
pub fn fn_sqrt(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let n = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    if n < 0.0 {
        Ok(FormulaValue::Error(CellError::Num))
    } else {
        Ok(FormulaValue::Number(n.sqrt()))
    }
}

/// POWER; non-finite results are `#NUM!`
pub fn fn_power(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let base = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let exponent = match number_arg(args, 1) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let result = base.powf(exponent);
    if result.is_nan() || result.is_infinite() {
        Ok(FormulaValue::Error(CellError::Num))
    } else {
        Ok(FormulaValue::Number(result))
    }
}

/// EXP
pub fn fn_exp(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let n = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let result = n.exp();
    if result.is_infinite() {
        Ok(FormulaValue::Error(CellError::Num))
    } else {
        Ok(FormulaValue::Number(result))
    }
}

/// LN; non-positive input is `#NUM!`
pub fn fn_ln(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let n = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    if n <= 0.0 {
        Ok(FormulaValue::Error(CellError::Num))
    } else {
        Ok(FormulaValue::Number(n.ln()))
    }
}

/// LOG with optional base (default 10)
pub fn fn_log(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let number = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let base = match number_arg_or(args, 1, 10.0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    if number <= 0.0 || base <= 0.0 || base == 1.0 {
        return Ok(FormulaValue::Error(CellError::Num));
    }
    Ok(FormulaValue::Number(number.ln() / base.ln()))
}

/// LOG10
pub fn fn_log10(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let n = match number_arg(args, 0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    if n <= 0.0 {
        Ok(FormulaValue::Error(CellError::Num))
    } else {
        Ok(FormulaValue::Number(n.log10()))
    }
}

/// PI
pub fn fn_pi(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(std::f64::consts::PI))
}

/// RAND, uniform in [0, 1)
pub fn fn_rand(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    Ok(FormulaValue::Number(rng.gen::<f64>()))
}

/// RANDBETWEEN, integer in [bottom, top]
pub fn fn_randbetween(
    args: &[FormulaValue],
    _ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    use rand::Rng;
    let bottom = match number_arg(args, 0) {
        Ok(n) => n.ceil() as i64,
        Err(v) => return Ok(v),
    };
    let top = match number_arg(args, 1) {
        Ok(n) => n.floor() as i64,
        Err(v) => return Ok(v),
    };
    if bottom > top {
        return Ok(FormulaValue::Error(CellError::Num));
    }
    let mut rng = rand::thread_rng();
    Ok(FormulaValue::Number(rng.gen_range(bottom..=top) as f64))
}

/// SUMIF(range, criteria, [sum_range])
///
/// `sum_range` defaults to `range`; when given, it is indexed by the same
/// (row, col) positions as the criteria range.
pub fn fn_sumif(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let range = match args.get(0) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => as_matrix(v),
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let Some(criteria) = args.get(1) else {
        return Ok(FormulaValue::Error(CellError::Value));
    };
    let matcher = CriteriaMatcher::new(criteria);
    let sum_range = match args.get(2) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => Some(as_matrix(v)),
        None => None,
    };
    let sum_range = sum_range.as_ref().unwrap_or(&range);

    let mut sum = 0.0;
    for (row_idx, row) in range.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            if !matcher.matches(cell) {
                continue;
            }
            let target = sum_range.get(row_idx).and_then(|r| r.get(col_idx));
            match target {
                Some(FormulaValue::Number(n)) => sum += n,
                Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
                _ => {}
            }
        }
    }
    Ok(FormulaValue::Number(sum))
}

/// SUMPRODUCT; all arrays must share one shape
pub fn fn_sumproduct(
    args: &[FormulaValue],
    _ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let mut products: Option<Vec<f64>> = None;
    let mut shape = (0usize, 0usize);

    for arg in args {
        if let FormulaValue::Error(e) = arg {
            return Ok(FormulaValue::Error(*e));
        }
        let matrix = as_matrix(arg);
        let dims = (matrix.len(), matrix.first().map_or(0, |r| r.len()));
        let values: Vec<f64> = matrix
            .iter()
            .flat_map(|row| {
                row.iter().map(|v| match v {
                    FormulaValue::Number(n) => *n,
                    FormulaValue::Boolean(true) => 1.0,
                    // Text, blanks and FALSE all contribute 0
                    _ => 0.0,
                })
            })
            .collect();

        match &mut products {
            None => {
                products = Some(values);
                shape = dims;
            }
            Some(acc) => {
                if dims != shape {
                    return Ok(FormulaValue::Error(CellError::Value));
                }
                for (p, v) in acc.iter_mut().zip(values) {
                    *p *= v;
                }
            }
        }
    }

    let sum = products.map_or(0.0, |p| p.iter().sum());
    Ok(FormulaValue::Number(sum))
}

/// View any value as a matrix; scalars become 1x1
pub(crate) fn as_matrix(value: &FormulaValue) -> Vec<Vec<FormulaValue>> {
    match value {
        FormulaValue::Array(rows) => rows.clone(),
        v => vec![vec![v.clone()]],
    }
}
