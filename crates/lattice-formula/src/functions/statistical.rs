//! Statistical functions

use super::criteria::CriteriaMatcher;
use super::math::as_matrix;
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;
use lattice_core::CellError;

/// COUNTA counts every non-empty value, errors included
pub fn fn_counta(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut count = 0u64;
    for arg in args {
        match arg {
            FormulaValue::Empty => {}
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        if !matches!(cell, FormulaValue::Empty) {
                            count += 1;
                        }
                    }
                }
            }
            _ => count += 1,
        }
    }
    Ok(FormulaValue::Number(count as f64))
}

/// COUNTIF(range, criteria)
pub fn fn_countif(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let range = match args.get(0) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => as_matrix(v),
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let Some(criteria) = args.get(1) else {
        return Ok(FormulaValue::Error(CellError::Value));
    };
    let matcher = CriteriaMatcher::new(criteria);

    let mut count = 0u64;
    for row in &range {
        for cell in row {
            if matcher.matches(cell) {
                count += 1;
            }
        }
    }
    Ok(FormulaValue::Number(count as f64))
}
