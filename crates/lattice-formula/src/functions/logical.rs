//! Logical functions

use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;
use lattice_core::CellError;

/// IF(condition, then, [else]); the else branch defaults to FALSE
pub fn fn_if(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let condition = match args.get(0) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => match v.as_bool() {
            Some(b) => b,
            None => return Ok(FormulaValue::Error(CellError::Value)),
        },
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };

    if condition {
        Ok(args.get(1).cloned().unwrap_or(FormulaValue::Boolean(true)))
    } else {
        Ok(args.get(2).cloned().unwrap_or(FormulaValue::Boolean(false)))
    }
}

/// Fold the boolean view of each argument, descending into arrays
///
/// Text inside ranges is skipped; a direct text argument that is not
/// TRUE/FALSE makes the whole call `#VALUE!`, as does finding no logical
/// values at all.
fn fold_bools(
    args: &[FormulaValue],
    mut f: impl FnMut(bool),
) -> Result<bool, CellError> {
    let mut any = false;
    for arg in args {
        match arg {
            FormulaValue::Error(e) => return Err(*e),
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        match cell {
                            FormulaValue::Error(e) => return Err(*e),
                            FormulaValue::Number(n) => {
                                f(*n != 0.0);
                                any = true;
                            }
                            FormulaValue::Boolean(b) => {
                                f(*b);
                                any = true;
                            }
                            _ => {}
                        }
                    }
                }
            }
            FormulaValue::Empty => {}
            v => match v.as_bool() {
                Some(b) => {
                    f(b);
                    any = true;
                }
                None => return Err(CellError::Value),
            },
        }
    }
    if any {
        Ok(true)
    } else {
        Err(CellError::Value)
    }
}

/// AND
pub fn fn_and(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut all = true;
    match fold_bools(args, |b| all &= b) {
        Ok(_) => Ok(FormulaValue::Boolean(all)),
        Err(e) => Ok(FormulaValue::Error(e)),
    }
}

/// OR
pub fn fn_or(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut some = false;
    match fold_bools(args, |b| some |= b) {
        Ok(_) => Ok(FormulaValue::Boolean(some)),
        Err(e) => Ok(FormulaValue::Error(e)),
    }
}

/// XOR is true for an odd number of true operands
pub fn fn_xor(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut parity = false;
    match fold_bools(args, |b| parity ^= b) {
        Ok(_) => Ok(FormulaValue::Boolean(parity)),
        Err(e) => Ok(FormulaValue::Error(e)),
    }
}

/// NOT
pub fn fn_not(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match args.get(0) {
        Some(FormulaValue::Error(e)) => Ok(FormulaValue::Error(*e)),
        Some(v) => match v.as_bool() {
            Some(b) => Ok(FormulaValue::Boolean(!b)),
            None => Ok(FormulaValue::Error(CellError::Value)),
        },
        None => Ok(FormulaValue::Error(CellError::Value)),
    }
}

/// IFERROR(value, fallback)
pub fn fn_iferror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match args.get(0) {
        Some(FormulaValue::Error(_)) => {
            Ok(args.get(1).cloned().unwrap_or(FormulaValue::Empty))
        }
        Some(v) => Ok(v.clone()),
        None => Ok(FormulaValue::Error(CellError::Value)),
    }
}

/// IFNA(value, fallback); only `#N/A` triggers the fallback
pub fn fn_ifna(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match args.get(0) {
        Some(FormulaValue::Error(CellError::Na)) => {
            Ok(args.get(1).cloned().unwrap_or(FormulaValue::Empty))
        }
        Some(v) => Ok(v.clone()),
        None => Ok(FormulaValue::Error(CellError::Value)),
    }
}

/// TRUE()
pub fn fn_true(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(true))
}

/// FALSE()
pub fn fn_false(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvaluationContext;
    use crate::functions::FunctionRegistry;
    use pretty_assertions::assert_eq;

    fn num(n: f64) -> FormulaValue {
        FormulaValue::Number(n)
    }

    #[test]
    fn test_if_branches_and_default_else() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        let args = [FormulaValue::Boolean(true), num(1.0), num(2.0)];
        assert_eq!(fn_if(&args, &ctx).unwrap(), num(1.0));

        let args = [num(0.0), num(1.0), num(2.0)];
        assert_eq!(fn_if(&args, &ctx).unwrap(), num(2.0));

        // Missing else yields FALSE
        let args = [FormulaValue::Boolean(false), num(1.0)];
        assert_eq!(fn_if(&args, &ctx).unwrap(), FormulaValue::Boolean(false));
    }

    #[test]
    fn test_and_or_over_ranges() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        let range = FormulaValue::Array(vec![vec![
            FormulaValue::Boolean(true),
            num(0.0),
            FormulaValue::String("skip me".into()),
        ]]);
        assert_eq!(
            fn_and(&[range.clone()], &ctx).unwrap(),
            FormulaValue::Boolean(false)
        );
        assert_eq!(fn_or(&[range], &ctx).unwrap(), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_and_with_no_logical_values_is_value_error() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        let range = FormulaValue::Array(vec![vec![FormulaValue::String("x".into())]]);
        assert_eq!(
            fn_and(&[range], &ctx).unwrap(),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_xor_parity() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        let t = FormulaValue::Boolean(true);
        let f = FormulaValue::Boolean(false);
        assert_eq!(
            fn_xor(&[t.clone(), t.clone(), f.clone()], &ctx).unwrap(),
            FormulaValue::Boolean(false)
        );
        assert_eq!(
            fn_xor(&[t.clone(), f.clone(), f], &ctx).unwrap(),
            FormulaValue::Boolean(true)
        );
    }

    #[test]
    fn test_iferror_and_ifna() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        let args = [FormulaValue::Error(CellError::Div0), num(0.0)];
        assert_eq!(fn_iferror(&args, &ctx).unwrap(), num(0.0));
        assert_eq!(
            fn_ifna(&args, &ctx).unwrap(),
            FormulaValue::Error(CellError::Div0)
        );

        let args = [FormulaValue::Error(CellError::Na), num(0.0)];
        assert_eq!(fn_ifna(&args, &ctx).unwrap(), num(0.0));

        let args = [num(7.0), num(0.0)];
        assert_eq!(fn_iferror(&args, &ctx).unwrap(), num(7.0));
    }
}
