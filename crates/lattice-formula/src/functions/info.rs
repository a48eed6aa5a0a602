//! Type inspection functions
//!
//! The IS* family never propagates argument errors; an error argument is
//! simply something to report on.

use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;
use lattice_core::CellError;

/// ISBLANK
pub fn fn_isblank(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(matches!(
        args.get(0),
        Some(FormulaValue::Empty)
    )))
}

/// ISERROR is true for every error value
pub fn fn_iserror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(matches!(
        args.get(0),
        Some(FormulaValue::Error(_))
    )))
}

/// ISERR is true for every error except `#N/A`
pub fn fn_iserr(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let result = match args.get(0) {
        Some(FormulaValue::Error(CellError::Na)) => false,
        Some(FormulaValue::Error(_)) => true,
        _ => false,
    };
    Ok(FormulaValue::Boolean(result))
}

/// ISNA
pub fn fn_isna(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(matches!(
        args.get(0),
        Some(FormulaValue::Error(CellError::Na))
    )))
}

/// ISNUMBER; numeric-looking text is not a number
pub fn fn_isnumber(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(matches!(
        args.get(0),
        Some(FormulaValue::Number(_))
    )))
}

/// ISTEXT
pub fn fn_istext(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(matches!(
        args.get(0),
        Some(FormulaValue::String(_))
    )))
}

/// ISLOGICAL
pub fn fn_islogical(
    args: &[FormulaValue],
    _ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(matches!(
        args.get(0),
        Some(FormulaValue::Boolean(_))
    )))
}

/// NA() constructs `#N/A`
pub fn fn_na(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Error(CellError::Na))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvaluationContext;
    use crate::functions::FunctionRegistry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_family_inspects_without_propagating() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);

        let div0 = [FormulaValue::Error(CellError::Div0)];
        let na = [FormulaValue::Error(CellError::Na)];
        assert_eq!(fn_iserror(&div0, &ctx).unwrap(), FormulaValue::Boolean(true));
        assert_eq!(fn_iserror(&na, &ctx).unwrap(), FormulaValue::Boolean(true));
        assert_eq!(fn_iserr(&div0, &ctx).unwrap(), FormulaValue::Boolean(true));
        assert_eq!(fn_iserr(&na, &ctx).unwrap(), FormulaValue::Boolean(false));
        assert_eq!(fn_isna(&na, &ctx).unwrap(), FormulaValue::Boolean(true));
        assert_eq!(fn_isna(&div0, &ctx).unwrap(), FormulaValue::Boolean(false));
    }

    #[test]
    fn test_type_predicates() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);

        let number = [FormulaValue::Number(1.0)];
        let text = [FormulaValue::String("1".into())];
        let boolean = [FormulaValue::Boolean(true)];
        let blank = [FormulaValue::Empty];

        assert_eq!(fn_isnumber(&number, &ctx).unwrap(), FormulaValue::Boolean(true));
        assert_eq!(fn_isnumber(&text, &ctx).unwrap(), FormulaValue::Boolean(false));
        assert_eq!(fn_istext(&text, &ctx).unwrap(), FormulaValue::Boolean(true));
        assert_eq!(fn_istext(&number, &ctx).unwrap(), FormulaValue::Boolean(false));
        assert_eq!(fn_islogical(&boolean, &ctx).unwrap(), FormulaValue::Boolean(true));
        assert_eq!(fn_isblank(&blank, &ctx).unwrap(), FormulaValue::Boolean(true));
        assert_eq!(fn_isblank(&number, &ctx).unwrap(), FormulaValue::Boolean(false));
    }

    #[test]
    fn test_na_constructs_error() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        assert_eq!(
            fn_na(&[], &ctx).unwrap(),
            FormulaValue::Error(CellError::Na)
        );
    }
}
