//! Text functions
//!
//! Positions and lengths are in characters, not bytes.

use super::{number_arg, number_arg_or, text_arg};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;
use lattice_core::CellError;

/// Longest string a text function may produce (Excel cell limit)
const MAX_TEXT_LEN: usize = 32_767;

/// CONCAT / CONCATENATE; arrays are flattened row-major
pub fn fn_concat(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut out = String::new();
    for arg in args {
        match arg {
            FormulaValue::Error(e) => return Ok(FormulaValue::Error(*e)),
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        if let FormulaValue::Error(e) = cell {
                            return Ok(FormulaValue::Error(*e));
                        }
                        out.push_str(&cell.as_string());
                    }
                }
            }
            v => out.push_str(&v.as_string()),
        }
        if out.chars().count() > MAX_TEXT_LEN {
            return Ok(FormulaValue::Error(CellError::Value));
        }
    }
    Ok(FormulaValue::String(out))
}

/// LEFT(text, [count=1])
pub fn fn_left(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let text = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    let count = match number_arg_or(args, 1, 1.0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    if count < 0.0 {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    let taken: String = text.chars().take(count as usize).collect();
    Ok(FormulaValue::String(taken))
}

/// RIGHT(text, [count=1])
pub fn fn_right(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let text = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    let count = match number_arg_or(args, 1, 1.0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    if count < 0.0 {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    let total = text.chars().count();
    let skip = total.saturating_sub(count as usize);
    let taken: String = text.chars().skip(skip).collect();
    Ok(FormulaValue::String(taken))
}

/// MID(text, start, count); start is 1-based
pub fn fn_mid(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let text = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    let start = match number_arg(args, 1) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let count = match number_arg(args, 2) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    if start < 1.0 || count < 0.0 {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    let taken: String = text
        .chars()
        .skip(start as usize - 1)
        .take(count as usize)
        .collect();
    Ok(FormulaValue::String(taken))
}

/// LEN
pub fn fn_len(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let text = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    Ok(FormulaValue::Number(text.chars().count() as f64))
}

/// LOWER
pub fn fn_lower(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let text = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    Ok(FormulaValue::String(text.to_lowercase()))
}

/// UPPER
pub fn fn_upper(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let text = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    Ok(FormulaValue::String(text.to_uppercase()))
}

/// TRIM strips leading/trailing spaces and collapses internal runs
pub fn fn_trim(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let text = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(FormulaValue::String(collapsed))
}

/// REPT(text, count)
pub fn fn_rept(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let text = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    let count = match number_arg(args, 1) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    if count < 0.0 {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    let count = count as usize;
    if text.chars().count().saturating_mul(count) > MAX_TEXT_LEN {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    Ok(FormulaValue::String(text.repeat(count)))
}

/// VALUE parses text as a number, `#VALUE!` when it cannot
pub fn fn_value(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match args.get(0) {
        Some(FormulaValue::Error(e)) => Ok(FormulaValue::Error(*e)),
        Some(v) => match v.as_number() {
            Some(n) => Ok(FormulaValue::Number(n)),
            None => Ok(FormulaValue::Error(CellError::Value)),
        },
        None => Ok(FormulaValue::Error(CellError::Value)),
    }
}

/// TEXTJOIN(delimiter, ignore_empty, value1, ...)
pub fn fn_textjoin(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let delimiter = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    let ignore_empty = match args.get(1) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => match v.as_bool() {
            Some(b) => b,
            None => return Ok(FormulaValue::Error(CellError::Value)),
        },
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };

    let mut pieces = Vec::new();
    for arg in &args[2..] {
        match arg {
            FormulaValue::Error(e) => return Ok(FormulaValue::Error(*e)),
            FormulaValue::Array(rows) => {
                for row in rows {
                    for cell in row {
                        if let FormulaValue::Error(e) = cell {
                            return Ok(FormulaValue::Error(*e));
                        }
                        pieces.push(cell.as_string());
                    }
                }
            }
            v => pieces.push(v.as_string()),
        }
    }
    if ignore_empty {
        pieces.retain(|p| !p.is_empty());
    }

    let joined = pieces.join(&delimiter);
    if joined.chars().count() > MAX_TEXT_LEN {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    Ok(FormulaValue::String(joined))
}

/// EXACT is a case-sensitive string comparison
pub fn fn_exact(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let left = match text_arg(args, 0) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    let right = match text_arg(args, 1) {
        Ok(s) => s,
        Err(v) => return Ok(v),
    };
    Ok(FormulaValue::Boolean(left == right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvaluationContext;
    use crate::functions::FunctionRegistry;
    use pretty_assertions::assert_eq;

    fn s(text: &str) -> FormulaValue {
        FormulaValue::String(text.to_string())
    }

    fn num(n: f64) -> FormulaValue {
        FormulaValue::Number(n)
    }

    #[test]
    fn test_concat_flattens_and_formats() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        let args = [
            s("total: "),
            FormulaValue::Array(vec![vec![num(1.0), num(2.0)]]),
            FormulaValue::Boolean(true),
        ];
        assert_eq!(fn_concat(&args, &ctx).unwrap(), s("total: 12TRUE"));
    }

    #[test]
    fn test_left_right_mid_are_char_based() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        assert_eq!(fn_left(&[s("héllo"), num(2.0)], &ctx).unwrap(), s("hé"));
        assert_eq!(fn_right(&[s("héllo"), num(3.0)], &ctx).unwrap(), s("llo"));
        assert_eq!(
            fn_mid(&[s("héllo"), num(2.0), num(3.0)], &ctx).unwrap(),
            s("éll")
        );
        // Counts past the end take what exists
        assert_eq!(fn_left(&[s("ab"), num(99.0)], &ctx).unwrap(), s("ab"));
        // Default count is one character
        assert_eq!(fn_left(&[s("ab")], &ctx).unwrap(), s("a"));
    }

    #[test]
    fn test_mid_rejects_bad_positions() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        assert_eq!(
            fn_mid(&[s("abc"), num(0.0), num(1.0)], &ctx).unwrap(),
            FormulaValue::Error(CellError::Value)
        );
        assert_eq!(
            fn_mid(&[s("abc"), num(1.0), num(-1.0)], &ctx).unwrap(),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_len_counts_chars() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        assert_eq!(fn_len(&[s("héllo")], &ctx).unwrap(), num(5.0));
        assert_eq!(fn_len(&[num(123.0)], &ctx).unwrap(), num(3.0));
    }

    #[test]
    fn test_trim_collapses_runs() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        assert_eq!(
            fn_trim(&[s("  a   b  c ")], &ctx).unwrap(),
            s("a b c")
        );
    }

    #[test]
    fn test_rept_bounds() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        assert_eq!(fn_rept(&[s("ab"), num(3.0)], &ctx).unwrap(), s("ababab"));
        assert_eq!(fn_rept(&[s("ab"), num(0.0)], &ctx).unwrap(), s(""));
        assert_eq!(
            fn_rept(&[s("ab"), num(-1.0)], &ctx).unwrap(),
            FormulaValue::Error(CellError::Value)
        );
        assert_eq!(
            fn_rept(&[s("ab"), num(100_000.0)], &ctx).unwrap(),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_value_parses_or_errors() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        assert_eq!(fn_value(&[s(" 42 ")], &ctx).unwrap(), num(42.0));
        assert_eq!(
            fn_value(&[s("forty-two")], &ctx).unwrap(),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_textjoin_ignore_empty() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        let values = FormulaValue::Array(vec![vec![s("a"), s(""), s("b")]]);
        let args = [s("-"), FormulaValue::Boolean(true), values.clone()];
        assert_eq!(fn_textjoin(&args, &ctx).unwrap(), s("a-b"));

        let args = [s("-"), FormulaValue::Boolean(false), values];
        assert_eq!(fn_textjoin(&args, &ctx).unwrap(), s("a--b"));
    }

    #[test]
    fn test_exact_is_case_sensitive() {
        let registry = FunctionRegistry::new();
        let ctx = EvaluationContext::detached(&registry);
        assert_eq!(
            fn_exact(&[s("Word"), s("Word")], &ctx).unwrap(),
            FormulaValue::Boolean(true)
        );
        assert_eq!(
            fn_exact(&[s("Word"), s("word")], &ctx).unwrap(),
            FormulaValue::Boolean(false)
        );
    }
}
