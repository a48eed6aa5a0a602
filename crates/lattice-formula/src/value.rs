//! Runtime values and operator semantics
//!
//! [`FormulaValue`] is what expressions evaluate to. Binary and unary
//! operators live here so the evaluator and the function library share one
//! set of coercion rules:
//!
//! - errors propagate eagerly, left operand first
//! - numeric coercion: `"100"` parses, `TRUE` is 1, empty is 0
//! - comparisons are type-ordered like Excel: number < string < boolean
//! - arrays broadcast: 1x1 against anything, row/column vectors along the
//!   matching axis, equal shapes element-wise

use crate::ast::{BinaryOperator, UnaryOperator};
use lattice_core::{CellError, CellValue};
use std::cmp::Ordering;

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    Array(Vec<Vec<FormulaValue>>),
    Empty,
}

impl FormulaValue {
    /// Convert to number, if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(true) => Some(1.0),
            FormulaValue::Boolean(false) => Some(0.0),
            FormulaValue::String(s) => s.trim().parse().ok(),
            FormulaValue::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            FormulaValue::Number(n) => Some(*n != 0.0),
            FormulaValue::String(s) => {
                let upper = s.to_uppercase();
                if upper == "TRUE" {
                    Some(true)
                } else if upper == "FALSE" {
                    Some(false)
                } else {
                    None
                }
            }
            FormulaValue::Empty => Some(false),
            _ => None,
        }
    }

    /// Convert to string, formatting numbers the way Excel displays them
    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Array(_) => "#VALUE!".to_string(),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Get the error if this is one
    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Array dimensions; scalars are 1x1
    pub fn shape(&self) -> (usize, usize) {
        match self {
            FormulaValue::Array(rows) => {
                (rows.len(), rows.first().map_or(0, |r| r.len()))
            }
            _ => (1, 1),
        }
    }
}

impl From<CellValue> for FormulaValue {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Empty => FormulaValue::Empty,
            CellValue::Number(n) => FormulaValue::Number(n),
            CellValue::String(s) => FormulaValue::String(s),
            CellValue::Boolean(b) => FormulaValue::Boolean(b),
            CellValue::Error(e) => FormulaValue::Error(e),
            CellValue::Formula { cached_value, .. } => cached_value
                .map(|v| (*v).into())
                .unwrap_or(FormulaValue::Empty),
            // Spill targets resolve through the worksheet accessor; a raw
            // conversion has no source array to consult
            CellValue::SpillTarget { .. } => FormulaValue::Empty,
        }
    }
}

impl From<FormulaValue> for CellValue {
    fn from(value: FormulaValue) -> Self {
        match value {
            FormulaValue::Empty => CellValue::Empty,
            FormulaValue::Number(n) => CellValue::Number(n),
            FormulaValue::String(s) => CellValue::String(s),
            FormulaValue::Boolean(b) => CellValue::Boolean(b),
            FormulaValue::Error(e) => CellValue::Error(e),
            FormulaValue::Array(_) => CellValue::Error(CellError::Value),
        }
    }
}

/// Excel-style type-ordered comparison: number < string < boolean
///
/// Empty compares as 0 against numbers and as "" against strings; string
/// comparison is case-insensitive.
pub fn compare_values(left: &FormulaValue, right: &FormulaValue) -> Ordering {
    use FormulaValue::*;

    fn type_rank(v: &FormulaValue) -> u8 {
        match v {
            Number(_) | Empty => 0,
            String(_) => 1,
            Boolean(_) => 2,
            _ => 3,
        }
    }

    match (left, right) {
        (Number(l), Number(r)) => l.partial_cmp(r).unwrap_or(Ordering::Equal),
        (Empty, Number(r)) => 0.0f64.partial_cmp(r).unwrap_or(Ordering::Equal),
        (Number(l), Empty) => l.partial_cmp(&0.0).unwrap_or(Ordering::Equal),
        (Empty, Empty) => Ordering::Equal,
        (String(l), String(r)) => l.to_lowercase().cmp(&r.to_lowercase()),
        (Empty, String(r)) => "".cmp(&r.to_lowercase()),
        (String(l), Empty) => l.to_lowercase().as_str().cmp(""),
        (Boolean(l), Boolean(r)) => l.cmp(r),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

/// Apply a binary operator with error propagation and array broadcasting
pub fn apply_binary(op: BinaryOperator, left: &FormulaValue, right: &FormulaValue) -> FormulaValue {
    if matches!(left, FormulaValue::Array(_)) || matches!(right, FormulaValue::Array(_)) {
        return broadcast_binary(op, left, right);
    }
    apply_binary_scalar(op, left, right)
}

fn apply_binary_scalar(
    op: BinaryOperator,
    left: &FormulaValue,
    right: &FormulaValue,
) -> FormulaValue {
    // Eager propagation, left first
    if let Some(e) = left.get_error() {
        return FormulaValue::Error(e);
    }
    if let Some(e) = right.get_error() {
        return FormulaValue::Error(e);
    }

    match op {
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Power => {
            let (Some(l), Some(r)) = (left.as_number(), right.as_number()) else {
                return FormulaValue::Error(CellError::Value);
            };
            let result = match op {
                BinaryOperator::Add => l + r,
                BinaryOperator::Subtract => l - r,
                BinaryOperator::Multiply => l * r,
                BinaryOperator::Divide => {
                    if r == 0.0 {
                        return FormulaValue::Error(CellError::Div0);
                    }
                    l / r
                }
                BinaryOperator::Power => l.powf(r),
                _ => unreachable!(),
            };
            if result.is_nan() || result.is_infinite() {
                FormulaValue::Error(CellError::Num)
            } else {
                FormulaValue::Number(result)
            }
        }

        BinaryOperator::Equal => {
            FormulaValue::Boolean(compare_values(left, right) == Ordering::Equal)
        }
        BinaryOperator::NotEqual => {
            FormulaValue::Boolean(compare_values(left, right) != Ordering::Equal)
        }
        BinaryOperator::LessThan => {
            FormulaValue::Boolean(compare_values(left, right) == Ordering::Less)
        }
        BinaryOperator::LessEqual => {
            FormulaValue::Boolean(compare_values(left, right) != Ordering::Greater)
        }
        BinaryOperator::GreaterThan => {
            FormulaValue::Boolean(compare_values(left, right) == Ordering::Greater)
        }
        BinaryOperator::GreaterEqual => {
            FormulaValue::Boolean(compare_values(left, right) != Ordering::Less)
        }

        BinaryOperator::Concat => {
            FormulaValue::String(left.as_string() + &right.as_string())
        }
    }
}

/// Element at (row, col) under broadcasting rules
///
/// A 1-long axis repeats; an index past a longer axis is a missing cell
/// (`#N/A`); scalars behave as 1x1.
fn broadcast_element<'a>(
    value: &'a FormulaValue,
    row: usize,
    col: usize,
) -> Result<&'a FormulaValue, CellError> {
    match value {
        FormulaValue::Array(rows) => {
            let (nrows, ncols) = value.shape();
            let r = if nrows == 1 { 0 } else { row };
            let c = if ncols == 1 { 0 } else { col };
            if r >= nrows || c >= ncols {
                return Err(CellError::Na);
            }
            Ok(&rows[r][c])
        }
        scalar => Ok(scalar),
    }
}

fn broadcast_binary(op: BinaryOperator, left: &FormulaValue, right: &FormulaValue) -> FormulaValue {
    let (l_rows, l_cols) = left.shape();
    let (r_rows, r_cols) = right.shape();

    // Incompatible axes (neither 1 nor equal) poison every element
    let rows_compatible = l_rows == r_rows || l_rows == 1 || r_rows == 1;
    let cols_compatible = l_cols == r_cols || l_cols == 1 || r_cols == 1;

    let out_rows = l_rows.max(r_rows);
    let out_cols = l_cols.max(r_cols);
    if out_rows == 0 || out_cols == 0 {
        return FormulaValue::Error(CellError::Value);
    }

    let mut result = Vec::with_capacity(out_rows);
    for row in 0..out_rows {
        let mut out_row = Vec::with_capacity(out_cols);
        for col in 0..out_cols {
            if !rows_compatible || !cols_compatible {
                out_row.push(FormulaValue::Error(CellError::Value));
                continue;
            }
            let element = match (
                broadcast_element(left, row, col),
                broadcast_element(right, row, col),
            ) {
                (Ok(l), Ok(r)) => apply_binary_scalar(op, l, r),
                _ => FormulaValue::Error(CellError::Na),
            };
            out_row.push(element);
        }
        result.push(out_row);
    }
    FormulaValue::Array(result)
}

/// Apply a unary operator, mapping over arrays
pub fn apply_unary(op: UnaryOperator, value: &FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::Array(rows) => {
            let mapped = rows
                .iter()
                .map(|row| row.iter().map(|v| apply_unary(op, v)).collect())
                .collect();
            FormulaValue::Array(mapped)
        }
        FormulaValue::Error(e) => FormulaValue::Error(*e),
        scalar => {
            let Some(n) = scalar.as_number() else {
                return FormulaValue::Error(CellError::Value);
            };
            match op {
                UnaryOperator::Negate => FormulaValue::Number(-n),
                UnaryOperator::Plus => FormulaValue::Number(n),
                UnaryOperator::Percent => FormulaValue::Number(n / 100.0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn num(n: f64) -> FormulaValue {
        FormulaValue::Number(n)
    }

    fn row(values: &[f64]) -> Vec<FormulaValue> {
        values.iter().map(|&n| num(n)).collect()
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(FormulaValue::String("100".into()).as_number(), Some(100.0));
        assert_eq!(FormulaValue::String(" 2.5 ".into()).as_number(), Some(2.5));
        assert_eq!(FormulaValue::Boolean(true).as_number(), Some(1.0));
        assert_eq!(FormulaValue::Empty.as_number(), Some(0.0));
        assert_eq!(FormulaValue::String("abc".into()).as_number(), None);
    }

    #[test]
    fn test_scalar_arithmetic() {
        assert_eq!(apply_binary(BinaryOperator::Add, &num(1.0), &num(2.0)), num(3.0));
        assert_eq!(
            apply_binary(BinaryOperator::Add, &num(1.0), &FormulaValue::String("2".into())),
            num(3.0)
        );
        assert_eq!(
            apply_binary(BinaryOperator::Divide, &num(1.0), &num(0.0)),
            FormulaValue::Error(CellError::Div0)
        );
        assert_eq!(
            apply_binary(BinaryOperator::Add, &num(1.0), &FormulaValue::String("x".into())),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_error_propagates_left_first() {
        assert_eq!(
            apply_binary(
                BinaryOperator::Add,
                &FormulaValue::Error(CellError::Ref),
                &FormulaValue::Error(CellError::Div0)
            ),
            FormulaValue::Error(CellError::Ref)
        );
    }

    #[test]
    fn test_type_ordered_comparison() {
        // number < string < boolean
        assert_eq!(
            compare_values(&num(999.0), &FormulaValue::String("a".into())),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&FormulaValue::String("zzz".into()), &FormulaValue::Boolean(false)),
            Ordering::Less
        );
        // Strings compare case-insensitively
        assert_eq!(
            compare_values(
                &FormulaValue::String("ABC".into()),
                &FormulaValue::String("abc".into())
            ),
            Ordering::Equal
        );
        // Empty compares as 0 against numbers
        assert_eq!(compare_values(&FormulaValue::Empty, &num(0.0)), Ordering::Equal);
        assert_eq!(compare_values(&FormulaValue::Empty, &num(-1.0)), Ordering::Greater);
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            apply_binary(
                BinaryOperator::Concat,
                &FormulaValue::String("Value: ".into()),
                &num(42.0)
            ),
            FormulaValue::String("Value: 42".into())
        );
    }

    #[test]
    fn test_broadcast_scalar_against_array() {
        let arr = FormulaValue::Array(vec![row(&[1.0, 2.0, 3.0])]);
        assert_eq!(
            apply_binary(BinaryOperator::Add, &arr, &num(1.0)),
            FormulaValue::Array(vec![row(&[2.0, 3.0, 4.0])])
        );
    }

    #[test]
    fn test_broadcast_equal_shapes() {
        let a = FormulaValue::Array(vec![row(&[1.0, 2.0]), row(&[3.0, 4.0])]);
        let b = FormulaValue::Array(vec![row(&[10.0, 20.0]), row(&[30.0, 40.0])]);
        assert_eq!(
            apply_binary(BinaryOperator::Add, &a, &b),
            FormulaValue::Array(vec![row(&[11.0, 22.0]), row(&[33.0, 44.0])])
        );
    }

    #[test]
    fn test_broadcast_row_against_column() {
        // 1x2 row + 2x1 column = 2x2
        let r = FormulaValue::Array(vec![row(&[1.0, 2.0])]);
        let c = FormulaValue::Array(vec![row(&[10.0]), row(&[20.0])]);
        assert_eq!(
            apply_binary(BinaryOperator::Add, &r, &c),
            FormulaValue::Array(vec![row(&[11.0, 12.0]), row(&[21.0, 22.0])])
        );
    }

    #[test]
    fn test_broadcast_mismatched_shapes() {
        // 1x2 + 1x3 - neither axis broadcasts
        let a = FormulaValue::Array(vec![row(&[1.0, 2.0])]);
        let b = FormulaValue::Array(vec![row(&[1.0, 2.0, 3.0])]);
        let result = apply_binary(BinaryOperator::Add, &a, &b);
        let FormulaValue::Array(rows) = result else {
            panic!("Expected array");
        };
        assert!(rows[0]
            .iter()
            .all(|v| *v == FormulaValue::Error(CellError::Value)));
    }

    #[test]
    fn test_unary_over_array() {
        let arr = FormulaValue::Array(vec![row(&[1.0, -2.0])]);
        assert_eq!(
            apply_unary(UnaryOperator::Negate, &arr),
            FormulaValue::Array(vec![row(&[-1.0, 2.0])])
        );
        assert_eq!(apply_unary(UnaryOperator::Percent, &num(50.0)), num(0.5));
    }
}
