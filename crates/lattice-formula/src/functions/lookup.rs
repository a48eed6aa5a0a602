//! Lookup and array-shaping functions

use super::math::as_matrix;
use super::{number_arg, number_arg_or};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::{compare_values, FormulaValue};
use lattice_core::CellError;
use std::cmp::Ordering;

/// VLOOKUP(lookup, table, col_index, [approximate=TRUE])
pub fn fn_vlookup(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let Some(lookup) = args.get(0) else {
        return Ok(FormulaValue::Error(CellError::Value));
    };
    if let FormulaValue::Error(e) = lookup {
        return Ok(FormulaValue::Error(*e));
    }
    let table = match args.get(1) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => as_matrix(v),
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let col_index = match number_arg(args, 2) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };
    let approximate = match lookup_mode(args, 3) {
        Ok(b) => b,
        Err(v) => return Ok(v),
    };

    if col_index < 1 {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    let col = col_index as usize - 1;
    if table.first().map_or(0, |r| r.len()) <= col {
        return Ok(FormulaValue::Error(CellError::Ref));
    }

    let keys: Vec<&FormulaValue> = table.iter().filter_map(|row| row.first()).collect();
    match find_row(lookup, &keys, approximate) {
        Some(row) => Ok(table[row][col].clone()),
        None => Ok(FormulaValue::Error(CellError::Na)),
    }
}

/// HLOOKUP(lookup, table, row_index, [approximate=TRUE])
pub fn fn_hlookup(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let Some(lookup) = args.get(0) else {
        return Ok(FormulaValue::Error(CellError::Value));
    };
    if let FormulaValue::Error(e) = lookup {
        return Ok(FormulaValue::Error(*e));
    }
    let table = match args.get(1) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => as_matrix(v),
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let row_index = match number_arg(args, 2) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };
    let approximate = match lookup_mode(args, 3) {
        Ok(b) => b,
        Err(v) => return Ok(v),
    };

    if row_index < 1 {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    let row = row_index as usize - 1;
    if table.len() <= row {
        return Ok(FormulaValue::Error(CellError::Ref));
    }

    let keys: Vec<&FormulaValue> = table.first().map_or(Vec::new(), |r| r.iter().collect());
    match find_row(lookup, &keys, approximate) {
        Some(col) => Ok(table[row]
            .get(col)
            .cloned()
            .unwrap_or(FormulaValue::Empty)),
        None => Ok(FormulaValue::Error(CellError::Na)),
    }
}

fn lookup_mode(args: &[FormulaValue], idx: usize) -> Result<bool, FormulaValue> {
    match args.get(idx) {
        None | Some(FormulaValue::Empty) => Ok(true),
        Some(FormulaValue::Error(e)) => Err(FormulaValue::Error(*e)),
        Some(v) => v
            .as_bool()
            .ok_or(FormulaValue::Error(CellError::Value)),
    }
}

/// Search a key vector; approximate mode returns the last position whose
/// key is <= the lookup value, assuming ascending order
fn find_row(lookup: &FormulaValue, keys: &[&FormulaValue], approximate: bool) -> Option<usize> {
    if approximate {
        let mut best = None;
        for (idx, key) in keys.iter().enumerate() {
            match compare_values(key, lookup) {
                Ordering::Less | Ordering::Equal => best = Some(idx),
                Ordering::Greater => break,
            }
        }
        best
    } else {
        keys.iter()
            .position(|key| compare_values(key, lookup) == Ordering::Equal)
    }
}

/// INDEX(array, row, [col])
///
/// An index of 0 selects the whole row or column as an array. A single
/// index into a one-row array selects by column.
pub fn fn_index(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let table = match args.get(0) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => as_matrix(v),
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let row_num = match number_arg(args, 1) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };
    let col_num = match args.get(2) {
        None => None,
        Some(_) => match number_arg(args, 2) {
            Ok(n) => Some(n as i64),
            Err(v) => return Ok(v),
        },
    };

    let rows = table.len();
    let cols = table.first().map_or(0, |r| r.len());

    let (row_num, col_num) = match col_num {
        Some(c) => (row_num, c),
        // One-row arrays index by column when only one index is given
        None if rows == 1 && cols > 1 => (1, row_num),
        None => (row_num, 1),
    };

    if row_num < 0 || col_num < 0 {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    if row_num as usize > rows || col_num as usize > cols {
        return Ok(FormulaValue::Error(CellError::Ref));
    }

    match (row_num, col_num) {
        (0, 0) => Ok(FormulaValue::Array(table)),
        (0, c) => Ok(FormulaValue::Array(
            table
                .iter()
                .map(|row| vec![row[c as usize - 1].clone()])
                .collect(),
        )),
        (r, 0) => Ok(FormulaValue::Array(vec![table[r as usize - 1].clone()])),
        (r, c) => Ok(table[r as usize - 1][c as usize - 1].clone()),
    }
}

/// MATCH(lookup, vector, [match_type=1])
///
/// Type 1 finds the largest value <= lookup (ascending data), 0 an exact
/// match, -1 the smallest value >= lookup (descending data). Returns a
/// 1-based position.
pub fn fn_match(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let Some(lookup) = args.get(0) else {
        return Ok(FormulaValue::Error(CellError::Value));
    };
    if let FormulaValue::Error(e) = lookup {
        return Ok(FormulaValue::Error(*e));
    }
    let matrix = match args.get(1) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => as_matrix(v),
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let match_type = match number_arg_or(args, 2, 1.0) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };

    let (rows, cols) = (matrix.len(), matrix.first().map_or(0, |r| r.len()));
    if rows > 1 && cols > 1 {
        return Ok(FormulaValue::Error(CellError::Na));
    }
    let vector: Vec<&FormulaValue> = matrix.iter().flatten().collect();

    let position = match match_type {
        0 => vector
            .iter()
            .position(|v| compare_values(v, lookup) == Ordering::Equal),
        t if t > 0 => {
            let mut best = None;
            for (idx, v) in vector.iter().enumerate() {
                match compare_values(v, lookup) {
                    Ordering::Less | Ordering::Equal => best = Some(idx),
                    Ordering::Greater => break,
                }
            }
            best
        }
        _ => {
            let mut best = None;
            for (idx, v) in vector.iter().enumerate() {
                match compare_values(v, lookup) {
                    Ordering::Greater | Ordering::Equal => best = Some(idx),
                    Ordering::Less => break,
                }
            }
            best
        }
    };

    match position {
        Some(idx) => Ok(FormulaValue::Number(idx as f64 + 1.0)),
        None => Ok(FormulaValue::Error(CellError::Na)),
    }
}

/// CHOOSE(index, value1, ...)
pub fn fn_choose(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let index = match number_arg(args, 0) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };
    if index < 1 || index as usize >= args.len() {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    Ok(args[index as usize].clone())
}

/// ROWS
pub fn fn_rows(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match args.get(0) {
        Some(FormulaValue::Error(e)) => Ok(FormulaValue::Error(*e)),
        Some(v) => Ok(FormulaValue::Number(v.shape().0 as f64)),
        None => Ok(FormulaValue::Error(CellError::Value)),
    }
}

/// COLUMNS
pub fn fn_columns(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match args.get(0) {
        Some(FormulaValue::Error(e)) => Ok(FormulaValue::Error(*e)),
        Some(v) => Ok(FormulaValue::Number(v.shape().1 as f64)),
        None => Ok(FormulaValue::Error(CellError::Value)),
    }
}

/// SEQUENCE(rows, [cols=1], [start=1], [step=1]) builds a spillable array
pub fn fn_sequence(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let rows = match number_arg(args, 0) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };
    let cols = match number_arg_or(args, 1, 1.0) {
        Ok(n) => n as i64,
        Err(v) => return Ok(v),
    };
    let start = match number_arg_or(args, 2, 1.0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };
    let step = match number_arg_or(args, 3, 1.0) {
        Ok(n) => n,
        Err(v) => return Ok(v),
    };

    if rows < 1 || cols < 1 {
        return Ok(FormulaValue::Error(CellError::Value));
    }

    let mut out = Vec::with_capacity(rows as usize);
    let mut value = start;
    for _ in 0..rows {
        let mut row = Vec::with_capacity(cols as usize);
        for _ in 0..cols {
            row.push(FormulaValue::Number(value));
            value += step;
        }
        out.push(row);
    }
    Ok(FormulaValue::Array(out))
}

/// TRANSPOSE
pub fn fn_transpose(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let matrix = match args.get(0) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => as_matrix(v),
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let rows = matrix.len();
    let cols = matrix.first().map_or(0, |r| r.len());
    if rows == 0 || cols == 0 {
        return Ok(FormulaValue::Error(CellError::Value));
    }

    let mut out = vec![Vec::with_capacity(rows); cols];
    for row in &matrix {
        for (c, cell) in row.iter().enumerate() {
            out[c].push(cell.clone());
        }
    }
    Ok(FormulaValue::Array(out))
}
