//! Formula Abstract Syntax Tree types
//!
//! Nodes are immutable once parsed: shared formulas hold one AST and apply
//! their per-cell offset at evaluation time, so nothing here is ever
//! mutated in place. Reference merges return new nodes.

use lattice_core::{CellError, GridRange, SheetRange};

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    // === Literals ===
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),
    /// Error literal
    Error(CellError),

    // === References ===
    /// Single cell reference: `A1`, `Sheet2!$B$2`
    CellRef(SheetRange),
    /// Bounded rectangle: `A1:B10`
    RangeRef(SheetRange),
    /// Column-only range with unbounded rows: `A:C`
    ColumnRef(SheetRange),
    /// Row-only range with unbounded columns: `5:10`
    RowRef(SheetRange),
    /// Named range or defined name
    NameRef(String),

    // === Operators ===
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<FormulaExpr>,
    },

    // === Function call ===
    Function {
        name: String,
        args: Vec<FormulaExpr>,
    },

    // === Composite forms ===
    /// Array literal: `{1,2;3,4}` (rows of columns)
    Array(Vec<Vec<FormulaExpr>>),
    /// Parenthesized comma-joined reference list: `(A1:A3,C1:C3)`
    Union(Vec<FormulaExpr>),
    /// `LAMBDA(x, y, x+y)`
    Lambda {
        params: Vec<String>,
        body: Box<FormulaExpr>,
    },
    /// Applying a lambda: `LAMBDA(x, x*2)(21)`
    Call {
        callee: Box<FormulaExpr>,
        args: Vec<FormulaExpr>,
    },
}

impl FormulaExpr {
    /// True for the four reference node kinds
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            FormulaExpr::CellRef(_)
                | FormulaExpr::RangeRef(_)
                | FormulaExpr::ColumnRef(_)
                | FormulaExpr::RowRef(_)
        )
    }

    /// The [`SheetRange`] behind a reference node, if this is one
    pub fn as_sheet_range(&self) -> Option<&SheetRange> {
        match self {
            FormulaExpr::CellRef(r)
            | FormulaExpr::RangeRef(r)
            | FormulaExpr::ColumnRef(r)
            | FormulaExpr::RowRef(r) => Some(r),
            _ => None,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    /// Unary plus is kept so `=+A1` round-trips, it is a no-op numerically
    Plus,
    Percent,
}

/// Merge two same-kind unbounded references into one widened reference
///
/// Two column refs widen to `min(start_col)..max(end_col)`; two row refs
/// widen to `min(start_row)..max(end_row)`. A kind mismatch, a sheet or
/// workbook qualifier mismatch, or a non-reference operand yields `#REF!`.
pub fn union_by(left: &FormulaExpr, right: &FormulaExpr) -> FormulaExpr {
    let (Some(a), Some(b)) = (left.as_sheet_range(), right.as_sheet_range()) else {
        return FormulaExpr::Error(CellError::Ref);
    };
    if a.unit_id != b.unit_id || a.sheet_name != b.sheet_name {
        return FormulaExpr::Error(CellError::Ref);
    }

    match (left, right) {
        (FormulaExpr::ColumnRef(_), FormulaExpr::ColumnRef(_)) => {
            let (Some(a_start), Some(a_end)) = (a.range.start_col, a.range.end_col) else {
                return FormulaExpr::Error(CellError::Ref);
            };
            let (Some(b_start), Some(b_end)) = (b.range.start_col, b.range.end_col) else {
                return FormulaExpr::Error(CellError::Ref);
            };
            FormulaExpr::ColumnRef(SheetRange {
                unit_id: a.unit_id.clone(),
                sheet_name: a.sheet_name.clone(),
                range: GridRange::columns(a_start.min(b_start), a_end.max(b_end)),
            })
        }
        (FormulaExpr::RowRef(_), FormulaExpr::RowRef(_)) => {
            let (Some(a_start), Some(a_end)) = (a.range.start_row, a.range.end_row) else {
                return FormulaExpr::Error(CellError::Ref);
            };
            let (Some(b_start), Some(b_end)) = (b.range.start_row, b.range.end_row) else {
                return FormulaExpr::Error(CellError::Ref);
            };
            FormulaExpr::RowRef(SheetRange {
                unit_id: a.unit_id.clone(),
                sheet_name: a.sheet_name.clone(),
                range: GridRange::rows(a_start.min(b_start), a_end.max(b_end)),
            })
        }
        _ => FormulaExpr::Error(CellError::Ref),
    }
}
