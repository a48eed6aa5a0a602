//! # lattice
//!
//! A spreadsheet formula engine: parsing, evaluation, dependency
//! tracking, and incremental recalculation.
//!
//! Lattice takes a workbook of values and formula text, parses the
//! formulas into an immutable AST, orders them by dependency, and commits
//! results back to the cells. Dynamic array results spill to neighboring
//! cells; edits recalculate only their dirty closure.
//!
//! ## Example
//!
//! ```rust
//! use lattice::prelude::*;
//!
//! // Create a new workbook with one sheet
//! let mut workbook = Workbook::new();
//!
//! let sheet = workbook.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", 10.0).unwrap();
//! sheet.set_cell_value("A2", 32.0).unwrap();
//! sheet.set_formula_at(2, 0, "=SUM(A1:A2)").unwrap();
//!
//! // Calculate all formulas
//! let result = workbook.calculate().unwrap();
//! assert_eq!(result.stats.cells_calculated, 1);
//! ```

pub mod calculation;
pub mod prelude;

// Re-export calculation types
pub use calculation::{
    CalculationEngine, CalculationOptions, CalculationStats, CancelToken, DirtyRange,
    RecalcResult, WorkbookCalculationExt,
};

// Re-export core types
pub use lattice_core::{
    AbsoluteRefType,
    CellAddress,
    CellData,
    // In-sheet error values
    CellError,
    CellRange,
    // Cell types
    CellValue,
    // Error types
    Error,
    GridRange,
    // Defined names
    NameScope,
    NamedRange,
    NamedRangeCollection,
    RangeType,
    Result,
    // Reference types
    SheetRange,
    // Main types
    Workbook,
    Worksheet,
    MAX_COLS,
    // Constants
    MAX_ROWS,
    MAX_SHEET_NAME_LEN,
};

// Re-export formula types
pub use lattice_formula::{
    evaluate, parse_formula, tokenize, EvaluationContext, FormulaError, FormulaExpr,
    FormulaResult, FormulaValue, FunctionDef, FunctionRegistry,
};
