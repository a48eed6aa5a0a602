//! Prelude module - common imports for lattice users
//!
//! ```rust
//! use lattice::prelude::*;
//! ```

pub use crate::{
    // Calculation types
    CalculationOptions,
    CalculationStats,
    CancelToken,
    CellAddress,
    CellError,
    CellRange,
    // Cell types
    CellValue,
    DirtyRange,
    // Error types
    Error,
    // Formula types
    FormulaValue,
    FunctionRegistry,
    RecalcResult,
    Result,
    SheetRange,
    // Main types
    Workbook,
    // Extension traits
    WorkbookCalculationExt,
    Worksheet,
};
