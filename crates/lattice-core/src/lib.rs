//! # lattice-core
//!
//! Core data structures for the lattice formula engine.
//!
//! This crate provides the types the engine computes over:
//! - [`CellValue`] - Cell contents (numbers, strings, booleans, errors, formulas)
//! - [`CellAddress`] and [`CellRange`] - Cell addressing and bounded ranges
//! - [`reference`] - A1-style reference grammar: serialization and
//!   deserialization of sheet- and workbook-qualified ranges, including
//!   unbounded column (`A:K`) and row (`6:11`) forms
//! - [`Workbook`], [`Worksheet`] - The document containers
//!
//! ## Example
//!
//! ```rust
//! use lattice_core::{CellValue, Workbook};
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//!
//! sheet.set_cell_value("A1", 2.0).unwrap();
//! sheet.set_formula("A2", "=A1*3").unwrap();
//! assert_eq!(sheet.get_value("A1").unwrap(), CellValue::Number(2.0));
//! ```

pub mod cell;
pub mod error;
pub mod named_range;
pub mod reference;
pub mod workbook;
pub mod worksheet;

pub use cell::{CellAddress, CellData, CellError, CellRange, CellStorage, CellValue};
pub use error::{Error, Result};
pub use named_range::{NameScope, NamedRange, NamedRangeCollection};
pub use reference::{
    absolute_ref_type, deserialize_range, deserialize_range_with_sheet, serialize_range,
    serialize_range_to_ref_string, AbsoluteRefType, GridRange, RangeType, SheetRange,
};
pub use workbook::Workbook;
pub use worksheet::Worksheet;

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
