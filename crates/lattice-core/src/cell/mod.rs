//! Cell-related types and utilities
//!
//! This module contains:
//! - [`CellValue`] - The value stored in a cell
//! - [`CellAddress`] - A cell's location (e.g., "A1")
//! - [`CellRange`] - A bounded range of cells (e.g., "A1:B10")
//! - [`CellData`] / [`CellStorage`] - Sparse per-sheet storage

mod address;
mod storage;
mod value;

pub use address::{CellAddress, CellRange};
pub use storage::{CellData, CellStorage, SpillInfo};
pub use value::{CellError, CellValue};
