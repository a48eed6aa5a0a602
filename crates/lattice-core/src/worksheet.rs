//! Worksheet type

use crate::cell::{CellAddress, CellData, CellRange, CellStorage, CellValue, SpillInfo};
use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};

/// A worksheet (single sheet in a workbook)
#[derive(Debug)]
pub struct Worksheet {
    /// Sheet name
    name: String,
    /// Cell storage
    cells: CellStorage,
}

/// A formula cell as seen by the calculation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormulaCell<'a> {
    /// Row of the formula cell
    pub row: u32,
    /// Column of the formula cell
    pub col: u16,
    /// Formula text, including the leading `=`
    pub text: &'a str,
    /// Shared-formula id, if this cell participates in one
    pub shared_id: Option<u32>,
    /// Offset from the shared-formula anchor
    pub shared_offset: (i64, i64),
}

impl Worksheet {
    /// Create a new worksheet with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            cells: CellStorage::new(),
        }
    }

    /// Get the sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the sheet name
    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    // === Cell access ===

    /// Get a cell by address string (e.g., "A1")
    pub fn cell(&self, address: &str) -> Result<Option<&CellData>> {
        let addr = CellAddress::parse(address)?;
        Ok(self.cells.get(addr.row, addr.col))
    }

    /// Get a cell by row and column indices
    pub fn cell_at(&self, row: u32, col: u16) -> Option<&CellData> {
        self.cells.get(row, col)
    }

    /// Get cell value (convenience method)
    pub fn get_value(&self, address: &str) -> Result<CellValue> {
        let addr = CellAddress::parse(address)?;
        Ok(self.get_value_at(addr.row, addr.col))
    }

    /// Get cell value by indices
    pub fn get_value_at(&self, row: u32, col: u16) -> CellValue {
        self.cells
            .get(row, col)
            .map(|c| c.value.clone())
            .unwrap_or(CellValue::Empty)
    }

    // === Cell modification ===

    /// Set a cell value by address string
    pub fn set_cell_value<V: Into<CellValue>>(&mut self, address: &str, value: V) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_cell_value_at(addr.row, addr.col, value)
    }

    /// Set a cell value by row and column indices
    pub fn set_cell_value_at<V: Into<CellValue>>(
        &mut self,
        row: u32,
        col: u16,
        value: V,
    ) -> Result<()> {
        self.validate_cell_position(row, col)?;
        self.cells.set_value(row, col, value.into());
        Ok(())
    }

    /// Set a cell formula by address string
    pub fn set_formula(&mut self, address: &str, formula: &str) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_formula_at(addr.row, addr.col, formula)
    }

    /// Set a cell formula by row and column indices
    pub fn set_formula_at(&mut self, row: u32, col: u16, formula: &str) -> Result<()> {
        self.validate_cell_position(row, col)?;
        let formula = normalize_formula_text(formula);
        self.cells.set_value(row, col, CellValue::formula(formula));
        Ok(())
    }

    /// Set a shared formula member
    ///
    /// The formula text is the anchor's; `offset` is this cell's (rows,
    /// cols) distance from the anchor. Relative references shift by the
    /// offset at evaluation time.
    pub fn set_shared_formula_at(
        &mut self,
        row: u32,
        col: u16,
        formula: &str,
        id: u32,
        offset: (i64, i64),
    ) -> Result<()> {
        self.validate_cell_position(row, col)?;
        let formula = normalize_formula_text(formula);
        self.cells
            .set_value(row, col, CellValue::shared_formula(formula, id, offset));
        Ok(())
    }

    /// Clear a cell
    pub fn clear_cell(&mut self, address: &str) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.clear_cell_at(addr.row, addr.col);
        Ok(())
    }

    /// Clear a cell by indices
    pub fn clear_cell_at(&mut self, row: u32, col: u16) {
        if self.cells.is_spill_source(row, col) {
            self.cells.clear_spill_targets(row, col);
        }
        self.cells.remove(row, col);
    }

    // === Range operations ===

    /// Get the used range (bounds of all non-empty cells)
    pub fn used_range(&self) -> Option<CellRange> {
        self.cells
            .used_bounds()
            .map(|(min_row, min_col, max_row, max_col)| {
                CellRange::from_indices(min_row, min_col, max_row, max_col)
            })
    }

    /// Clear all cells in a range
    pub fn clear_range(&mut self, range: &CellRange) {
        for addr in range.cells() {
            self.clear_cell_at(addr.row, addr.col);
        }
    }

    // === Internal ===

    /// Validate cell position
    fn validate_cell_position(&self, row: u32, col: u16) -> Result<()> {
        if row >= MAX_ROWS {
            return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
        }
        if col >= MAX_COLS {
            return Err(Error::ColumnOutOfBounds(col, MAX_COLS - 1));
        }
        Ok(())
    }

    /// Get the number of non-empty cells
    pub fn cell_count(&self) -> usize {
        self.cells.cell_count()
    }

    /// Check if the worksheet is empty
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate over all non-empty cells
    pub fn iter_cells(&self) -> impl Iterator<Item = (u32, u16, &CellData)> {
        self.cells.iter()
    }

    // === Formula calculation support ===

    /// Iterate over all formula cells in row order
    pub fn formula_cells(&self) -> impl Iterator<Item = FormulaCell<'_>> {
        self.cells.iter().filter_map(|(row, col, cell)| {
            if let CellValue::Formula {
                text,
                shared_id,
                shared_offset,
                ..
            } = &cell.value
            {
                Some(FormulaCell {
                    row,
                    col,
                    text: text.as_str(),
                    shared_id: *shared_id,
                    shared_offset: *shared_offset,
                })
            } else {
                None
            }
        })
    }

    /// Get the formula text at a cell position (if it's a formula)
    pub fn get_formula_at(&self, row: u32, col: u16) -> Option<&str> {
        self.cells
            .get(row, col)
            .and_then(|cell| cell.value.formula_text())
    }

    /// Set the cached result value of a formula cell
    pub fn set_formula_result(&mut self, row: u32, col: u16, value: CellValue) -> Result<()> {
        let cell = self
            .cells
            .get_mut(row, col)
            .ok_or_else(|| Error::InvalidAddress(format!("Cell at ({}, {}) not found", row, col)))?;

        match &mut cell.value {
            CellValue::Formula { cached_value, .. } => {
                *cached_value = Some(Box::new(value));
                Ok(())
            }
            _ => Err(Error::InvalidAddress(format!(
                "Cell at ({}, {}) is not a formula",
                row, col
            ))),
        }
    }

    /// Get the cached value of a formula cell, or the cell value directly
    ///
    /// Spill targets resolve through their source formula's array result.
    pub fn get_calculated_value_at(&self, row: u32, col: u16) -> Option<CellValue> {
        let cell = self.cells.get(row, col)?;
        match &cell.value {
            CellValue::Formula {
                cached_value: Some(v),
                ..
            } => Some(v.as_ref().clone()),
            CellValue::SpillTarget {
                source_row,
                source_col,
                offset_row,
                offset_col,
            } => self.spill_value(*source_row, *source_col, *offset_row, *offset_col),
            other => Some(other.clone()),
        }
    }

    fn spill_value(
        &self,
        source_row: u32,
        source_col: u16,
        offset_row: u32,
        offset_col: u16,
    ) -> Option<CellValue> {
        let source = self.cells.get(source_row, source_col)?;
        match &source.value {
            CellValue::Formula {
                array_result: Some(array),
                ..
            } => array
                .get(offset_row as usize)
                .and_then(|r| r.get(offset_col as usize))
                .cloned(),
            _ => None,
        }
    }

    // === Dynamic array spill support ===

    /// Set the result of a dynamic array formula, spilling to adjacent cells
    ///
    /// Returns `Err` when the spill range is blocked; in that case the
    /// source cell's cached value is set to `#SPILL!` and the blocking
    /// cells are left untouched.
    pub fn set_array_formula_result(
        &mut self,
        row: u32,
        col: u16,
        array: Vec<Vec<CellValue>>,
    ) -> Result<()> {
        let num_rows = array.len() as u32;
        let num_cols = array.first().map(|r| r.len() as u16).unwrap_or(0);

        if num_rows == 0 || num_cols == 0 {
            return Err(Error::other("Empty array result"));
        }

        // Single-cell results take the scalar path
        if num_rows == 1 && num_cols == 1 {
            let value = array
                .into_iter()
                .next()
                .and_then(|r| r.into_iter().next())
                .unwrap_or(CellValue::Empty);
            return self.set_formula_result(row, col, value);
        }

        // Clear any existing spill from this source
        self.clear_spill(row, col);

        if !self.cells.can_spill_to(row, col, num_rows, num_cols) {
            if let Some(cell) = self.cells.get_mut(row, col) {
                if let CellValue::Formula {
                    cached_value,
                    array_result,
                    ..
                } = &mut cell.value
                {
                    *cached_value = Some(Box::new(CellValue::Error(crate::CellError::Spill)));
                    *array_result = None;
                }
            }
            return Err(Error::other("Cannot spill: blocked by existing data"));
        }

        self.cells
            .register_spill_source(row, col, SpillInfo::new(num_rows, num_cols));

        // Stamp targets, then store the whole array on the source so spill
        // targets can resolve their values through it
        for row_offset in 0..num_rows {
            for col_offset in 0..num_cols {
                if row_offset == 0 && col_offset == 0 {
                    continue;
                }
                self.cells.set(
                    row + row_offset,
                    col + col_offset,
                    CellData::new(CellValue::SpillTarget {
                        source_row: row,
                        source_col: col,
                        offset_row: row_offset,
                        offset_col: col_offset,
                    }),
                );
            }
        }

        let top_left = array[0][0].clone();
        if let Some(cell) = self.cells.get_mut(row, col) {
            if let CellValue::Formula {
                cached_value,
                array_result,
                ..
            } = &mut cell.value
            {
                *cached_value = Some(Box::new(top_left));
                *array_result = Some(array);
            }
        }

        Ok(())
    }

    /// Clear any spill targets from a source formula cell
    pub fn clear_spill(&mut self, row: u32, col: u16) {
        self.cells.clear_spill_targets(row, col);
        if let Some(cell) = self.cells.get_mut(row, col) {
            if let CellValue::Formula { array_result, .. } = &mut cell.value {
                *array_result = None;
            }
        }
    }

    /// Check if a cell is a spill target
    pub fn is_spill_target(&self, row: u32, col: u16) -> bool {
        self.cells
            .get(row, col)
            .map(|c| c.value.is_spill_target())
            .unwrap_or(false)
    }

    /// Check if a cell is a spill source (has an array formula that spills)
    pub fn is_spill_source(&self, row: u32, col: u16) -> bool {
        self.cells.is_spill_source(row, col)
    }

    /// Get the source cell coordinates for a spill target
    pub fn get_spill_source(&self, row: u32, col: u16) -> Option<(u32, u16)> {
        self.cells
            .get(row, col)
            .and_then(|c| c.value.spill_source())
    }

    /// Get the committed spill size (rows, cols) of a spill source cell
    pub fn spill_extent(&self, row: u32, col: u16) -> Option<(u32, u16)> {
        self.cells
            .get_spill_info(row, col)
            .map(|info| (info.rows, info.cols))
    }
}

/// Ensure formula text carries the leading `=`
fn normalize_formula_text(formula: &str) -> String {
    if formula.starts_with('=') {
        formula.to_string()
    } else {
        format!("={}", formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_worksheet() {
        let ws = Worksheet::new("Test");
        assert_eq!(ws.name(), "Test");
        assert!(ws.is_empty());
    }

    #[test]
    fn test_set_cell_values() {
        let mut ws = Worksheet::new("Test");

        ws.set_cell_value("A1", "Hello").unwrap();
        ws.set_cell_value("B1", 42.0).unwrap();
        ws.set_cell_value("C1", true).unwrap();

        assert_eq!(ws.get_value("A1").unwrap().as_string(), Some("Hello"));
        assert_eq!(ws.get_value("B1").unwrap().as_number(), Some(42.0));
        assert_eq!(ws.get_value("C1").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_set_formula_normalizes_equals() {
        let mut ws = Worksheet::new("Test");

        ws.set_formula("A1", "SUM(B1:B10)").unwrap();
        let value = ws.get_value("A1").unwrap();
        assert!(value.is_formula());
        assert_eq!(value.formula_text(), Some("=SUM(B1:B10)"));
    }

    #[test]
    fn test_formula_cells_iterator() {
        let mut ws = Worksheet::new("Test");

        ws.set_cell_value("A1", 1.0).unwrap();
        ws.set_formula("B1", "=A1*2").unwrap();
        ws.set_shared_formula_at(1, 1, "=A1*2", 3, (1, 0)).unwrap();

        let formulas: Vec<_> = ws.formula_cells().collect();
        assert_eq!(formulas.len(), 2);
        assert_eq!(formulas[0].text, "=A1*2");
        assert_eq!(formulas[0].shared_id, None);
        assert_eq!(formulas[1].shared_id, Some(3));
        assert_eq!(formulas[1].shared_offset, (1, 0));
    }

    #[test]
    fn test_array_result_spills() {
        let mut ws = Worksheet::new("Test");

        ws.set_formula("A1", "=SEQUENCE(1,3)").unwrap();
        ws.set_array_formula_result(
            0,
            0,
            vec![vec![
                CellValue::Number(1.0),
                CellValue::Number(2.0),
                CellValue::Number(3.0),
            ]],
        )
        .unwrap();

        assert!(ws.is_spill_source(0, 0));
        assert!(ws.is_spill_target(0, 1));
        assert_eq!(
            ws.get_calculated_value_at(0, 2),
            Some(CellValue::Number(3.0))
        );
    }

    #[test]
    fn test_blocked_spill_sets_error() {
        let mut ws = Worksheet::new("Test");

        ws.set_cell_value_at(0, 1, "in the way").unwrap();
        ws.set_formula("A1", "=SEQUENCE(1,3)").unwrap();

        let result = ws.set_array_formula_result(
            0,
            0,
            vec![vec![
                CellValue::Number(1.0),
                CellValue::Number(2.0),
                CellValue::Number(3.0),
            ]],
        );
        assert!(result.is_err());

        // Source shows #SPILL!, blocker untouched
        assert_eq!(
            ws.get_calculated_value_at(0, 0),
            Some(CellValue::Error(crate::CellError::Spill))
        );
        assert_eq!(
            ws.get_value_at(0, 1).as_string(),
            Some("in the way")
        );
    }

    #[test]
    fn test_clear_cell_clears_spill() {
        let mut ws = Worksheet::new("Test");

        ws.set_formula("A1", "=SEQUENCE(2,1)").unwrap();
        ws.set_array_formula_result(
            0,
            0,
            vec![vec![CellValue::Number(1.0)], vec![CellValue::Number(2.0)]],
        )
        .unwrap();
        assert!(ws.is_spill_target(1, 0));

        ws.clear_cell("A1").unwrap();
        assert!(!ws.is_spill_target(1, 0));
        assert_eq!(ws.cell_count(), 0);
    }
}
