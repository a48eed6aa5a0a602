//! Sparse cell storage
//!
//! Only non-empty cells are stored, using a row-based BTreeMap structure
//! (row index → column map). The formula engine walks this sparsely; a
//! million-row sheet with a hundred formulas costs a hundred entries.

use std::collections::BTreeMap;

use ahash::AHashMap;

use super::CellValue;

/// Complete data for a single cell
#[derive(Debug, Clone)]
pub struct CellData {
    /// The cell's value
    pub value: CellValue,
}

impl CellData {
    /// Create a new cell with a value
    pub fn new(value: CellValue) -> Self {
        Self { value }
    }

    /// Create an empty cell
    pub fn empty() -> Self {
        Self {
            value: CellValue::Empty,
        }
    }

    /// Check if this cell is effectively empty
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl Default for CellData {
    fn default() -> Self {
        Self::empty()
    }
}

/// Information about a spill source (a formula that produces an array)
#[derive(Debug, Clone)]
pub struct SpillInfo {
    /// Number of rows in the spilled array
    pub rows: u32,
    /// Number of columns in the spilled array
    pub cols: u16,
}

impl SpillInfo {
    /// Create new spill info
    pub fn new(rows: u32, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Get the spill range as (end_row, end_col) offsets from source
    pub fn end_offsets(&self) -> (u32, u16) {
        (self.rows.saturating_sub(1), self.cols.saturating_sub(1))
    }
}

/// Sparse row-based storage for worksheet cells
///
/// Structure: `BTreeMap<row_index, BTreeMap<col_index, CellData>>`.
/// BTreeMap gives ordered iteration, which keeps formula collection and
/// recalculation order deterministic.
#[derive(Debug, Default)]
pub struct CellStorage {
    /// Row index → column map
    rows: BTreeMap<u32, BTreeMap<u16, CellData>>,

    /// Spill sources: maps source cell (row, col) to spill info
    spill_sources: AHashMap<(u32, u16), SpillInfo>,
}

impl CellStorage {
    /// Create a new empty cell storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cell
    pub fn get(&self, row: u32, col: u16) -> Option<&CellData> {
        self.rows.get(&row).and_then(|r| r.get(&col))
    }

    /// Get a mutable cell
    pub fn get_mut(&mut self, row: u32, col: u16) -> Option<&mut CellData> {
        self.rows.get_mut(&row).and_then(|r| r.get_mut(&col))
    }

    /// Set a cell
    ///
    /// If the cell data is empty, the cell is removed.
    pub fn set(&mut self, row: u32, col: u16, data: CellData) {
        if data.is_empty() {
            // Remove empty cells to save memory
            if let Some(row_map) = self.rows.get_mut(&row) {
                row_map.remove(&col);
                if row_map.is_empty() {
                    self.rows.remove(&row);
                }
            }
        } else {
            self.rows.entry(row).or_default().insert(col, data);
        }
    }

    /// Set a cell value
    pub fn set_value(&mut self, row: u32, col: u16, value: CellValue) {
        self.set(row, col, CellData::new(value));
    }

    /// Remove a cell
    pub fn remove(&mut self, row: u32, col: u16) -> Option<CellData> {
        let result = self.rows.get_mut(&row).and_then(|r| r.remove(&col));

        // Clean up empty rows
        if let Some(row_map) = self.rows.get(&row) {
            if row_map.is_empty() {
                self.rows.remove(&row);
            }
        }

        result
    }

    /// Clear all cells
    pub fn clear(&mut self) {
        self.rows.clear();
        self.spill_sources.clear();
    }

    /// Get the number of non-empty cells
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(|r| r.len()).sum()
    }

    /// Check if storage is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the bounds of used cells
    ///
    /// Returns (min_row, min_col, max_row, max_col) or None if empty
    pub fn used_bounds(&self) -> Option<(u32, u16, u32, u16)> {
        let min_row = *self.rows.keys().next()?;
        let max_row = *self.rows.keys().next_back()?;

        let mut min_col = u16::MAX;
        let mut max_col = 0u16;

        for row_data in self.rows.values() {
            if let Some(&col) = row_data.keys().next() {
                min_col = min_col.min(col);
            }
            if let Some(&col) = row_data.keys().next_back() {
                max_col = max_col.max(col);
            }
        }

        Some((min_row, min_col, max_row, max_col))
    }

    /// Iterate over all cells in row order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16, &CellData)> {
        self.rows
            .iter()
            .flat_map(|(&row, cols)| cols.iter().map(move |(&col, data)| (row, col, data)))
    }

    /// Iterate over cells in a specific row
    pub fn iter_row(&self, row: u32) -> impl Iterator<Item = (u16, &CellData)> {
        self.rows
            .get(&row)
            .into_iter()
            .flat_map(|cols| cols.iter().map(|(&col, data)| (col, data)))
    }

    /// Iterate over row indices that have data
    pub fn row_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.rows.keys().copied()
    }

    // ==================== Spill management ====================

    /// Check if a range can be used for spilling
    ///
    /// A range can be spilled to if all cells in it (except the source) are
    /// empty or are already spill targets of this same source. Anything else
    /// blocks the spill and the source gets `#SPILL!`.
    pub fn can_spill_to(
        &self,
        source_row: u32,
        source_col: u16,
        num_rows: u32,
        num_cols: u16,
    ) -> bool {
        for row_offset in 0..num_rows {
            for col_offset in 0..num_cols {
                if row_offset == 0 && col_offset == 0 {
                    continue;
                }
                let row = source_row + row_offset;
                let col = source_col + col_offset;

                if let Some(cell) = self.get(row, col) {
                    match &cell.value {
                        CellValue::Empty => continue,
                        CellValue::SpillTarget {
                            source_row: sr,
                            source_col: sc,
                            ..
                        } => {
                            if *sr == source_row && *sc == source_col {
                                continue;
                            }
                            return false; // Different source - blocked
                        }
                        _ => return false,
                    }
                }
            }
        }

        true
    }

    /// Register a spill source
    pub fn register_spill_source(&mut self, row: u32, col: u16, info: SpillInfo) {
        self.spill_sources.insert((row, col), info);
    }

    /// Get spill info for a source cell
    pub fn get_spill_info(&self, row: u32, col: u16) -> Option<&SpillInfo> {
        self.spill_sources.get(&(row, col))
    }

    /// Check if a cell is a spill source
    pub fn is_spill_source(&self, row: u32, col: u16) -> bool {
        self.spill_sources.contains_key(&(row, col))
    }

    /// Clear all spill targets for a given source
    ///
    /// Call this before recalculating a formula or when a spill source is
    /// deleted.
    pub fn clear_spill_targets(&mut self, source_row: u32, source_col: u16) {
        if let Some(info) = self.spill_sources.get(&(source_row, source_col)).cloned() {
            for row_offset in 0..info.rows {
                for col_offset in 0..info.cols {
                    if row_offset == 0 && col_offset == 0 {
                        continue;
                    }
                    let row = source_row + row_offset;
                    let col = source_col + col_offset;

                    if let Some(cell) = self.get(row, col) {
                        if matches!(cell.value, CellValue::SpillTarget { .. }) {
                            self.remove(row, col);
                        }
                    }
                }
            }

            self.spill_sources.remove(&(source_row, source_col));
        }
    }

    /// Get all spill sources
    pub fn spill_sources(&self) -> impl Iterator<Item = ((u32, u16), &SpillInfo)> {
        self.spill_sources.iter().map(|(k, v)| (*k, v))
    }
}
