//! Workbook calculation engine
//!
//! Full and incremental recalculation over a workbook: collect and parse
//! formulas into an arena, build the dependency graph, evaluate in
//! topological order, and commit results (scalars or spilled arrays) back
//! to the worksheets.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice::prelude::*;
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", 10.0).unwrap();
//! sheet.set_cell_value("A2", 20.0).unwrap();
//! sheet.set_formula_at(2, 0, "=A1+A2").unwrap();
//!
//! let result = workbook.calculate().unwrap();
//! println!("Calculated {} cells", result.stats.cells_calculated);
//! ```

use ahash::{AHashMap, AHashSet};
use lattice_core::{CellError, CellRange, CellValue, Result, Workbook};
use lattice_formula::{
    collect_reads, contains_volatile, evaluate, parse_formula, CellKey, DependencyGraph,
    EvaluationContext, FormulaArena, FormulaExpr, FormulaId, FormulaValue, FunctionRegistry,
    RangeRead,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shareable cancellation flag, checked between formula evaluations
///
/// Cancelling mid-pass leaves already committed cells in place; nothing
/// further is evaluated or committed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options for workbook calculation
#[derive(Debug, Clone)]
pub struct CalculationOptions {
    /// Resolve circular references by bounded fixed-point iteration
    /// instead of committing `#CYCLE!`
    pub iterative: bool,
    /// Maximum iterations for circular references (default: 100)
    pub max_iterations: u32,
    /// Convergence threshold for iterative calculation (default: 0.001)
    pub max_change: f64,
    /// Recalculate every formula, ignoring dirty tracking
    pub force_full_calculation: bool,
    /// Include volatile functions (NOW, TODAY, RAND, ...) in incremental
    /// passes even when nothing they read changed
    pub calculate_volatile: bool,
    /// Cooperative cancellation flag
    pub cancel: CancelToken,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            iterative: false,
            max_iterations: 100,
            max_change: 0.001,
            force_full_calculation: true,
            calculate_volatile: true,
            cancel: CancelToken::new(),
        }
    }
}

/// Statistics from a calculation run
#[derive(Debug, Clone, Default)]
pub struct CalculationStats {
    /// Total number of formula cells that parsed
    pub formula_count: usize,
    /// Number of cells calculated
    pub cells_calculated: usize,
    /// Number of iterations performed (for circular references)
    pub iterations: u32,
    /// Number of formulas involved in or downstream of a cycle
    pub circular_references: usize,
    /// Number of volatile formula cells
    pub volatile_cells: usize,
    /// Number of errors encountered during calculation
    pub errors: usize,
    /// Whether calculation converged (trivially true without cycles)
    pub converged: bool,
    /// Whether the pass was abandoned via the cancel token
    pub cancelled: bool,
}

/// An edited region that invalidates formulas reading it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRange {
    /// Worksheet index
    pub sheet: usize,
    /// Edited cells
    pub range: CellRange,
}

impl DirtyRange {
    /// A single edited cell
    pub fn cell(sheet: usize, row: u32, col: u16) -> Self {
        Self {
            sheet,
            range: CellRange::from_indices(row, col, row, col),
        }
    }

    /// An edited rectangle
    pub fn area(sheet: usize, range: CellRange) -> Self {
        Self { sheet, range }
    }

    fn to_read(self) -> RangeRead {
        RangeRead::area(
            self.sheet,
            self.range.start.row,
            self.range.start.col,
            self.range.end.row,
            self.range.end.col,
        )
    }
}

/// Outcome of a calculation pass
#[derive(Debug, Clone)]
pub struct RecalcResult {
    /// Counters from the pass
    pub stats: CalculationStats,
    /// Bounding range of committed changes per sheet, for rendering
    pub changed: Vec<DirtyRange>,
}

/// Extension trait adding calculation methods to [`Workbook`]
pub trait WorkbookCalculationExt {
    /// Calculate all formulas with default options
    fn calculate(&mut self) -> Result<RecalcResult>;

    /// Calculate all formulas with custom options
    fn calculate_with_options(&mut self, options: &CalculationOptions) -> Result<RecalcResult>;

    /// Recalculate only the formulas affected by the given edits
    /// (their dirty closure), plus volatile formulas
    fn recalculate_dirty(&mut self, dirty: &[DirtyRange]) -> Result<RecalcResult>;
}

impl WorkbookCalculationExt for Workbook {
    fn calculate(&mut self) -> Result<RecalcResult> {
        self.calculate_with_options(&CalculationOptions::default())
    }

    fn calculate_with_options(&mut self, options: &CalculationOptions) -> Result<RecalcResult> {
        CalculationEngine::new(options.clone()).calculate(self)
    }

    fn recalculate_dirty(&mut self, dirty: &[DirtyRange]) -> Result<RecalcResult> {
        let options = CalculationOptions {
            force_full_calculation: false,
            ..Default::default()
        };
        CalculationEngine::new(options).recalculate_dirty(self, dirty)
    }
}

/// Bounding box of committed changes, per sheet
#[derive(Debug, Default)]
struct ChangedBounds {
    bounds: AHashMap<usize, (u32, u16, u32, u16)>,
}

impl ChangedBounds {
    fn mark_cell(&mut self, cell: CellKey) {
        self.mark_area(cell.sheet, cell.row, cell.col, cell.row, cell.col);
    }

    fn mark_area(&mut self, sheet: usize, start_row: u32, start_col: u16, end_row: u32, end_col: u16) {
        let entry = self
            .bounds
            .entry(sheet)
            .or_insert((start_row, start_col, end_row, end_col));
        entry.0 = entry.0.min(start_row);
        entry.1 = entry.1.min(start_col);
        entry.2 = entry.2.max(end_row);
        entry.3 = entry.3.max(end_col);
    }

    fn into_ranges(self) -> Vec<DirtyRange> {
        let mut ranges: Vec<DirtyRange> = self
            .bounds
            .into_iter()
            .map(|(sheet, (r1, c1, r2, c2))| {
                DirtyRange::area(sheet, CellRange::from_indices(r1, c1, r2, c2))
            })
            .collect();
        ranges.sort_by_key(|r| r.sheet);
        ranges
    }
}

/// The calculation engine
///
/// Owns the function registry so callers can register custom functions
/// before running a pass; [`WorkbookCalculationExt`] constructs a fresh
/// engine with the built-in registry per call.
pub struct CalculationEngine {
    options: CalculationOptions,
    registry: FunctionRegistry,
}

impl CalculationEngine {
    /// Create an engine with the built-in function registry
    pub fn new(options: CalculationOptions) -> Self {
        Self {
            options,
            registry: FunctionRegistry::new(),
        }
    }

    /// The function registry, for registering custom functions
    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Full pass: every formula recalculates
    pub fn calculate(&self, workbook: &mut Workbook) -> Result<RecalcResult> {
        self.run(workbook, None)
    }

    /// Incremental pass over the dirty closure of the given edits
    ///
    /// Falls back to a full pass when `force_full_calculation` is set.
    pub fn recalculate_dirty(
        &self,
        workbook: &mut Workbook,
        dirty: &[DirtyRange],
    ) -> Result<RecalcResult> {
        self.run(workbook, Some(dirty))
    }

    fn run(&self, workbook: &mut Workbook, dirty: Option<&[DirtyRange]>) -> Result<RecalcResult> {
        let mut stats = CalculationStats::default();
        let mut changed = ChangedBounds::default();

        // Phase 1: collect and parse formulas into the arena
        let (arena, parse_failures) = self.collect_formulas(workbook, &mut stats);

        for &cell in &parse_failures {
            if let Some(sheet) = workbook.worksheet_mut(cell.sheet) {
                let _ = sheet.set_formula_result(
                    cell.row,
                    cell.col,
                    CellValue::Error(CellError::Name),
                );
            }
            changed.mark_cell(cell);
            stats.errors += 1;
        }

        if arena.is_empty() {
            stats.converged = true;
            return Ok(RecalcResult {
                stats,
                changed: changed.into_ranges(),
            });
        }

        // Phase 2: dependency graph; edges respect spill extents committed
        // by the previous pass
        let graph = {
            let snapshot = &*workbook;
            DependencyGraph::build(&arena, &|cell| {
                snapshot
                    .worksheet(cell.sheet)
                    .and_then(|ws| ws.spill_extent(cell.row, cell.col))
            })
        };

        // Phase 3: topological order and cycle detection
        let (order, cycles) = graph.calculation_order(&arena);
        stats.circular_references = cycles.len();

        // Phase 4: narrow to the dirty closure on incremental passes
        let target: Option<AHashSet<FormulaId>> = match dirty {
            Some(ranges) if !self.options.force_full_calculation => {
                let reads: Vec<RangeRead> = ranges.iter().map(|r| r.to_read()).collect();
                Some(graph.dirty_closure(&arena, &reads, self.options.calculate_volatile))
            }
            _ => None,
        };

        // Phase 5: evaluate and commit
        if cycles.is_empty() || !self.options.iterative {
            self.pass_ordered(
                workbook,
                &arena,
                &order,
                &cycles,
                target.as_ref(),
                &mut stats,
                &mut changed,
            );
        } else {
            self.pass_iterative(workbook, &arena, &order, &cycles, &mut stats, &mut changed);
        }

        Ok(RecalcResult {
            stats,
            changed: changed.into_ranges(),
        })
    }

    /// Parse every formula cell into the arena
    ///
    /// Shared formulas parse once per `(sheet, shared_id)` and reuse the
    /// AST behind an `Arc`; each member keeps its own offset. Unparseable
    /// formulas are reported back so the caller can commit `#NAME?`.
    fn collect_formulas(
        &self,
        workbook: &Workbook,
        stats: &mut CalculationStats,
    ) -> (FormulaArena, Vec<CellKey>) {
        let mut arena = FormulaArena::new();
        let mut failures = Vec::new();
        let mut shared_asts: AHashMap<(usize, u32), Arc<FormulaExpr>> = AHashMap::new();

        for sheet_idx in 0..workbook.sheet_count() {
            let Some(sheet) = workbook.worksheet(sheet_idx) else {
                continue;
            };

            for formula in sheet.formula_cells() {
                let cell = CellKey::new(sheet_idx, formula.row, formula.col);

                let cached = formula
                    .shared_id
                    .and_then(|id| shared_asts.get(&(sheet_idx, id)).cloned());
                let ast = match cached {
                    Some(ast) => ast,
                    None => match parse_formula(formula.text) {
                        Ok(ast) => {
                            let ast = Arc::new(ast);
                            if let Some(id) = formula.shared_id {
                                shared_asts.insert((sheet_idx, id), Arc::clone(&ast));
                            }
                            ast
                        }
                        Err(e) => {
                            log::warn!(
                                "failed to parse formula at sheet {} ({}, {}): {}",
                                sheet_idx,
                                formula.row,
                                formula.col,
                                e
                            );
                            failures.push(cell);
                            continue;
                        }
                    },
                };

                let volatile = contains_volatile(&ast, &self.registry);
                let resolve = |unit: &str, name: &str| {
                    if !unit.is_empty() && unit != workbook.unit_id() {
                        return None;
                    }
                    if name.is_empty() {
                        Some(sheet_idx)
                    } else {
                        workbook.sheet_index(name)
                    }
                };
                let reads = collect_reads(&ast, sheet_idx, formula.shared_offset, &resolve);

                arena.insert(cell, ast, formula.shared_offset, reads, volatile);
                stats.formula_count += 1;
                if volatile {
                    stats.volatile_cells += 1;
                }
            }
        }

        (arena, failures)
    }

    /// One ordered pass; cycle members get `#CYCLE!`
    #[allow(clippy::too_many_arguments)]
    fn pass_ordered(
        &self,
        workbook: &mut Workbook,
        arena: &FormulaArena,
        order: &[FormulaId],
        cycles: &AHashSet<FormulaId>,
        target: Option<&AHashSet<FormulaId>>,
        stats: &mut CalculationStats,
        changed: &mut ChangedBounds,
    ) {
        for &id in order {
            if target.is_some_and(|t| !t.contains(&id)) {
                continue;
            }
            if self.options.cancel.is_cancelled() {
                stats.cancelled = true;
                return;
            }
            self.evaluate_and_commit(workbook, arena, id, stats, changed);
        }

        // Cycle members (and everything downstream of one) commit
        // `#CYCLE!` in cell order
        let mut cycle_ids: Vec<FormulaId> = cycles.iter().copied().collect();
        cycle_ids.sort_by_key(|&id| arena.get(id).cell);
        for id in cycle_ids {
            if target.is_some_and(|t| !t.contains(&id)) {
                continue;
            }
            let cell = arena.get(id).cell;
            if let Some(sheet) = workbook.worksheet_mut(cell.sheet) {
                sheet.clear_spill(cell.row, cell.col);
                let _ =
                    sheet.set_formula_result(cell.row, cell.col, CellValue::Error(CellError::Cycle));
            }
            changed.mark_cell(cell);
            stats.errors += 1;
        }

        stats.iterations = 1;
        stats.converged = cycles.is_empty();
    }

    /// Evaluate one formula against the current workbook state and commit
    /// the result
    fn evaluate_and_commit(
        &self,
        workbook: &mut Workbook,
        arena: &FormulaArena,
        id: FormulaId,
        stats: &mut CalculationStats,
        changed: &mut ChangedBounds,
    ) {
        let record = arena.get(id);
        let cell = record.cell;

        let ctx = EvaluationContext::new(
            Some(workbook),
            cell.sheet,
            cell.row,
            cell.col,
            &self.registry,
        )
        .with_shared_offset(record.offset);
        let result = match evaluate(&record.ast, &ctx) {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    "evaluation error at sheet {} ({}, {}): {}",
                    cell.sheet,
                    cell.row,
                    cell.col,
                    e
                );
                stats.errors += 1;
                FormulaValue::Error(CellError::Value)
            }
        };

        let Some(sheet) = workbook.worksheet_mut(cell.sheet) else {
            return;
        };
        match result {
            FormulaValue::Array(array) => {
                let rows = (array.len() as u32).max(1);
                let cols = array.first().map(|r| r.len() as u16).unwrap_or(1).max(1);
                let cell_array: Vec<Vec<CellValue>> = array
                    .into_iter()
                    .map(|row| row.into_iter().map(Into::into).collect())
                    .collect();

                // Repaint the previous spill extent too; shrinking spills
                // vacate cells
                if let Some((old_rows, old_cols)) = sheet.spill_extent(cell.row, cell.col) {
                    changed.mark_area(
                        cell.sheet,
                        cell.row,
                        cell.col,
                        cell.row + old_rows.saturating_sub(1),
                        cell.col + old_cols.saturating_sub(1),
                    );
                }

                // A blocked spill already stamped #SPILL! on the source
                if sheet
                    .set_array_formula_result(cell.row, cell.col, cell_array)
                    .is_err()
                {
                    stats.errors += 1;
                }
                changed.mark_area(
                    cell.sheet,
                    cell.row,
                    cell.col,
                    cell.row + rows - 1,
                    cell.col + cols - 1,
                );
            }
            value => {
                let new: CellValue = value.into();
                let old = sheet.get_calculated_value_at(cell.row, cell.col);
                sheet.clear_spill(cell.row, cell.col);
                if sheet
                    .set_formula_result(cell.row, cell.col, new.clone())
                    .is_ok()
                    && old.as_ref() != Some(&new)
                {
                    changed.mark_cell(cell);
                }
            }
        }
        stats.cells_calculated += 1;
    }

    /// Fixed-point iteration when cycles exist and `iterative` is set
    ///
    /// The acyclic part keeps its dependency order; cycle members run
    /// after it in cell order. Convergence is measured on the numeric
    /// values of cycle members only.
    fn pass_iterative(
        &self,
        workbook: &mut Workbook,
        arena: &FormulaArena,
        order: &[FormulaId],
        cycles: &AHashSet<FormulaId>,
        stats: &mut CalculationStats,
        changed: &mut ChangedBounds,
    ) {
        let mut sequence: Vec<FormulaId> = order.to_vec();
        let mut cycle_ids: Vec<FormulaId> = cycles.iter().copied().collect();
        cycle_ids.sort_by_key(|&id| arena.get(id).cell);
        sequence.extend(cycle_ids);

        let mut prev_values: AHashMap<CellKey, f64> = AHashMap::new();
        let mut converged = false;

        'passes: for iteration in 0..self.options.max_iterations {
            stats.iterations = iteration + 1;
            let mut max_change: f64 = 0.0;

            for &id in &sequence {
                if self.options.cancel.is_cancelled() {
                    stats.cancelled = true;
                    break 'passes;
                }

                let record = arena.get(id);
                let cell = record.cell;
                let ctx = EvaluationContext::new(
                    Some(workbook),
                    cell.sheet,
                    cell.row,
                    cell.col,
                    &self.registry,
                )
                .with_shared_offset(record.offset);
                let result: CellValue = match evaluate(&record.ast, &ctx) {
                    Ok(value) => value.into(),
                    Err(_) => CellValue::Error(CellError::Value),
                };

                if cycles.contains(&id) {
                    if let CellValue::Number(new_value) = &result {
                        if let Some(&old_value) = prev_values.get(&cell) {
                            max_change = max_change.max((new_value - old_value).abs());
                        }
                        prev_values.insert(cell, *new_value);
                    }
                }

                if let Some(sheet) = workbook.worksheet_mut(cell.sheet) {
                    let _ = sheet.set_formula_result(cell.row, cell.col, result);
                }
                changed.mark_cell(cell);
                if iteration == 0 {
                    stats.cells_calculated += 1;
                }
            }

            // The first pass has no previous values to compare against
            if iteration > 0 && max_change <= self.options.max_change {
                converged = true;
                break;
            }
        }

        stats.converged = converged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn number_at(workbook: &Workbook, sheet: usize, row: u32, col: u16) -> f64 {
        match workbook
            .worksheet(sheet)
            .unwrap()
            .get_calculated_value_at(row, col)
        {
            Some(CellValue::Number(n)) => n,
            other => panic!("expected a number, got {:?}", other),
        }
    }

    fn value_at(workbook: &Workbook, sheet: usize, row: u32, col: u16) -> CellValue {
        workbook
            .worksheet(sheet)
            .unwrap()
            .get_calculated_value_at(row, col)
            .unwrap_or(CellValue::Empty)
    }

    #[test]
    fn test_simple_calculation() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 10.0).unwrap();
        sheet.set_cell_value("A2", 20.0).unwrap();
        sheet.set_formula_at(2, 0, "=A1+A2").unwrap();

        let result = workbook.calculate().unwrap();
        assert_eq!(result.stats.formula_count, 1);
        assert_eq!(result.stats.cells_calculated, 1);
        assert_eq!(result.stats.errors, 0);
        assert_eq!(number_at(&workbook, 0, 2, 0), 30.0);
    }

    #[test]
    fn test_chain_calculates_in_dependency_order() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        // C1 and B1 are set before A1's value, out of dependency order
        sheet.set_formula_at(0, 2, "=B1+1").unwrap();
        sheet.set_formula_at(0, 1, "=A1*2").unwrap();
        sheet.set_cell_value("A1", 5.0).unwrap();

        workbook.calculate().unwrap();
        assert_eq!(number_at(&workbook, 0, 0, 1), 10.0);
        assert_eq!(number_at(&workbook, 0, 0, 2), 11.0);
    }

    #[test]
    fn test_sum_over_range() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        for row in 0..5 {
            sheet.set_cell_value_at(row, 0, (row + 1) as f64).unwrap();
        }
        sheet.set_formula_at(5, 0, "=SUM(A1:A5)").unwrap();

        workbook.calculate().unwrap();
        assert_eq!(number_at(&workbook, 0, 5, 0), 15.0);
    }

    #[test]
    fn test_cycle_commits_cycle_error() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_formula_at(0, 0, "=B1").unwrap();
        sheet.set_formula_at(0, 1, "=A1").unwrap();
        sheet.set_formula_at(0, 2, "=1+1").unwrap();

        let result = workbook.calculate().unwrap();
        assert_eq!(result.stats.circular_references, 2);
        assert!(!result.stats.converged);
        assert_eq!(value_at(&workbook, 0, 0, 0), CellValue::Error(CellError::Cycle));
        assert_eq!(value_at(&workbook, 0, 0, 1), CellValue::Error(CellError::Cycle));
        // The unrelated formula still calculates
        assert_eq!(number_at(&workbook, 0, 0, 2), 2.0);
    }

    #[test]
    fn test_downstream_of_cycle_gets_cycle_error() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_formula_at(0, 0, "=B1").unwrap();
        sheet.set_formula_at(0, 1, "=A1").unwrap();
        sheet.set_formula_at(0, 2, "=A1+1").unwrap();

        workbook.calculate().unwrap();
        assert_eq!(value_at(&workbook, 0, 0, 2), CellValue::Error(CellError::Cycle));
    }

    #[test]
    fn test_iterative_calculation_converges() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        // Mutually dependent contraction with fixed point A1 = B1 = 2
        sheet.set_formula_at(0, 0, "=B1/2+1").unwrap();
        sheet.set_formula_at(0, 1, "=A1/2+1").unwrap();

        let options = CalculationOptions {
            iterative: true,
            ..Default::default()
        };
        let result = workbook.calculate_with_options(&options).unwrap();
        assert!(result.stats.converged);
        assert!(result.stats.iterations > 1);
        assert!((number_at(&workbook, 0, 0, 0) - 2.0).abs() < 0.01);
        assert!((number_at(&workbook, 0, 0, 1) - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_volatile_cells_are_counted() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_formula_at(0, 0, "=RAND()").unwrap();
        sheet.set_formula_at(0, 1, "=1+1").unwrap();

        let result = workbook.calculate().unwrap();
        assert_eq!(result.stats.volatile_cells, 1);
        assert!(matches!(value_at(&workbook, 0, 0, 0), CellValue::Number(_)));
    }

    #[test]
    fn test_cross_sheet_calculation() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet_with_name("Data").unwrap();
        workbook
            .worksheet_by_name_mut("Data")
            .unwrap()
            .set_cell_value("A1", 42.0)
            .unwrap();
        workbook
            .worksheet_mut(0)
            .unwrap()
            .set_formula_at(0, 0, "=Data!A1*2")
            .unwrap();

        workbook.calculate().unwrap();
        assert_eq!(number_at(&workbook, 0, 0, 0), 84.0);
    }

    #[test]
    fn test_parse_failure_commits_name_error() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_formula_at(0, 0, "=1+").unwrap();
        sheet.set_formula_at(0, 1, "=2*3").unwrap();

        let result = workbook.calculate().unwrap();
        assert_eq!(result.stats.errors, 1);
        assert_eq!(value_at(&workbook, 0, 0, 0), CellValue::Error(CellError::Name));
        assert_eq!(number_at(&workbook, 0, 0, 1), 6.0);
    }

    #[test]
    fn test_sequence_spills_column() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_formula_at(0, 0, "=SEQUENCE(3)").unwrap();

        workbook.calculate().unwrap();
        assert_eq!(number_at(&workbook, 0, 0, 0), 1.0);
        assert_eq!(number_at(&workbook, 0, 1, 0), 2.0);
        assert_eq!(number_at(&workbook, 0, 2, 0), 3.0);
    }

    #[test]
    fn test_blocked_spill_sets_spill_error() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_formula_at(0, 0, "=SEQUENCE(3)").unwrap();
        sheet.set_cell_value_at(1, 0, "blocker").unwrap();

        workbook.calculate().unwrap();
        assert_eq!(value_at(&workbook, 0, 0, 0), CellValue::Error(CellError::Spill));
        assert_eq!(
            value_at(&workbook, 0, 1, 0),
            CellValue::String("blocker".into())
        );
    }

    #[test]
    fn test_reader_of_spilled_cell_sees_spilled_value() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_formula_at(0, 0, "=SEQUENCE(3)").unwrap();
        sheet.set_formula_at(0, 1, "=A3*10").unwrap();

        // First pass commits the spill; the second pass has the spill
        // extent in the graph, so the reader orders after the source
        workbook.calculate().unwrap();
        workbook.calculate().unwrap();
        assert_eq!(number_at(&workbook, 0, 0, 1), 30.0);
    }

    #[test]
    fn test_shared_formula_members_shift_relative_references() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 1.0).unwrap();
        sheet.set_cell_value("A2", 2.0).unwrap();
        sheet.set_cell_value("A3", 3.0).unwrap();
        sheet.set_shared_formula_at(0, 1, "=A1*10", 0, (0, 0)).unwrap();
        sheet.set_shared_formula_at(1, 1, "=A1*10", 0, (1, 0)).unwrap();
        sheet.set_shared_formula_at(2, 1, "=A1*10", 0, (2, 0)).unwrap();

        workbook.calculate().unwrap();
        assert_eq!(number_at(&workbook, 0, 0, 1), 10.0);
        assert_eq!(number_at(&workbook, 0, 1, 1), 20.0);
        assert_eq!(number_at(&workbook, 0, 2, 1), 30.0);
    }

    #[test]
    fn test_recalculate_dirty_touches_only_the_closure() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 1.0).unwrap();
        sheet.set_formula_at(0, 1, "=A1*2").unwrap();
        sheet.set_formula_at(0, 2, "=B1+1").unwrap();
        sheet.set_cell_value("D4", 7.0).unwrap();
        sheet.set_formula_at(4, 4, "=D4").unwrap();
        workbook.calculate().unwrap();

        workbook
            .worksheet_mut(0)
            .unwrap()
            .set_cell_value("A1", 5.0)
            .unwrap();
        let result = workbook
            .recalculate_dirty(&[DirtyRange::cell(0, 0, 0)])
            .unwrap();

        assert_eq!(result.stats.cells_calculated, 2);
        assert_eq!(number_at(&workbook, 0, 0, 1), 10.0);
        assert_eq!(number_at(&workbook, 0, 0, 2), 11.0);
        assert_eq!(number_at(&workbook, 0, 4, 4), 7.0);
    }

    #[test]
    fn test_recalculate_dirty_reports_changed_bounds() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 1.0).unwrap();
        sheet.set_formula_at(0, 1, "=A1*2").unwrap();
        sheet.set_formula_at(0, 2, "=B1+1").unwrap();
        workbook.calculate().unwrap();

        workbook
            .worksheet_mut(0)
            .unwrap()
            .set_cell_value("A1", 9.0)
            .unwrap();
        let result = workbook
            .recalculate_dirty(&[DirtyRange::cell(0, 0, 0)])
            .unwrap();

        assert_eq!(result.changed.len(), 1);
        let changed = result.changed[0];
        assert_eq!(changed.sheet, 0);
        // B1 and C1 both changed; the bounding range covers them
        assert_eq!(changed.range, CellRange::from_indices(0, 1, 0, 2));
    }

    #[test]
    fn test_unchanged_results_report_no_changes() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 1.0).unwrap();
        sheet.set_formula_at(0, 1, "=A1*2").unwrap();
        workbook.calculate().unwrap();

        // Recalculating against the same inputs commits the same value
        let result = workbook
            .recalculate_dirty(&[DirtyRange::cell(0, 0, 0)])
            .unwrap();
        assert_eq!(result.stats.cells_calculated, 1);
        assert!(result.changed.is_empty());
    }

    #[test]
    fn test_cancelled_pass_commits_nothing() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 1.0).unwrap();
        sheet.set_formula_at(0, 1, "=A1*2").unwrap();

        let options = CalculationOptions::default();
        options.cancel.cancel();
        let result = workbook.calculate_with_options(&options).unwrap();

        assert!(result.stats.cancelled);
        assert_eq!(result.stats.cells_calculated, 0);
        // No result was committed to the formula cell
        assert!(!matches!(value_at(&workbook, 0, 0, 1), CellValue::Number(_)));
    }

    #[test]
    fn test_full_recalculation_is_deterministic() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 3.0).unwrap();
        sheet.set_formula_at(0, 1, "=A1^2").unwrap();
        sheet.set_formula_at(0, 2, "=B1+A1").unwrap();

        workbook.calculate().unwrap();
        let first = (number_at(&workbook, 0, 0, 1), number_at(&workbook, 0, 0, 2));
        workbook.calculate().unwrap();
        let second = (number_at(&workbook, 0, 0, 1), number_at(&workbook, 0, 0, 2));
        assert_eq!(first, second);
    }
}
