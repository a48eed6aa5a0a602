//! Dependency tracking for formula calculation
//!
//! Parsed formulas live in a [`FormulaArena`] addressed by stable integer
//! ids; shared formulas hold one AST behind an `Arc` and differ only in
//! their anchor cell and offset. The [`DependencyGraph`] connects writer
//! to reader by range overlap: an edge A -> B exists when B reads a range
//! that covers A's output cell (or its committed spill extent).

use crate::ast::FormulaExpr;
use ahash::{AHashMap, AHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Unique key for a cell (sheet index + coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellKey {
    /// Create a new cell key
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }
}

/// Stable id of a formula record in its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormulaId(u32);

impl FormulaId {
    /// Index into the arena's record table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A rectangular region a formula reads, resolved to concrete bounds
///
/// Unbounded axes are clamped to the full sheet extent before they get
/// here; overlap tests never see `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRead {
    pub sheet: usize,
    pub start_row: u32,
    pub start_col: u16,
    pub end_row: u32,
    pub end_col: u16,
}

impl RangeRead {
    /// A read of a single cell
    pub fn cell(key: CellKey) -> Self {
        Self {
            sheet: key.sheet,
            start_row: key.row,
            start_col: key.col,
            end_row: key.row,
            end_col: key.col,
        }
    }

    /// A read of a rectangle on one sheet
    pub fn area(sheet: usize, start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> Self {
        Self {
            sheet,
            start_row,
            start_col,
            end_row,
            end_col,
        }
    }

    /// Whether this read covers the given cell
    pub fn contains(&self, key: CellKey) -> bool {
        self.sheet == key.sheet
            && self.start_row <= key.row
            && key.row <= self.end_row
            && self.start_col <= key.col
            && key.col <= self.end_col
    }

    /// Whether two reads overlap
    pub fn intersects(&self, other: &RangeRead) -> bool {
        self.sheet == other.sheet
            && self.start_row <= other.end_row
            && other.start_row <= self.end_row
            && self.start_col <= other.end_col
            && other.start_col <= self.end_col
    }
}

/// One formula in the arena
#[derive(Debug, Clone)]
pub struct FormulaRecord {
    pub id: FormulaId,
    /// Anchor cell the formula writes to
    pub cell: CellKey,
    /// Parsed AST, shared between `si`-related cells
    pub ast: Arc<FormulaExpr>,
    /// Shared-formula offset applied to relative references
    pub offset: (i64, i64),
    /// Ranges this formula reads
    pub reads: Vec<RangeRead>,
    /// Recalculates on every pass regardless of dirtiness
    pub volatile: bool,
}

/// Arena of parsed formula records with a cell index
#[derive(Debug, Default)]
pub struct FormulaArena {
    records: Vec<FormulaRecord>,
    index: AHashMap<CellKey, FormulaId>,
}

impl FormulaArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a formula record, returning its id
    ///
    /// A second insert at the same cell replaces the index entry; the old
    /// record stays allocated but unreachable (arenas are rebuilt per
    /// calculation pass, not edited in place).
    pub fn insert(
        &mut self,
        cell: CellKey,
        ast: Arc<FormulaExpr>,
        offset: (i64, i64),
        reads: Vec<RangeRead>,
        volatile: bool,
    ) -> FormulaId {
        let id = FormulaId(self.records.len() as u32);
        self.records.push(FormulaRecord {
            id,
            cell,
            ast,
            offset,
            reads,
            volatile,
        });
        self.index.insert(cell, id);
        id
    }

    /// Get a record by id
    pub fn get(&self, id: FormulaId) -> &FormulaRecord {
        &self.records[id.index()]
    }

    /// Find the formula anchored at a cell
    pub fn id_at(&self, cell: CellKey) -> Option<FormulaId> {
        self.index.get(&cell).copied()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the arena is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all records in insertion order
    pub fn records(&self) -> impl Iterator<Item = &FormulaRecord> {
        self.records.iter()
    }
}

/// Collect the ranges a formula reads
///
/// Relative references shift by the shared-formula `offset`; absolute
/// endpoints stay pinned. Unbounded column/row ranges clamp to the full
/// sheet extent. `resolve_sheet` maps `(unit_id, sheet_name)` qualifiers
/// to sheet indices; unresolvable qualifiers contribute no read (the
/// evaluator surfaces `#REF!` for them). Defined names contribute no
/// direct reads; edits behind a name need a full recalculation.
pub fn collect_reads(
    expr: &FormulaExpr,
    anchor_sheet: usize,
    offset: (i64, i64),
    resolve_sheet: &dyn Fn(&str, &str) -> Option<usize>,
) -> Vec<RangeRead> {
    let mut reads = Vec::new();
    walk_reads(expr, anchor_sheet, offset, resolve_sheet, &mut reads);
    reads
}

fn walk_reads(
    expr: &FormulaExpr,
    anchor_sheet: usize,
    offset: (i64, i64),
    resolve_sheet: &dyn Fn(&str, &str) -> Option<usize>,
    out: &mut Vec<RangeRead>,
) {
    match expr {
        FormulaExpr::CellRef(r)
        | FormulaExpr::RangeRef(r)
        | FormulaExpr::ColumnRef(r)
        | FormulaExpr::RowRef(r) => {
            let sheet = if r.sheet_name.is_empty() && r.unit_id.is_empty() {
                Some(anchor_sheet)
            } else {
                resolve_sheet(&r.unit_id, &r.sheet_name)
            };
            let Some(sheet) = sheet else { return };
            let Some(shifted) = r.range.offset(offset.0, offset.1) else {
                return;
            };
            if let Some(cells) = shifted.to_cell_range() {
                out.push(RangeRead::area(
                    sheet,
                    cells.start.row,
                    cells.start.col,
                    cells.end.row,
                    cells.end.col,
                ));
            }
        }

        FormulaExpr::BinaryOp { left, right, .. } => {
            walk_reads(left, anchor_sheet, offset, resolve_sheet, out);
            walk_reads(right, anchor_sheet, offset, resolve_sheet, out);
        }
        FormulaExpr::UnaryOp { operand, .. } => {
            walk_reads(operand, anchor_sheet, offset, resolve_sheet, out);
        }
        FormulaExpr::Function { args, .. } => {
            for arg in args {
                walk_reads(arg, anchor_sheet, offset, resolve_sheet, out);
            }
        }
        FormulaExpr::Array(rows) => {
            for row in rows {
                for element in row {
                    walk_reads(element, anchor_sheet, offset, resolve_sheet, out);
                }
            }
        }
        FormulaExpr::Union(items) => {
            for item in items {
                walk_reads(item, anchor_sheet, offset, resolve_sheet, out);
            }
        }
        FormulaExpr::Lambda { body, .. } => {
            walk_reads(body, anchor_sheet, offset, resolve_sheet, out);
        }
        FormulaExpr::Call { callee, args } => {
            walk_reads(callee, anchor_sheet, offset, resolve_sheet, out);
            for arg in args {
                walk_reads(arg, anchor_sheet, offset, resolve_sheet, out);
            }
        }

        FormulaExpr::Number(_)
        | FormulaExpr::String(_)
        | FormulaExpr::Boolean(_)
        | FormulaExpr::Error(_)
        | FormulaExpr::NameRef(_) => {}
    }
}

/// Dependency graph over an arena, built once per calculation pass
#[derive(Debug)]
pub struct DependencyGraph {
    /// Edges id -> formulas that read id's output
    dependents: Vec<Vec<FormulaId>>,
    /// Edges id -> formulas whose output id reads
    precedents: Vec<Vec<FormulaId>>,
}

impl DependencyGraph {
    /// Build the graph by read/output overlap
    ///
    /// `spill_extent` reports the committed spill size (rows, cols) of a
    /// source cell from the previous calculation, so reads of a spilled
    /// region also depend on the source formula.
    pub fn build(arena: &FormulaArena, spill_extent: &dyn Fn(CellKey) -> Option<(u32, u16)>) -> Self {
        let n = arena.len();
        let mut dependents = vec![Vec::new(); n];
        let mut precedents = vec![Vec::new(); n];

        let outputs: Vec<RangeRead> = arena
            .records()
            .map(|record| {
                let (rows, cols) = spill_extent(record.cell).unwrap_or((1, 1));
                RangeRead::area(
                    record.cell.sheet,
                    record.cell.row,
                    record.cell.col,
                    record.cell.row + rows.saturating_sub(1),
                    record.cell.col + cols.saturating_sub(1),
                )
            })
            .collect();

        for reader in arena.records() {
            for read in &reader.reads {
                for (writer_idx, output) in outputs.iter().enumerate() {
                    if writer_idx == reader.id.index() {
                        continue;
                    }
                    if read.intersects(output) {
                        let writer = FormulaId(writer_idx as u32);
                        if !dependents[writer_idx].contains(&reader.id) {
                            dependents[writer_idx].push(reader.id);
                            precedents[reader.id.index()].push(writer);
                        }
                    }
                }
            }
        }

        Self {
            dependents,
            precedents,
        }
    }

    /// Formulas that read the given formula's output
    pub fn dependents_of(&self, id: FormulaId) -> &[FormulaId] {
        &self.dependents[id.index()]
    }

    /// Formulas whose output the given formula reads
    pub fn precedents_of(&self, id: FormulaId) -> &[FormulaId] {
        &self.precedents[id.index()]
    }

    /// Deterministic topological order plus the set of unorderable formulas
    ///
    /// Dependencies come first; ties break by (sheet, row, column) of the
    /// anchor cell. The returned set holds every formula in a cycle and
    /// everything downstream of one; callers commit `#CYCLE!` for those.
    pub fn calculation_order(&self, arena: &FormulaArena) -> (Vec<FormulaId>, AHashSet<FormulaId>) {
        let n = arena.len();
        let mut in_degree: Vec<usize> = (0..n).map(|i| self.precedents[i].len()).collect();

        let mut ready = BinaryHeap::new();
        for record in arena.records() {
            if in_degree[record.id.index()] == 0 {
                ready.push(Reverse((record.cell, record.id)));
            }
        }

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse((_, id))) = ready.pop() {
            order.push(id);
            for &dependent in &self.dependents[id.index()] {
                let degree = &mut in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse((arena.get(dependent).cell, dependent)));
                }
            }
        }

        let mut cycles = AHashSet::new();
        if order.len() < n {
            let ordered: AHashSet<FormulaId> = order.iter().copied().collect();
            for record in arena.records() {
                if !ordered.contains(&record.id) {
                    cycles.insert(record.id);
                }
            }
        }
        (order, cycles)
    }

    /// Formulas affected by edits to the given ranges, plus transitive
    /// dependents
    ///
    /// Seeds are formulas whose reads intersect a dirty range, formulas
    /// anchored inside a dirty range (the edit may have replaced them),
    /// and, when `include_volatile` is set, every volatile formula.
    pub fn dirty_closure(
        &self,
        arena: &FormulaArena,
        dirty: &[RangeRead],
        include_volatile: bool,
    ) -> AHashSet<FormulaId> {
        let mut affected = AHashSet::new();
        let mut queue = Vec::new();

        for record in arena.records() {
            let seeded = (include_volatile && record.volatile)
                || dirty.iter().any(|d| d.contains(record.cell))
                || record
                    .reads
                    .iter()
                    .any(|read| dirty.iter().any(|d| d.intersects(read)));
            if seeded && affected.insert(record.id) {
                queue.push(record.id);
            }
        }

        while let Some(id) = queue.pop() {
            for &dependent in &self.dependents[id.index()] {
                if affected.insert(dependent) {
                    queue.push(dependent);
                }
            }
        }
        affected
    }
}
