//! Named range definitions
//!
//! Named ranges assign meaningful names to cells, ranges, or constants:
//!
//! ```text
//! workbook.define_name("TaxRate", "Sheet1!$B$1")?;
//! =Price * TaxRate
//! ```

use ahash::AHashMap;

/// Scope of a named range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameScope {
    /// Available throughout the workbook (global)
    Workbook,
    /// Scoped to a specific sheet (local)
    Sheet(usize),
}

impl NameScope {
    fn key(&self) -> Option<usize> {
        match self {
            NameScope::Workbook => None,
            NameScope::Sheet(idx) => Some(*idx),
        }
    }
}

/// A named range definition
///
/// The `refers_to` text can be a reference (`Sheet1!$A$1:$D$10`), a
/// constant (`0.0725`), or a formula expression (`=SUM(A1:A10)`).
#[derive(Debug, Clone)]
pub struct NamedRange {
    /// The name (case-insensitive, like Excel)
    pub name: String,
    /// Scope of this name (workbook-wide or sheet-specific)
    pub scope: NameScope,
    /// What the name refers to
    pub refers_to: String,
}

impl NamedRange {
    /// Create a new named range
    pub fn new(name: impl Into<String>, refers_to: impl Into<String>, scope: NameScope) -> Self {
        Self {
            name: name.into(),
            scope,
            refers_to: refers_to.into(),
        }
    }

    /// Create a workbook-scoped named range
    pub fn workbook_scope(name: impl Into<String>, refers_to: impl Into<String>) -> Self {
        Self::new(name, refers_to, NameScope::Workbook)
    }

    /// Create a sheet-scoped named range
    pub fn sheet_scope(
        name: impl Into<String>,
        refers_to: impl Into<String>,
        sheet_index: usize,
    ) -> Self {
        Self::new(name, refers_to, NameScope::Sheet(sheet_index))
    }

    /// Check if the refers_to is a formula (starts with =)
    pub fn is_formula(&self) -> bool {
        self.refers_to.starts_with('=')
    }

    /// Get the refers_to expression without the leading = if it's a formula
    pub fn expression(&self) -> &str {
        self.refers_to.strip_prefix('=').unwrap_or(&self.refers_to)
    }
}

/// Collection of named ranges with case-insensitive lookup
#[derive(Debug, Default, Clone)]
pub struct NamedRangeCollection {
    /// Keyed by (lowercase name, sheet scope); `None` scope = workbook
    ranges: AHashMap<(String, Option<usize>), NamedRange>,
}

impl NamedRangeCollection {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a new named range
    ///
    /// Returns an error if a name with the same scope already exists
    pub fn define(&mut self, range: NamedRange) -> Result<(), String> {
        let key = (range.name.to_lowercase(), range.scope.key());
        if self.ranges.contains_key(&key) {
            return Err(format!(
                "Named range '{}' already exists in this scope",
                range.name
            ));
        }
        self.ranges.insert(key, range);
        Ok(())
    }

    /// Define or update a named range
    pub fn define_or_update(&mut self, range: NamedRange) {
        let key = (range.name.to_lowercase(), range.scope.key());
        self.ranges.insert(key, range);
    }

    /// Get a named range by name and current sheet context
    ///
    /// Excel's scoping rules: a sheet-scoped name for the current sheet
    /// shadows a workbook-scoped one.
    pub fn get(&self, name: &str, current_sheet: usize) -> Option<&NamedRange> {
        let lower = name.to_lowercase();
        self.ranges
            .get(&(lower.clone(), Some(current_sheet)))
            .or_else(|| self.ranges.get(&(lower, None)))
    }

    /// Get a named range by exact scope
    pub fn get_exact(&self, name: &str, scope: &NameScope) -> Option<&NamedRange> {
        self.ranges.get(&(name.to_lowercase(), scope.key()))
    }

    /// Remove a named range
    pub fn remove(&mut self, name: &str, scope: &NameScope) -> Option<NamedRange> {
        self.ranges.remove(&(name.to_lowercase(), scope.key()))
    }

    /// Check if a name exists in the given scope
    pub fn contains(&self, name: &str, scope: &NameScope) -> bool {
        self.ranges
            .contains_key(&(name.to_lowercase(), scope.key()))
    }

    /// Iterate over all named ranges
    pub fn iter(&self) -> impl Iterator<Item = &NamedRange> {
        self.ranges.values()
    }

    /// Get the number of named ranges
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if the collection is empty
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
