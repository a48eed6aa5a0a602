//! Cell address and bounded range types
//!
//! [`CellAddress`] and [`CellRange`] cover the fully-bounded cases the
//! storage and dependency layers work with. Unbounded row/column forms
//! (`A:K`, `6:11`) live in [`crate::reference`] as `GridRange`.

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// A cell address (e.g., "A1", "$B$2")
///
/// Column letters run A-XFD, rows 1-1048576. A `$` prefix on either part
/// makes that part absolute: it does not shift when the formula is filled
/// to another cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    /// Row index (0-based internally, 1-based in display)
    pub row: u32,
    /// Column index (0-based, A=0, B=1, ..., XFD=16383)
    pub col: u16,
    /// Whether the row reference is absolute ($)
    pub row_absolute: bool,
    /// Whether the column reference is absolute ($)
    pub col_absolute: bool,
}

impl CellAddress {
    /// Create a new cell address with relative references
    pub fn new(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_absolute: false,
            col_absolute: false,
        }
    }

    /// Create a new cell address with specified absolute/relative flags
    pub fn with_absolute(row: u32, col: u16, row_absolute: bool, col_absolute: bool) -> Self {
        Self {
            row,
            col,
            row_absolute,
            col_absolute,
        }
    }

    /// Create an absolute cell address ($A$1 style)
    pub fn absolute(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_absolute: true,
            col_absolute: true,
        }
    }

    /// Parse a cell address from A1-style notation
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (col, row, col_absolute, row_absolute) = split_a1(s)?;
        if row >= MAX_ROWS {
            return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
        }
        Ok(Self {
            row,
            col,
            row_absolute,
            col_absolute,
        })
    }

    /// Convert column index to letters (0 = A, 25 = Z, 26 = AA, etc.)
    pub fn column_to_letters(col: u16) -> String {
        let mut result = String::new();
        let mut n = col as u32 + 1; // 1-based for calculation

        while n > 0 {
            n -= 1;
            let c = ((n % 26) as u8 + b'A') as char;
            result.insert(0, c);
            n /= 26;
        }

        result
    }

    /// Convert column letters to index (A = 0, Z = 25, AA = 26, etc.)
    pub fn letters_to_column(letters: &str) -> Result<u16> {
        if letters.is_empty() {
            return Err(Error::InvalidAddress("empty column letters".into()));
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(Error::InvalidAddress(format!(
                    "invalid column letter '{}'",
                    c
                )));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }

        let col = col - 1; // Convert to 0-based

        if col >= MAX_COLS as u32 {
            return Err(Error::ColumnOutOfBounds(col as u16, MAX_COLS - 1));
        }

        Ok(col as u16)
    }

    /// Format as A1-style string, re-inserting `$` markers
    pub fn to_a1_string(&self) -> String {
        let mut result = String::new();

        if self.col_absolute {
            result.push('$');
        }
        result.push_str(&Self::column_to_letters(self.col));

        if self.row_absolute {
            result.push('$');
        }
        result.push_str(&(self.row + 1).to_string());

        result
    }

    /// Shift this address by (rows, cols), leaving absolute parts fixed.
    ///
    /// Used to resolve shared-formula members: the anchor's references are
    /// shifted by the member's stored offset. A shift that leaves the grid
    /// returns `None`, which evaluation surfaces as `#REF!`.
    pub fn offset(&self, rows: i64, cols: i64) -> Option<Self> {
        let row = if self.row_absolute {
            self.row
        } else {
            let r = self.row as i64 + rows;
            if r < 0 || r >= MAX_ROWS as i64 {
                return None;
            }
            r as u32
        };
        let col = if self.col_absolute {
            self.col
        } else {
            let c = self.col as i64 + cols;
            if c < 0 || c >= MAX_COLS as i64 {
                return None;
            }
            c as u16
        };
        Some(Self {
            row,
            col,
            row_absolute: self.row_absolute,
            col_absolute: self.col_absolute,
        })
    }

    /// Create a range from this address to another
    pub fn to(&self, other: CellAddress) -> CellRange {
        CellRange::new(*self, other)
    }
}

/// Split an A1-style token into (col, row, col_absolute, row_absolute)
fn split_a1(s: &str) -> Result<(u16, u32, bool, bool)> {
    if s.is_empty() {
        return Err(Error::InvalidAddress("empty address".into()));
    }

    let mut chars = s.char_indices().peekable();

    let col_absolute = matches!(chars.peek(), Some((_, '$')));
    if col_absolute {
        chars.next();
    }

    let letters_start = chars.peek().map(|(i, _)| *i).unwrap_or(s.len());
    let mut letters_end = letters_start;
    while let Some((i, c)) = chars.peek().copied() {
        if c.is_ascii_alphabetic() {
            letters_end = i + c.len_utf8();
            chars.next();
        } else {
            break;
        }
    }
    if letters_end == letters_start {
        return Err(Error::InvalidAddress(format!("no column letters in '{}'", s)));
    }
    let col = CellAddress::letters_to_column(&s[letters_start..letters_end])?;

    let row_absolute = matches!(chars.peek(), Some((_, '$')));
    if row_absolute {
        chars.next();
    }

    let digits_start = chars.peek().map(|(i, _)| *i).unwrap_or(s.len());
    let digits = &s[digits_start..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidAddress(format!("invalid row number in '{}'", s)));
    }

    let row: u32 = digits
        .parse()
        .map_err(|_| Error::InvalidAddress(format!("invalid row number in '{}'", s)))?;
    if row == 0 {
        return Err(Error::InvalidAddress(format!(
            "row number must be >= 1 in '{}'",
            s
        )));
    }

    // Excel rows are 1-based, we use 0-based internally
    Ok((col, row - 1, col_absolute, row_absolute))
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A bounded range of cells (e.g., "A1:B10")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// Start address (top-left)
    pub start: CellAddress,
    /// End address (bottom-right)
    pub end: CellAddress,
}

impl CellRange {
    /// Create a new cell range, normalized so start is top-left
    pub fn new(start: CellAddress, end: CellAddress) -> Self {
        let (start_row, end_row) = if start.row <= end.row {
            (start.row, end.row)
        } else {
            (end.row, start.row)
        };

        let (start_col, end_col) = if start.col <= end.col {
            (start.col, end.col)
        } else {
            (end.col, start.col)
        };

        Self {
            start: CellAddress::with_absolute(
                start_row,
                start_col,
                start.row_absolute,
                start.col_absolute,
            ),
            end: CellAddress::with_absolute(end_row, end_col, end.row_absolute, end.col_absolute),
        }
    }

    /// Create a range from row/column indices
    pub fn from_indices(start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> Self {
        Self::new(
            CellAddress::new(start_row, start_col),
            CellAddress::new(end_row, end_col),
        )
    }

    /// Create a single-cell range
    pub fn single(addr: CellAddress) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    /// Parse a range from A1:B10 notation
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some(colon_pos) = s.find(':') {
            let start = CellAddress::parse(&s[..colon_pos])?;
            let end = CellAddress::parse(&s[colon_pos + 1..])?;
            Ok(Self::new(start, end))
        } else {
            let addr = CellAddress::parse(s)?;
            Ok(Self::single(addr))
        }
    }

    /// Check if a cell is within this range
    pub fn contains(&self, addr: &CellAddress) -> bool {
        addr.row >= self.start.row
            && addr.row <= self.end.row
            && addr.col >= self.start.col
            && addr.col <= self.end.col
    }

    /// Get the number of rows in the range
    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    /// Get the number of columns in the range
    pub fn col_count(&self) -> u16 {
        self.end.col - self.start.col + 1
    }

    /// Get the total number of cells in the range
    pub fn cell_count(&self) -> u64 {
        self.row_count() as u64 * self.col_count() as u64
    }

    /// Check if this range overlaps with another
    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.start.row <= other.end.row
            && self.end.row >= other.start.row
            && self.start.col <= other.end.col
            && self.end.col >= other.start.col
    }

    /// Get the intersection of two ranges, if any
    pub fn intersect(&self, other: &CellRange) -> Option<CellRange> {
        if !self.overlaps(other) {
            return None;
        }

        Some(CellRange::from_indices(
            self.start.row.max(other.start.row),
            self.start.col.max(other.start.col),
            self.end.row.min(other.end.row),
            self.end.col.min(other.end.col),
        ))
    }

    /// Smallest range covering both operands
    pub fn union(&self, other: &CellRange) -> CellRange {
        CellRange::from_indices(
            self.start.row.min(other.start.row),
            self.start.col.min(other.start.col),
            self.end.row.max(other.end.row),
            self.end.col.max(other.end.col),
        )
    }

    /// Iterate over all cell addresses in the range (row by row)
    pub fn cells(&self) -> CellRangeIterator {
        CellRangeIterator {
            range: *self,
            current_row: self.start.row,
            current_col: self.start.col,
        }
    }

    /// Format as A1:B10 string
    pub fn to_a1_string(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            format!("{}:{}", self.start.to_a1_string(), self.end.to_a1_string())
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Iterator over cells in a range
pub struct CellRangeIterator {
    range: CellRange,
    current_row: u32,
    current_col: u16,
}

impl Iterator for CellRangeIterator {
    type Item = CellAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row > self.range.end.row {
            return None;
        }

        let addr = CellAddress::new(self.current_row, self.current_col);

        self.current_col += 1;
        if self.current_col > self.range.end.col {
            self.current_col = self.range.start.col;
            self.current_row += 1;
        }

        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.range.cell_count() as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CellRangeIterator {}
