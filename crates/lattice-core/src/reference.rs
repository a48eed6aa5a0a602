//! A1-style reference grammar
//!
//! Serialization and deserialization of range references as they appear in
//! formula text: `A5:B10`, `$A$5`, column-only `A:K`, row-only `6:11`,
//! sheet-qualified `Sheet1!A1`, quoted `'My Sheet'!A1`, and
//! workbook-qualified `[Book1]Sheet1!A1` forms.
//!
//! Unbounded endpoints are modeled as `None`: a column range `A:K` has
//! `None` rows, a row range `10:100` has `None` columns. These survive the
//! whole pipeline untouched; only resolution against a concrete sheet
//! clamps them.
//!
//! Malformed reference text degrades to [`GridRange::EMPTY`] rather than
//! an error. Callers that need a hard failure check [`GridRange::is_empty`]
//! and surface `#REF!`.

use crate::cell::{CellAddress, CellRange};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;

/// The shape of a range reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RangeType {
    /// A bounded rectangle: `A6:K11` or a single cell
    #[default]
    Normal,
    /// Whole rows: `6:11`
    Row,
    /// Whole columns: `A:K`
    Column,
    /// The entire sheet
    All,
}

/// Which parts of a reference endpoint carry a `$` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AbsoluteRefType {
    /// `A4` - fully relative
    #[default]
    None,
    /// `A$4` - row fixed
    Row,
    /// `$A4` - column fixed
    Column,
    /// `$A$4` - both fixed
    All,
}

impl AbsoluteRefType {
    fn from_flags(col_abs: bool, row_abs: bool) -> Self {
        match (col_abs, row_abs) {
            (true, true) => AbsoluteRefType::All,
            (true, false) => AbsoluteRefType::Column,
            (false, true) => AbsoluteRefType::Row,
            (false, false) => AbsoluteRefType::None,
        }
    }

    /// Whether the column part is fixed
    pub fn col_fixed(&self) -> bool {
        matches!(self, AbsoluteRefType::Column | AbsoluteRefType::All)
    }

    /// Whether the row part is fixed
    pub fn row_fixed(&self) -> bool {
        matches!(self, AbsoluteRefType::Row | AbsoluteRefType::All)
    }
}

/// A range as written in a reference, bounds optional
///
/// All indices are 0-based. `None` marks an unbounded endpoint: column
/// ranges have no rows, row ranges have no columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridRange {
    /// First row, or `None` for a column-only range
    pub start_row: Option<u32>,
    /// First column, or `None` for a row-only range
    pub start_col: Option<u16>,
    /// Last row (inclusive), or `None` for a column-only range
    pub end_row: Option<u32>,
    /// Last column (inclusive), or `None` for a row-only range
    pub end_col: Option<u16>,
    /// Shape of the reference
    pub range_type: RangeType,
    /// `$` markers on the start endpoint
    pub start_abs: AbsoluteRefType,
    /// `$` markers on the end endpoint
    pub end_abs: AbsoluteRefType,
}

impl GridRange {
    /// The degenerate range malformed input degrades to
    pub const EMPTY: GridRange = GridRange {
        start_row: None,
        start_col: None,
        end_row: None,
        end_col: None,
        range_type: RangeType::Normal,
        start_abs: AbsoluteRefType::None,
        end_abs: AbsoluteRefType::None,
    };

    /// A bounded rectangle
    pub fn cells(start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> Self {
        GridRange {
            start_row: Some(start_row),
            start_col: Some(start_col),
            end_row: Some(end_row),
            end_col: Some(end_col),
            range_type: RangeType::Normal,
            start_abs: AbsoluteRefType::None,
            end_abs: AbsoluteRefType::None,
        }
    }

    /// A single cell
    pub fn single(row: u32, col: u16) -> Self {
        Self::cells(row, col, row, col)
    }

    /// Whole columns, rows unbounded
    pub fn columns(start_col: u16, end_col: u16) -> Self {
        GridRange {
            start_row: None,
            start_col: Some(start_col),
            end_row: None,
            end_col: Some(end_col),
            range_type: RangeType::Column,
            start_abs: AbsoluteRefType::None,
            end_abs: AbsoluteRefType::None,
        }
    }

    /// Whole rows, columns unbounded
    pub fn rows(start_row: u32, end_row: u32) -> Self {
        GridRange {
            start_row: Some(start_row),
            start_col: None,
            end_row: Some(end_row),
            end_col: None,
            range_type: RangeType::Row,
            start_abs: AbsoluteRefType::None,
            end_abs: AbsoluteRefType::None,
        }
    }

    /// True for the degenerate range produced from malformed input
    pub fn is_empty(&self) -> bool {
        self.start_row.is_none()
            && self.start_col.is_none()
            && self.end_row.is_none()
            && self.end_col.is_none()
    }

    /// True when the range denotes exactly one cell
    pub fn is_single_cell(&self) -> bool {
        self.range_type == RangeType::Normal
            && self.start_row.is_some()
            && self.start_row == self.end_row
            && self.start_col == self.end_col
    }

    /// Clamp unbounded endpoints to the full sheet extent
    ///
    /// Returns `None` for the empty range.
    pub fn to_cell_range(&self) -> Option<CellRange> {
        if self.is_empty() {
            return None;
        }
        let start_row = self.start_row.unwrap_or(0);
        let end_row = self.end_row.unwrap_or(MAX_ROWS - 1);
        let start_col = self.start_col.unwrap_or(0);
        let end_col = self.end_col.unwrap_or(MAX_COLS - 1);
        Some(CellRange::from_indices(
            start_row, start_col, end_row, end_col,
        ))
    }

    /// Shift relative bounds by (rows, cols); absolute parts stay fixed
    ///
    /// Returns `None` if any relative bound leaves the grid.
    pub fn offset(&self, rows: i64, cols: i64) -> Option<GridRange> {
        fn shift_row(bound: Option<u32>, fixed: bool, by: i64) -> Option<Option<u32>> {
            match bound {
                None => Some(None),
                Some(v) if fixed => Some(Some(v)),
                Some(v) => {
                    let shifted = v as i64 + by;
                    if shifted < 0 || shifted >= MAX_ROWS as i64 {
                        None
                    } else {
                        Some(Some(shifted as u32))
                    }
                }
            }
        }
        fn shift_col(bound: Option<u16>, fixed: bool, by: i64) -> Option<Option<u16>> {
            match bound {
                None => Some(None),
                Some(v) if fixed => Some(Some(v)),
                Some(v) => {
                    let shifted = v as i64 + by;
                    if shifted < 0 || shifted >= MAX_COLS as i64 {
                        None
                    } else {
                        Some(Some(shifted as u16))
                    }
                }
            }
        }

        Some(GridRange {
            start_row: shift_row(self.start_row, self.start_abs.row_fixed(), rows)?,
            start_col: shift_col(self.start_col, self.start_abs.col_fixed(), cols)?,
            end_row: shift_row(self.end_row, self.end_abs.row_fixed(), rows)?,
            end_col: shift_col(self.end_col, self.end_abs.col_fixed(), cols)?,
            range_type: self.range_type,
            start_abs: self.start_abs,
            end_abs: self.end_abs,
        })
    }
}

impl fmt::Display for GridRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serialize_range(self))
    }
}

/// A range qualified by workbook and sheet
///
/// Empty `unit_id` / `sheet_name` mean "the current context": a bare
/// `A1:B2` deserializes with both empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SheetRange {
    /// Workbook identity from a `[unitId]` prefix, or empty
    pub unit_id: String,
    /// Sheet name from a `sheet!` prefix (unquoted), or empty
    pub sheet_name: String,
    /// The range itself
    pub range: GridRange,
}

impl SheetRange {
    /// A range with no workbook or sheet qualifier
    pub fn local(range: GridRange) -> Self {
        SheetRange {
            unit_id: String::new(),
            sheet_name: String::new(),
            range,
        }
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serialize_range_to_ref_string(self))
    }
}

/// Classify the `$` markers in a single endpoint token like `$A$4`
pub fn absolute_ref_type(token: &str) -> AbsoluteRefType {
    let (col_abs, row_abs) = endpoint_abs_flags(token);
    AbsoluteRefType::from_flags(col_abs, row_abs)
}

fn endpoint_abs_flags(token: &str) -> (bool, bool) {
    let bytes = token.as_bytes();
    let mut col_abs = false;
    let mut row_abs = false;
    let mut i = 0;
    if bytes.first() == Some(&b'$') {
        // Leading $ binds to whichever part follows
        match bytes.get(1) {
            Some(b) if b.is_ascii_alphabetic() => col_abs = true,
            Some(b) if b.is_ascii_digit() => row_abs = true,
            _ => {}
        }
        i = 1;
    }
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) {
            row_abs = true;
        }
        i += 1;
    }
    (col_abs, row_abs)
}

/// One endpoint of a range: column and/or row, with `$` markers
#[derive(Debug, Clone, Copy)]
struct Endpoint {
    col: Option<u16>,
    row: Option<u32>,
    abs: AbsoluteRefType,
}

/// Parse one endpoint token: `A`, `4`, `A4`, `$A$4`, `$4`, `$A`
fn parse_endpoint(token: &str) -> Option<Endpoint> {
    let bytes = token.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let mut i = 0;
    let col_abs = bytes[i] == b'$';
    let mut col_end = if col_abs { 1 } else { 0 };
    i = col_end;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    let letters = &token[col_end..i];
    // A '$' that preceded digits belongs to the row, not the column
    if col_abs && letters.is_empty() {
        col_end = 0;
        i = 1;
    }
    let _ = col_end;

    let row_abs_marker = i < bytes.len() && bytes[i] == b'$';
    let digits_start = if row_abs_marker { i + 1 } else { i };
    let digits = &token[digits_start..];

    if letters.is_empty() && digits.is_empty() {
        return None;
    }
    if !digits.is_empty() && !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let col = if letters.is_empty() {
        None
    } else {
        Some(CellAddress::letters_to_column(letters).ok()?)
    };

    let row = if digits.is_empty() {
        None
    } else {
        let n: u32 = digits.parse().ok()?;
        if n == 0 || n > MAX_ROWS {
            return None;
        }
        Some(n - 1)
    };

    // Recompute markers against what actually parsed
    let col_abs = col.is_some() && col_abs;
    let row_abs = row.is_some() && (row_abs_marker || (col.is_none() && bytes[0] == b'$'));

    Some(Endpoint {
        col,
        row,
        abs: AbsoluteRefType::from_flags(col_abs, row_abs),
    })
}

/// Parse the range part (after any sheet qualifier) into a [`GridRange`]
///
/// Malformed input yields [`GridRange::EMPTY`].
pub fn deserialize_range(text: &str) -> GridRange {
    let text = text.trim();

    let (first, second) = match text.find(':') {
        Some(pos) => (&text[..pos], Some(&text[pos + 1..])),
        None => (text, None),
    };

    let Some(a) = parse_endpoint(first) else {
        return GridRange::EMPTY;
    };

    match second {
        None => match (a.row, a.col) {
            // A lone endpoint must be a full cell reference
            (Some(row), Some(col)) => GridRange {
                start_row: Some(row),
                start_col: Some(col),
                end_row: Some(row),
                end_col: Some(col),
                range_type: RangeType::Normal,
                start_abs: a.abs,
                end_abs: a.abs,
            },
            _ => GridRange::EMPTY,
        },
        Some(rest) => {
            let Some(b) = parse_endpoint(rest) else {
                return GridRange::EMPTY;
            };
            let range_type = match (a.row.is_some(), a.col.is_some(), b.row.is_some(), b.col.is_some()) {
                (true, true, true, true) => RangeType::Normal,
                // A:K - columns only
                (false, true, false, true) => RangeType::Column,
                // 6:11 - rows only
                (true, false, true, false) => RangeType::Row,
                _ => return GridRange::EMPTY,
            };
            GridRange {
                start_row: a.row,
                start_col: a.col,
                end_row: b.row,
                end_col: b.col,
                range_type,
                start_abs: a.abs,
                end_abs: b.abs,
            }
        }
    }
}

/// Parse a full reference string: `[unitId]sheetName!range`
///
/// The workbook and sheet qualifiers are optional; quoted sheet names are
/// unwrapped with `''` and `\'` unescaping to `'`. Malformed range parts
/// degrade to [`GridRange::EMPTY`] with whatever qualifiers did parse.
pub fn deserialize_range_with_sheet(text: &str) -> SheetRange {
    let text = text.trim();
    let mut rest = text;

    let mut unit_id = String::new();
    if let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => {
                unit_id = stripped[..close].to_string();
                rest = &stripped[close + 1..];
            }
            None => {
                return SheetRange {
                    unit_id,
                    sheet_name: String::new(),
                    range: GridRange::EMPTY,
                };
            }
        }
    }

    let mut sheet_name = String::new();
    if let Some(stripped) = rest.strip_prefix('\'') {
        // Quoted sheet name: scan for the closing quote, honoring escapes
        let mut name = String::new();
        let mut chars = stripped.char_indices().peekable();
        let mut close = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '\'' => {
                    if let Some((_, '\'')) = chars.peek() {
                        name.push('\'');
                        chars.next();
                    } else {
                        close = Some(i);
                        break;
                    }
                }
                '\\' => {
                    if let Some((_, '\'')) = chars.peek() {
                        name.push('\'');
                        chars.next();
                    } else {
                        name.push('\\');
                    }
                }
                _ => name.push(c),
            }
        }
        match close {
            Some(i) if stripped[i + 1..].starts_with('!') => {
                sheet_name = name;
                rest = &stripped[i + 2..];
            }
            _ => {
                return SheetRange {
                    unit_id,
                    sheet_name,
                    range: GridRange::EMPTY,
                };
            }
        }
    } else if let Some(bang) = rest.find('!') {
        sheet_name = rest[..bang].to_string();
        rest = &rest[bang + 1..];
    }

    SheetRange {
        unit_id,
        sheet_name,
        range: deserialize_range(rest),
    }
}

fn push_col(out: &mut String, col: u16, fixed: bool) {
    if fixed {
        out.push('$');
    }
    out.push_str(&CellAddress::column_to_letters(col));
}

fn push_row(out: &mut String, row: u32, fixed: bool) {
    if fixed {
        out.push('$');
    }
    out.push_str(&(row + 1).to_string());
}

/// Serialize a [`GridRange`] back to its text form
///
/// Column ranges emit `A:K`, row ranges (and whole-sheet ranges) emit
/// `6:11`, bounded rectangles emit `A6:K11` (or a single `A6`). `$`
/// markers are re-inserted per the stored absolute flags, making this the
/// exact inverse of [`deserialize_range`].
pub fn serialize_range(range: &GridRange) -> String {
    let mut out = String::new();
    match range.range_type {
        RangeType::Column => {
            if let (Some(sc), Some(ec)) = (range.start_col, range.end_col) {
                push_col(&mut out, sc, range.start_abs.col_fixed());
                out.push(':');
                push_col(&mut out, ec, range.end_abs.col_fixed());
            }
        }
        RangeType::Row | RangeType::All => {
            if let (Some(sr), Some(er)) = (range.start_row, range.end_row) {
                push_row(&mut out, sr, range.start_abs.row_fixed());
                out.push(':');
                push_row(&mut out, er, range.end_abs.row_fixed());
            }
        }
        RangeType::Normal => {
            if let (Some(sr), Some(sc), Some(er), Some(ec)) =
                (range.start_row, range.start_col, range.end_row, range.end_col)
            {
                push_col(&mut out, sc, range.start_abs.col_fixed());
                push_row(&mut out, sr, range.start_abs.row_fixed());
                if sr != er || sc != ec || range.start_abs != range.end_abs {
                    out.push(':');
                    push_col(&mut out, ec, range.end_abs.col_fixed());
                    push_row(&mut out, er, range.end_abs.row_fixed());
                }
            }
        }
    }
    out
}

fn sheet_name_needs_quoting(name: &str) -> bool {
    name.is_empty()
        || name.bytes().next().is_some_and(|b| b.is_ascii_digit())
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Serialize a [`SheetRange`] to its full `[unitId]sheetName!range` form
///
/// Sheet names containing anything beyond alphanumerics are single-quoted
/// with `'` doubled. Empty qualifiers are omitted.
pub fn serialize_range_to_ref_string(sheet_range: &SheetRange) -> String {
    let mut out = String::new();
    if !sheet_range.unit_id.is_empty() {
        out.push('[');
        out.push_str(&sheet_range.unit_id);
        out.push(']');
    }
    if !sheet_range.sheet_name.is_empty() {
        if sheet_name_needs_quoting(&sheet_range.sheet_name) {
            out.push('\'');
            out.push_str(&sheet_range.sheet_name.replace('\'', "''"));
            out.push('\'');
        } else {
            out.push_str(&sheet_range.sheet_name);
        }
        out.push('!');
    }
    out.push_str(&serialize_range(&sheet_range.range));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_absolute_ref_type() {
        assert_eq!(absolute_ref_type("A4"), AbsoluteRefType::None);
        assert_eq!(absolute_ref_type("$A4"), AbsoluteRefType::Column);
        assert_eq!(absolute_ref_type("A$4"), AbsoluteRefType::Row);
        assert_eq!(absolute_ref_type("$A$4"), AbsoluteRefType::All);
    }

    #[test]
    fn test_deserialize_bounded_range() {
        let r = deserialize_range("A5:B10");
        assert_eq!(
            r,
            GridRange {
                start_row: Some(4),
                start_col: Some(0),
                end_row: Some(9),
                end_col: Some(1),
                range_type: RangeType::Normal,
                start_abs: AbsoluteRefType::None,
                end_abs: AbsoluteRefType::None,
            }
        );

        let r = deserialize_range("A5:B$10");
        assert_eq!(r.end_abs, AbsoluteRefType::Row);
        assert_eq!(r.start_abs, AbsoluteRefType::None);

        let r = deserialize_range("$A$5:$B$10");
        assert_eq!(r.start_abs, AbsoluteRefType::All);
        assert_eq!(r.end_abs, AbsoluteRefType::All);
    }

    #[test]
    fn test_deserialize_unbounded_ranges() {
        // Column range: rows stay None, never coerced to 0
        let r = deserialize_range("A:B");
        assert_eq!(r.range_type, RangeType::Column);
        assert_eq!(r.start_col, Some(0));
        assert_eq!(r.end_col, Some(1));
        assert_eq!(r.start_row, None);
        assert_eq!(r.end_row, None);

        // Row range: columns stay None
        let r = deserialize_range("10:100");
        assert_eq!(r.range_type, RangeType::Row);
        assert_eq!(r.start_row, Some(9));
        assert_eq!(r.end_row, Some(99));
        assert_eq!(r.start_col, None);
        assert_eq!(r.end_col, None);
    }

    #[test]
    fn test_deserialize_malformed() {
        assert_eq!(deserialize_range(""), GridRange::EMPTY);
        assert_eq!(deserialize_range("A"), GridRange::EMPTY);
        assert_eq!(deserialize_range("A1:B"), GridRange::EMPTY);
        assert_eq!(deserialize_range("1:B2"), GridRange::EMPTY);
        assert_eq!(deserialize_range("A0"), GridRange::EMPTY);
        assert_eq!(deserialize_range("hello"), GridRange::EMPTY);
    }

    #[test]
    fn test_deserialize_range_with_sheet() {
        let r = deserialize_range_with_sheet("[workbook1]sheet1!A5:B10");
        assert_eq!(r.unit_id, "workbook1");
        assert_eq!(r.sheet_name, "sheet1");
        assert_eq!(r.range.start_row, Some(4));
        assert_eq!(r.range.end_col, Some(1));

        // No qualifiers at all
        let r = deserialize_range_with_sheet("10:100");
        assert_eq!(r.unit_id, "");
        assert_eq!(r.sheet_name, "");
        assert_eq!(r.range.start_row, Some(9));
        assert_eq!(r.range.start_col, None);

        // Unbounded columns through the full form
        let r = deserialize_range_with_sheet("[workbook2]sheet1!A:B");
        assert_eq!(r.range.range_type, RangeType::Column);
        assert_eq!(r.range.start_row, None);
        assert_eq!(r.range.end_row, None);
    }

    #[test]
    fn test_deserialize_quoted_sheet_name() {
        let r = deserialize_range_with_sheet("[workbook2]'sheet-1'!10:100");
        assert_eq!(r.unit_id, "workbook2");
        assert_eq!(r.sheet_name, "sheet-1");
        assert_eq!(r.range.start_row, Some(9));
        assert_eq!(r.range.end_row, Some(99));

        // Doubled quote unescapes
        let r = deserialize_range_with_sheet("'it''s a sheet'!A1");
        assert_eq!(r.sheet_name, "it's a sheet");

        // Backslash escape form
        let r = deserialize_range_with_sheet(r"'it\'s a sheet'!A1");
        assert_eq!(r.sheet_name, "it's a sheet");
    }

    #[test]
    fn test_serialize_range_shapes() {
        let base = GridRange {
            start_row: Some(5),
            start_col: Some(0),
            end_row: Some(10),
            end_col: Some(10),
            range_type: RangeType::Normal,
            start_abs: AbsoluteRefType::None,
            end_abs: AbsoluteRefType::None,
        };
        assert_eq!(serialize_range(&base), "A6:K11");

        let col = GridRange {
            range_type: RangeType::Column,
            ..base
        };
        assert_eq!(serialize_range(&col), "A:K");

        let row = GridRange {
            range_type: RangeType::Row,
            ..base
        };
        assert_eq!(serialize_range(&row), "6:11");

        // Whole-sheet ranges serialize in row form
        let all = GridRange {
            range_type: RangeType::All,
            ..base
        };
        assert_eq!(serialize_range(&all), "6:11");
    }

    #[test]
    fn test_serialize_absolute_markers() {
        let mut r = deserialize_range("$A$5:$B$10");
        assert_eq!(serialize_range(&r), "$A$5:$B$10");

        r = deserialize_range("A5:B$10");
        assert_eq!(serialize_range(&r), "A5:B$10");

        r = deserialize_range("$A$1");
        assert_eq!(serialize_range(&r), "$A$1");
    }

    #[test]
    fn test_serialize_range_to_ref_string() {
        let sr = SheetRange {
            unit_id: "workbook1".into(),
            sheet_name: "sheet1".into(),
            range: GridRange {
                start_row: Some(5),
                start_col: Some(0),
                end_row: Some(10),
                end_col: Some(10),
                range_type: RangeType::Column,
                start_abs: AbsoluteRefType::None,
                end_abs: AbsoluteRefType::None,
            },
        };
        assert_eq!(serialize_range_to_ref_string(&sr), "[workbook1]sheet1!A:K");

        // Sheet names with punctuation get quoted, quotes doubled
        let sr = SheetRange {
            unit_id: String::new(),
            sheet_name: "sheet-1".into(),
            range: GridRange::single(0, 0),
        };
        assert_eq!(serialize_range_to_ref_string(&sr), "'sheet-1'!A1");

        let sr = SheetRange {
            unit_id: String::new(),
            sheet_name: "it's".into(),
            range: GridRange::single(0, 0),
        };
        assert_eq!(serialize_range_to_ref_string(&sr), "'it''s'!A1");
    }

    #[test]
    fn test_round_trip() {
        for text in [
            "A5:B10",
            "$A$5:$B$10",
            "A5:B$10",
            "A:K",
            "6:11",
            "$A:$K",
            "A1",
            "[workbook1]sheet1!A:K",
            "[workbook2]'sheet-1'!10:100",
            "Sheet1!A1:C3",
        ] {
            let parsed = deserialize_range_with_sheet(text);
            assert_eq!(serialize_range_to_ref_string(&parsed), text, "{}", text);
        }
    }

    #[test]
    fn test_none_bounds_survive_round_trip() {
        let parsed = deserialize_range_with_sheet("[wb]s!10:100");
        assert_eq!(parsed.range.start_col, None);
        assert_eq!(parsed.range.end_col, None);
        let text = serialize_range_to_ref_string(&parsed);
        let again = deserialize_range_with_sheet(&text);
        assert_eq!(again.range.start_col, None);
        assert_eq!(again.range.end_col, None);
    }

    #[test]
    fn test_to_cell_range_clamps() {
        let r = deserialize_range("A:B");
        let cr = r.to_cell_range().unwrap();
        assert_eq!(cr.start.row, 0);
        assert_eq!(cr.end.row, crate::MAX_ROWS - 1);
        assert_eq!(cr.start.col, 0);
        assert_eq!(cr.end.col, 1);

        assert!(GridRange::EMPTY.to_cell_range().is_none());
    }

    #[test]
    fn test_grid_range_offset() {
        let r = deserialize_range("A1:B2");
        let shifted = r.offset(1, 1).unwrap();
        assert_eq!(serialize_range(&shifted), "B2:C3");

        // Absolute endpoints pinned
        let r = deserialize_range("$A$1:B2");
        let shifted = r.offset(1, 1).unwrap();
        assert_eq!(serialize_range(&shifted), "$A$1:C3");

        // Unbounded endpoints pass through
        let r = deserialize_range("A:B");
        let shifted = r.offset(5, 0).unwrap();
        assert_eq!(shifted.start_row, None);

        // Off the grid
        let r = deserialize_range("A1");
        assert!(r.offset(-1, 0).is_none());
    }
}
