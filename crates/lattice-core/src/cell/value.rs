//! Cell value types

use std::fmt;

/// Represents the value stored in a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell (no value)
    Empty,

    /// Boolean value (TRUE/FALSE)
    Boolean(bool),

    /// Numeric value (all numbers stored as f64, including dates)
    Number(f64),

    /// String value
    String(String),

    /// Error value (#VALUE!, #REF!, etc.)
    Error(CellError),

    /// Formula with cached result
    Formula {
        /// Original formula text (e.g., "=SUM(A1:A10)")
        text: String,
        /// Shared-formula id: fill/copy operations store one formula text
        /// under an id and stamp dependents with the id plus their offset
        /// from the anchor cell. `None` for a standalone formula.
        shared_id: Option<u32>,
        /// Offset (rows, cols) from the shared-formula anchor. Relative
        /// references shift by this amount at evaluation time. `(0, 0)`
        /// for the anchor itself and for standalone formulas.
        shared_offset: (i64, i64),
        /// Last calculated value (if any)
        /// For dynamic array formulas, this contains the top-left value
        cached_value: Option<Box<CellValue>>,
        /// If this formula produces an array, this contains all values
        /// The outer Vec is rows, inner Vec is columns
        array_result: Option<Vec<Vec<CellValue>>>,
    },

    /// A cell that receives a spilled value from a dynamic array formula
    /// This cell cannot be edited directly - it displays a value from the source formula
    SpillTarget {
        /// Row of the source formula cell
        source_row: u32,
        /// Column of the source formula cell
        source_col: u16,
        /// Row offset from source (0 for first row of spill)
        offset_row: u32,
        /// Column offset from source (0 for first column of spill)
        offset_col: u16,
    },
}

impl CellValue {
    /// Create a new formula value
    pub fn formula<S: Into<String>>(text: S) -> Self {
        CellValue::Formula {
            text: text.into(),
            shared_id: None,
            shared_offset: (0, 0),
            cached_value: None,
            array_result: None,
        }
    }

    /// Create a formula value that shares its text through a shared-formula id
    pub fn shared_formula<S: Into<String>>(text: S, id: u32, offset: (i64, i64)) -> Self {
        CellValue::Formula {
            text: text.into(),
            shared_id: Some(id),
            shared_offset: offset,
            cached_value: None,
            array_result: None,
        }
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Check if the cell contains a formula
    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula { .. })
    }

    /// Check if the cell contains an error
    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }

    /// Check if the cell is a spill target
    pub fn is_spill_target(&self) -> bool {
        matches!(self, CellValue::SpillTarget { .. })
    }

    /// Check if the cell contains a dynamic array formula
    pub fn is_array_formula(&self) -> bool {
        matches!(
            self,
            CellValue::Formula {
                array_result: Some(_),
                ..
            }
        )
    }

    /// Get the spill source coordinates if this is a spill target
    pub fn spill_source(&self) -> Option<(u32, u16)> {
        match self {
            CellValue::SpillTarget {
                source_row,
                source_col,
                ..
            } => Some((*source_row, *source_col)),
            _ => None,
        }
    }

    /// Try to get the value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(true) => Some(1.0),
            CellValue::Boolean(false) => Some(0.0),
            CellValue::Formula {
                cached_value: Some(v),
                ..
            } => v.as_number(),
            _ => None,
        }
    }

    /// Try to get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Boolean(b) => Some(*b),
            CellValue::Number(n) => Some(*n != 0.0),
            CellValue::Formula {
                cached_value: Some(v),
                ..
            } => v.as_bool(),
            _ => None,
        }
    }

    /// Try to get the value as a string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s.as_str()),
            CellValue::Formula {
                cached_value: Some(v),
                ..
            } => v.as_string(),
            _ => None,
        }
    }

    /// Get the formula text if this is a formula cell
    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellValue::Formula { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Get the shared-formula id if this formula participates in one
    pub fn shared_formula_id(&self) -> Option<u32> {
        match self {
            CellValue::Formula { shared_id, .. } => *shared_id,
            _ => None,
        }
    }

    /// Get the effective value (cached value for formulas, value otherwise)
    pub fn effective_value(&self) -> &CellValue {
        match self {
            CellValue::Formula {
                cached_value: Some(v),
                ..
            } => v.effective_value(),
            _ => self,
        }
    }

    /// Get the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Boolean(_) => "boolean",
            CellValue::Number(_) => "number",
            CellValue::String(_) => "string",
            CellValue::Error(_) => "error",
            CellValue::Formula { .. } => "formula",
            CellValue::SpillTarget { .. } => "spill_target",
        }
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => write!(f, ""),
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::String(s) => write!(f, "{}", s),
            CellValue::Error(e) => write!(f, "{}", e),
            CellValue::Formula {
                cached_value: Some(v),
                ..
            } => write!(f, "{}", v),
            CellValue::Formula { text, .. } => write!(f, "{}", text),
            // SpillTarget shows as empty - the actual value comes from looking up the source
            CellValue::SpillTarget { .. } => write!(f, ""),
        }
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<CellError> for CellValue {
    fn from(e: CellError) -> Self {
        CellValue::Error(e)
    }
}

/// Excel error values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellError {
    /// #NULL! - Incorrect range operator
    Null,
    /// #DIV/0! - Division by zero
    Div0,
    /// #VALUE! - Wrong type of argument or operand
    Value,
    /// #REF! - Invalid cell reference
    Ref,
    /// #NAME? - Unrecognized formula name
    Name,
    /// #NUM! - Invalid numeric value
    Num,
    /// #N/A - Value not available
    Na,
    /// #SPILL! - Dynamic array cannot spill
    Spill,
    /// #CALC! - Calculation error
    Calc,
    /// #CYCLE! - Cell participates in a circular reference
    Cycle,
}

impl CellError {
    /// Get the display string for this error
    pub fn as_str(&self) -> &'static str {
        match self {
            CellError::Null => "#NULL!",
            CellError::Div0 => "#DIV/0!",
            CellError::Value => "#VALUE!",
            CellError::Ref => "#REF!",
            CellError::Name => "#NAME?",
            CellError::Num => "#NUM!",
            CellError::Na => "#N/A",
            CellError::Spill => "#SPILL!",
            CellError::Calc => "#CALC!",
            CellError::Cycle => "#CYCLE!",
        }
    }

    /// Parse an error string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "#NULL!" => Some(CellError::Null),
            "#DIV/0!" => Some(CellError::Div0),
            "#VALUE!" => Some(CellError::Value),
            "#REF!" => Some(CellError::Ref),
            "#NAME?" => Some(CellError::Name),
            "#NUM!" => Some(CellError::Num),
            "#N/A" => Some(CellError::Na),
            "#SPILL!" => Some(CellError::Spill),
            "#CALC!" => Some(CellError::Calc),
            "#CYCLE!" => Some(CellError::Cycle),
            _ => None,
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
