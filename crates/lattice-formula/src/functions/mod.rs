//! Built-in worksheet functions

pub mod criteria;
pub mod date;
pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod statistical;
pub mod text;

use crate::ast::FormulaExpr;
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::FormulaValue;
use ahash::AHashMap;

/// Function implementation signature
///
/// Arguments arrive already evaluated; implementations consult the
/// evaluation context for workbook state such as the current cell.
pub type FunctionImpl = fn(&[FormulaValue], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// Function definition
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
    /// Recalculates on every pass regardless of dirtiness
    pub volatile: bool,
}

/// Registry of built-in functions
///
/// The evaluation context borrows a registry instead of consulting a
/// global, so embedders can extend or replace the function set per
/// workbook.
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// Create a registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        registry.register_math_functions();
        registry.register_statistical_functions();
        registry.register_logical_functions();
        registry.register_text_functions();
        registry.register_lookup_functions();
        registry.register_info_functions();
        registry.register_date_functions();

        registry
    }

    /// Look up a function by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_uppercase())
    }

    /// Register a function, replacing any existing definition
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    fn register_math_functions(&mut self) {
        self.register(FunctionDef {
            name: "SUM",
            min_args: 1,
            max_args: None,
            implementation: math::fn_sum,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "AVERAGE",
            min_args: 1,
            max_args: None,
            implementation: math::fn_average,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "MIN",
            min_args: 1,
            max_args: None,
            implementation: math::fn_min,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "MAX",
            min_args: 1,
            max_args: None,
            implementation: math::fn_max,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "COUNT",
            min_args: 1,
            max_args: None,
            implementation: math::fn_count,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "PRODUCT",
            min_args: 1,
            max_args: None,
            implementation: math::fn_product,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "ABS",
            min_args: 1,
            max_args: Some(1),
            implementation: math::fn_abs,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "INT",
            min_args: 1,
            max_args: Some(1),
            implementation: math::fn_int,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "MOD",
            min_args: 2,
            max_args: Some(2),
            implementation: math::fn_mod,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "ROUND",
            min_args: 1,
            max_args: Some(2),
            implementation: math::fn_round,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "TRUNC",
            min_args: 1,
            max_args: Some(2),
            implementation: math::fn_trunc,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "SIGN",
            min_args: 1,
            max_args: Some(1),
            implementation: math::fn_sign,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "SQRT",
            min_args: 1,
            max_args: Some(1),
            implementation: math::fn_sqrt,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "POWER",
            min_args: 2,
            max_args: Some(2),
            implementation: math::fn_power,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "EXP",
            min_args: 1,
            max_args: Some(1),
            implementation: math::fn_exp,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "LN",
            min_args: 1,
            max_args: Some(1),
            implementation: math::fn_ln,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "LOG",
            min_args: 1,
            max_args: Some(2),
            implementation: math::fn_log,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "LOG10",
            min_args: 1,
            max_args: Some(1),
            implementation: math::fn_log10,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "PI",
            min_args: 0,
            max_args: Some(0),
            implementation: math::fn_pi,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "RAND",
            min_args: 0,
            max_args: Some(0),
            implementation: math::fn_rand,
            volatile: true,
        });
        self.register(FunctionDef {
            name: "RANDBETWEEN",
            min_args: 2,
            max_args: Some(2),
            implementation: math::fn_randbetween,
            volatile: true,
        });
        self.register(FunctionDef {
            name: "SUMIF",
            min_args: 2,
            max_args: Some(3),
            implementation: math::fn_sumif,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "SUMPRODUCT",
            min_args: 1,
            max_args: None,
            implementation: math::fn_sumproduct,
            volatile: false,
        });
    }

    fn register_statistical_functions(&mut self) {
        self.register(FunctionDef {
            name: "COUNTA",
            min_args: 1,
            max_args: None,
            implementation: statistical::fn_counta,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "COUNTIF",
            min_args: 2,
            max_args: Some(2),
            implementation: statistical::fn_countif,
            volatile: false,
        });
    }

    fn register_logical_functions(&mut self) {
        self.register(FunctionDef {
            name: "IF",
            min_args: 2,
            max_args: Some(3),
            implementation: logical::fn_if,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "AND",
            min_args: 1,
            max_args: None,
            implementation: logical::fn_and,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "OR",
            min_args: 1,
            max_args: None,
            implementation: logical::fn_or,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "NOT",
            min_args: 1,
            max_args: Some(1),
            implementation: logical::fn_not,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "XOR",
            min_args: 1,
            max_args: None,
            implementation: logical::fn_xor,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "IFERROR",
            min_args: 2,
            max_args: Some(2),
            implementation: logical::fn_iferror,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "IFNA",
            min_args: 2,
            max_args: Some(2),
            implementation: logical::fn_ifna,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "TRUE",
            min_args: 0,
            max_args: Some(0),
            implementation: logical::fn_true,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "FALSE",
            min_args: 0,
            max_args: Some(0),
            implementation: logical::fn_false,
            volatile: false,
        });
    }

    fn register_text_functions(&mut self) {
        self.register(FunctionDef {
            name: "CONCAT",
            min_args: 1,
            max_args: None,
            implementation: text::fn_concat,
            volatile: false,
        });
        // Legacy alias with identical behavior
        self.register(FunctionDef {
            name: "CONCATENATE",
            min_args: 1,
            max_args: None,
            implementation: text::fn_concat,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "LEFT",
            min_args: 1,
            max_args: Some(2),
            implementation: text::fn_left,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "RIGHT",
            min_args: 1,
            max_args: Some(2),
            implementation: text::fn_right,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "MID",
            min_args: 3,
            max_args: Some(3),
            implementation: text::fn_mid,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "LEN",
            min_args: 1,
            max_args: Some(1),
            implementation: text::fn_len,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "LOWER",
            min_args: 1,
            max_args: Some(1),
            implementation: text::fn_lower,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "UPPER",
            min_args: 1,
            max_args: Some(1),
            implementation: text::fn_upper,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "TRIM",
            min_args: 1,
            max_args: Some(1),
            implementation: text::fn_trim,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "REPT",
            min_args: 2,
            max_args: Some(2),
            implementation: text::fn_rept,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "VALUE",
            min_args: 1,
            max_args: Some(1),
            implementation: text::fn_value,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "TEXTJOIN",
            min_args: 3,
            max_args: None,
            implementation: text::fn_textjoin,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "EXACT",
            min_args: 2,
            max_args: Some(2),
            implementation: text::fn_exact,
            volatile: false,
        });
    }

    fn register_lookup_functions(&mut self) {
        self.register(FunctionDef {
            name: "VLOOKUP",
            min_args: 3,
            max_args: Some(4),
            implementation: lookup::fn_vlookup,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "HLOOKUP",
            min_args: 3,
            max_args: Some(4),
            implementation: lookup::fn_hlookup,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "INDEX",
            min_args: 2,
            max_args: Some(3),
            implementation: lookup::fn_index,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "MATCH",
            min_args: 2,
            max_args: Some(3),
            implementation: lookup::fn_match,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "CHOOSE",
            min_args: 2,
            max_args: None,
            implementation: lookup::fn_choose,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "ROWS",
            min_args: 1,
            max_args: Some(1),
            implementation: lookup::fn_rows,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "COLUMNS",
            min_args: 1,
            max_args: Some(1),
            implementation: lookup::fn_columns,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "SEQUENCE",
            min_args: 1,
            max_args: Some(4),
            implementation: lookup::fn_sequence,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "TRANSPOSE",
            min_args: 1,
            max_args: Some(1),
            implementation: lookup::fn_transpose,
            volatile: false,
        });
    }

    fn register_info_functions(&mut self) {
        self.register(FunctionDef {
            name: "ISBLANK",
            min_args: 1,
            max_args: Some(1),
            implementation: info::fn_isblank,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "ISERROR",
            min_args: 1,
            max_args: Some(1),
            implementation: info::fn_iserror,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "ISERR",
            min_args: 1,
            max_args: Some(1),
            implementation: info::fn_iserr,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "ISNA",
            min_args: 1,
            max_args: Some(1),
            implementation: info::fn_isna,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "ISNUMBER",
            min_args: 1,
            max_args: Some(1),
            implementation: info::fn_isnumber,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "ISTEXT",
            min_args: 1,
            max_args: Some(1),
            implementation: info::fn_istext,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "ISLOGICAL",
            min_args: 1,
            max_args: Some(1),
            implementation: info::fn_islogical,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "NA",
            min_args: 0,
            max_args: Some(0),
            implementation: info::fn_na,
            volatile: false,
        });
    }

    fn register_date_functions(&mut self) {
        self.register(FunctionDef {
            name: "DATE",
            min_args: 3,
            max_args: Some(3),
            implementation: date::fn_date,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "YEAR",
            min_args: 1,
            max_args: Some(1),
            implementation: date::fn_year,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "MONTH",
            min_args: 1,
            max_args: Some(1),
            implementation: date::fn_month,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "DAY",
            min_args: 1,
            max_args: Some(1),
            implementation: date::fn_day,
            volatile: false,
        });
        self.register(FunctionDef {
            name: "NOW",
            min_args: 0,
            max_args: Some(0),
            implementation: date::fn_now,
            volatile: true,
        });
        self.register(FunctionDef {
            name: "TODAY",
            min_args: 0,
            max_args: Some(0),
            implementation: date::fn_today,
            volatile: true,
        });
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a parsed formula calls any volatile function
///
/// Unknown function names count as non-volatile; they evaluate to
/// `#NAME?` either way.
pub fn contains_volatile(expr: &FormulaExpr, registry: &FunctionRegistry) -> bool {
    match expr {
        FormulaExpr::Function { name, args } => {
            if registry.get(name).is_some_and(|def| def.volatile) {
                return true;
            }
            args.iter().any(|arg| contains_volatile(arg, registry))
        }
        FormulaExpr::BinaryOp { left, right, .. } => {
            contains_volatile(left, registry) || contains_volatile(right, registry)
        }
        FormulaExpr::UnaryOp { operand, .. } => contains_volatile(operand, registry),
        FormulaExpr::Array(rows) => rows
            .iter()
            .any(|row| row.iter().any(|e| contains_volatile(e, registry))),
        FormulaExpr::Union(items) => items.iter().any(|e| contains_volatile(e, registry)),
        FormulaExpr::Lambda { body, .. } => contains_volatile(body, registry),
        FormulaExpr::Call { callee, args } => {
            contains_volatile(callee, registry)
                || args.iter().any(|arg| contains_volatile(arg, registry))
        }
        _ => false,
    }
}

/// Coerce an argument to a number
///
/// `Err` carries the value the function should return: the argument's own
/// error, or `#VALUE!` when the argument is missing or not numeric.
pub(crate) fn number_arg(args: &[FormulaValue], idx: usize) -> Result<f64, FormulaValue> {
    use lattice_core::CellError;
    match args.get(idx) {
        Some(FormulaValue::Error(e)) => Err(FormulaValue::Error(*e)),
        Some(v) => v
            .as_number()
            .ok_or(FormulaValue::Error(CellError::Value)),
        None => Err(FormulaValue::Error(CellError::Value)),
    }
}

/// Coerce an optional argument to a number, with a default when absent or
/// empty
pub(crate) fn number_arg_or(
    args: &[FormulaValue],
    idx: usize,
    default: f64,
) -> Result<f64, FormulaValue> {
    match args.get(idx) {
        None | Some(FormulaValue::Empty) => Ok(default),
        _ => number_arg(args, idx),
    }
}

/// Coerce an argument to text, propagating errors
pub(crate) fn text_arg(args: &[FormulaValue], idx: usize) -> Result<String, FormulaValue> {
    use lattice_core::CellError;
    match args.get(idx) {
        Some(FormulaValue::Error(e)) => Err(FormulaValue::Error(*e)),
        Some(FormulaValue::Array(_)) => Err(FormulaValue::Error(CellError::Value)),
        Some(v) => Ok(v.as_string()),
        None => Err(FormulaValue::Error(CellError::Value)),
    }
}
