//! Formula evaluator
//!
//! Post-order, left-to-right evaluation of a parsed AST against a workbook
//! snapshot. Function dispatch goes through a [`FunctionRegistry`] held by
//! reference in the context; there is no global registry.

use crate::ast::FormulaExpr;
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionRegistry;
use crate::value::{apply_binary, apply_unary, FormulaValue};
use ahash::AHashMap;
use lattice_core::{deserialize_range_with_sheet, CellError, CellRange, SheetRange, Workbook};
use std::cell::{Cell, RefCell};

/// Recursion limit for named formulas that reference other names
const MAX_NAME_DEPTH: usize = 64;

/// Context for formula evaluation
pub struct EvaluationContext<'a> {
    /// Workbook snapshot for cell lookups
    pub workbook: Option<&'a Workbook>,
    /// Current worksheet index
    pub current_sheet: usize,
    /// Anchor cell row (for ROW() and friends)
    pub current_row: u32,
    /// Anchor cell column
    pub current_col: u16,
    /// Shared-formula offset applied to relative references
    pub shared_offset: (i64, i64),
    registry: &'a FunctionRegistry,
    /// Lambda parameter scopes, innermost last
    locals: RefCell<Vec<AHashMap<String, FormulaValue>>>,
    name_depth: Cell<usize>,
}

impl<'a> EvaluationContext<'a> {
    /// Create a new evaluation context anchored at a cell
    pub fn new(
        workbook: Option<&'a Workbook>,
        sheet: usize,
        row: u32,
        col: u16,
        registry: &'a FunctionRegistry,
    ) -> Self {
        Self {
            workbook,
            current_sheet: sheet,
            current_row: row,
            current_col: col,
            shared_offset: (0, 0),
            registry,
            locals: RefCell::new(Vec::new()),
            name_depth: Cell::new(0),
        }
    }

    /// A context without a workbook, for literal-only evaluation and tests
    pub fn detached(registry: &'a FunctionRegistry) -> Self {
        Self::new(None, 0, 0, 0, registry)
    }

    /// Set the shared-formula offset
    pub fn with_shared_offset(mut self, offset: (i64, i64)) -> Self {
        self.shared_offset = offset;
        self
    }

    /// The function registry in use
    pub fn registry(&self) -> &FunctionRegistry {
        self.registry
    }

    /// Resolve a sheet qualifier to a worksheet index
    ///
    /// An empty sheet name means the current sheet; a `unit_id` naming a
    /// different workbook cannot be resolved from a single snapshot.
    fn resolve_sheet(&self, unit_id: &str, sheet_name: &str) -> Result<usize, CellError> {
        let workbook = self.workbook.ok_or(CellError::Ref)?;
        if !unit_id.is_empty() && unit_id != workbook.unit_id() {
            return Err(CellError::Ref);
        }
        if sheet_name.is_empty() {
            return Ok(self.current_sheet);
        }
        workbook.sheet_index(sheet_name).ok_or(CellError::Ref)
    }

    /// Resolve a reference node to a value: single cell to scalar,
    /// multi-cell to a 2-D array
    pub fn resolve_reference(&self, sheet_range: &SheetRange) -> FormulaValue {
        let sheet_idx = match self.resolve_sheet(&sheet_range.unit_id, &sheet_range.sheet_name) {
            Ok(idx) => idx,
            Err(e) => return FormulaValue::Error(e),
        };
        let workbook = self.workbook.expect("resolve_sheet checked workbook");
        let Some(worksheet) = workbook.worksheet(sheet_idx) else {
            return FormulaValue::Error(CellError::Ref);
        };

        // Shared-formula offset shifts relative endpoints only
        let (off_rows, off_cols) = self.shared_offset;
        let Some(range) = sheet_range.range.offset(off_rows, off_cols) else {
            return FormulaValue::Error(CellError::Ref);
        };
        let Some(mut cells) = range.to_cell_range() else {
            return FormulaValue::Error(CellError::Ref);
        };

        // Clamp unbounded axes to the used extent so `A:A` does not
        // materialize a million rows
        if range.start_row.is_none() || range.start_col.is_none() {
            match worksheet.used_range() {
                Some(used) => {
                    if range.start_row.is_none() {
                        cells = CellRange::from_indices(
                            used.start.row.min(cells.start.row),
                            cells.start.col,
                            used.end.row.min(cells.end.row),
                            cells.end.col,
                        );
                    }
                    if range.start_col.is_none() {
                        cells = CellRange::from_indices(
                            cells.start.row,
                            used.start.col.min(cells.start.col),
                            cells.end.row,
                            used.end.col.min(cells.end.col),
                        );
                    }
                }
                None => return FormulaValue::Array(vec![vec![FormulaValue::Empty]]),
            }
        }

        if range.is_single_cell() {
            let value = worksheet
                .get_calculated_value_at(cells.start.row, cells.start.col)
                .unwrap_or_default();
            return value.into();
        }

        let mut rows = Vec::with_capacity(cells.row_count() as usize);
        for row in cells.start.row..=cells.end.row {
            let mut cols = Vec::with_capacity(cells.col_count() as usize);
            for col in cells.start.col..=cells.end.col {
                let value = worksheet.get_calculated_value_at(row, col).unwrap_or_default();
                cols.push(value.into());
            }
            rows.push(cols);
        }
        FormulaValue::Array(rows)
    }

    /// Resolve a name: lambda locals first, then defined names
    fn resolve_name(&self, name: &str) -> FormulaResult<FormulaValue> {
        let lower = name.to_lowercase();
        {
            let locals = self.locals.borrow();
            for scope in locals.iter().rev() {
                if let Some(value) = scope.get(&lower) {
                    return Ok(value.clone());
                }
            }
        }

        let Some(workbook) = self.workbook else {
            return Ok(FormulaValue::Error(CellError::Name));
        };
        let Some(named) = workbook.get_named_range(name, self.current_sheet) else {
            return Ok(FormulaValue::Error(CellError::Name));
        };

        if self.name_depth.get() >= MAX_NAME_DEPTH {
            return Err(FormulaError::CircularReference);
        }
        self.name_depth.set(self.name_depth.get() + 1);
        let result = self.resolve_name_target(&named.refers_to);
        self.name_depth.set(self.name_depth.get() - 1);
        result
    }

    fn resolve_name_target(&self, refers_to: &str) -> FormulaResult<FormulaValue> {
        if refers_to.starts_with('=') {
            let ast = crate::parser::parse_formula(refers_to)?;
            return evaluate(&ast, self);
        }

        if let Ok(n) = refers_to.parse::<f64>() {
            return Ok(FormulaValue::Number(n));
        }
        let upper = refers_to.to_uppercase();
        if upper == "TRUE" {
            return Ok(FormulaValue::Boolean(true));
        }
        if upper == "FALSE" {
            return Ok(FormulaValue::Boolean(false));
        }

        let sheet_range = deserialize_range_with_sheet(refers_to);
        if sheet_range.range.is_empty() {
            return Ok(FormulaValue::Error(CellError::Name));
        }
        Ok(self.resolve_reference(&sheet_range))
    }

    fn push_scope(&self, scope: AHashMap<String, FormulaValue>) {
        self.locals.borrow_mut().push(scope);
    }

    fn pop_scope(&self) {
        self.locals.borrow_mut().pop();
    }
}

/// Evaluate a formula expression
pub fn evaluate(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match expr {
        // === Literals ===
        FormulaExpr::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaExpr::String(s) => Ok(FormulaValue::String(s.clone())),
        FormulaExpr::Boolean(b) => Ok(FormulaValue::Boolean(*b)),
        FormulaExpr::Error(e) => Ok(FormulaValue::Error(*e)),

        // === References ===
        FormulaExpr::CellRef(r)
        | FormulaExpr::RangeRef(r)
        | FormulaExpr::ColumnRef(r)
        | FormulaExpr::RowRef(r) => Ok(ctx.resolve_reference(r)),

        FormulaExpr::NameRef(name) => ctx.resolve_name(name),

        // === Operators ===
        FormulaExpr::BinaryOp { op, left, right } => {
            let left_val = evaluate(left, ctx)?;
            let right_val = evaluate(right, ctx)?;
            Ok(apply_binary(*op, &left_val, &right_val))
        }

        FormulaExpr::UnaryOp { op, operand } => {
            let value = evaluate(operand, ctx)?;
            Ok(apply_unary(*op, &value))
        }

        // === Functions ===
        FormulaExpr::Function { name, args } => evaluate_function(name, args, ctx),

        // === Composite forms ===
        FormulaExpr::Array(rows) => {
            let mut result_rows = Vec::with_capacity(rows.len());
            for row in rows {
                let mut result_row = Vec::with_capacity(row.len());
                for element in row {
                    result_row.push(evaluate(element, ctx)?);
                }
                result_rows.push(result_row);
            }
            Ok(FormulaValue::Array(result_rows))
        }

        FormulaExpr::Union(items) => {
            // Flatten all member values into a single column so aggregate
            // functions see every cell once
            let mut flat = Vec::new();
            for item in items {
                match evaluate(item, ctx)? {
                    FormulaValue::Array(rows) => {
                        for row in rows {
                            for value in row {
                                flat.push(vec![value]);
                            }
                        }
                    }
                    value => flat.push(vec![value]),
                }
            }
            Ok(FormulaValue::Array(flat))
        }

        // A lambda that is never applied has no value
        FormulaExpr::Lambda { .. } => Ok(FormulaValue::Error(CellError::Calc)),

        FormulaExpr::Call { callee, args } => match &**callee {
            FormulaExpr::Lambda { params, body } => {
                if params.len() != args.len() {
                    return Ok(FormulaValue::Error(CellError::Value));
                }
                let mut scope = AHashMap::with_capacity(params.len());
                for (param, arg) in params.iter().zip(args) {
                    scope.insert(param.to_lowercase(), evaluate(arg, ctx)?);
                }
                ctx.push_scope(scope);
                let result = evaluate(body, ctx);
                ctx.pop_scope();
                result
            }
            _ => Ok(FormulaValue::Error(CellError::Calc)),
        },
    }
}

/// Evaluate a function call through the context's registry
fn evaluate_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let Some(func) = ctx.registry().get(name) else {
        // Unknown function names surface in the sheet, not to the host
        return Ok(FormulaValue::Error(CellError::Name));
    };

    if args.len() < func.min_args {
        return Err(FormulaError::ArgumentCount {
            function: name.to_string(),
            expected: format!("at least {}", func.min_args),
            actual: args.len(),
        });
    }
    if let Some(max) = func.max_args {
        if args.len() > max {
            return Err(FormulaError::ArgumentCount {
                function: name.to_string(),
                expected: format!("at most {}", max),
                actual: args.len(),
            });
        }
    }

    let mut evaluated = Vec::with_capacity(args.len());
    for arg in args {
        evaluated.push(evaluate(arg, ctx)?);
    }

    (func.implementation)(&evaluated, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;
    use lattice_core::Workbook;
    use pretty_assertions::assert_eq;

    fn eval(formula: &str) -> FormulaValue {
        let registry = FunctionRegistry::new();
        let ast = parse_formula(formula).unwrap();
        let ctx = EvaluationContext::detached(&registry);
        evaluate(&ast, &ctx).unwrap()
    }

    fn eval_in(workbook: &Workbook, sheet: usize, formula: &str) -> FormulaValue {
        let registry = FunctionRegistry::new();
        let ast = parse_formula(formula).unwrap();
        let ctx = EvaluationContext::new(Some(workbook), sheet, 0, 0, &registry);
        evaluate(&ast, &ctx).unwrap()
    }

    #[test]
    fn test_evaluate_literals() {
        assert_eq!(eval("=42"), FormulaValue::Number(42.0));
        assert_eq!(eval("=\"Hello\""), FormulaValue::String("Hello".into()));
        assert_eq!(eval("=TRUE"), FormulaValue::Boolean(true));
        assert_eq!(eval("=#VALUE!"), FormulaValue::Error(CellError::Value));
    }

    #[test]
    fn test_evaluate_arithmetic() {
        assert_eq!(eval("=1+2*3"), FormulaValue::Number(7.0));
        assert_eq!(eval("=(1+2)*3"), FormulaValue::Number(9.0));
        assert_eq!(eval("=2^10"), FormulaValue::Number(1024.0));
        assert_eq!(eval("=2^3^2"), FormulaValue::Number(512.0));
        assert_eq!(eval("=-5"), FormulaValue::Number(-5.0));
        assert_eq!(eval("=50%"), FormulaValue::Number(0.5));
        assert_eq!(eval("=1/0"), FormulaValue::Error(CellError::Div0));
    }

    #[test]
    fn test_evaluate_comparison_and_concat() {
        assert_eq!(eval("=1<2"), FormulaValue::Boolean(true));
        assert_eq!(eval("=5<>5"), FormulaValue::Boolean(false));
        assert_eq!(
            eval("=\"a\"&\"b\"&1"),
            FormulaValue::String("ab1".into())
        );
        // Type-ordered: any number is less than any string
        assert_eq!(eval("=999<\"a\""), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_eager_error_propagation() {
        assert_eq!(eval("=1+#REF!"), FormulaValue::Error(CellError::Ref));
        assert_eq!(eval("=#NULL!&\"x\""), FormulaValue::Error(CellError::Null));
    }

    #[test]
    fn test_evaluate_functions() {
        assert_eq!(eval("=SUM(1,2,3)"), FormulaValue::Number(6.0));
        assert_eq!(eval("=IF(1>0,\"Yes\",\"No\")"), FormulaValue::String("Yes".into()));
        assert_eq!(
            eval("=IF(AND(1>0,2<3),SUM(1,2,3)*2,0)"),
            FormulaValue::Number(12.0)
        );
    }

    #[test]
    fn test_unknown_function_yields_name_error() {
        assert_eq!(eval("=NOSUCHFN(1)"), FormulaValue::Error(CellError::Name));
    }

    #[test]
    fn test_argument_count_is_host_error() {
        let registry = FunctionRegistry::new();
        let ast = parse_formula("=ABS(1,2)").unwrap();
        let ctx = EvaluationContext::detached(&registry);
        assert!(matches!(
            evaluate(&ast, &ctx),
            Err(FormulaError::ArgumentCount { .. })
        ));
    }

    #[test]
    fn test_array_broadcast() {
        assert_eq!(
            eval("={1,2,3}+1"),
            FormulaValue::Array(vec![vec![
                FormulaValue::Number(2.0),
                FormulaValue::Number(3.0),
                FormulaValue::Number(4.0),
            ]])
        );
    }

    #[test]
    fn test_cell_and_range_resolution() {
        let mut wb = Workbook::new();
        let ws = wb.worksheet_mut(0).unwrap();
        ws.set_cell_value_at(0, 0, 10.0).unwrap();
        ws.set_cell_value_at(1, 0, 20.0).unwrap();
        ws.set_cell_value_at(2, 0, 30.0).unwrap();

        assert_eq!(eval_in(&wb, 0, "=A1"), FormulaValue::Number(10.0));
        assert_eq!(eval_in(&wb, 0, "=A1+A2"), FormulaValue::Number(30.0));
        assert_eq!(eval_in(&wb, 0, "=SUM(A1:A3)"), FormulaValue::Number(60.0));
        // Unbounded column clamps to the used extent
        assert_eq!(eval_in(&wb, 0, "=SUM(A:A)"), FormulaValue::Number(60.0));
        // Missing cell is empty, which is 0 in arithmetic
        assert_eq!(eval_in(&wb, 0, "=A1+B7"), FormulaValue::Number(10.0));
    }

    #[test]
    fn test_cross_sheet_resolution() {
        let mut wb = Workbook::new();
        wb.add_worksheet_with_name("Data").unwrap();
        wb.worksheet_mut(1)
            .unwrap()
            .set_cell_value_at(0, 0, 99.0)
            .unwrap();

        assert_eq!(eval_in(&wb, 0, "=Data!A1"), FormulaValue::Number(99.0));
        assert_eq!(
            eval_in(&wb, 0, "=Missing!A1"),
            FormulaValue::Error(CellError::Ref)
        );
    }

    #[test]
    fn test_workbook_qualifier() {
        let mut wb = Workbook::new();
        wb.set_unit_id("book1");
        wb.worksheet_mut(0)
            .unwrap()
            .set_cell_value_at(0, 0, 5.0)
            .unwrap();

        assert_eq!(
            eval_in(&wb, 0, "=[book1]Sheet1!A1"),
            FormulaValue::Number(5.0)
        );
        assert_eq!(
            eval_in(&wb, 0, "=[other]Sheet1!A1"),
            FormulaValue::Error(CellError::Ref)
        );
    }

    #[test]
    fn test_named_range_resolution() {
        let mut wb = Workbook::new();
        wb.worksheet_mut(0)
            .unwrap()
            .set_cell_value_at(0, 1, 0.05)
            .unwrap();
        wb.define_name("TaxRate", "Sheet1!$B$1").unwrap();
        wb.define_name("Flat", "42").unwrap();

        assert_eq!(eval_in(&wb, 0, "=TaxRate"), FormulaValue::Number(0.05));
        assert_eq!(eval_in(&wb, 0, "=Flat+1"), FormulaValue::Number(43.0));
        assert_eq!(
            eval_in(&wb, 0, "=NoSuchName"),
            FormulaValue::Error(CellError::Name)
        );
    }

    #[test]
    fn test_shared_offset_shifts_relative_refs() {
        let mut wb = Workbook::new();
        let ws = wb.worksheet_mut(0).unwrap();
        ws.set_cell_value_at(0, 0, 1.0).unwrap();
        ws.set_cell_value_at(1, 0, 2.0).unwrap();
        ws.set_cell_value_at(0, 1, 100.0).unwrap();

        let registry = FunctionRegistry::new();
        let ast = parse_formula("=A1+$B$1").unwrap();

        // Offset (1, 0): relative A1 becomes A2, absolute $B$1 stays
        let ctx =
            EvaluationContext::new(Some(&wb), 0, 1, 2, &registry).with_shared_offset((1, 0));
        assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(102.0));
    }

    #[test]
    fn test_lambda_call() {
        assert_eq!(eval("=LAMBDA(x, x*2)(21)"), FormulaValue::Number(42.0));
        assert_eq!(
            eval("=LAMBDA(a, b, a&b)(\"x\", \"y\")"),
            FormulaValue::String("xy".into())
        );
        // Unapplied lambda has no value
        assert_eq!(eval("=LAMBDA(x, x)"), FormulaValue::Error(CellError::Calc));
        // Wrong arity
        assert_eq!(
            eval("=LAMBDA(x, y, x+y)(1)"),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_union_flattens_members() {
        let mut wb = Workbook::new();
        let ws = wb.worksheet_mut(0).unwrap();
        ws.set_cell_value_at(0, 0, 1.0).unwrap();
        ws.set_cell_value_at(1, 0, 2.0).unwrap();
        ws.set_cell_value_at(0, 2, 10.0).unwrap();

        assert_eq!(
            eval_in(&wb, 0, "=SUM((A1:A2,C1))"),
            FormulaValue::Number(13.0)
        );
    }
}
