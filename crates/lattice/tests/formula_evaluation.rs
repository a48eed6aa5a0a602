//! Tests for formula evaluation with cell references

use lattice::prelude::*;
use lattice::{evaluate, parse_formula, EvaluationContext, FormulaValue};

/// Test basic formula evaluation without cell references
#[test]
fn test_evaluate_simple_formulas() {
    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::detached(&registry);

    // Arithmetic
    let ast = parse_formula("=1+2*3").unwrap();
    let result = evaluate(&ast, &ctx).unwrap();
    assert_eq!(result, FormulaValue::Number(7.0));

    // String concatenation
    let ast = parse_formula("=\"Hello \"&\"World\"").unwrap();
    let result = evaluate(&ast, &ctx).unwrap();
    assert_eq!(result, FormulaValue::String("Hello World".into()));

    // Comparison
    let ast = parse_formula("=5>3").unwrap();
    let result = evaluate(&ast, &ctx).unwrap();
    assert_eq!(result, FormulaValue::Boolean(true));

    // Percent and unary minus
    let ast = parse_formula("=-50%").unwrap();
    let result = evaluate(&ast, &ctx).unwrap();
    assert_eq!(result, FormulaValue::Number(-0.5));
}

/// Errors propagate eagerly through operators, left operand first
#[test]
fn test_eager_error_propagation() {
    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::detached(&registry);

    let ast = parse_formula("=1+#REF!").unwrap();
    let result = evaluate(&ast, &ctx).unwrap();
    assert_eq!(result, FormulaValue::Error(CellError::Ref));

    let ast = parse_formula("=#DIV/0!=#NAME?").unwrap();
    let result = evaluate(&ast, &ctx).unwrap();
    assert_eq!(result, FormulaValue::Error(CellError::Div0));
}

/// COUNT skips errors instead of propagating them
#[test]
fn test_count_skips_errors() {
    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::detached(&registry);

    let ast = parse_formula("=COUNT(1,#REF!,2,\"text\")").unwrap();
    let result = evaluate(&ast, &ctx).unwrap();
    assert_eq!(result, FormulaValue::Number(2.0));
}

/// Test formula evaluation with cell references
#[test]
fn test_evaluate_with_cell_references() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();

    sheet.set_cell_value("A1", 10.0).unwrap();
    sheet.set_cell_value("A2", 20.0).unwrap();
    sheet.set_cell_value("A3", 30.0).unwrap();
    sheet.set_cell_value("B1", 5.0).unwrap();

    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::new(Some(&wb), 0, 0, 0, &registry);

    let ast = parse_formula("=A1").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(10.0));

    let ast = parse_formula("=A1+B1").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(15.0));

    let ast = parse_formula("=SUM(A1:A3)").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(60.0));

    // Empty referenced cell coerces to zero in arithmetic
    let ast = parse_formula("=C9+1").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(1.0));
}

/// `:`-joined unbounded references evaluate over the widened span
#[test]
fn test_evaluate_column_union() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();

    sheet.set_cell_value("A1", 1.0).unwrap();
    sheet.set_cell_value("B2", 2.0).unwrap();
    sheet.set_cell_value("C3", 10.0).unwrap();
    sheet.set_cell_value("D1", 100.0).unwrap();

    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::new(Some(&wb), 0, 9, 9, &registry);

    // A:A:C:C covers columns A through C, leaving D out
    let ast = parse_formula("=SUM(A:A:C:C)").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(13.0));

    // Joining a column with a row is not a rectangle
    let ast = parse_formula("=SUM(A:A:2:2)").unwrap();
    assert_eq!(
        evaluate(&ast, &ctx).unwrap(),
        FormulaValue::Error(CellError::Ref)
    );
}

/// Array literals broadcast against scalars and shape-matched arrays
#[test]
fn test_array_broadcasting() {
    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::detached(&registry);

    let ast = parse_formula("={1,2,3}+1").unwrap();
    assert_eq!(
        evaluate(&ast, &ctx).unwrap(),
        FormulaValue::Array(vec![vec![
            FormulaValue::Number(2.0),
            FormulaValue::Number(3.0),
            FormulaValue::Number(4.0),
        ]])
    );

    let ast = parse_formula("={1,2}+{10,20}").unwrap();
    assert_eq!(
        evaluate(&ast, &ctx).unwrap(),
        FormulaValue::Array(vec![vec![
            FormulaValue::Number(11.0),
            FormulaValue::Number(22.0),
        ]])
    );

    // Incompatible shapes poison the result with #VALUE!
    let ast = parse_formula("={1,2,3}+{1,2}").unwrap();
    let FormulaValue::Array(rows) = evaluate(&ast, &ctx).unwrap() else {
        panic!("expected an array");
    };
    assert!(rows[0]
        .iter()
        .all(|v| *v == FormulaValue::Error(CellError::Value)));
}

/// Criteria functions match numbers, comparisons, and wildcards
#[test]
fn test_criteria_functions_against_ranges() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    let fruit = ["apple", "apricot", "banana", "cherry"];
    let counts = [10.0, 20.0, 30.0, 40.0];
    for (row, (name, count)) in fruit.iter().zip(counts).enumerate() {
        sheet.set_cell_value_at(row as u32, 0, *name).unwrap();
        sheet.set_cell_value_at(row as u32, 1, count).unwrap();
    }

    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::new(Some(&wb), 0, 0, 0, &registry);

    let ast = parse_formula("=COUNTIF(A1:A4,\"ap*\")").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(2.0));

    let ast = parse_formula("=SUMIF(B1:B4,\">15\")").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(90.0));

    let ast = parse_formula("=SUMIF(A1:A4,\"ap*\",B1:B4)").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(30.0));
}

/// VLOOKUP over a table built in the sheet
#[test]
fn test_vlookup_in_worksheet() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    let table = [("N1", 1.0), ("N2", 2.0), ("N3", 3.0)];
    for (row, (key, value)) in table.iter().enumerate() {
        sheet.set_cell_value_at(row as u32, 0, *key).unwrap();
        sheet.set_cell_value_at(row as u32, 1, *value).unwrap();
    }

    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::new(Some(&wb), 0, 0, 0, &registry);

    let ast = parse_formula("=VLOOKUP(\"N2\",A1:B3,2,FALSE)").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(2.0));

    let ast = parse_formula("=VLOOKUP(\"missing\",A1:B3,2,FALSE)").unwrap();
    assert_eq!(
        evaluate(&ast, &ctx).unwrap(),
        FormulaValue::Error(CellError::Na)
    );
}

/// Defined names resolve through the workbook, scoped names shadow
/// workbook-level ones
#[test]
fn test_named_ranges_in_formulas() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_value("A1", 2.0).unwrap();
    sheet.set_cell_value("A2", 3.0).unwrap();
    wb.define_name("Inputs", "Sheet1!$A$1:$A$2").unwrap();

    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::new(Some(&wb), 0, 0, 0, &registry);

    let ast = parse_formula("=SUM(Inputs)").unwrap();
    assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(5.0));

    // Unknown names evaluate to #NAME?
    let ast = parse_formula("=Nope+1").unwrap();
    assert_eq!(
        evaluate(&ast, &ctx).unwrap(),
        FormulaValue::Error(CellError::Name)
    );
}

/// Unknown functions evaluate to #NAME?, wrong arity is a host error
#[test]
fn test_function_dispatch_failures() {
    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::detached(&registry);

    let ast = parse_formula("=NOTAFUNCTION(1)").unwrap();
    assert_eq!(
        evaluate(&ast, &ctx).unwrap(),
        FormulaValue::Error(CellError::Name)
    );

    let ast = parse_formula("=ABS()").unwrap();
    assert!(evaluate(&ast, &ctx).is_err());
}

/// Evaluation is idempotent: the same AST against the same snapshot
/// yields the same value
#[test]
fn test_evaluation_idempotence() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_value("A1", 7.0).unwrap();

    let registry = FunctionRegistry::new();
    let ctx = EvaluationContext::new(Some(&wb), 0, 0, 0, &registry);

    let ast = parse_formula("=A1*A1+SUM(A1:A1)").unwrap();
    let first = evaluate(&ast, &ctx).unwrap();
    let second = evaluate(&ast, &ctx).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, FormulaValue::Number(56.0));
}
