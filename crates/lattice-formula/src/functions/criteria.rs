//! Criteria matching shared by SUMIF and COUNTIF
//!
//! A criteria value can be a number (exact numeric match), a comparison
//! string such as `">5"` or `"<>0"`, or a text pattern. Text matching is
//! case-insensitive and supports `*` (any run of characters) and `?`
//! (exactly one character).

use crate::value::FormulaValue;
use lazy_regex::regex_captures;
use regex::Regex;

const NUMERIC_EPSILON: f64 = 1e-10;

/// Compiled criteria for one SUMIF/COUNTIF call
#[derive(Debug)]
pub struct CriteriaMatcher {
    criteria: Criteria,
}

#[derive(Debug)]
enum Criteria {
    /// Exact numeric match (text that looks like a number does not match)
    Number(f64),
    Comparison(ComparisonOp, f64),
    /// Case-insensitive text match, wildcards compiled to a regex
    Text(Regex),
    /// Matches empty cells and empty strings
    Blank,
}

#[derive(Debug, Clone, Copy)]
enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl CriteriaMatcher {
    pub fn new(criteria: &FormulaValue) -> Self {
        let criteria = match criteria {
            FormulaValue::Number(n) => Criteria::Number(*n),
            FormulaValue::Boolean(b) => Criteria::Number(if *b { 1.0 } else { 0.0 }),
            FormulaValue::String(s) => parse_text_criteria(s),
            // Empty, errors and arrays as criteria match only blanks
            _ => Criteria::Blank,
        };
        Self { criteria }
    }

    /// Whether a cell value satisfies the criteria
    pub fn matches(&self, value: &FormulaValue) -> bool {
        match &self.criteria {
            Criteria::Number(target) => match numeric(value) {
                Some(n) => (n - target).abs() < NUMERIC_EPSILON,
                None => false,
            },
            Criteria::Comparison(op, target) => {
                let Some(n) = numeric(value) else { return false };
                match op {
                    ComparisonOp::Equal => (n - target).abs() < NUMERIC_EPSILON,
                    ComparisonOp::NotEqual => (n - target).abs() >= NUMERIC_EPSILON,
                    ComparisonOp::LessThan => n < *target,
                    ComparisonOp::LessEqual => n <= *target,
                    ComparisonOp::GreaterThan => n > *target,
                    ComparisonOp::GreaterEqual => n >= *target,
                }
            }
            Criteria::Text(pattern) => pattern.is_match(&value.as_string()),
            Criteria::Blank => match value {
                FormulaValue::Empty => true,
                FormulaValue::String(s) => s.is_empty(),
                _ => false,
            },
        }
    }
}

/// Numeric view of a cell for criteria purposes
///
/// Unlike general coercion, text is never treated as a number here:
/// `COUNTIF(range, 5)` does not count the string `"5"`.
fn numeric(value: &FormulaValue) -> Option<f64> {
    match value {
        FormulaValue::Number(n) => Some(*n),
        FormulaValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn parse_text_criteria(s: &str) -> Criteria {
    let s = s.trim();
    if s.is_empty() {
        return Criteria::Blank;
    }

    if let Some((_, op, rest)) = regex_captures!(r"^(<=|>=|<>|<|>|=)\s*(.*)$", s) {
        if let Ok(n) = rest.trim().parse::<f64>() {
            let op = match op {
                "<=" => ComparisonOp::LessEqual,
                ">=" => ComparisonOp::GreaterEqual,
                "<>" => ComparisonOp::NotEqual,
                "<" => ComparisonOp::LessThan,
                ">" => ComparisonOp::GreaterThan,
                _ => ComparisonOp::Equal,
            };
            return Criteria::Comparison(op, n);
        }
        // Text after an operator ("=apple") falls through to a text match
        // on the remainder for `=`, and on the whole string otherwise
        if op == "=" {
            return Criteria::Text(compile_pattern(rest));
        }
    }

    if let Ok(n) = s.parse::<f64>() {
        return Criteria::Number(n);
    }

    Criteria::Text(compile_pattern(s))
}

/// Compile a wildcard pattern to an anchored case-insensitive regex
fn compile_pattern(pattern: &str) -> Regex {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            _ => source.push_str(&regex::escape(&ch.to_string())),
        }
    }
    source.push('$');
    // The source is escaped character by character, compilation cannot fail
    Regex::new(&source).unwrap_or_else(|_| Regex::new("$^").unwrap())
}
