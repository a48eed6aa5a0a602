//! Formula parser
//!
//! Recursive descent over the token stream with one token of lookahead.
//! Precedence, loosest to tightest: comparison, `&`, `+ -`, `* /`, `^`
//! (right associative), unary prefix `-`/`+` and postfix `%`, range,
//! primary.
//!
//! Reference endpoints are re-joined textually (`A1` `:` `B2` becomes
//! `A1:B2`) and handed to the reference grammar in `lattice-core`, so the
//! parser and the serializer agree on every form, including `$` markers
//! and unbounded column/row ranges. Malformed reference text becomes a
//! `#REF!` literal in the AST rather than a parse failure.

use crate::ast::{union_by, BinaryOperator, FormulaExpr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::lexer::{tokenize, Token, TokenKind};
use lattice_core::{
    deserialize_range, CellAddress, CellError, RangeType, SheetRange, MAX_ROWS,
};

/// Parse a formula (with or without a leading `=`) into an AST
pub fn parse_formula(text: &str) -> FormulaResult<FormulaExpr> {
    let body = text.trim();
    let body = body.strip_prefix('=').unwrap_or(body);
    if body.is_empty() {
        return Err(FormulaError::Parse("Empty formula".into()));
    }

    let tokens = tokenize(body)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(FormulaError::Parse(format!(
            "Unexpected token at offset {}",
            token.pos
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> FormulaResult<()> {
        match self.peek() {
            Some(k) if *k == kind => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(FormulaError::Parse(format!("Expected {}", what))),
        }
    }

    // ==================== Precedence chain ====================

    fn parse_expression(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_concatenation()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Equal) => BinaryOperator::Equal,
                Some(TokenKind::NotEqual) => BinaryOperator::NotEqual,
                Some(TokenKind::Less) => BinaryOperator::LessThan,
                Some(TokenKind::LessEqual) => BinaryOperator::LessEqual,
                Some(TokenKind::Greater) => BinaryOperator::GreaterThan,
                Some(TokenKind::GreaterEqual) => BinaryOperator::GreaterEqual,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_concatenation()?;
            left = FormulaExpr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_concatenation(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_additive()?;
        while matches!(self.peek(), Some(TokenKind::Ampersand)) {
            self.pos += 1;
            let right = self.parse_additive()?;
            left = FormulaExpr::BinaryOp {
                op: BinaryOperator::Concat,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOperator::Add,
                Some(TokenKind::Minus) => BinaryOperator::Subtract,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = FormulaExpr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOperator::Multiply,
                Some(TokenKind::Slash) => BinaryOperator::Divide,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_exponent()?;
            left = FormulaExpr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// `^` is right associative: `2^3^2` is `2^(3^2)`
    fn parse_exponent(&mut self) -> FormulaResult<FormulaExpr> {
        let base = self.parse_unary()?;
        if matches!(self.peek(), Some(TokenKind::Caret)) {
            self.pos += 1;
            let exponent = self.parse_exponent()?;
            return Ok(FormulaExpr::BinaryOp {
                op: BinaryOperator::Power,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> FormulaResult<FormulaExpr> {
        match self.peek() {
            Some(TokenKind::Minus) => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                return Ok(FormulaExpr::UnaryOp {
                    op: UnaryOperator::Negate,
                    operand: Box::new(operand),
                });
            }
            Some(TokenKind::Plus) => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                return Ok(FormulaExpr::UnaryOp {
                    op: UnaryOperator::Plus,
                    operand: Box::new(operand),
                });
            }
            _ => {}
        }

        let mut expr = self.parse_range()?;
        while matches!(self.peek(), Some(TokenKind::Percent)) {
            self.pos += 1;
            expr = FormulaExpr::UnaryOp {
                op: UnaryOperator::Percent,
                operand: Box::new(expr),
            };
        }
        Ok(expr)
    }

    // ==================== References ====================

    /// Parse a (possibly sheet-qualified, possibly `:`-joined) reference,
    /// or fall through to a primary expression
    fn parse_range(&mut self) -> FormulaResult<FormulaExpr> {
        let prefix = match self.peek() {
            Some(TokenKind::SheetPrefix { .. }) => {
                let Some(Token {
                    kind: TokenKind::SheetPrefix { unit_id, sheet_name },
                    ..
                }) = self.advance()
                else {
                    unreachable!()
                };
                Some((unit_id.clone(), sheet_name.clone()))
            }
            _ => None,
        };

        let starts_reference = match self.peek() {
            Some(TokenKind::Reference(_)) => true,
            Some(kind) => {
                endpoint_text(kind).is_some()
                    && (prefix.is_some() || matches!(self.peek_at(1), Some(TokenKind::Colon)))
            }
            None => false,
        };

        if !starts_reference {
            if prefix.is_some() {
                return Err(FormulaError::Parse(
                    "Expected cell or range after sheet qualifier".into(),
                ));
            }
            return self.parse_primary();
        }

        let mut expr = self.parse_reference_operand(prefix)?;

        // Further `:` operators union unbounded references: `A:A:C:C` widens
        // to the covering column span. Mismatched kinds or sheet qualifiers
        // collapse to `#REF!` in `union_by`.
        while matches!(
            expr,
            FormulaExpr::ColumnRef(_) | FormulaExpr::RowRef(_) | FormulaExpr::Error(CellError::Ref)
        ) && matches!(self.peek(), Some(TokenKind::Colon))
        {
            let next = self.peek_at(1);
            let has_prefix = matches!(next, Some(TokenKind::SheetPrefix { .. }));
            if !has_prefix && next.and_then(endpoint_text).is_none() {
                break;
            }
            self.pos += 1;
            let right_prefix = match self.peek() {
                Some(TokenKind::SheetPrefix { .. }) => {
                    let Some(Token {
                        kind: TokenKind::SheetPrefix { unit_id, sheet_name },
                        ..
                    }) = self.advance()
                    else {
                        unreachable!()
                    };
                    Some((unit_id.clone(), sheet_name.clone()))
                }
                _ => None,
            };
            let right = self.parse_reference_operand(right_prefix)?;
            expr = union_by(&expr, &right);
        }
        Ok(expr)
    }

    /// Parse one reference operand: an endpoint, optionally `:`-joined with
    /// a second endpoint, classified through the reference grammar
    fn parse_reference_operand(
        &mut self,
        prefix: Option<(String, String)>,
    ) -> FormulaResult<FormulaExpr> {
        let mut text = self.take_endpoint()?;
        if matches!(self.peek(), Some(TokenKind::Colon)) {
            // Only join if the other side is an endpoint too
            if self.peek_at(1).and_then(endpoint_text).is_some() {
                self.pos += 1;
                text.push(':');
                text.push_str(&self.take_endpoint()?);
            }
        }

        let range = deserialize_range(&text);
        if range.is_empty() {
            return Ok(FormulaExpr::Error(CellError::Ref));
        }
        let (unit_id, sheet_name) = prefix.unwrap_or_default();
        let sheet_range = SheetRange {
            unit_id,
            sheet_name,
            range,
        };
        Ok(match range.range_type {
            RangeType::Column => FormulaExpr::ColumnRef(sheet_range),
            RangeType::Row => FormulaExpr::RowRef(sheet_range),
            _ if range.is_single_cell() => FormulaExpr::CellRef(sheet_range),
            _ => FormulaExpr::RangeRef(sheet_range),
        })
    }

    fn take_endpoint(&mut self) -> FormulaResult<String> {
        match self.peek().and_then(endpoint_text) {
            Some(text) => {
                self.pos += 1;
                Ok(text)
            }
            None => Err(FormulaError::Parse("Expected range endpoint".into())),
        }
    }

    // ==================== Primaries ====================

    fn parse_primary(&mut self) -> FormulaResult<FormulaExpr> {
        let mut expr = match self.peek().cloned() {
            Some(TokenKind::Number(n)) => {
                self.pos += 1;
                FormulaExpr::Number(n)
            }
            Some(TokenKind::String(s)) => {
                self.pos += 1;
                FormulaExpr::String(s)
            }
            Some(TokenKind::Boolean(b)) => {
                self.pos += 1;
                FormulaExpr::Boolean(b)
            }
            Some(TokenKind::ErrorLiteral(e)) => {
                self.pos += 1;
                FormulaExpr::Error(e)
            }
            Some(TokenKind::Identifier(name)) => {
                self.pos += 1;
                if matches!(self.peek(), Some(TokenKind::LeftParen)) {
                    self.parse_function_call(name)?
                } else {
                    FormulaExpr::NameRef(name)
                }
            }
            Some(TokenKind::Reference(_)) => {
                // parse_range handles these; a lone partial like `$A` lands
                // here only through malformed joins
                return self.parse_range();
            }
            Some(TokenKind::LeftParen) => {
                self.pos += 1;
                let first = self.parse_expression()?;
                if matches!(self.peek(), Some(TokenKind::Comma)) {
                    // Parenthesized comma-joined reference list
                    let mut items = vec![first];
                    while matches!(self.peek(), Some(TokenKind::Comma)) {
                        self.pos += 1;
                        items.push(self.parse_expression()?);
                    }
                    self.expect(TokenKind::RightParen, "')'")?;
                    FormulaExpr::Union(items)
                } else {
                    self.expect(TokenKind::RightParen, "')'")?;
                    first
                }
            }
            Some(TokenKind::LeftBrace) => self.parse_array()?,
            _ => return Err(FormulaError::Parse("Unexpected end of formula".into())),
        };

        // A lambda immediately applied: LAMBDA(x, x*2)(21)
        while matches!(self.peek(), Some(TokenKind::LeftParen))
            && matches!(expr, FormulaExpr::Lambda { .. } | FormulaExpr::Call { .. })
        {
            let args = self.parse_argument_list()?;
            expr = FormulaExpr::Call {
                callee: Box::new(expr),
                args,
            };
        }
        Ok(expr)
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<FormulaExpr> {
        let args = self.parse_argument_list()?;
        let name = name.to_uppercase();
        if name == "LAMBDA" {
            return build_lambda(args);
        }
        Ok(FormulaExpr::Function { name, args })
    }

    fn parse_argument_list(&mut self) -> FormulaResult<Vec<FormulaExpr>> {
        self.expect(TokenKind::LeftParen, "'('")?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(TokenKind::RightParen)) {
            loop {
                args.push(self.parse_expression()?);
                if matches!(self.peek(), Some(TokenKind::Comma)) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(args)
    }

    /// `{1,2;3,4}` - rows separated by `;`, columns by `,`
    fn parse_array(&mut self) -> FormulaResult<FormulaExpr> {
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut rows = Vec::new();
        let mut current = Vec::new();
        loop {
            current.push(self.parse_expression()?);
            match self.peek() {
                Some(TokenKind::Comma) => {
                    self.pos += 1;
                }
                Some(TokenKind::Semicolon) => {
                    self.pos += 1;
                    rows.push(std::mem::take(&mut current));
                }
                Some(TokenKind::RightBrace) => {
                    self.pos += 1;
                    rows.push(current);
                    break;
                }
                _ => return Err(FormulaError::Parse("Expected ',', ';' or '}'".into())),
            }
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(FormulaError::Parse("Ragged array literal".into()));
        }
        Ok(FormulaExpr::Array(rows))
    }
}

fn build_lambda(mut args: Vec<FormulaExpr>) -> FormulaResult<FormulaExpr> {
    if args.is_empty() {
        return Err(FormulaError::Parse("LAMBDA requires a body".into()));
    }
    let body = args.pop().unwrap();
    let mut params = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            FormulaExpr::NameRef(name) => params.push(name),
            _ => {
                return Err(FormulaError::Parse(
                    "LAMBDA parameters must be plain names".into(),
                ))
            }
        }
    }
    Ok(FormulaExpr::Lambda {
        params,
        body: Box::new(body),
    })
}

/// The raw text a token contributes to a range endpoint, if any
fn endpoint_text(kind: &TokenKind) -> Option<String> {
    match kind {
        TokenKind::Reference(text) => Some(text.clone()),
        TokenKind::Identifier(text)
            if text.len() <= 3
                && text.bytes().all(|b| b.is_ascii_alphabetic())
                && CellAddress::letters_to_column(text).is_ok() =>
        {
            Some(text.clone())
        }
        TokenKind::Number(n) if n.fract() == 0.0 && *n >= 1.0 && *n <= MAX_ROWS as f64 => {
            Some(format!("{}", *n as u64))
        }
        _ => None,
    }
}
