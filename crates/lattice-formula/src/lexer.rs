//! Formula tokenizer
//!
//! Splits formula text into a flat token stream for the parser. The lexer
//! is a pure function: no workbook context, no reference resolution. Cell
//! and range endpoint tokens keep their raw text (including `$` markers)
//! so the reference grammar in `lattice-core` can do the actual parsing.

use crate::error::{FormulaError, FormulaResult};
use lattice_core::{CellAddress, CellError, MAX_ROWS};

/// A single lexed token with its source offset
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Character offset of the token's first character
    pub pos: usize,
}

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Numeric literal: `42`, `3.14`, `1e-3`
    Number(f64),
    /// String literal with `""` escapes already resolved
    String(String),
    /// `TRUE` / `FALSE`
    Boolean(bool),
    /// Error literal: `#REF!`, `#DIV/0!`, ...
    ErrorLiteral(CellError),
    /// Function or defined name; also bare column letters like `A` in `A:C`
    Identifier(String),
    /// Raw reference endpoint text with `$` markers: `A1`, `$B$2`, `$A`, `$4`
    Reference(String),
    /// `Sheet1!`, `'My Sheet'!`, `[Book1]Sheet1!`
    SheetPrefix { unit_id: String, sheet_name: String },

    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Ampersand,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Comma,
    Semicolon,
    Colon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
}

/// Tokenize formula text (without any leading `=`)
pub fn tokenize(text: &str) -> FormulaResult<Vec<Token>> {
    Lexer::new(text).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn push(&mut self, kind: TokenKind, pos: usize) {
        self.tokens.push(Token { kind, pos });
    }

    fn err(&self, pos: usize, message: impl Into<String>) -> FormulaError {
        FormulaError::Lex {
            pos,
            message: message.into(),
        }
    }

    fn run(mut self) -> FormulaResult<Vec<Token>> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                c if c.is_whitespace() => {
                    self.pos += 1;
                }
                '0'..='9' => self.scan_number(start)?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.scan_number(start)?
                }
                '"' => self.scan_string(start)?,
                '#' => self.scan_error_literal(start)?,
                '\'' => {
                    let sheet_name = self.scan_quoted_sheet(start)?;
                    self.push(
                        TokenKind::SheetPrefix {
                            unit_id: String::new(),
                            sheet_name,
                        },
                        start,
                    );
                }
                '[' => self.scan_workbook_prefix(start)?,
                '$' => self.scan_dollar_reference(start),
                c if c.is_alphabetic() || c == '_' => self.scan_word(start),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '^' => self.single(TokenKind::Caret),
                '&' => self.single(TokenKind::Ampersand),
                '%' => self.single(TokenKind::Percent),
                '=' => self.single(TokenKind::Equal),
                ',' => self.single(TokenKind::Comma),
                ';' => self.single(TokenKind::Semicolon),
                ':' => self.single(TokenKind::Colon),
                '(' => self.single(TokenKind::LeftParen),
                ')' => self.single(TokenKind::RightParen),
                '{' => self.single(TokenKind::LeftBrace),
                '}' => self.single(TokenKind::RightBrace),
                '<' => {
                    self.pos += 1;
                    match self.peek() {
                        Some('=') => {
                            self.pos += 1;
                            self.push(TokenKind::LessEqual, start);
                        }
                        Some('>') => {
                            self.pos += 1;
                            self.push(TokenKind::NotEqual, start);
                        }
                        _ => self.push(TokenKind::Less, start),
                    }
                }
                '>' => {
                    self.pos += 1;
                    if self.peek() == Some('=') {
                        self.pos += 1;
                        self.push(TokenKind::GreaterEqual, start);
                    } else {
                        self.push(TokenKind::Greater, start);
                    }
                }
                c => return Err(self.err(start, format!("Unexpected character '{}'", c))),
            }
        }
        Ok(self.tokens)
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.pos;
        self.pos += 1;
        self.push(kind, start);
    }

    fn scan_number(&mut self, start: usize) -> FormulaResult<()> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        // Scientific notation: only consume the 'e' if a digit follows
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(1), Some('+') | Some('-')) {
                lookahead = 2;
            }
            if self.peek_at(lookahead).is_some_and(|c| c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
                if matches!(self.peek(), Some('+') | Some('-')) {
                    text.push(self.bump().unwrap());
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }
        }
        let value: f64 = text
            .parse()
            .map_err(|_| self.err(start, format!("Invalid number '{}'", text)))?;
        self.push(TokenKind::Number(value), start);
        Ok(())
    }

    fn scan_string(&mut self, start: usize) -> FormulaResult<()> {
        self.pos += 1; // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => {
                    // "" escapes a literal quote
                    if self.peek() == Some('"') {
                        value.push('"');
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Some(c) => value.push(c),
                None => return Err(self.err(start, "Unterminated string literal")),
            }
        }
        self.push(TokenKind::String(value), start);
        Ok(())
    }

    fn scan_error_literal(&mut self, start: usize) -> FormulaResult<()> {
        let mut text = String::from('#');
        self.pos += 1;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '/' {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if matches!(self.peek(), Some('!') | Some('?')) {
            text.push(self.bump().unwrap());
        }
        match CellError::from_str(&text) {
            Some(e) => {
                self.push(TokenKind::ErrorLiteral(e), start);
                Ok(())
            }
            None => Err(self.err(start, format!("Unknown error literal '{}'", text))),
        }
    }

    /// Scan `'name'` (with `''` and `\'` escapes) which must be followed by `!`
    fn scan_quoted_sheet(&mut self, start: usize) -> FormulaResult<String> {
        self.pos += 1; // opening quote
        let mut name = String::new();
        loop {
            match self.bump() {
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        name.push('\'');
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Some('\\') => {
                    if self.peek() == Some('\'') {
                        name.push('\'');
                        self.pos += 1;
                    } else {
                        name.push('\\');
                    }
                }
                Some(c) => name.push(c),
                None => return Err(self.err(start, "Unterminated sheet name")),
            }
        }
        if self.peek() != Some('!') {
            return Err(self.err(start, "Quoted sheet name must be followed by '!'"));
        }
        self.pos += 1;
        Ok(name)
    }

    /// Scan `[unitId]sheetName!`
    fn scan_workbook_prefix(&mut self, start: usize) -> FormulaResult<()> {
        self.pos += 1; // '['
        let mut unit_id = String::new();
        loop {
            match self.bump() {
                Some(']') => break,
                Some(c) => unit_id.push(c),
                None => return Err(self.err(start, "Unterminated workbook qualifier")),
            }
        }
        let sheet_name = if self.peek() == Some('\'') {
            self.scan_quoted_sheet(self.pos)?
        } else {
            let mut name = String::new();
            while let Some(c) = self.peek() {
                if c == '!' {
                    break;
                }
                if c.is_alphanumeric() || c == '_' || c == '.' {
                    name.push(c);
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if self.peek() != Some('!') {
                return Err(self.err(start, "Workbook qualifier must precede 'sheet!'"));
            }
            self.pos += 1;
            name
        };
        self.push(TokenKind::SheetPrefix { unit_id, sheet_name }, start);
        Ok(())
    }

    /// Scan a `$`-led reference endpoint: `$A$1`, `$A`, `$4`
    fn scan_dollar_reference(&mut self, start: usize) {
        let mut text = String::from('$');
        self.pos += 1;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.peek() == Some('$') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('$');
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Reference(text), start);
    }

    /// Scan a letter-led word: identifier, boolean, cell reference, or a
    /// bare sheet prefix (`Sheet1!`)
    fn scan_word(&mut self, start: usize) {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        // `A$1` - a row-absolute marker mid-token makes this a reference
        if self.peek() == Some('$') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('$');
            self.pos += 1;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.pos += 1;
                } else {
                    break;
                }
            }
            self.push(TokenKind::Reference(text), start);
            return;
        }

        if self.peek() == Some('!') {
            self.pos += 1;
            self.push(
                TokenKind::SheetPrefix {
                    unit_id: String::new(),
                    sheet_name: text,
                },
                start,
            );
            return;
        }

        let upper = text.to_uppercase();
        if upper == "TRUE" {
            self.push(TokenKind::Boolean(true), start);
        } else if upper == "FALSE" {
            self.push(TokenKind::Boolean(false), start);
        } else if is_cell_reference(&text) {
            self.push(TokenKind::Reference(text), start);
        } else {
            self.push(TokenKind::Identifier(text), start);
        }
    }
}

/// Check whether a bare word is a full A1-style cell reference
fn is_cell_reference(text: &str) -> bool {
    let letters_end = text
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    if letters_end == 0 || letters_end == text.len() || letters_end > 3 {
        return false;
    }
    let (letters, digits) = text.split_at(letters_end);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if CellAddress::letters_to_column(letters).is_err() {
        return false;
    }
    matches!(digits.parse::<u32>(), Ok(n) if n >= 1 && n <= MAX_ROWS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42"), vec![TokenKind::Number(42.0)]);
        assert_eq!(kinds("3.14"), vec![TokenKind::Number(3.14)]);
        assert_eq!(kinds("1e3"), vec![TokenKind::Number(1000.0)]);
        assert_eq!(kinds("2.5E-2"), vec![TokenKind::Number(0.025)]);
        assert_eq!(kinds(".5"), vec![TokenKind::Number(0.5)]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds("\"hello\""),
            vec![TokenKind::String("hello".into())]
        );
        assert_eq!(
            kinds("\"say \"\"hi\"\"\""),
            vec![TokenKind::String("say \"hi\"".into())]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            tokenize("\"oops"),
            Err(FormulaError::Lex { .. })
        ));
    }

    #[test]
    fn test_booleans_and_errors() {
        assert_eq!(kinds("TRUE"), vec![TokenKind::Boolean(true)]);
        assert_eq!(kinds("false"), vec![TokenKind::Boolean(false)]);
        assert_eq!(
            kinds("#DIV/0!"),
            vec![TokenKind::ErrorLiteral(CellError::Div0)]
        );
        assert_eq!(kinds("#N/A"), vec![TokenKind::ErrorLiteral(CellError::Na)]);
        assert_eq!(
            kinds("#NAME?"),
            vec![TokenKind::ErrorLiteral(CellError::Name)]
        );
    }

    #[test]
    fn test_references_vs_identifiers() {
        assert_eq!(kinds("A1"), vec![TokenKind::Reference("A1".into())]);
        assert_eq!(kinds("$B$2"), vec![TokenKind::Reference("$B$2".into())]);
        assert_eq!(kinds("A$4"), vec![TokenKind::Reference("A$4".into())]);
        assert_eq!(kinds("$A"), vec![TokenKind::Reference("$A".into())]);
        assert_eq!(kinds("$10"), vec![TokenKind::Reference("$10".into())]);
        assert_eq!(kinds("SUM"), vec![TokenKind::Identifier("SUM".into())]);
        assert_eq!(kinds("A1B"), vec![TokenKind::Identifier("A1B".into())]);
        // XFE is past the last column, so this is a name
        assert_eq!(kinds("XFE1"), vec![TokenKind::Identifier("XFE1".into())]);
    }

    #[test]
    fn test_sheet_prefixes() {
        assert_eq!(
            kinds("Sheet1!A1"),
            vec![
                TokenKind::SheetPrefix {
                    unit_id: String::new(),
                    sheet_name: "Sheet1".into()
                },
                TokenKind::Reference("A1".into()),
            ]
        );
        assert_eq!(
            kinds("'My Sheet'!A1"),
            vec![
                TokenKind::SheetPrefix {
                    unit_id: String::new(),
                    sheet_name: "My Sheet".into()
                },
                TokenKind::Reference("A1".into()),
            ]
        );
        assert_eq!(
            kinds("'it''s'!A1"),
            vec![
                TokenKind::SheetPrefix {
                    unit_id: String::new(),
                    sheet_name: "it's".into()
                },
                TokenKind::Reference("A1".into()),
            ]
        );
        assert_eq!(
            kinds("[Book1]Sheet1!A1"),
            vec![
                TokenKind::SheetPrefix {
                    unit_id: "Book1".into(),
                    sheet_name: "Sheet1".into()
                },
                TokenKind::Reference("A1".into()),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("1+2*3"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Plus,
                TokenKind::Number(2.0),
                TokenKind::Star,
                TokenKind::Number(3.0),
            ]
        );
        assert_eq!(
            kinds("a<=b<>c"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::LessEqual,
                TokenKind::Identifier("b".into()),
                TokenKind::NotEqual,
                TokenKind::Identifier("c".into()),
            ]
        );
        assert_eq!(kinds("50%"), vec![TokenKind::Number(50.0), TokenKind::Percent]);
    }

    #[test]
    fn test_row_range_tokens() {
        assert_eq!(
            kinds("6:11"),
            vec![
                TokenKind::Number(6.0),
                TokenKind::Colon,
                TokenKind::Number(11.0),
            ]
        );
    }

    #[test]
    fn test_array_literal_tokens() {
        assert_eq!(
            kinds("{1,2;3,4}"),
            vec![
                TokenKind::LeftBrace,
                TokenKind::Number(1.0),
                TokenKind::Comma,
                TokenKind::Number(2.0),
                TokenKind::Semicolon,
                TokenKind::Number(3.0),
                TokenKind::Comma,
                TokenKind::Number(4.0),
                TokenKind::RightBrace,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("1 + A1").unwrap();
        assert_eq!(tokens[0].pos, 0);
        assert_eq!(tokens[1].pos, 2);
        assert_eq!(tokens[2].pos, 4);
    }

    #[test]
    fn test_bad_character() {
        assert!(matches!(tokenize("1 ~ 2"), Err(FormulaError::Lex { .. })));
    }
}
