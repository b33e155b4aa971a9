//! Arithmetic formula parser and evaluator for calculated columns.
//!
//! Supports expressions like:
//! - `price * qty`
//! - `(gross - discount) / units`
//! - `amount * 1.21`
//! - `-balance % 7`
//!
//! Identifiers are column attrs resolved against the row being evaluated.
//! Nothing but arithmetic is evaluated: there are no calls, no assignment and
//! no access to anything outside the row.

use crate::error::FormulaError;
use crate::value::CellValue;

/// A parsed formula that can be evaluated against a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Reference to a column of the current row
    Column(String),
    /// Unary negation
    Neg(Box<Expr>),
    /// Binary arithmetic
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Rem, // %
}

/// Token types for lexing
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Eof,
}

/// Lexer for tokenizing formula strings
struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_number(&mut self) -> Result<Token, FormulaError> {
        let start = self.pos;
        let mut num_str = String::new();
        let mut seen_dot = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                num_str.push(c);
                self.advance();
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                num_str.push(c);
                self.advance();
            } else if (c == 'e' || c == 'E') && !num_str.is_empty() {
                // exponent, optionally signed
                num_str.push(c);
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    num_str.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        num_str
            .parse()
            .map(Token::Number)
            .map_err(|_| FormulaError::UnexpectedToken(format!("'{}' at {}", num_str, start)))
    }

    fn next_token(&mut self) -> Result<Token, FormulaError> {
        self.skip_whitespace();

        match self.peek() {
            None => Ok(Token::Eof),
            Some(c) => match c {
                '(' => { self.advance(); Ok(Token::LParen) }
                ')' => { self.advance(); Ok(Token::RParen) }
                '+' => { self.advance(); Ok(Token::Plus) }
                '-' => { self.advance(); Ok(Token::Minus) }
                '*' => { self.advance(); Ok(Token::Star) }
                '/' => { self.advance(); Ok(Token::Slash) }
                '%' => { self.advance(); Ok(Token::Percent) }
                _ if c.is_ascii_digit() || c == '.' => self.read_number(),
                _ if c.is_alphabetic() || c == '_' => Ok(Token::Ident(self.read_ident())),
                _ => Err(FormulaError::UnexpectedChar(c, self.pos)),
            },
        }
    }
}

/// Recursive-descent parser building the formula AST
struct Parser {
    lexer: Lexer,
    current: Token,
}

impl Parser {
    fn new(input: &str) -> Result<Self, FormulaError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current })
    }

    fn advance(&mut self) -> Result<(), FormulaError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: &Token) -> Result<(), FormulaError> {
        if &self.current == expected {
            self.advance()
        } else {
            Err(FormulaError::UnexpectedToken(format!(
                "expected {:?}, got {:?}",
                expected, self.current
            )))
        }
    }

    /// Additive expressions (lowest precedence)
    fn parse_sum(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_product()?;

        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_product()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }

        Ok(left)
    }

    /// Multiplicative expressions
    fn parse_product(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        match self.current {
            Token::Minus => {
                self.advance()?;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Token::Plus => {
                self.advance()?;
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        match &self.current {
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_sum()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::Number(n) => {
                let n = *n;
                self.advance()?;
                Ok(Expr::Number(n))
            }
            Token::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(Expr::Column(name))
            }
            other => Err(FormulaError::UnexpectedToken(format!("{:?}", other))),
        }
    }
}

/// Parse a formula string into an [`Expr`].
pub fn parse_formula(input: &str) -> Result<Expr, FormulaError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_sum()?;

    if parser.current != Token::Eof {
        return Err(FormulaError::UnexpectedToken(format!(
            "{:?} after expression",
            parser.current
        )));
    }

    Ok(expr)
}

/// Evaluate a formula using a column lookup function.
///
/// Referenced cells are coerced with [`CellValue::to_number`], so a non-numeric
/// cell makes the whole result `NaN`. Unknown columns are an error.
pub fn eval_formula<F>(expr: &Expr, get_column: &F) -> Result<f64, FormulaError>
where
    F: Fn(&str) -> Option<CellValue>,
{
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Column(name) => get_column(name)
            .map(|v| v.to_number())
            .ok_or_else(|| FormulaError::UnknownColumn(name.clone())),
        Expr::Neg(inner) => Ok(-eval_formula(inner, get_column)?),
        Expr::Binary { op, left, right } => {
            let a = eval_formula(left, get_column)?;
            let b = eval_formula(right, get_column)?;
            Ok(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
            })
        }
    }
}

/// Extract all column names referenced in a formula.
pub fn extract_columns(expr: &Expr) -> Vec<String> {
    let mut columns = Vec::new();
    extract_columns_recursive(expr, &mut columns);
    columns.sort();
    columns.dedup();
    columns
}

fn extract_columns_recursive(expr: &Expr, columns: &mut Vec<String>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Column(name) => columns.push(name.clone()),
        Expr::Neg(inner) => extract_columns_recursive(inner, columns),
        Expr::Binary { left, right, .. } => {
            extract_columns_recursive(left, columns);
            extract_columns_recursive(right, columns);
        }
    }
}
