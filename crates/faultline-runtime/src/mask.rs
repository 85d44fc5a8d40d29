//! The live reporting mask and INI-style mask expressions.
//!
//! `error_reporting` values are written as expressions over level constants,
//! e.g. `E_ALL & ~E_DEPRECATED`. The INI grammar gives `|`, `&` and `^` the
//! same precedence (left-associative) and binds `~`/`!` tighter.
//!
//! Reference: php-src/Zend/zend_ini_parser.y

use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;

use crate::error::ErrorLevel;

/// Shared handle to the active `error_reporting` value.
///
/// Every clone observes the same cell, so holders always read the value in
/// effect at the moment of the read.
#[derive(Debug, Clone)]
pub struct ReportingMask(Rc<Cell<u32>>);

impl ReportingMask {
    pub fn new(mask: u32) -> Self {
        Self(Rc::new(Cell::new(mask)))
    }

    /// Current value.
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Replace the value. Returns the previous one.
    pub fn set(&self, mask: u32) -> u32 {
        self.0.replace(mask)
    }

    /// Whether `level` is currently reported.
    pub fn includes(&self, level: ErrorLevel) -> bool {
        level.is_in(self.get())
    }
}

impl Default for ReportingMask {
    fn default() -> Self {
        Self::new(ErrorLevel::ALL)
    }
}

/// Errors from [`parse_mask`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskError {
    #[error("unknown constant '{0}'")]
    UnknownConstant(String),
    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedToken { offset: usize, found: String },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("integer '{0}' out of range")]
    IntegerOverflow(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Ident(String),
    Op(char),
}

fn tokenize(expr: &str) -> Result<Vec<(usize, Token)>, MaskError> {
    let mut tokens = Vec::new();
    let bytes = expr.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'|' | b'&' | b'^' | b'~' | b'!' | b'(' | b')' => {
                tokens.push((pos, Token::Op(c as char)));
                pos += 1;
            }
            b'0'..=b'9' | b'-' => {
                let start = pos;
                pos += 1;
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                let text = &expr[start..pos];
                if text == "-" {
                    return Err(MaskError::UnexpectedToken {
                        offset: start,
                        found: text.to_string(),
                    });
                }
                let value = text
                    .parse::<i64>()
                    .ok()
                    .filter(|n| (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(n))
                    .ok_or_else(|| MaskError::IntegerOverflow(text.to_string()))?;
                tokens.push((start, Token::Int(value)));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                tokens.push((start, Token::Ident(expr[start..pos].to_string())));
            }
            _ => {
                let found = expr[pos..].chars().next().map(String::from).unwrap_or_default();
                return Err(MaskError::UnexpectedToken { offset: pos, found });
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    /// expr := unary (('|' | '&' | '^') unary)*
    fn expr(&mut self) -> Result<i64, MaskError> {
        let mut acc = self.unary()?;
        while let Some(Token::Op(op @ ('|' | '&' | '^'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            acc = match op {
                '|' => acc | rhs,
                '&' => acc & rhs,
                _ => acc ^ rhs,
            };
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<i64, MaskError> {
        match self.next() {
            Some((_, Token::Op('~'))) => Ok(!self.unary()?),
            Some((_, Token::Op('!'))) => Ok((self.unary()? == 0) as i64),
            Some((_, Token::Op('('))) => {
                let value = self.expr()?;
                match self.next() {
                    Some((_, Token::Op(')'))) => Ok(value),
                    Some((offset, tok)) => Err(unexpected(offset, &tok)),
                    None => Err(MaskError::UnexpectedEnd),
                }
            }
            Some((_, Token::Int(n))) => Ok(n),
            Some((_, Token::Ident(name))) => constant(&name),
            Some((offset, tok)) => Err(unexpected(offset, &tok)),
            None => Err(MaskError::UnexpectedEnd),
        }
    }
}

fn unexpected(offset: usize, tok: &Token) -> MaskError {
    let found = match tok {
        Token::Int(n) => n.to_string(),
        Token::Ident(s) => s.clone(),
        Token::Op(c) => c.to_string(),
    };
    MaskError::UnexpectedToken { offset, found }
}

fn constant(name: &str) -> Result<i64, MaskError> {
    if name == "E_ALL" {
        return Ok(ErrorLevel::ALL as i64);
    }
    ErrorLevel::from_name(name)
        .map(|level| level.mask() as i64)
        .ok_or_else(|| MaskError::UnknownConstant(name.to_string()))
}

/// Evaluate an `error_reporting` expression.
///
/// The result is clamped to the E_ALL bits, so `~E_NOTICE` yields
/// `E_ALL & ~E_NOTICE`. An empty expression is 0. Integer literals must fit
/// in 32 bits, signed or unsigned.
pub fn parse_mask(expr: &str) -> Result<u32, MaskError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Ok(0);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if let Some((offset, tok)) = parser.next() {
        return Err(unexpected(offset, &tok));
    }

    Ok((value as u32) & ErrorLevel::ALL)
}
