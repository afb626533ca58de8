//! Arithmetic expression parsing (tokens + recursive descent evaluator).
//!
//! Supported grammar:
//!
//! ```text
//! expr    := term (("+" | "-") term)*
//! term    := unary (("*" | "/") unary)*
//! unary   := ("+" | "-") unary | primary
//! primary := NUMBER | REFERENCE | "(" expr ")"
//! ```
//!
//! References are resolved to numbers by the caller. Nothing else (function
//! calls, strings, identifiers) is accepted.

use thiserror::Error;

use super::cell_ref::CellId;

/// Deepest nesting of parentheses and unary operators accepted.
const MAX_DEPTH: usize = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("Unexpected token {0}")]
    UnexpectedToken(String),

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Expression nested too deeply")]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Reference(CellId),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

/// Evaluate an arithmetic expression, resolving each reference through `resolve`.
pub fn evaluate_arithmetic<F>(input: &str, resolve: F) -> Result<f64, ExprError>
where
    F: Fn(CellId) -> f64,
{
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        resolve,
    };
    let value = parser.parse_expr()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::UnexpectedToken(format!("{:?}", token)));
    }
    Ok(value)
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            b'-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            b'*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            b'/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b'0'..=b'9' | b'.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                // Lowercase exponent only: uppercase letters always start a reference.
                if i < bytes.len() && bytes[i] == b'e' {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        while j < bytes.len() && bytes[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text = &input[start..i];
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(text.to_string()))?;
                tokens.push(Token::Number(n));
            }
            b'A'..=b'Z' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_uppercase() {
                    i += 1;
                }
                let letters_end = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text = &input[start..i];
                if i == letters_end {
                    return Err(ExprError::UnexpectedToken(text.to_string()));
                }
                let id = CellId::parse(text)
                    .ok_or_else(|| ExprError::InvalidReference(text.to_string()))?;
                tokens.push(Token::Reference(id));
            }
            _ => {
                let ch = input[i..].chars().next().unwrap_or('?');
                return Err(ExprError::UnexpectedChar(ch));
            }
        }
    }

    Ok(tokens)
}

struct Parser<F> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    resolve: F,
}

impl<F> Parser<F>
where
    F: Fn(CellId) -> f64,
{
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.parse_term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    value /= self.parse_unary()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_unary(&mut self) -> Result<f64, ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        let result = match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.parse_unary()
            }
            Some(Token::Minus) => {
                self.pos += 1;
                self.parse_unary().map(|v| -v)
            }
            _ => self.parse_primary(),
        };
        self.depth -= 1;
        result
    }

    fn parse_primary(&mut self) -> Result<f64, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Reference(id)) => Ok((self.resolve)(id)),
            Some(Token::LParen) => {
                let value = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    Some(other) => Err(ExprError::UnexpectedToken(format!("{:?}", other))),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(format!("{:?}", other))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(input: &str) -> Result<f64, ExprError> {
        evaluate_arithmetic(input, |_| 0.0)
    }

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(eval("1 + 2 * 3"), Ok(7.0));
        assert_eq!(eval("(1 + 2) * 3"), Ok(9.0));
        assert_eq!(eval("10 - 4 - 3"), Ok(3.0));
        assert_eq!(eval("8 / 4 / 2"), Ok(1.0));
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(eval("-3 + 5"), Ok(2.0));
        assert_eq!(eval("2 * -(1 + 1)"), Ok(-4.0));
        assert_eq!(eval("+4"), Ok(4.0));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(eval("1.5 * 2"), Ok(3.0));
        assert_eq!(eval(".5 + .5"), Ok(1.0));
        assert_eq!(eval("1e3"), Ok(1000.0));
        assert!(matches!(eval("1.2.3"), Err(ExprError::InvalidNumber(_))));
    }

    #[test]
    fn test_references_resolve_through_callback() {
        let value = evaluate_arithmetic("A1 * B2 + 1", |id| (id.col + id.row + 2) as f64);
        assert_eq!(value, Ok(2.0 * 4.0 + 1.0));
    }

    #[test]
    fn test_uppercase_exponent_is_a_reference() {
        assert!(eval("2E5").is_err());
    }

    #[test]
    fn test_rejects_code_and_identifiers() {
        assert!(matches!(eval("alert(1)"), Err(ExprError::UnexpectedChar('a'))));
        assert!(matches!(eval("SUM(1)"), Err(ExprError::UnexpectedToken(_))));
        assert!(matches!(eval("A0 + 1"), Err(ExprError::InvalidReference(_))));
        assert!(eval("1; 2").is_err());
        assert!(eval("\"1\"").is_err());
    }

    #[test]
    fn test_malformed_expressions() {
        assert_eq!(eval(""), Err(ExprError::UnexpectedEnd));
        assert_eq!(eval("1 +"), Err(ExprError::UnexpectedEnd));
        assert_eq!(eval("(1 + 2"), Err(ExprError::UnexpectedEnd));
        assert!(eval("1 2").is_err());
        assert!(eval("()").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(eval(&deep), Err(ExprError::TooDeep));
    }

    #[test]
    fn test_division_by_zero_is_not_finite() {
        assert!(eval("1 / 0").unwrap().is_infinite());
        assert!(eval("0 / 0").unwrap().is_nan());
    }
}
