//! Arithmetic evaluation for candidate equations.
//!
//! Grammar: `+ - * /`, parentheses, unary minus, decimal literals.
//! Whitespace is ignored; anything else is an error.

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected character {ch:?} at {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("invalid number at {0}")]
    InvalidNumber(usize),
    #[error("division by zero")]
    DivisionByZero,
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
}

/// Limit on nested parentheses and unary signs.
pub const MAX_DEPTH: usize = 64;

/// Evaluate `source` to a value.
pub fn evaluate(source: &str) -> Result<f64, ExprError> {
    let tokens: Vec<(usize, char)> = source.char_indices().collect();
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    match parser.peek() {
        Some((pos, ch)) => Err(ExprError::UnexpectedChar { ch, pos }),
        None => Ok(value),
    }
}

struct Parser {
    tokens: Vec<(usize, char)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Next non-whitespace token.
    fn peek(&mut self) -> Option<(usize, char)> {
        while matches!(self.tokens.get(self.pos), Some((_, c)) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let tok = self.peek();
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        while let Some((_, op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.factor()?;
        while let Some((_, op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err(ExprError::DivisionByZero);
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    /// Run `inner` one nesting level deeper.
    fn nested(&mut self, inner: fn(&mut Self) -> Result<f64, ExprError>) -> Result<f64, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let value = inner(self);
        self.depth -= 1;
        value
    }

    fn factor(&mut self) -> Result<f64, ExprError> {
        match self.bump() {
            None => Err(ExprError::UnexpectedEnd),
            Some((_, '-')) => Ok(-self.nested(Self::factor)?),
            Some((_, '+')) => self.nested(Self::factor),
            Some((_, '(')) => {
                let value = self.nested(Self::expr)?;
                match self.bump() {
                    Some((_, ')')) => Ok(value),
                    Some((pos, ch)) => Err(ExprError::UnexpectedChar { ch, pos }),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some((start, ch)) if ch.is_ascii_digit() || ch == '.' => {
                let mut literal = String::from(ch);
                // Literals end at whitespace, so read raw tokens here.
                while let Some(&(_, c)) = self.tokens.get(self.pos) {
                    if !(c.is_ascii_digit() || c == '.') {
                        break;
                    }
                    literal.push(c);
                    self.pos += 1;
                }
                literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(start))
            }
            Some((pos, ch)) => Err(ExprError::UnexpectedChar { ch, pos }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(s: &str) -> f64 {
        evaluate(s).unwrap()
    }

    #[test]
    fn test_precedence_and_parens() {
        assert_eq!(eval("4 + 9 * 2"), 22.0);
        assert_eq!(eval("(4 + 8) * (6 - 4)"), 24.0);
        assert_eq!(eval("5 + 5 + 5 + 9"), 24.0);
        assert!((eval("8 / (3 - 8 / 3)") - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("24 / 2 / 3"), 4.0);
    }

    #[test]
    fn test_unary_and_decimals() {
        assert_eq!(eval("-3 + 5"), 2.0);
        assert_eq!(eval("-(2 * 3)"), -6.0);
        assert_eq!(eval("1.5 * 4"), 6.0);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(evaluate("4 / (2 - 2)"), Err(ExprError::DivisionByZero));
    }

    #[test]
    fn test_malformed() {
        assert!(evaluate("").is_err());
        assert!(evaluate("4 +").is_err());
        assert!(evaluate("(4 + 2").is_err());
        assert!(evaluate("4 + x").is_err());
        assert!(evaluate("1.2.3").is_err());
        assert!(evaluate("4 4").is_err());
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(evaluate(&parens), Err(ExprError::TooDeep(MAX_DEPTH)));
        assert_eq!(evaluate(&"-".repeat(10_000)), Err(ExprError::TooDeep(MAX_DEPTH)));

        let ok = format!("{}24{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(eval(&ok), 24.0);
    }
}
