//! Safe evaluation of quantity expressions.
//!
//! Users type things like `2+1` or `3*2` in the quantity part of an order line. The grammar is deliberately tiny:
//! decimal literals, unary sign, `+ - * / // **` and parentheses. There are no names, calls or comparisons, so the
//! worst a hostile input can do is fail to parse. Expressions are parsed into a small tree and the tree is walked
//! with an explicit whitelist of node kinds; anything else is a syntax error, never a panic.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("Invalid quantity expression: {0}")]
    Syntax(String),
    #[error("Division by zero in quantity expression")]
    DivisionByZero,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleStar,
    DoubleSlash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Pow,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(f64),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Evaluate a quantity expression. Returns the numeric value as `f64`; integral-quantity enforcement is the
/// caller's concern (see the order parser).
pub fn eval_quantity(expr: &str) -> Result<f64, QuantityError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let tree = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(QuantityError::Syntax(format!("Unexpected trailing input in '{expr}'")));
    }
    let value = eval(&tree)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(QuantityError::Syntax(format!("Expression '{expr}' does not evaluate to a finite number")))
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, QuantityError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            },
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            },
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::DoubleStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            },
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            },
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            },
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            },
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| QuantityError::Syntax(format!("Invalid number '{literal}'")))?;
                tokens.push(Token::Number(value));
            },
            other => return Err(QuantityError::Syntax(format!("Unexpected character '{other}'"))),
        }
    }
    if tokens.is_empty() {
        return Err(QuantityError::Syntax("Empty expression".to_string()));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    // expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr, QuantityError> {
        let mut lhs = self.parse_term()?;
        while let Some(op) = self.peek() {
            let op = match op {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // term := unary (('*' | '/' | '//') unary)*
    fn parse_term(&mut self) -> Result<Expr, QuantityError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.peek() {
            let op = match op {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::DoubleSlash => BinOp::FloorDiv,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // unary := ('+' | '-') unary | power
    fn parse_unary(&mut self) -> Result<Expr, QuantityError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.bump();
                Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.parse_unary()?)))
            },
            Some(Token::Minus) => {
                self.bump();
                Ok(Expr::Unary(UnaryOp::Minus, Box::new(self.parse_unary()?)))
            },
            _ => self.parse_power(),
        }
    }

    // power := atom ('**' unary)?   -- right-associative, exponent may carry its own sign
    fn parse_power(&mut self) -> Result<Expr, QuantityError> {
        let base = self.parse_atom()?;
        if self.peek() == Some(Token::DoubleStar) {
            self.bump();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, QuantityError> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Expr::Literal(n)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(QuantityError::Syntax("Unbalanced parentheses".to_string())),
                }
            },
            other => Err(QuantityError::Syntax(format!("Expected a number or '(', found {other:?}"))),
        }
    }
}

fn eval(expr: &Expr) -> Result<f64, QuantityError> {
    match expr {
        Expr::Literal(n) => Ok(*n),
        Expr::Unary(UnaryOp::Plus, inner) => eval(inner),
        Expr::Unary(UnaryOp::Minus, inner) => Ok(-eval(inner)?),
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs)?;
            let rhs = eval(rhs)?;
            match op {
                BinOp::Add => Ok(lhs + rhs),
                BinOp::Sub => Ok(lhs - rhs),
                BinOp::Mul => Ok(lhs * rhs),
                BinOp::Div => {
                    if rhs == 0.0 {
                        Err(QuantityError::DivisionByZero)
                    } else {
                        Ok(lhs / rhs)
                    }
                },
                BinOp::FloorDiv => {
                    if rhs == 0.0 {
                        Err(QuantityError::DivisionByZero)
                    } else {
                        Ok((lhs / rhs).floor())
                    }
                },
                BinOp::Pow => Ok(lhs.powf(rhs)),
            }
        },
    }
}
