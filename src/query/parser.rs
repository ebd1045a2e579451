//! Recursive-descent parser producing [`Expr`] trees

use super::lexer::{tokenize, Token};
use super::QueryError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identity,
    Recurse,
    Literal(Value),
    Index(Box<Expr>, Box<Expr>),
    Iterate(Box<Expr>),
    Try(Box<Expr>),
    Array(Option<Box<Expr>>),
    Pipe(Box<Expr>, Box<Expr>),
    Comma(Box<Expr>, Box<Expr>),
    Alternative(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Call(String, Vec<Expr>),
}

const KEYWORDS: &[&str] = &["and", "or", "if", "then", "elif", "else", "end"];

/// Parse a query string into an expression tree
pub fn parse(query: &str) -> Result<Expr, QueryError> {
    let tokens = tokenize(query)?;
    if tokens.is_empty() {
        return Ok(Expr::Identity);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: query.len(),
    };
    let expr = parser.pipe()?;
    if let Some((token, offset)) = parser.tokens.get(parser.pos) {
        return Err(QueryError::Parse {
            offset: *offset,
            message: format!("unexpected token {:?}", token),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, QueryError> {
        Err(QueryError::Parse {
            offset: self.offset(),
            message: message.into(),
        })
    }

    fn expect(&mut self, expected: Token) -> Result<(), QueryError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            self.error(format!("expected {:?}, found {:?}", expected, self.peek()))
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), QueryError> {
        if self.at_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            self.error(format!("expected '{}'", keyword))
        }
    }

    fn at_op(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Token::Op(op)) if *op == symbol)
    }

    fn pipe(&mut self) -> Result<Expr, QueryError> {
        let lhs = self.comma()?;
        if self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            let rhs = self.pipe()?;
            return Ok(Expr::Pipe(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn comma(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.alternative()?;
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            let rhs = self.alternative()?;
            lhs = Expr::Comma(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn alternative(&mut self) -> Result<Expr, QueryError> {
        let lhs = self.or()?;
        if self.at_op("//") {
            self.pos += 1;
            let rhs = self.alternative()?;
            return Ok(Expr::Alternative(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.and()?;
        while self.at_keyword("or") {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.comparison()?;
        while self.at_keyword("and") {
            self.pos += 1;
            let rhs = self.comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, QueryError> {
        let lhs = self.additive()?;
        if let Some(Token::Op(symbol)) = self.peek() {
            if let Some(op @ (BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)) =
                BinOp::from_symbol(symbol)
            {
                self.pos += 1;
                let rhs = self.additive()?;
                return Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
            }
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = if self.at_op("+") {
                BinOp::Add
            } else if self.at_op("-") {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, QueryError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.at_op("*") {
                BinOp::Mul
            } else if self.at_op("/") {
                BinOp::Div
            } else if self.at_op("%") {
                BinOp::Mod
            } else {
                return Ok(lhs);
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, QueryError> {
        if self.at_op("-") {
            self.pos += 1;
            let inner = self.unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, QueryError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Field(name)) => {
                    let key = Expr::Literal(Value::String(name.clone()));
                    self.pos += 1;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                Some(Token::Dot) => {
                    // `.foo."bar"` and `.foo.[0]`
                    match self.tokens.get(self.pos + 1).map(|(t, _)| t) {
                        Some(Token::Str(name)) => {
                            let key = Expr::Literal(Value::String(name.clone()));
                            self.pos += 2;
                            expr = Expr::Index(Box::new(expr), Box::new(key));
                        }
                        Some(Token::LBracket) => {
                            self.pos += 1;
                        }
                        _ => return self.error("expected field name after '.'"),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    if self.peek() == Some(&Token::RBracket) {
                        self.pos += 1;
                        expr = Expr::Iterate(Box::new(expr));
                    } else {
                        let key = self.pipe()?;
                        self.expect(Token::RBracket)?;
                        expr = Expr::Index(Box::new(expr), Box::new(key));
                    }
                }
                Some(Token::Question) => {
                    self.pos += 1;
                    expr = Expr::Try(Box::new(expr));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, QueryError> {
        let offset = self.offset();
        let Some(token) = self.advance() else {
            return self.error("unexpected end of query");
        };

        match token {
            Token::Dot => {
                if let Some(Token::Str(name)) = self.peek() {
                    let key = Expr::Literal(Value::String(name.clone()));
                    self.pos += 1;
                    return Ok(Expr::Index(Box::new(Expr::Identity), Box::new(key)));
                }
                Ok(Expr::Identity)
            }
            Token::DotDot => Ok(Expr::Recurse),
            Token::Field(name) => Ok(Expr::Index(
                Box::new(Expr::Identity),
                Box::new(Expr::Literal(Value::String(name))),
            )),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Num(n) => Ok(Expr::Literal(super::eval::number(n))),
            Token::LParen => {
                let inner = self.pipe()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                if self.peek() == Some(&Token::RBracket) {
                    self.pos += 1;
                    return Ok(Expr::Array(None));
                }
                let inner = self.pipe()?;
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(Some(Box::new(inner))))
            }
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "if" => self.conditional(),
                keyword if KEYWORDS.contains(&keyword) => Err(QueryError::Parse {
                    offset,
                    message: format!("unexpected keyword '{}'", keyword),
                }),
                _ => {
                    let mut args = Vec::new();
                    if self.peek() == Some(&Token::LParen) {
                        self.pos += 1;
                        loop {
                            args.push(self.pipe()?);
                            if self.peek() == Some(&Token::Semicolon) {
                                self.pos += 1;
                                continue;
                            }
                            self.expect(Token::RParen)?;
                            break;
                        }
                    }
                    Ok(Expr::Call(name, args))
                }
            },
            other => Err(QueryError::Parse {
                offset,
                message: format!("unexpected token {:?}", other),
            }),
        }
    }

    /// Parse after `if`; `elif` chains become nested conditionals
    fn conditional(&mut self) -> Result<Expr, QueryError> {
        let cond = self.pipe()?;
        self.expect_keyword("then")?;
        let then = self.pipe()?;

        let otherwise = if self.at_keyword("elif") {
            self.pos += 1;
            Some(Box::new(self.conditional()?))
        } else if self.at_keyword("else") {
            self.pos += 1;
            let otherwise = self.pipe()?;
            self.expect_keyword("end")?;
            Some(Box::new(otherwise))
        } else {
            self.expect_keyword("end")?;
            None
        };

        Ok(Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(target: Expr, name: &str) -> Expr {
        Expr::Index(
            Box::new(target),
            Box::new(Expr::Literal(Value::String(name.into()))),
        )
    }

    #[test]
    fn test_empty_query_is_identity() {
        assert_eq!(parse("  ").unwrap(), Expr::Identity);
    }

    #[test]
    fn test_field_and_iterate() {
        let expr = parse(".values.boot_disk[]").unwrap();
        let expected = Expr::Iterate(Box::new(field(
            field(Expr::Identity, "values"),
            "boot_disk",
        )));
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_call_with_two_arguments() {
        let expr = parse(r#"all_select("type"; "google_compute_disk")"#).unwrap();
        match expr {
            Expr::Call(name, args) => {
                assert_eq!(name, "all_select");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_elif_chain() {
        let expr = parse(r#"if . == 1 then "a" elif . == 2 then "b" else "c" end"#).unwrap();
        assert!(matches!(expr, Expr::If { otherwise: Some(_), .. }));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(parse(".a )").is_err());
    }

    #[test]
    fn test_missing_end_rejected() {
        assert!(parse("if . then 1 else 2").is_err());
    }
}
