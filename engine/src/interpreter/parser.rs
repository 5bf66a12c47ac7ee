use super::lexer::Token;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Expr>),
    /// Bare identifier, resolved against bound messages at evaluation time.
    Var(String),
    /// `<var> whereId <expr>` — binds the variable, yields found/not-found.
    WhereId { var: String, id: Box<Expr> },
    /// `<target>.<method>[...]` / `(...)`.
    Method {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// `<function>[...]` / `(...)` — readChatValue, saveChatValue.
    Call { name: String, args: Vec<Expr> },
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Eq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
    Add,
    Sub,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of predicate")]
    UnexpectedEnd,
    #[error("expected '{expected}', found '{found}'")]
    Expected { expected: &'static str, found: String },
    #[error("trailing input after expression: '{0}'")]
    TrailingInput(String),
}

pub fn parse(tokens: &[Token]) -> Result<Expr, ParseError> {
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(extra) => Err(ParseError::TrailingInput(extra.to_string())),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<&'a Token, ParseError> {
        let token = self.tokens.get(self.pos).ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, label: &'static str) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(ParseError::Expected {
                expected: label,
                found: self
                    .peek()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "end of predicate".into()),
            })
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_cmp()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_cmp()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::NotEq,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::Le) => BinOp::Le,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_add()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_postfix()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_postfix()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        while self.eat(&Token::Dot) {
            let name = match self.next()? {
                Token::Ident(name) => name.clone(),
                other => {
                    return Err(ParseError::Expected {
                        expected: "method name",
                        found: other.to_string(),
                    });
                }
            };
            let args = self.parse_invoke_args()?.unwrap_or_default();
            expr = if name == "not" {
                Expr::Not(Box::new(expr))
            } else {
                Expr::Method {
                    target: Box::new(expr),
                    name,
                    args,
                }
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.next()? {
            Token::Number(n) => Ok(Expr::Number(*n)),
            Token::Str(s) => Ok(Expr::Str(s.clone())),
            Token::Bool(b) => Ok(Expr::Bool(*b)),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, ")")?;
                Ok(inner)
            }
            Token::LBracket => {
                let items = self.parse_expr_list(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::Ident(name) => {
                let name = name.clone();
                if self.eat(&Token::WhereId) {
                    let id = self.parse_primary()?;
                    return Ok(Expr::WhereId {
                        var: name,
                        id: Box::new(id),
                    });
                }
                if let Some(args) = self.parse_invoke_args()? {
                    return Ok(Expr::Call { name, args });
                }
                Ok(Expr::Var(name))
            }
            other => Err(ParseError::UnexpectedToken(other.to_string())),
        }
    }

    /// Invocation suffix if present: `[args]` or `(args)`.
    fn parse_invoke_args(&mut self) -> Result<Option<Vec<Expr>>, ParseError> {
        if self.eat(&Token::LBracket) {
            Ok(Some(self.parse_expr_list(&Token::RBracket)?))
        } else if self.eat(&Token::LParen) {
            Ok(Some(self.parse_expr_list(&Token::RParen)?))
        } else {
            Ok(None)
        }
    }

    fn parse_expr_list(&mut self, close: &Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_or()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(close, "closing bracket")?;
            return Ok(items);
        }
    }
}
