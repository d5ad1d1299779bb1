//! Recursive-descent parser producing the expression tree.
//!
//! The grammar is a minimal prefix notation:
//!
//! ```text
//! expr     := atom | '(' symbol expr* ')' | '[' expr* ']'
//! atom     := int | float | string | symbol | 'true' | 'false' | 'nil'
//! template := (literal | '{{' expr '}}')*
//! ```

use thiserror::Error;

use super::token::{Mode, Spanned, Token, TokenStream};

/// Errors raised while building the expression tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected {token} at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },

    #[error("unmatched '{delim}' at offset {offset}")]
    Unmatched { delim: char, offset: usize },

    #[error("unexpected trailing {token} at offset {offset}")]
    Trailing { token: String, offset: usize },

    #[error("empty application '()' at offset {0}")]
    EmptyApplication(usize),

    #[error("empty expression")]
    EmptyInput,
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A variable reference, possibly a dotted path
    Symbol(String),
    /// `[a b c]`
    List(Vec<Expr>),
    /// `(op a b c)`
    Call { op: String, args: Vec<Expr> },
    /// Template parts whose display forms are concatenated
    Concat(Vec<Expr>),
}

fn describe(token: &Token) -> String {
    match token {
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::LBracket => "'['".to_string(),
        Token::RBracket => "']'".to_string(),
        Token::Int(i) => format!("integer {}", i),
        Token::Float(f) => format!("float {}", f),
        Token::Str(s) => format!("string {:?}", s),
        Token::Symbol(s) => format!("symbol '{}'", s),
        Token::Literal(_) => "literal text".to_string(),
        Token::Open => "'{{'".to_string(),
        Token::Close => "'}}'".to_string(),
    }
}

/// Parser state over a borrowed token slice.
pub struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Spanned]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Spanned> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Parses a whole expression-mode stream.
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        let expr = self.expr()?;
        if let Some(extra) = self.peek() {
            return Err(ParseError::Trailing {
                token: describe(&extra.token),
                offset: extra.offset,
            });
        }
        Ok(expr)
    }

    /// Parses a whole template-mode stream.
    pub fn parse_template(&mut self) -> Result<Expr, ParseError> {
        let mut parts = Vec::new();
        let mut has_literal = false;

        while let Some(tok) = self.next() {
            match &tok.token {
                Token::Literal(text) => {
                    has_literal = true;
                    parts.push(Expr::Str(text.clone()));
                }
                Token::Open => {
                    parts.push(self.expr()?);
                    match self.next() {
                        Some(Spanned {
                            token: Token::Close,
                            ..
                        }) => {}
                        Some(extra) => {
                            return Err(ParseError::Trailing {
                                token: describe(&extra.token),
                                offset: extra.offset,
                            })
                        }
                        None => {
                            return Err(ParseError::Unmatched {
                                delim: '{',
                                offset: tok.offset,
                            })
                        }
                    }
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        token: describe(other),
                        offset: tok.offset,
                    })
                }
            }
        }

        if parts.len() == 1 && !has_literal {
            return Ok(parts.remove(0));
        }
        Ok(Expr::Concat(parts))
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.next() else {
            return Err(ParseError::EmptyInput);
        };

        match &tok.token {
            Token::Int(i) => Ok(Expr::Int(*i)),
            Token::Float(f) => Ok(Expr::Float(*f)),
            Token::Str(s) => Ok(Expr::Str(s.clone())),
            Token::Symbol(s) => Ok(match s.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "nil" => Expr::Nil,
                _ => Expr::Symbol(s.clone()),
            }),
            Token::LParen => self.call(tok.offset),
            Token::LBracket => {
                let items = self.until(Token::RBracket, '[', tok.offset)?;
                Ok(Expr::List(items))
            }
            Token::RParen => Err(ParseError::Unmatched {
                delim: ')',
                offset: tok.offset,
            }),
            Token::RBracket => Err(ParseError::Unmatched {
                delim: ']',
                offset: tok.offset,
            }),
            other => Err(ParseError::UnexpectedToken {
                token: describe(other),
                offset: tok.offset,
            }),
        }
    }

    fn call(&mut self, open: usize) -> Result<Expr, ParseError> {
        let op = match self.next() {
            Some(Spanned {
                token: Token::Symbol(op),
                ..
            }) => op.clone(),
            Some(Spanned {
                token: Token::RParen,
                ..
            }) => return Err(ParseError::EmptyApplication(open)),
            Some(Spanned {
                token: Token::Close,
                ..
            })
            | None => {
                return Err(ParseError::Unmatched {
                    delim: '(',
                    offset: open,
                })
            }
            Some(other) => {
                return Err(ParseError::UnexpectedToken {
                    token: describe(&other.token),
                    offset: other.offset,
                })
            }
        };
        let args = self.until(Token::RParen, '(', open)?;
        Ok(Expr::Call { op, args })
    }

    /// Parses expressions up to and including the closing token.
    fn until(&mut self, close: Token, delim: char, open: usize) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(tok) if tok.token == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(Spanned {
                    token: Token::Close,
                    ..
                })
                | None => return Err(ParseError::Unmatched { delim, offset: open }),
                Some(_) => items.push(self.expr()?),
            }
        }
    }
}

/// Parses a token stream according to its mode.
pub fn parse(stream: &TokenStream) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(&stream.tokens);
    match stream.mode {
        Mode::Expression => parser.parse_expression(),
        Mode::Template => parser.parse_template(),
    }
}
