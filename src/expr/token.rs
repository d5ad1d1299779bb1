//! Tokenizer and template expander.
//!
//! Raw text reaches the parser in one of two shapes:
//!
//! - **expression mode**: the whole text is a single expression such as
//!   `(+ 1 2)` or `pkgs.0`;
//! - **template mode**: literal text with embedded `{{ ... }}` regions. The
//!   literal segments are kept as [`Token::Literal`] and each region is
//!   bracketed by [`Token::Open`] / [`Token::Close`], so the parser can
//!   rebuild the template as a concatenation node.

use thiserror::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Errors raised while scanning text into tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("unterminated expression starting at offset {0}")]
    Unterminated(usize),

    #[error("unbalanced '}}}}' at offset {0}")]
    Unbalanced(usize),

    #[error("nested '{{{{' at offset {0}")]
    Nested(usize),

    #[error("empty expression at offset {0}")]
    Empty(usize),

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    /// Literal template text outside any `{{ }}` region
    Literal(String),
    /// Start of an embedded expression region
    Open,
    /// End of an embedded expression region
    Close,
}

/// A token with the byte offset it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// How the token stream is to be read by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Expression,
    Template,
}

/// The output of expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStream {
    pub mode: Mode,
    pub tokens: Vec<Spanned>,
}

impl TokenStream {
    /// Tokens without their offsets, mostly useful in tests.
    pub fn kinds(&self) -> Vec<Token> {
        self.tokens.iter().map(|s| s.token.clone()).collect()
    }
}

/// Scans an expression into tokens.
pub struct Tokenizer<'a> {
    src: &'a str,
    base: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, base: 0 }
    }

    /// Tokenizer for a region whose offsets are reported relative to the
    /// enclosing text.
    fn at(src: &'a str, base: usize) -> Self {
        Self { src, base }
    }

    pub fn tokenize(&self) -> Result<Vec<Spanned>, SyntaxError> {
        let mut out = Vec::new();
        let mut chars = self.src.char_indices().peekable();

        while let Some(&(i, c)) = chars.peek() {
            let offset = self.base + i;
            let simple = match c {
                '(' => Some(Token::LParen),
                ')' => Some(Token::RParen),
                '[' => Some(Token::LBracket),
                ']' => Some(Token::RBracket),
                _ => None,
            };
            if let Some(token) = simple {
                chars.next();
                out.push(Spanned { token, offset });
                continue;
            }

            if c.is_whitespace() {
                chars.next();
            } else if c == '"' || c == '\'' {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, other)) => text.push(other),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => text.push(ch),
                    }
                }
                if !closed {
                    return Err(SyntaxError::UnterminatedString(offset));
                }
                out.push(Spanned {
                    token: Token::Str(text),
                    offset,
                });
            } else if is_word_char(c) {
                let mut word = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if !is_word_char(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                out.push(Spanned {
                    token: classify(word),
                    offset,
                });
            } else {
                return Err(SyntaxError::UnexpectedChar { ch: c, offset });
            }
        }

        Ok(out)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '_' | '.' | '-' | '+' | '*' | '/' | '%' | '=' | '!' | '<' | '>' | '?' | '$' | '&' | '|' | ':'
        )
}

fn classify(word: String) -> Token {
    let mut chars = word.chars();
    let numeric = match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-' | '+') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    };

    if numeric {
        if let Ok(i) = word.parse::<i64>() {
            return Token::Int(i);
        }
        if let Ok(f) = word.parse::<f64>() {
            return Token::Float(f);
        }
    }
    Token::Symbol(word)
}

/// Splits template text into literal segments and tokenized regions.
pub struct Expander<'a> {
    text: &'a str,
}

impl<'a> Expander<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    /// Expands in template mode if the text contains any delimiter,
    /// otherwise tokenizes the whole text as one expression.
    pub fn expand(&self) -> Result<TokenStream, SyntaxError> {
        if self.text.contains(OPEN) || self.text.contains(CLOSE) {
            self.expand_template()
        } else {
            Ok(TokenStream {
                mode: Mode::Expression,
                tokens: Tokenizer::new(self.text).tokenize()?,
            })
        }
    }

    /// Expands in template mode unconditionally; text without delimiters
    /// becomes a single literal.
    pub fn expand_template(&self) -> Result<TokenStream, SyntaxError> {
        let text = self.text;
        let mut tokens = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            let open = rest.find(OPEN);
            let close = rest.find(CLOSE);

            let open = match (open, close) {
                (None, Some(c)) => return Err(SyntaxError::Unbalanced(pos + c)),
                (Some(o), Some(c)) if c < o => return Err(SyntaxError::Unbalanced(pos + c)),
                (None, None) => {
                    push_literal(&mut tokens, rest, pos);
                    break;
                }
                (Some(o), _) => pos + o,
            };

            push_literal(&mut tokens, &text[pos..open], pos);

            let start = open + OPEN.len();
            let end = text[start..]
                .find(CLOSE)
                .map(|c| start + c)
                .ok_or(SyntaxError::Unterminated(open))?;
            let inner = &text[start..end];

            if let Some(n) = inner.find(OPEN) {
                return Err(SyntaxError::Nested(start + n));
            }
            if inner.trim().is_empty() {
                return Err(SyntaxError::Empty(open));
            }

            tokens.push(Spanned {
                token: Token::Open,
                offset: open,
            });
            tokens.extend(Tokenizer::at(inner, start).tokenize()?);
            tokens.push(Spanned {
                token: Token::Close,
                offset: end,
            });

            pos = end + CLOSE.len();
        }

        Ok(TokenStream {
            mode: Mode::Template,
            tokens,
        })
    }
}

fn push_literal(tokens: &mut Vec<Spanned>, text: &str, offset: usize) {
    if !text.is_empty() {
        tokens.push(Spanned {
            token: Token::Literal(text.to_string()),
            offset,
        });
    }
}

/// Convenience wrapper for [`Expander::expand`].
pub fn expand(text: &str) -> Result<TokenStream, SyntaxError> {
    Expander::new(text).expand()
}
