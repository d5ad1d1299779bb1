//! The embedded expression language.
//!
//! Text is processed in three stages: the [`token`] expander splits it into
//! tokens, the [`parser`] builds an [`Expr`] tree, and the [`eval`] module
//! walks the tree against a [`Scope`], producing a [`Value`].
//!
//! ```text
//! "port is {{ (+ base 1) }}"
//!     -> Literal("port is ") Open LParen Symbol(+) Symbol(base) Int(1) RParen Close
//!     -> Concat([Str("port is "), Call { op: "+", args: [Symbol(base), Int(1)] }])
//!     -> String("port is 81")
//! ```
//!
//! Evaluation is a pure function of the text and the scope contents, except
//! that reading a name bound to an unsettled future blocks until it settles.

pub mod eval;
pub mod parser;
pub mod token;
pub mod value;

use thiserror::Error;

pub use eval::{EvalError, Evaluator};
pub use parser::{parse, Expr, ParseError};
pub use token::{expand, Expander, SyntaxError, Token, TokenStream};
pub use value::{boolify, Value, Vars};

use crate::vars::Scope;

/// An expression failure tagged with the stage that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
}

/// Parses text, choosing expression or template mode automatically.
pub fn compile(text: &str) -> Result<Expr, ExprError> {
    Ok(parse(&expand(text)?)?)
}

/// Parses text in template mode.
pub fn compile_template(text: &str) -> Result<Expr, ExprError> {
    Ok(parse(&Expander::new(text).expand_template()?)?)
}

/// Expands, parses and evaluates `text`.
///
/// Text without `{{` is treated as a bare expression, so
/// `eval_string("(+ 1 2)", scope)` yields `Int(3)`.
pub fn eval_string(text: &str, scope: &dyn Scope) -> Result<Value, ExprError> {
    let ast = compile(text)?;
    Ok(Evaluator::new(scope).eval(&ast)?)
}

/// Evaluates `text` as a template.
///
/// A template that is exactly one `{{ }}` region yields that region's raw
/// value; anything else yields a string.
pub fn eval_template(text: &str, scope: &dyn Scope) -> Result<Value, ExprError> {
    let ast = compile_template(text)?;
    Ok(Evaluator::new(scope).eval(&ast)?)
}

/// Evaluates `text` as a template and renders the result as a string.
pub fn expand_templates(text: &str, scope: &dyn Scope) -> Result<String, ExprError> {
    Ok(eval_template(text, scope)?.to_string())
}
