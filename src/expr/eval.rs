//! Tree-walking evaluator and built-in functions.

use std::cmp::Ordering;

use thiserror::Error;

use super::parser::Expr;
use super::value::Value;
use crate::vars::Scope;

/// Errors raised while evaluating an expression tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A symbol, path segment or function name did not resolve
    #[error("undefined: '{0}'")]
    Undefined(String),

    /// An operand had the wrong type
    #[error("type mismatch in '{op}': expected {expected}, found {found}")]
    TypeMismatch {
        op: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Wrong number of arguments
    #[error("'{op}' expects {expected} arguments, got {found}")]
    Arity {
        op: String,
        expected: &'static str,
        found: usize,
    },

    #[error("division by zero")]
    DivisionByZero,
}

fn mismatch(op: &str, expected: &'static str, found: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn check_arity(op: &str, args: &[Expr], ok: bool, expected: &'static str) -> Result<(), EvalError> {
    if ok {
        Ok(())
    } else {
        Err(EvalError::Arity {
            op: op.to_string(),
            expected,
            found: args.len(),
        })
    }
}

/// Walks one path segment into a value.
pub fn lookup(value: &Value, segment: &str) -> Option<Value> {
    match value {
        Value::Map(map) => map.get(segment).cloned(),
        Value::List(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned()),
        Value::Result(res) => res.data.get(segment).cloned().or(match segment {
            "Changed" | "changed" => Some(Value::Bool(res.changed)),
            "Failed" | "failed" => Some(Value::Bool(res.failed)),
            _ => None,
        }),
        _ => None,
    }
}

/// Resolves a possibly dotted symbol path through a scope.
pub fn resolve(path: &str, scope: &dyn Scope) -> Result<Value, EvalError> {
    let mut segments = path.split('.');
    let head = segments.next().unwrap_or(path);
    let mut current = scope
        .get(head)
        .ok_or_else(|| EvalError::Undefined(path.to_string()))?;

    for segment in segments {
        current = lookup(&current, segment).ok_or_else(|| EvalError::Undefined(path.to_string()))?;
    }
    Ok(current)
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(op: &str, value: &Value) -> Result<Num, EvalError> {
        match value {
            Value::Int(i) => Ok(Num::Int(*i)),
            Value::Float(f) => Ok(Num::Float(*f)),
            other => Err(mismatch(op, "number", other)),
        }
    }

    fn float(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn value(self) -> Value {
        match self {
            Num::Int(i) => Value::Int(i),
            Num::Float(f) => Value::Float(f),
        }
    }
}

fn arith(op: &str, a: Num, b: Num) -> Result<Num, EvalError> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        let checked = match op {
            "+" => x.checked_add(y),
            "-" => x.checked_sub(y),
            "*" => x.checked_mul(y),
            "/" => {
                if y == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                x.checked_div(y)
            }
            _ => None,
        };
        if let Some(result) = checked {
            return Ok(Num::Int(result));
        }
    }

    let (x, y) = (a.float(), b.float());
    Ok(Num::Float(match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        _ => {
            if y == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            x / y
        }
    }))
}

/// Structural equality where Int and Float compare numerically.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

fn compare(op: &str, a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (x, y) = (Num::of(op, a)?.float(), Num::of(op, b)?.float());
            Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
        }
        (Value::Int(_) | Value::Float(_) | Value::String(_), other) => {
            Err(mismatch(op, a.type_name(), other))
        }
        (other, _) => Err(mismatch(op, "number or string", other)),
    }
}

/// Evaluates expression trees against a scope.
pub struct Evaluator<'a> {
    scope: &'a dyn Scope,
}

impl<'a> Evaluator<'a> {
    pub fn new(scope: &'a dyn Scope) -> Self {
        Self { scope }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Symbol(path) => resolve(path, self.scope),
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&self.eval(part)?.to_string());
                }
                Ok(Value::String(out))
            }
            Expr::Call { op, args } => self.call(op, args),
        }
    }

    fn eval_all(&self, exprs: &[Expr]) -> Result<Vec<Value>, EvalError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    /// Evaluates to `None` when the expression is undefined.
    fn try_eval(&self, expr: &Expr) -> Result<Option<Value>, EvalError> {
        match self.eval(expr) {
            Ok(v) => Ok(Some(v)),
            Err(EvalError::Undefined(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn call(&self, op: &str, args: &[Expr]) -> Result<Value, EvalError> {
        // Special forms see their arguments unevaluated.
        match op {
            "if" => {
                check_arity(op, args, matches!(args.len(), 2 | 3), "2 or 3")?;
                return if self.eval(&args[0])?.truthy() {
                    self.eval(&args[1])
                } else {
                    args.get(2).map_or(Ok(Value::Nil), |e| self.eval(e))
                };
            }
            "and" => {
                for arg in args {
                    if !self.eval(arg)?.truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                return Ok(Value::Bool(true));
            }
            "or" => {
                for arg in args {
                    if self.eval(arg)?.truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                return Ok(Value::Bool(false));
            }
            "defined" => {
                check_arity(op, args, args.len() == 1, "1")?;
                return Ok(Value::Bool(self.try_eval(&args[0])?.is_some()));
            }
            "default" => {
                check_arity(op, args, args.len() == 2, "2")?;
                return match self.try_eval(&args[0])? {
                    Some(v) => Ok(v),
                    None => self.eval(&args[1]),
                };
            }
            _ => {}
        }

        let values = self.eval_all(args)?;
        apply(op, args, values)
    }
}

fn apply(op: &str, args: &[Expr], values: Vec<Value>) -> Result<Value, EvalError> {
    match op {
        "+" | "*" => {
            check_arity(op, args, !values.is_empty(), "at least 1")?;
            fold_numbers(op, &values)
        }
        "-" => {
            check_arity(op, args, !values.is_empty(), "at least 1")?;
            if values.len() == 1 {
                return match Num::of(op, &values[0])? {
                    Num::Int(i) => Ok(Value::Int(i.wrapping_neg())),
                    Num::Float(f) => Ok(Value::Float(-f)),
                };
            }
            fold_numbers(op, &values)
        }
        "/" => {
            check_arity(op, args, values.len() >= 2, "at least 2")?;
            fold_numbers(op, &values)
        }
        "%" => {
            check_arity(op, args, values.len() == 2, "2")?;
            match (&values[0], &values[1]) {
                (Value::Int(_), Value::Int(0)) => Err(EvalError::DivisionByZero),
                (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_rem(*y))),
                (Value::Int(_), other) | (other, _) => Err(mismatch(op, "int", other)),
            }
        }
        "=" | "!=" => {
            check_arity(op, args, values.len() == 2, "2")?;
            let eq = values_equal(&values[0], &values[1]);
            Ok(Value::Bool(if op == "=" { eq } else { !eq }))
        }
        "<" | ">" | "<=" | ">=" => {
            check_arity(op, args, values.len() == 2, "2")?;
            let ord = compare(op, &values[0], &values[1])?;
            Ok(Value::Bool(match op {
                "<" => ord == Ordering::Less,
                ">" => ord == Ordering::Greater,
                "<=" => ord != Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        "not" => {
            check_arity(op, args, values.len() == 1, "1")?;
            Ok(Value::Bool(!values[0].truthy()))
        }
        "str" => Ok(Value::String(values.iter().map(Value::to_string).collect())),
        "list" => Ok(Value::List(values)),
        "len" => {
            check_arity(op, args, values.len() == 1, "1")?;
            let len = match &values[0] {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                other => return Err(mismatch(op, "string, list or map", other)),
            };
            Ok(Value::Int(len as i64))
        }
        "get" => {
            check_arity(op, args, values.len() == 2, "2")?;
            match (&values[0], &values[1]) {
                (Value::List(items), Value::Int(i)) => Ok(usize::try_from(*i)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()),
                (container @ (Value::Map(_) | Value::Result(_)), Value::String(key)) => {
                    Ok(lookup(container, key).unwrap_or_default())
                }
                (Value::List(_), other) => Err(mismatch(op, "int", other)),
                (Value::Map(_) | Value::Result(_), other) => Err(mismatch(op, "string", other)),
                (other, _) => Err(mismatch(op, "list, map or result", other)),
            }
        }
        "upper" | "lower" => {
            check_arity(op, args, values.len() == 1, "1")?;
            match &values[0] {
                Value::String(s) if op == "upper" => Ok(Value::String(s.to_uppercase())),
                Value::String(s) => Ok(Value::String(s.to_lowercase())),
                other => Err(mismatch(op, "string", other)),
            }
        }
        "join" => {
            check_arity(op, args, values.len() == 2, "2")?;
            match (&values[0], &values[1]) {
                (Value::List(items), Value::String(sep)) => Ok(Value::String(
                    items
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join(sep),
                )),
                (Value::List(_), other) => Err(mismatch(op, "string", other)),
                (other, _) => Err(mismatch(op, "list", other)),
            }
        }
        "contains" => {
            check_arity(op, args, values.len() == 2, "2")?;
            let found = match (&values[0], &values[1]) {
                (Value::String(hay), Value::String(needle)) => hay.contains(needle.as_str()),
                (Value::List(items), needle) => items.iter().any(|v| values_equal(v, needle)),
                (Value::Map(map), Value::String(key)) => map.contains_key(key),
                (res @ Value::Result(_), Value::String(key)) => lookup(res, key).is_some(),
                (Value::String(_), other) => return Err(mismatch(op, "string", other)),
                (Value::Map(_) | Value::Result(_), other) => {
                    return Err(mismatch(op, "string", other))
                }
                (other, _) => return Err(mismatch(op, "string, list or map", other)),
            };
            Ok(Value::Bool(found))
        }
        _ => Err(EvalError::Undefined(op.to_string())),
    }
}

fn fold_numbers(op: &str, values: &[Value]) -> Result<Value, EvalError> {
    let mut acc = Num::of(op, &values[0])?;
    for value in &values[1..] {
        acc = arith(op, acc, Num::of(op, value)?)?;
    }
    Ok(acc.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;
    use crate::expr::token::expand;
    use crate::vars::NestedScope;
    use pretty_assertions::assert_eq;

    fn eval_in(text: &str, scope: &dyn Scope) -> Result<Value, EvalError> {
        let ast = parse(&expand(text).unwrap()).unwrap();
        Evaluator::new(scope).eval(&ast)
    }

    fn ev(text: &str) -> Result<Value, EvalError> {
        eval_in(text, &NestedScope::new())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(ev("(+ 1 2 3)").unwrap(), Value::Int(6));
        assert_eq!(ev("(+ 1 2.5)").unwrap(), Value::Float(3.5));
        assert_eq!(ev("(- 5)").unwrap(), Value::Int(-5));
        assert_eq!(ev("(- 10 3 2)").unwrap(), Value::Int(5));
        assert_eq!(ev("(* 2 3)").unwrap(), Value::Int(6));
        assert_eq!(ev("(/ 7 2)").unwrap(), Value::Int(3));
        assert_eq!(ev("(/ 7.0 2)").unwrap(), Value::Float(3.5));
        assert_eq!(ev("(% 7 3)").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(ev("(/ 1 0)"), Err(EvalError::DivisionByZero));
        assert_eq!(ev("(% 1 0)"), Err(EvalError::DivisionByZero));
        assert_eq!(ev("(/ 1.0 0)"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_comparison() {
        assert_eq!(ev("(= 1 1.0)").unwrap(), Value::Bool(true));
        assert_eq!(ev("(!= \"a\" \"b\")").unwrap(), Value::Bool(true));
        assert_eq!(ev("(< 1 2.5)").unwrap(), Value::Bool(true));
        assert_eq!(ev("(>= \"b\" \"a\")").unwrap(), Value::Bool(true));
        assert!(matches!(ev("(< 1 \"a\")"), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn test_short_circuit() {
        // `missing` is never evaluated.
        assert_eq!(ev("(and false missing)").unwrap(), Value::Bool(false));
        assert_eq!(ev("(or 1 missing)").unwrap(), Value::Bool(true));
        assert_eq!(ev("(if true 1 missing)").unwrap(), Value::Int(1));
        assert_eq!(ev("(if false 1)").unwrap(), Value::Nil);
    }

    #[test]
    fn test_defined_and_default() {
        let scope = NestedScope::new();
        scope.set("x", Value::Int(1));
        assert_eq!(eval_in("(defined x)", &scope).unwrap(), Value::Bool(true));
        assert_eq!(eval_in("(defined y)", &scope).unwrap(), Value::Bool(false));
        assert_eq!(eval_in("(default y 7)", &scope).unwrap(), Value::Int(7));
        assert_eq!(eval_in("(default x 7)", &scope).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_paths() {
        let scope = NestedScope::new();
        scope.set(
            "cfg",
            Value::from(serde_json::json!({"pkgs": ["nginx", "git"], "port": 80})),
        );
        assert_eq!(eval_in("cfg.pkgs.1", &scope).unwrap(), Value::from("git"));
        assert_eq!(eval_in("cfg.port", &scope).unwrap(), Value::Int(80));
        assert_eq!(
            eval_in("cfg.nope", &scope),
            Err(EvalError::Undefined("cfg.nope".into()))
        );
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(ev("(str \"a\" 1 true)").unwrap(), Value::from("a1true"));
        assert_eq!(ev("(upper \"abc\")").unwrap(), Value::from("ABC"));
        assert_eq!(ev("(len \"héllo\")").unwrap(), Value::Int(5));
        assert_eq!(ev("(join [1 2] \",\")").unwrap(), Value::from("1,2"));
        assert_eq!(ev("(contains \"hello\" \"ell\")").unwrap(), Value::Bool(true));
        assert_eq!(ev("(contains [1 2] 2.0)").unwrap(), Value::Bool(true));
        assert_eq!(ev("(get [1 2] 5)").unwrap(), Value::Nil);
    }

    #[test]
    fn test_arity_and_unknown() {
        assert!(matches!(ev("(not 1 2)"), Err(EvalError::Arity { found: 2, .. })));
        assert!(matches!(ev("(/ 1)"), Err(EvalError::Arity { .. })));
        assert_eq!(ev("(frobnicate 1)"), Err(EvalError::Undefined("frobnicate".into())));
        assert!(matches!(ev("(+ 1 \"a\")"), Err(EvalError::TypeMismatch { .. })));
    }
}
