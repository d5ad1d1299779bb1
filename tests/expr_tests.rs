//! Expression language tests
//!
//! Covers evaluation through the public API, error classification by
//! stage, template expansion against scope chains, and property tests for
//! arithmetic, comparison and literal text.

use std::sync::Arc;

use playrun::expr::{
    boolify, eval_string, eval_template, expand_templates, EvalError, ExprError, Value,
};
use playrun::vars::{NestedScope, Scope};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn scope() -> NestedScope {
    let scope = NestedScope::new();
    scope.set("name", Value::from("web"));
    scope.set("port", Value::Int(80));
    scope.set(
        "hosts",
        Value::List(vec![Value::from("a"), Value::from("b")]),
    );
    scope
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_arithmetic() {
    let s = scope();
    assert_eq!(eval_string("(+ 1 2)", &s).unwrap(), Value::Int(3));
    assert_eq!(eval_string("(* 2 (+ port 1))", &s).unwrap(), Value::Int(162));
    assert_eq!(eval_string("(- 10 4 1)", &s).unwrap(), Value::Int(5));
    assert_eq!(eval_string("(+ 1 0.5)", &s).unwrap(), Value::Float(1.5));
}

#[test]
fn test_comparison_and_logic() {
    let s = scope();
    assert_eq!(eval_string("(= port 80)", &s).unwrap(), Value::Bool(true));
    assert_eq!(eval_string("(!= name \"db\")", &s).unwrap(), Value::Bool(true));
    assert_eq!(eval_string("(< 1 2)", &s).unwrap(), Value::Bool(true));
    assert!(eval_string("(and true (= port 80))", &s).unwrap().truthy());
    assert!(!eval_string("(or false nil)", &s).unwrap().truthy());
    assert_eq!(
        eval_string("(if (= port 80) \"http\" \"other\")", &s).unwrap(),
        Value::from("http")
    );
}

#[test]
fn test_defined_and_default() {
    let s = scope();
    assert_eq!(eval_string("(defined name)", &s).unwrap(), Value::Bool(true));
    assert_eq!(eval_string("(defined nope)", &s).unwrap(), Value::Bool(false));
    assert_eq!(
        eval_string("(default nope \"fallback\")", &s).unwrap(),
        Value::from("fallback")
    );
}

#[test]
fn test_errors_by_stage() {
    let s = scope();
    assert!(matches!(eval_string("(+ 1", &s), Err(ExprError::Parse(_))));
    assert!(matches!(eval_string("{{ (+ 1 2)", &s), Err(ExprError::Syntax(_))));
    assert!(matches!(
        eval_string("(+ name 1)", &s),
        Err(ExprError::Eval(EvalError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        eval_string("(/ 1 0)", &s),
        Err(ExprError::Eval(EvalError::DivisionByZero))
    ));
    assert!(matches!(
        eval_string("(= 1)", &s),
        Err(ExprError::Eval(EvalError::Arity { .. }))
    ));
    assert!(matches!(
        eval_string("missing", &s),
        Err(ExprError::Eval(EvalError::Undefined(_)))
    ));
}

#[test]
fn test_boolify() {
    assert!(!boolify(""));
    assert!(!boolify("no"));
    assert!(!boolify("false"));
    assert!(boolify("anything"));
    assert!(boolify("0"));
}

// ============================================================================
// Templates
// ============================================================================

#[test]
fn test_template_expansion() {
    let s = scope();
    assert_eq!(
        expand_templates("listen {{ name }}:{{ (+ port 1) }}", &s).unwrap(),
        "listen web:81"
    );
    assert_eq!(expand_templates("no templates here", &s).unwrap(), "no templates here");
    assert_eq!(eval_template("{{ port }}", &s).unwrap(), Value::Int(80));
    assert_eq!(expand_templates("{{ hosts.1 }}", &s).unwrap(), "b");
}

#[test]
fn test_templates_see_parent_scopes() {
    let parent = Arc::new(scope());
    let child = NestedScope::with_parent(parent.clone());
    child.set("port", Value::Int(8080));

    assert_eq!(
        expand_templates("{{ name }}:{{ port }}", &child).unwrap(),
        "web:8080"
    );
    assert_eq!(expand_templates("{{ port }}", parent.as_ref()).unwrap(), "80");
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_addition_matches_integers(a in 0i64..1_000_000_000, b in 0i64..1_000_000_000) {
        let s = NestedScope::new();
        let v = eval_string(&format!("(+ {} {})", a, b), &s).unwrap();
        prop_assert_eq!(v, Value::Int(a + b));
    }

    #[test]
    fn prop_comparison_matches_integers(a in 0i64..10_000, b in 0i64..10_000) {
        let s = NestedScope::new();
        let v = eval_string(&format!("(< {} {})", a, b), &s).unwrap();
        prop_assert_eq!(v, Value::Bool(a < b));
    }

    #[test]
    fn prop_bound_values_round_trip(key in "[a-z][a-z0-9_]{0,8}", n in any::<i64>()) {
        prop_assume!(!matches!(key.as_str(), "true" | "false" | "nil"));
        let s = NestedScope::new();
        s.set(&key, Value::Int(n));
        prop_assert_eq!(eval_string(&key, &s).unwrap(), Value::Int(n));
    }

    #[test]
    fn prop_literal_text_is_unchanged(text in "[a-zA-Z0-9 .,:;()=+-]{0,40}") {
        let s = NestedScope::new();
        prop_assert_eq!(expand_templates(&text, &s).unwrap(), text);
    }

    #[test]
    fn prop_boolify_only_three_falsy_words(text in ".{0,12}") {
        let expected = !matches!(text.as_str(), "" | "false" | "no");
        prop_assert_eq!(boolify(&text), expected);
    }
}
