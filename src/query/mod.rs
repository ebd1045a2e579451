//! Path query evaluator
//!
//! A small jq-like language used by mapping declarations to locate values in
//! a plan document. Supported forms:
//!
//! - traversal: `.`, `..`, `.a.b`, `."a"`, `.[0]`, `.[-1]`, `.[]`, `.a?`
//! - composition: `|`, `,`, `//`, `and`, `or`, `( )`, `[ ]`
//! - comparison and arithmetic: `== != < <= > >= + - * / %`
//! - `if ... then ... elif ... else ... end`
//! - builtins such as `select`, `map`, `length`, `flatten`, `test`, `split`
//!   and `all_select(key; value)` which finds every object below the input
//!   whose `key` equals `value`
//!
//! Queries rooted at the cross-cutting plan sections (`.configuration`,
//! `.prior_state`, `.planned_values`) or calling `all_select` are evaluated
//! against the whole plan rather than the local resource subtree, see
//! [`evaluate_routed`].

mod builtins;
mod eval;
mod lexer;
mod parser;

pub use parser::{parse, BinOp, Expr};

use serde_json::Value;

/// Plan sections that are always resolved from the top-level document
pub const PLAN_ROOT_SECTIONS: &[&str] = &[".configuration", ".prior_state", ".planned_values"];

/// Helper whose presence routes a query to the top-level document
const ALL_SELECT_CALL: &str = "all_select(";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    User(String),

    #[error("unknown function {name}/{arity}")]
    UnknownFunction { name: String, arity: usize },

    #[error("invalid regex `{pattern}`: {message}")]
    Regex { pattern: String, message: String },
}

/// Evaluate a query against a document, returning every match in order
pub fn evaluate(query: &str, document: &Value) -> Result<Vec<Value>, QueryError> {
    let expr = parse(query)?;
    run(&expr, document)
}

/// Evaluate an already parsed expression
pub fn run(expr: &Expr, document: &Value) -> Result<Vec<Value>, QueryError> {
    eval::eval_all(expr, document)
}

/// Whether a query must run against the whole plan instead of a subtree
pub fn targets_plan_root(query: &str) -> bool {
    let trimmed = query.trim_start();
    let rooted = PLAN_ROOT_SECTIONS.iter().any(|section| {
        trimmed.strip_prefix(section).is_some_and(|rest| {
            !rest
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        })
    });
    rooted || query.contains(ALL_SELECT_CALL)
}

/// Evaluate against `local`, or against `root` when [`targets_plan_root`] says so
pub fn evaluate_routed(query: &str, local: &Value, root: &Value) -> Result<Vec<Value>, QueryError> {
    if targets_plan_root(query) {
        tracing::trace!("routing query to plan root: {}", query);
        evaluate(query, root)
    } else {
        evaluate(query, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_routing_by_prefix() {
        assert!(targets_plan_root(".configuration.root_module"));
        assert!(targets_plan_root("  .prior_state.values"));
        assert!(targets_plan_root(".planned_values | all_select(\"type\"; \"x\")"));
        assert!(targets_plan_root(r#"all_select("address"; "a.b")"#));
        assert!(!targets_plan_root(".values.machine_type"));
        assert!(!targets_plan_root(".planned_values_extra"));
    }

    #[test]
    fn test_routed_evaluation_uses_root() {
        let root = json!({"configuration": {"provider": "google"}, "values": {"a": 1}});
        let local = json!({"values": {"a": 2}});
        assert_eq!(
            evaluate_routed(".configuration.provider", &local, &root).unwrap(),
            vec![json!("google")]
        );
        assert_eq!(
            evaluate_routed(".values.a", &local, &root).unwrap(),
            vec![json!(2)]
        );
    }
}
