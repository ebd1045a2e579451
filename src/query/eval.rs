//! Expression evaluation over `serde_json::Value`
//!
//! Every expression yields zero or more outputs. Outputs are collected eagerly
//! since plan documents are small enough that streaming buys nothing.

use super::builtins;
use super::parser::{BinOp, Expr};
use super::QueryError;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Evaluate `expr` against `input`, collecting all outputs
pub(super) fn eval_all(expr: &Expr, input: &Value) -> Result<Vec<Value>, QueryError> {
    let mut out = Vec::new();
    eval(expr, input, &mut out)?;
    Ok(out)
}

pub(super) fn eval(expr: &Expr, input: &Value, out: &mut Vec<Value>) -> Result<(), QueryError> {
    match expr {
        Expr::Identity => out.push(input.clone()),
        Expr::Recurse => recurse(input, out),
        Expr::Literal(value) => out.push(value.clone()),
        Expr::Index(target, key) => {
            let keys = eval_all(key, input)?;
            for target in eval_all(target, input)? {
                for key in &keys {
                    out.push(index(&target, key)?);
                }
            }
        }
        Expr::Iterate(target) => {
            for target in eval_all(target, input)? {
                iterate(&target, out)?;
            }
        }
        Expr::Try(inner) => {
            // Outputs produced before an error are kept
            let mut partial = Vec::new();
            let _ = eval(inner, input, &mut partial);
            out.extend(partial);
        }
        Expr::Array(None) => out.push(Value::Array(Vec::new())),
        Expr::Array(Some(inner)) => out.push(Value::Array(eval_all(inner, input)?)),
        Expr::Pipe(lhs, rhs) => {
            for value in eval_all(lhs, input)? {
                eval(rhs, &value, out)?;
            }
        }
        Expr::Comma(lhs, rhs) => {
            eval(lhs, input, out)?;
            eval(rhs, input, out)?;
        }
        Expr::Alternative(lhs, rhs) => {
            let mut partial = Vec::new();
            let _ = eval(lhs, input, &mut partial);
            let truthy: Vec<Value> = partial.into_iter().filter(is_truthy).collect();
            if truthy.is_empty() {
                eval(rhs, input, out)?;
            } else {
                out.extend(truthy);
            }
        }
        Expr::And(lhs, rhs) => {
            for l in eval_all(lhs, input)? {
                if !is_truthy(&l) {
                    out.push(Value::Bool(false));
                    continue;
                }
                for r in eval_all(rhs, input)? {
                    out.push(Value::Bool(is_truthy(&r)));
                }
            }
        }
        Expr::Or(lhs, rhs) => {
            for l in eval_all(lhs, input)? {
                if is_truthy(&l) {
                    out.push(Value::Bool(true));
                    continue;
                }
                for r in eval_all(rhs, input)? {
                    out.push(Value::Bool(is_truthy(&r)));
                }
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let rights = eval_all(rhs, input)?;
            for l in eval_all(lhs, input)? {
                for r in &rights {
                    out.push(binary(*op, &l, r)?);
                }
            }
        }
        Expr::Negate(inner) => {
            for value in eval_all(inner, input)? {
                match value.as_f64() {
                    Some(n) => out.push(number(-n)),
                    None => {
                        return Err(QueryError::Type(format!(
                            "{} cannot be negated",
                            type_name(&value)
                        )))
                    }
                }
            }
        }
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            for c in eval_all(cond, input)? {
                if is_truthy(&c) {
                    eval(then, input, out)?;
                } else if let Some(otherwise) = otherwise {
                    eval(otherwise, input, out)?;
                } else {
                    out.push(input.clone());
                }
            }
        }
        Expr::Call(name, args) => builtins::call(name, args, input, out)?,
    }
    Ok(())
}

/// Pre-order walk of a value and all its descendants
pub(super) fn recurse(value: &Value, out: &mut Vec<Value>) {
    out.push(value.clone());
    match value {
        Value::Array(items) => items.iter().for_each(|item| recurse(item, out)),
        Value::Object(map) => map.values().for_each(|item| recurse(item, out)),
        _ => {}
    }
}

pub(super) fn index(target: &Value, key: &Value) -> Result<Value, QueryError> {
    match (target, key) {
        (Value::Null, Value::String(_) | Value::Number(_)) => Ok(Value::Null),
        (Value::Object(map), Value::String(k)) => Ok(map.get(k).cloned().unwrap_or(Value::Null)),
        (Value::Array(items), Value::Number(n)) => {
            let Some(n) = n.as_f64() else {
                return Ok(Value::Null);
            };
            let n = n.floor() as i64;
            let idx = if n < 0 { items.len() as i64 + n } else { n };
            if idx < 0 {
                return Ok(Value::Null);
            }
            Ok(items.get(idx as usize).cloned().unwrap_or(Value::Null))
        }
        _ => Err(QueryError::Type(format!(
            "Cannot index {} with {}",
            type_name(target),
            describe(key)
        ))),
    }
}

/// Null iterates as empty so a missing list attribute yields no items
fn iterate(target: &Value, out: &mut Vec<Value>) -> Result<(), QueryError> {
    match target {
        Value::Null => Ok(()),
        Value::Array(items) => {
            out.extend(items.iter().cloned());
            Ok(())
        }
        Value::Object(map) => {
            out.extend(map.values().cloned());
            Ok(())
        }
        other => Err(QueryError::Type(format!(
            "Cannot iterate over {}",
            type_name(other)
        ))),
    }
}

pub(super) fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, QueryError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(compare(l, r) == Ordering::Equal)),
        BinOp::Ne => Ok(Value::Bool(compare(l, r) != Ordering::Equal)),
        BinOp::Lt => Ok(Value::Bool(compare(l, r) == Ordering::Less)),
        BinOp::Le => Ok(Value::Bool(compare(l, r) != Ordering::Greater)),
        BinOp::Gt => Ok(Value::Bool(compare(l, r) == Ordering::Greater)),
        BinOp::Ge => Ok(Value::Bool(compare(l, r) != Ordering::Less)),
        BinOp::Add => add(l, r),
        BinOp::Sub => match (l, r) {
            (Value::Number(a), Value::Number(b)) => Ok(number(as_f64(a) - as_f64(b))),
            (Value::Array(a), Value::Array(b)) => Ok(Value::Array(
                a.iter().filter(|item| !b.contains(item)).cloned().collect(),
            )),
            _ => Err(arith_error("subtracted", l, r)),
        },
        BinOp::Mul => match (l, r) {
            (Value::Number(a), Value::Number(b)) => Ok(number(as_f64(a) * as_f64(b))),
            _ => Err(arith_error("multiplied", l, r)),
        },
        BinOp::Div => match (l, r) {
            (Value::Number(a), Value::Number(b)) => {
                let divisor = as_f64(b);
                if divisor == 0.0 {
                    return Err(QueryError::Type(format!(
                        "{} cannot be divided because the divisor is zero",
                        as_f64(a)
                    )));
                }
                Ok(number(as_f64(a) / divisor))
            }
            (Value::String(a), Value::String(b)) => Ok(Value::Array(
                a.split(b.as_str())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            )),
            _ => Err(arith_error("divided", l, r)),
        },
        BinOp::Mod => match (l, r) {
            (Value::Number(a), Value::Number(b)) => {
                let divisor = as_f64(b).trunc() as i64;
                if divisor == 0 {
                    return Err(QueryError::Type(format!(
                        "{} cannot be divided because the divisor is zero",
                        as_f64(a)
                    )));
                }
                let dividend = as_f64(a).trunc() as i64;
                let remainder = dividend.checked_rem(divisor).ok_or_else(|| {
                    QueryError::Type(format!("{} % {} overflows", dividend, divisor))
                })?;
                Ok(number(remainder as f64))
            }
            _ => Err(arith_error("divided", l, r)),
        },
    }
}

pub(super) fn add(l: &Value, r: &Value) -> Result<Value, QueryError> {
    match (l, r) {
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        (Value::Number(a), Value::Number(b)) => Ok(number(as_f64(a) + as_f64(b))),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Value::Object(a), Value::Object(b)) => {
            let mut merged: Map<String, Value> = a.clone();
            merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Value::Object(merged))
        }
        _ => Err(arith_error("added", l, r)),
    }
}

fn arith_error(verb: &str, l: &Value, r: &Value) -> QueryError {
    QueryError::Type(format!(
        "{} and {} cannot be {}",
        type_name(l),
        type_name(r),
        verb
    ))
}

fn as_f64(n: &serde_json::Number) -> f64 {
    n.as_f64().unwrap_or(0.0)
}

/// Build a JSON number, keeping integral values as integers
pub(super) fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

pub(super) fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

pub(super) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        other => type_name(other).to_string(),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Total order: null < false < true < numbers < strings < arrays < objects
pub(super) fn compare(l: &Value, r: &Value) -> Ordering {
    let rank = type_rank(l).cmp(&type_rank(r));
    if rank != Ordering::Equal {
        return rank;
    }
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => as_f64(a)
            .partial_cmp(&as_f64(b))
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ord = compare(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(a), Value::Object(b)) => {
            let mut a_keys: Vec<&String> = a.keys().collect();
            let mut b_keys: Vec<&String> = b.keys().collect();
            a_keys.sort();
            b_keys.sort();
            let ord = a_keys.cmp(&b_keys);
            if ord != Ordering::Equal {
                return ord;
            }
            for key in a_keys {
                let ord = compare(&a[key], &b[key]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::super::evaluate;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_traversal() {
        let doc = json!({"values": {"machine_type": "n1-standard-1"}});
        assert_eq!(
            evaluate(".values.machine_type", &doc).unwrap(),
            vec![json!("n1-standard-1")]
        );
    }

    #[test]
    fn test_missing_field_is_null() {
        let doc = json!({"values": {}});
        assert_eq!(evaluate(".values.zone", &doc).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn test_iterate_null_is_empty() {
        let doc = json!({"values": {}});
        assert!(evaluate(".values.scratch_disk[]", &doc).unwrap().is_empty());
    }

    #[test]
    fn test_iterate_and_project() {
        let doc = json!({"disks": [{"size": 10}, {"size": 20}]});
        assert_eq!(
            evaluate(".disks[].size", &doc).unwrap(),
            vec![json!(10), json!(20)]
        );
    }

    #[test]
    fn test_negative_index() {
        let doc = json!({"zones": ["a", "b", "c"]});
        assert_eq!(evaluate(".zones[-1]", &doc).unwrap(), vec![json!("c")]);
    }

    #[test]
    fn test_select_filter() {
        let doc = json!([{"name": "a", "size": 1}, {"name": "b", "size": 5}]);
        assert_eq!(
            evaluate(".[] | select(.size > 2) | .name", &doc).unwrap(),
            vec![json!("b")]
        );
    }

    #[test]
    fn test_alternative_falls_back_on_null() {
        let doc = json!({"a": null, "b": 3});
        assert_eq!(evaluate(".a // .b", &doc).unwrap(), vec![json!(3)]);
    }

    #[test]
    fn test_index_string_with_field_is_type_error() {
        let doc = json!({"a": "text"});
        assert!(matches!(
            evaluate(".a.b", &doc),
            Err(QueryError::Type(_))
        ));
    }

    #[test]
    fn test_optional_suppresses_error() {
        let doc = json!({"a": "text"});
        assert!(evaluate(".a.b?", &doc).unwrap().is_empty());
    }

    #[test]
    fn test_arithmetic_keeps_integers() {
        let doc = json!({"size": 2});
        assert_eq!(evaluate(".size * 1024", &doc).unwrap(), vec![json!(2048)]);
    }

    #[test]
    fn test_division_by_zero_errors() {
        assert!(evaluate("1 / 0", &json!(null)).is_err());
    }

    #[test]
    fn test_modulo_overflow_errors() {
        assert!(evaluate("-9223372036854775808 % -1", &json!(null)).is_err());
        assert_eq!(evaluate("-7 % 2", &json!(null)).unwrap(), vec![json!(-1)]);
    }

    #[test]
    fn test_conditional() {
        let doc = json!({"availability_type": "REGIONAL"});
        assert_eq!(
            evaluate(
                r#"if .availability_type == "REGIONAL" then 2 else 1 end"#,
                &doc
            )
            .unwrap(),
            vec![json!(2)]
        );
    }

    #[test]
    fn test_comma_and_array_construction() {
        let doc = json!({"a": 1, "b": 2});
        assert_eq!(evaluate("[.a, .b]", &doc).unwrap(), vec![json!([1, 2])]);
    }

    #[test]
    fn test_cross_type_ordering() {
        assert_eq!(compare(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare(&json!(10), &json!("1")), Ordering::Less);
        assert_eq!(compare(&json!([1, 2]), &json!([1, 3])), Ordering::Less);
    }
}
