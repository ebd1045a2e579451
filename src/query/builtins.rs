//! Builtin functions

use super::eval::{add, compare, eval_all, index, is_truthy, number, recurse, type_name};
use super::parser::Expr;
use super::QueryError;
use regex::Regex;
use serde_json::{json, Value};

pub(super) fn call(
    name: &str,
    args: &[Expr],
    input: &Value,
    out: &mut Vec<Value>,
) -> Result<(), QueryError> {
    match (name, args.len()) {
        ("empty", 0) => {}
        ("error", 0) => return Err(QueryError::User(to_text(input))),
        ("error", 1) => {
            if let Some(message) = eval_all(&args[0], input)?.first() {
                return Err(QueryError::User(to_text(message)));
            }
        }
        ("not", 0) => out.push(Value::Bool(!is_truthy(input))),
        ("select", 1) => {
            for cond in eval_all(&args[0], input)? {
                if is_truthy(&cond) {
                    out.push(input.clone());
                }
            }
        }
        ("map", 1) => {
            let items = elements(input, "map")?;
            let mut mapped = Vec::new();
            for item in items {
                mapped.extend(eval_all(&args[0], item)?);
            }
            out.push(Value::Array(mapped));
        }
        ("recurse", 0) => recurse(input, out),
        ("length", 0) => out.push(length(input)?),
        ("keys", 0) => out.push(keys(input)?),
        ("has", 1) => {
            for key in eval_all(&args[0], input)? {
                let present = match (input, &key) {
                    (Value::Object(map), Value::String(k)) => map.contains_key(k),
                    (Value::Array(items), Value::Number(n)) => n
                        .as_f64()
                        .map(|n| n >= 0.0 && (n as usize) < items.len())
                        .unwrap_or(false),
                    _ => {
                        return Err(QueryError::Type(format!(
                            "Cannot check whether {} has a {} key",
                            type_name(input),
                            type_name(&key)
                        )))
                    }
                };
                out.push(Value::Bool(present));
            }
        }
        ("type", 0) => out.push(Value::String(type_name(input).to_string())),
        ("first", 0) => out.push(index(input, &json!(0))?),
        ("last", 0) => out.push(index(input, &json!(-1))?),
        ("first", 1) => {
            if let Some(value) = eval_all(&args[0], input)?.into_iter().next() {
                out.push(value);
            }
        }
        ("last", 1) => {
            if let Some(value) = eval_all(&args[0], input)?.into_iter().last() {
                out.push(value);
            }
        }
        ("flatten", 0) => out.push(Value::Array(flatten(elements(input, "flatten")?, usize::MAX))),
        ("flatten", 1) => {
            for depth in eval_all(&args[0], input)? {
                let depth = depth
                    .as_f64()
                    .filter(|d| *d >= 0.0)
                    .ok_or_else(|| QueryError::Type("flatten depth must not be negative".into()))?;
                out.push(Value::Array(flatten(
                    elements(input, "flatten")?,
                    depth as usize,
                )));
            }
        }
        ("add", 0) => {
            let mut total = Value::Null;
            for item in elements(input, "add")? {
                total = add(&total, item)?;
            }
            out.push(total);
        }
        ("any", 0) => out.push(Value::Bool(elements(input, "any")?.into_iter().any(is_truthy))),
        ("all", 0) => out.push(Value::Bool(elements(input, "all")?.into_iter().all(is_truthy))),
        ("sort", 0) => out.push(Value::Array(sorted(input)?)),
        ("unique", 0) => {
            let mut items = sorted(input)?;
            items.dedup_by(|a, b| compare(a, b).is_eq());
            out.push(Value::Array(items));
        }
        ("min", 0) => out.push(sorted(input)?.into_iter().next().unwrap_or(Value::Null)),
        ("max", 0) => out.push(sorted(input)?.into_iter().last().unwrap_or(Value::Null)),
        ("reverse", 0) => match input {
            Value::String(s) => out.push(Value::String(s.chars().rev().collect())),
            Value::Null => out.push(Value::Array(Vec::new())),
            _ => {
                let mut items: Vec<Value> = elements(input, "reverse")?.into_iter().cloned().collect();
                items.reverse();
                out.push(Value::Array(items));
            }
        },
        ("tostring", 0) => out.push(Value::String(to_text(input))),
        ("tonumber", 0) => out.push(match input {
            Value::Number(_) => input.clone(),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(number)
                .map_err(|_| QueryError::Type(format!("Cannot parse '{}' as number", s)))?,
            other => {
                return Err(QueryError::Type(format!(
                    "{} cannot be parsed as a number",
                    type_name(other)
                )))
            }
        }),
        ("ascii_downcase", 0) => out.push(Value::String(string(input, name)?.to_ascii_lowercase())),
        ("ascii_upcase", 0) => out.push(Value::String(string(input, name)?.to_ascii_uppercase())),
        ("test", 1) => {
            let subject = string(input, name)?;
            for pattern in eval_all(&args[0], input)? {
                let pattern = string(&pattern, name)?;
                let re = Regex::new(pattern).map_err(|e| QueryError::Regex {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
                out.push(Value::Bool(re.is_match(subject)));
            }
        }
        ("split", 1) => {
            let subject = string(input, name)?;
            for sep in eval_all(&args[0], input)? {
                let sep = string(&sep, name)?;
                out.push(Value::Array(
                    subject
                        .split(sep)
                        .map(|s| Value::String(s.to_string()))
                        .collect(),
                ));
            }
        }
        ("join", 1) => {
            for sep in eval_all(&args[0], input)? {
                let sep = string(&sep, name)?;
                let parts: Vec<String> = elements(input, name)?
                    .into_iter()
                    .map(|v| match v {
                        Value::Null => String::new(),
                        other => to_text(other),
                    })
                    .collect();
                out.push(Value::String(parts.join(sep)));
            }
        }
        ("startswith", 1) | ("endswith", 1) | ("ltrimstr", 1) | ("rtrimstr", 1) => {
            for arg in eval_all(&args[0], input)? {
                out.push(affix(name, input, &arg)?);
            }
        }
        ("contains", 1) => {
            for needle in eval_all(&args[0], input)? {
                out.push(Value::Bool(contains(input, &needle)?));
            }
        }
        ("values", 0) => filter_kind(input, out, |v| !v.is_null()),
        ("nulls", 0) => filter_kind(input, out, Value::is_null),
        ("booleans", 0) => filter_kind(input, out, Value::is_boolean),
        ("numbers", 0) => filter_kind(input, out, Value::is_number),
        ("strings", 0) => filter_kind(input, out, Value::is_string),
        ("arrays", 0) => filter_kind(input, out, Value::is_array),
        ("objects", 0) => filter_kind(input, out, Value::is_object),
        ("to_entries", 0) => match input {
            Value::Object(map) => out.push(Value::Array(
                map.iter()
                    .map(|(k, v)| json!({"key": k, "value": v}))
                    .collect(),
            )),
            other => {
                return Err(QueryError::Type(format!(
                    "{} has no keys",
                    type_name(other)
                )))
            }
        },
        ("all_select", 2) => {
            // Every object anywhere below the input whose `key` equals `value`
            let keys = eval_all(&args[0], input)?;
            let wanted = eval_all(&args[1], input)?;
            let mut nodes = Vec::new();
            recurse(input, &mut nodes);
            for key in &keys {
                let key = string(key, name)?;
                for node in &nodes {
                    let Some(found) = node.as_object().and_then(|map| map.get(key)) else {
                        continue;
                    };
                    if wanted.iter().any(|w| compare(found, w).is_eq()) {
                        out.push(node.clone());
                    }
                }
            }
        }
        _ => {
            return Err(QueryError::UnknownFunction {
                name: name.to_string(),
                arity: args.len(),
            })
        }
    }
    Ok(())
}

/// Text form used by `tostring`, `join` and `error`
pub(super) fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string<'v>(value: &'v Value, func: &str) -> Result<&'v str, QueryError> {
    value.as_str().ok_or_else(|| {
        QueryError::Type(format!(
            "{} ({}) cannot be used with {}",
            type_name(value),
            to_text(value),
            func
        ))
    })
}

fn elements<'v>(value: &'v Value, func: &str) -> Result<Vec<&'v Value>, QueryError> {
    match value {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(map) => Ok(map.values().collect()),
        other => Err(QueryError::Type(format!(
            "Cannot iterate over {} in {}",
            type_name(other),
            func
        ))),
    }
}

fn length(value: &Value) -> Result<Value, QueryError> {
    Ok(match value {
        Value::Null => json!(0),
        Value::Bool(_) => {
            return Err(QueryError::Type("boolean has no length".to_string()))
        }
        Value::Number(n) => number(n.as_f64().unwrap_or(0.0).abs()),
        Value::String(s) => json!(s.chars().count()),
        Value::Array(items) => json!(items.len()),
        Value::Object(map) => json!(map.len()),
    })
}

fn keys(value: &Value) -> Result<Value, QueryError> {
    match value {
        Value::Object(map) => {
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            Ok(Value::Array(names.into_iter().map(|k| json!(k)).collect()))
        }
        Value::Array(items) => Ok(Value::Array((0..items.len()).map(|i| json!(i)).collect())),
        other => Err(QueryError::Type(format!("{} has no keys", type_name(other)))),
    }
}

fn sorted(value: &Value) -> Result<Vec<Value>, QueryError> {
    let Value::Array(items) = value else {
        return Err(QueryError::Type(format!(
            "{} cannot be sorted, as it is not an array",
            type_name(value)
        )));
    };
    let mut items = items.clone();
    items.sort_by(compare);
    Ok(items)
}

fn flatten(items: Vec<&Value>, depth: usize) -> Vec<Value> {
    let mut flat = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => {
                flat.extend(flatten(inner.iter().collect(), depth - 1));
            }
            other => flat.push(other.clone()),
        }
    }
    flat
}

fn affix(func: &str, input: &Value, arg: &Value) -> Result<Value, QueryError> {
    let (Value::String(subject), Value::String(affix)) = (input, arg) else {
        if matches!(func, "ltrimstr" | "rtrimstr") {
            return Ok(input.clone());
        }
        return Err(QueryError::Type(format!(
            "{}() requires string inputs",
            func
        )));
    };
    Ok(match func {
        "startswith" => Value::Bool(subject.starts_with(affix.as_str())),
        "endswith" => Value::Bool(subject.ends_with(affix.as_str())),
        "ltrimstr" => Value::String(
            subject
                .strip_prefix(affix.as_str())
                .unwrap_or(subject.as_str())
                .to_string(),
        ),
        _ => Value::String(
            subject
                .strip_suffix(affix.as_str())
                .unwrap_or(subject.as_str())
                .to_string(),
        ),
    })
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, QueryError> {
    match (haystack, needle) {
        (Value::String(a), Value::String(b)) => Ok(a.contains(b.as_str())),
        (Value::Array(a), Value::Array(b)) => {
            for wanted in b {
                let mut found = false;
                for item in a {
                    if contains(item, wanted).unwrap_or(false) {
                        found = true;
                        break;
                    }
                }
                if !found {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::Object(a), Value::Object(b)) => {
            for (key, wanted) in b {
                match a.get(key) {
                    Some(item) if contains(item, wanted)? => {}
                    _ => return Ok(false),
                }
            }
            Ok(true)
        }
        (a, b) if type_name(a) == type_name(b) => Ok(compare(a, b).is_eq()),
        (a, b) => Err(QueryError::Type(format!(
            "{} and {} cannot have their containment checked",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn filter_kind(input: &Value, out: &mut Vec<Value>, keep: impl Fn(&Value) -> bool) {
    if keep(input) {
        out.push(input.clone());
    }
}
