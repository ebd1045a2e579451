//! Resolved values
//!
//! Absence is expressed with `Option`, never with a variant, so a `Value` in
//! hand always came from the plan, a default, or a reference table.

use crate::error::TypeMismatch;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// A resolved value with the unit declared by its property definition
#[derive(Debug, Clone, PartialEq)]
pub struct ValueWithUnit {
    pub value: Value,
    pub unit: Option<String>,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    fn mismatch(&self, expected: &'static str) -> TypeMismatch {
        TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }

    /// Numbers, and strings holding a number (regex captures are strings)
    pub fn as_f64(&self) -> Result<f64, TypeMismatch> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::String(s) => s.trim().parse().map_err(|_| self.mismatch("number")),
            _ => Err(self.mismatch("number")),
        }
    }

    pub fn as_str(&self) -> Result<&str, TypeMismatch> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(self.mismatch("string")),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], TypeMismatch> {
        match self {
            Self::List(items) => Ok(items),
            _ => Err(self.mismatch("list")),
        }
    }

    pub fn as_map(&self) -> Result<&BTreeMap<String, Value>, TypeMismatch> {
        match self {
            Self::Map(map) => Ok(map),
            _ => Err(self.mismatch("map")),
        }
    }

    /// Text used when splicing a value into a query or matching a regex
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => b.to_string(),
            Self::Null => "null".to_string(),
            other => other.to_json().to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Self::Map(
                map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Render a number without a trailing `.0` for integral values
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_strings_convert() {
        assert_eq!(Value::String("4".into()).as_f64(), Ok(4.0));
        assert_eq!(Value::Number(2.5).as_f64(), Ok(2.5));
    }

    #[test]
    fn test_mismatch_is_reported() {
        let err = Value::String("n1-standard-1".into()).as_f64().unwrap_err();
        assert_eq!(err.expected, "number");
        assert_eq!(err.found, "string");
        assert!(Value::Number(1.0).as_str().is_err());
        assert!(Value::Null.as_list().is_err());
    }

    #[test]
    fn test_text_form() {
        assert_eq!(Value::Number(16.0).to_text(), "16");
        assert_eq!(Value::Number(0.25).to_text(), "0.25");
        assert_eq!(Value::String("pd-ssd".into()).to_text(), "pd-ssd");
    }

    #[test]
    fn test_json_conversion_keeps_shape() {
        let original = json!({"zones": ["a", "b"], "size": 10, "ssd": true});
        let value = Value::from(&original);
        assert_eq!(value.as_map().unwrap()["zones"].as_list().unwrap().len(), 2);
        assert_eq!(value.to_json(), original);
    }
}
