//! Query-based post-conditions
//!
//! A validator gates on evaluation failure, not on emptiness: a query that
//! yields nothing still passes, one that raises (a type error, or an explicit
//! `error(...)`) rejects the value.

use super::context::EvaluationContext;
use super::value::Value;
use super::Resolver;
use crate::error::{EngineError, Result};
use crate::query;

impl<'a> Resolver<'a> {
    pub fn validate(&self, value: &Value, validator: &str, ctx: &EvaluationContext<'_>) -> Result<()> {
        let expr = self.expand(validator, ctx)?;
        query::evaluate(&expr, &value.to_json())
            .map(|_| ())
            .map_err(|source| EngineError::Validation {
                address: ctx.address.to_string(),
                validator: expr,
                value: value.to_text(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{document, resource_mapping};
    use super::super::{DataStore, MappingScope};
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn validate(value: Value, validator: &str) -> Result<()> {
        let doc = document("compute_resource:\n  t:\n    paths: .x\n");
        let data = DataStore::new(None);
        let config = Config::default();
        let plan = json!({});
        let resolver = Resolver::new(&plan, &doc, &data, &config);
        let resource = json!({});
        let ctx = EvaluationContext::new(
            &resource,
            MappingScope::from(resource_mapping(&doc, "t")),
            "t.one",
            "t",
            "gcp",
        );
        resolver.validate(&value, validator, &ctx)
    }

    #[test]
    fn test_empty_result_passes() {
        assert!(validate(Value::Number(3.0), "select(. > 10)").is_ok());
    }

    #[test]
    fn test_explicit_error_rejects() {
        let err = validate(
            Value::Number(-1.0),
            r#"if . >= 0 then . else error("size must not be negative") end"#,
        )
        .unwrap_err();
        match err {
            EngineError::Validation { address, value, .. } => {
                assert_eq!(address, "t.one");
                assert_eq!(value, "-1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_type_error_rejects() {
        assert!(validate(Value::String("pd-ssd".into()), ".size").is_err());
    }
}
