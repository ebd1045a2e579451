//! Regex capture extraction
//!
//! A declared regex means the value is expected to conform: a value that
//! does not match, or whose requested group does not participate, is an
//! error rather than an empty string.

use super::context::EvaluationContext;
use super::value::Value;
use super::Resolver;
use crate::error::{EngineError, Result};
use crate::mapping::RegexRule;
use regex::Regex;

/// Capture `group` of the first match of `regex` in `value`
pub fn extract_group(regex: &Regex, value: &str, group: usize) -> Option<String> {
    regex
        .captures(value)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str().to_string())
}

impl<'a> Resolver<'a> {
    pub fn extract(&self, value: &Value, rule: &RegexRule, ctx: &EvaluationContext<'_>) -> Result<String> {
        let regex = self.regex(&rule.pattern, ctx)?;
        let text = value.to_text();

        extract_group(&regex, &text, rule.group).ok_or_else(|| EngineError::RegexMismatch {
            address: ctx.address.to_string(),
            value: text,
            pattern: rule.pattern.clone(),
            group: rule.group,
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

    const MAPPING: &str = r#"
compute_resource:
  google_compute_instance:
    paths: .x
    properties:
      name:
        - paths: .name
"#;

    fn extract_with(pattern: &str, value: &str) -> Result<String> {
        let doc = document(MAPPING);
        let data = DataStore::new(None);
        let config = Config::default();
        let plan = json!({});
        let resource = json!({});
        let resolver = Resolver::new(&plan, &doc, &data, &config);
        let ctx = EvaluationContext::new(
            &resource,
            MappingScope::from(resource_mapping(&doc, "google_compute_instance")),
            "google_compute_instance.vm",
            "google_compute_instance",
            "gcp",
        );
        let rule = RegexRule {
            pattern: pattern.to_string(),
            group: 1,
        };
        resolver.extract(&Value::String(value.to_string()), &rule, &ctx)
    }

    #[test]
    fn test_invalid_pattern_names_resource_type() {
        match extract_with("custom-([0-9+", "custom-4-8192") {
            Err(EngineError::InvalidMapping { resource_type, .. }) => {
                assert_eq!(resource_type, "google_compute_instance");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mismatch_is_error() {
        assert_eq!(extract_with(r"custom-(\d+)", "custom-4-8192").unwrap(), "4");
        assert!(matches!(
            extract_with(r"custom-(\d+)", "n1-standard-4"),
            Err(EngineError::RegexMismatch { .. })
        ));
    }

    #[test]
    fn test_extracts_group() {
        let re = Regex::new(r"^db-custom-(\d+)-(\d+)$").unwrap();
        assert_eq!(extract_group(&re, "db-custom-4-15360", 1).as_deref(), Some("4"));
        assert_eq!(extract_group(&re, "db-custom-4-15360", 2).as_deref(), Some("15360"));
    }

    #[test]
    fn test_no_match_is_none() {
        let re = Regex::new(r"^db-custom-(\d+)-(\d+)$").unwrap();
        assert_eq!(extract_group(&re, "db-f1-micro", 1), None);
    }

    #[test]
    fn test_missing_group_is_none_not_empty() {
        let re = Regex::new(r"^(a)|(b)$").unwrap();
        assert_eq!(extract_group(&re, "b", 1), None);
        assert_eq!(extract_group(&re, "b", 5), None);
    }
}
