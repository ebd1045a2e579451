//! Placeholder expansion
//!
//! `${this.<path>}` reads the current subtree, `${config.<key>}` reads a
//! numeric setting, anything else is a named variable of the current mapping
//! (falling back to the resource-level mapping from inside list items).
//! Placeholders that resolve to nothing expand to [`UNRESOLVED_PLACEHOLDER`]
//! so the surrounding query simply matches nothing.

use super::context::EvaluationContext;
use super::value::{format_number, Value};
use super::{Resolver, MAX_RESOLUTION_DEPTH};
use crate::error::{EngineError, Result};
use crate::query;
use serde_json::Value as Json;
use std::cell::RefCell;

/// Substituted for placeholders that resolve to nothing
pub const UNRESOLVED_PLACEHOLDER: &str = "__unresolved__";

/// Placeholder name bound to the raw value in plan reference paths (`${key}`)
pub const KEY_TOKEN: &str = "key";

const THIS_PREFIX: &str = "this.";
const CONFIG_PREFIX: &str = "config.";

/// Pops the variable trail when a lookup finishes, including on error
struct TrailGuard<'r> {
    trail: &'r RefCell<Vec<String>>,
}

impl Drop for TrailGuard<'_> {
    fn drop(&mut self) {
        self.trail.borrow_mut().pop();
    }
}

impl<'a> Resolver<'a> {
    /// Expand every `${...}` token of a path template
    pub fn expand(&self, template: &str, ctx: &EvaluationContext<'_>) -> Result<String> {
        self.expand_with_key(template, None, ctx)
    }

    /// Like [`Resolver::expand`], with `${key}` bound to `key` when given.
    ///
    /// Text substituted inside a `"..."` literal is JSON-escaped, so values
    /// such as `workers["blue"]` stay one string.
    pub(super) fn expand_with_key(
        &self,
        template: &str,
        key: Option<&str>,
        ctx: &EvaluationContext<'_>,
    ) -> Result<String> {
        let mut expanded = String::with_capacity(template.len());
        let mut rest = template;
        let mut in_string = false;

        while let Some(start) = rest.find("${") {
            let body = &rest[start + 2..];
            let Some(end) = body.find('}') else {
                break;
            };
            let literal = &rest[..start];
            in_string = string_state_after(literal, in_string);
            expanded.push_str(literal);

            let token = body[..end].trim();
            let text = match key {
                Some(key) if token == KEY_TOKEN => Some(key.to_string()),
                _ => self.placeholder(token, ctx)?,
            };
            match text {
                Some(text) if in_string => push_escaped(&mut expanded, text),
                Some(text) => expanded.push_str(&text),
                None => {
                    tracing::debug!("{}: placeholder ${{{}}} is unresolved", ctx.address, token);
                    expanded.push_str(UNRESOLVED_PLACEHOLDER);
                }
            }
            rest = &body[end + 1..];
        }

        expanded.push_str(rest);
        Ok(expanded)
    }

    fn placeholder(&self, token: &str, ctx: &EvaluationContext<'_>) -> Result<Option<String>> {
        if let Some(path) = token.strip_prefix(THIS_PREFIX) {
            let query = format!(".{}", path);
            let matches: Vec<_> = query::evaluate(&query, ctx.resource)
                .map_err(|source| EngineError::Query {
                    address: ctx.address.to_string(),
                    query: query.clone(),
                    source,
                })?
                .into_iter()
                .filter(|v| !v.is_null())
                .collect();

            return match matches.len() {
                0 => Ok(None),
                1 => Ok(Some(Value::from(&matches[0]).to_text())),
                count => Err(EngineError::Ambiguous {
                    address: ctx.address.to_string(),
                    property: format!("${{{}}}", token),
                    query,
                    count,
                }),
            };
        }

        if let Some(key) = token.strip_prefix(CONFIG_PREFIX) {
            return Ok(self.config.numeric(key).map(format_number));
        }

        Ok(self.resolve_variable(ctx, token)?.map(|v| v.to_text()))
    }

    /// Resolve a named variable, locally first, then from the resource-level mapping
    pub fn resolve_variable(&self, ctx: &EvaluationContext<'_>, name: &str) -> Result<Option<Value>> {
        let (owner, defs) = match ctx.scope.variables.get(name) {
            Some(defs) => (ctx, defs),
            None => {
                let root = ctx.root();
                match root.scope.variables.get(name) {
                    Some(defs) => (root, defs),
                    None => return Ok(None),
                }
            }
        };

        let _guard = self.enter(owner, name)?;
        Ok(self.resolve_definitions(owner, name, defs)?.map(|v| v.value))
    }

    fn enter(&self, ctx: &EvaluationContext<'_>, name: &str) -> Result<TrailGuard<'_>> {
        let key = format!("{}::{}", ctx.address, name);
        let mut trail = self.trail.borrow_mut();

        if trail.contains(&key) || trail.len() >= MAX_RESOLUTION_DEPTH {
            let mut chain = trail.clone();
            chain.push(key);
            return Err(EngineError::CyclicResolution {
                address: ctx.address.to_string(),
                chain: chain.join(" -> "),
            });
        }

        trail.push(key);
        Ok(TrailGuard { trail: &self.trail })
    }
}

/// Whether the text after `literal` is inside a double-quoted string
fn string_state_after(literal: &str, mut in_string: bool) -> bool {
    let mut escaped = false;
    for c in literal.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ => {}
        }
    }
    in_string
}

fn push_escaped(out: &mut String, text: String) {
    let quoted = Json::String(text).to_string();
    out.push_str(&quoted[1..quoted.len() - 1]);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{document, resource_mapping};
    use super::super::{DataStore, EvaluationContext, MappingScope, Resolver};
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    const MAPPING: &str = r#"
compute_resource:
  google_compute_instance:
    paths: .x
    variables:
      machine_type:
        - paths: .values.machine_type
      family:
        - paths: .values.machine_type
          regex: { pattern: '^([a-z0-9]+)-', group: 1 }
      loop_a:
        - paths: '.values["${loop_b}"]'
      loop_b:
        - paths: '.values["${loop_a}"]'
    properties:
      name:
        - paths: .name
"#;

    fn expand(template: &str, resource: &serde_json::Value) -> Result<String> {
        let doc = document(MAPPING);
        let data = DataStore::new(None);
        let config = Config::default();
        let plan = json!({});
        let resolver = Resolver::new(&plan, &doc, &data, &config);
        let mapping = resource_mapping(&doc, "google_compute_instance");
        let ctx = EvaluationContext::new(
            resource,
            MappingScope::from(mapping),
            "google_compute_instance.vm",
            "google_compute_instance",
            "gcp",
        );
        resolver.expand(template, &ctx)
    }

    #[test]
    fn test_this_placeholder() {
        let resource = json!({"values": {"zone": "us-central1-a"}});
        assert_eq!(
            expand(r#"all_select("zone"; "${this.values.zone}")"#, &resource).unwrap(),
            r#"all_select("zone"; "us-central1-a")"#
        );
    }

    #[test]
    fn test_values_inside_string_literals_are_escaped() {
        let resource = json!({"address": r#"google_compute_instance.vm["blue"]"#});
        assert_eq!(
            expand(r#"all_select("address"; "${this.address}")"#, &resource).unwrap(),
            r#"all_select("address"; "google_compute_instance.vm[\"blue\"]")"#
        );
        assert_eq!(
            expand(r#".a["x\"y"] | ${this.address}"#, &resource).unwrap(),
            r#".a["x\"y"] | google_compute_instance.vm["blue"]"#
        );
    }

    #[test]
    fn test_escaped_query_still_parses() {
        let resource = json!({"address": r#"google_compute_instance.vm["blue"]"#});
        let query = expand(r#"all_select("address"; "${this.address}") | .address"#, &resource).unwrap();
        assert_eq!(
            crate::query::evaluate(&query, &resource).unwrap(),
            vec![json!(r#"google_compute_instance.vm["blue"]"#)]
        );
    }

    #[test]
    fn test_config_placeholder() {
        let resource = json!({});
        assert_eq!(
            expand("${config.providers.gcp.avg_cpu_use}", &resource).unwrap(),
            "0.5"
        );
    }

    #[test]
    fn test_variable_placeholder_runs_pipeline() {
        let resource = json!({"values": {"machine_type": "n2-standard-4"}});
        assert_eq!(
            expand(".families[\"${family}\"]", &resource).unwrap(),
            ".families[\"n2\"]"
        );
        assert_eq!(
            expand("${ machine_type }", &resource).unwrap(),
            "n2-standard-4"
        );
    }

    #[test]
    fn test_unresolved_placeholders_use_sentinel() {
        let resource = json!({"values": {}});
        assert_eq!(
            expand("${this.values.zone}/${unknown}/${config.nope}", &resource).unwrap(),
            format!(
                "{}/{}/{}",
                UNRESOLVED_PLACEHOLDER, UNRESOLVED_PLACEHOLDER, UNRESOLVED_PLACEHOLDER
            )
        );
    }

    #[test]
    fn test_unterminated_placeholder_left_verbatim() {
        let resource = json!({});
        assert_eq!(expand(".a${oops", &resource).unwrap(), ".a${oops");
    }

    #[test]
    fn test_ambiguous_this_placeholder() {
        let resource = json!({"values": {"disks": [{"id": 1}, {"id": 2}]}});
        assert!(matches!(
            expand("${this.values.disks[].id}", &resource),
            Err(EngineError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_cyclic_variables_are_detected() {
        let resource = json!({"values": {}});
        let err = expand("${loop_a}", &resource).unwrap_err();
        match err {
            EngineError::CyclicResolution { chain, .. } => {
                assert!(chain.contains("loop_a"));
                assert!(chain.contains("loop_b"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
