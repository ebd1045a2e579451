//! Reference resolution
//!
//! Maps a raw value to its final form with exactly one strategy:
//!
//! - `json_file` + `property`: look the value up in a static table
//! - `general`: classify a disk type through the provider taxonomy
//! - `paths` (+ `property` / `return_path`): search the plan for the value
//! - nothing: identity

use super::context::EvaluationContext;
use super::value::Value;
use super::Resolver;
use crate::error::{EngineError, Result};
use crate::mapping::{Reference, ReferenceKind};
use crate::query;
use serde_json::Value as Json;

impl<'a> Resolver<'a> {
    /// `Ok(None)` means "no value" and lets the property fall through to its default
    pub fn resolve_reference(
        &self,
        raw: Value,
        reference: &Reference,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Option<Value>> {
        match reference.kind() {
            ReferenceKind::Identity => Ok(Some(raw)),
            ReferenceKind::JsonFile { table, property } => self.lookup_table(&raw, table, property, ctx),
            ReferenceKind::General(_) => Ok(Some(Value::String(self.classify_disk(&raw.to_text())))),
            ReferenceKind::Plan {
                paths,
                property,
                return_path,
            } => self.lookup_plan(&raw, paths, property, return_path, ctx),
        }
    }

    /// Storage class of a disk type: taxonomy entry, else taxonomy default, else configured fallback
    pub fn classify_disk(&self, disk_type: &str) -> String {
        let taxonomy = &self.mapping.general.disk_types;
        taxonomy
            .types
            .get(disk_type)
            .or(taxonomy.default.as_ref())
            .cloned()
            .unwrap_or_else(|| self.config.fallback_disk_class.to_string())
    }

    fn lookup_table(
        &self,
        raw: &Value,
        table: &str,
        property: Option<&str>,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Option<Value>> {
        let file = self
            .mapping
            .general
            .json_data
            .get(table)
            .map(String::as_str)
            .unwrap_or(table);
        let data = self.data.table(file)?;
        let key = raw.to_text();

        let Some(entry) = data.get(&key) else {
            tracing::debug!("{}: '{}' not found in {}", ctx.address, key, file);
            return Ok(None);
        };

        match property {
            Some(property) => self.project(entry, property, ctx),
            None => Ok(Some(Value::from(entry))),
        }
    }

    fn lookup_plan(
        &self,
        raw: &Value,
        paths: &[String],
        property: Option<&str>,
        return_path: bool,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Option<Value>> {
        let key = raw.to_text();

        for template in paths {
            let query = self.expand_with_key(template, Some(&key), ctx)?;
            let matches: Vec<Json> = query::evaluate(&query, self.plan)
                .map_err(|source| EngineError::Query {
                    address: ctx.address.to_string(),
                    query: query.clone(),
                    source,
                })?
                .into_iter()
                .filter(|v| !v.is_null())
                .collect();

            if matches.is_empty() {
                continue;
            }
            if return_path {
                return Ok(Some(Value::String(query)));
            }

            let mut values = Vec::new();
            for matched in &matches {
                match property {
                    Some(property) => values.extend(self.project(matched, property, ctx)?),
                    None => values.push(Value::from(matched)),
                }
            }
            return Ok(match values.len() {
                0 => None,
                1 => values.pop(),
                _ => Some(Value::List(values)),
            });
        }

        tracing::debug!("{}: no plan match for '{}'", ctx.address, key);
        Ok(None)
    }

    /// Read `property` from an entry: a plain field name, or a query when it starts with `.`
    fn project(&self, entry: &Json, property: &str, ctx: &EvaluationContext<'_>) -> Result<Option<Value>> {
        if !property.starts_with('.') {
            return Ok(entry
                .get(property)
                .filter(|v| !v.is_null())
                .map(Value::from));
        }

        let matches: Vec<Value> = query::evaluate(property, entry)
            .map_err(|source| EngineError::Query {
                address: ctx.address.to_string(),
                query: property.to_string(),
                source,
            })?
            .iter()
            .filter(|v| !v.is_null())
            .map(Value::from)
            .collect();

        Ok(match matches.len() {
            0 => None,
            1 => matches.into_iter().next(),
            _ => Some(Value::List(matches)),
        })
    }
}
