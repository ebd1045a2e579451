//! Property resolution
//!
//! A [`Resolver`] evaluates mapping definitions against one plan document.
//! Each property definition runs through a fixed pipeline:
//!
//! ```text
//! paths (placeholders expanded) ──▶ regex ──▶ reference ──▶ validator
//!          │ no value
//!          └──▶ default ──▶ regex ──▶ reference ──▶ validator
//! ```
//!
//! - [`placeholder`] - `${this.*}`, `${config.*}` and named variables
//! - [`reference`] - static tables, disk taxonomy, plan lookups
//! - [`pattern`] - regex capture extraction
//! - [`validator`] - query-based post-conditions
//! - [`property`] - scalar and list-valued property resolution

mod context;
mod data;
mod pattern;
mod placeholder;
mod property;
mod reference;
mod validator;
mod value;

pub use context::{EvaluationContext, MappingScope};
pub use data::DataStore;
pub use pattern::extract_group;
pub use placeholder::{KEY_TOKEN, UNRESOLVED_PLACEHOLDER};
pub use property::{ItemRecord, PropertyValue};
pub use value::{format_number, Value, ValueWithUnit};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::mapping::MappingDocument;
use crate::query;
use regex::Regex;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::collections::HashMap;

/// Maximum nesting of variable lookups and list items
pub const MAX_RESOLUTION_DEPTH: usize = 16;

/// Resolution session over one plan document
///
/// Holds the read-only inputs plus two per-run caches: compiled regexes and
/// the trail of variables currently being resolved.
pub struct Resolver<'a> {
    plan: &'a Json,
    mapping: &'a MappingDocument,
    data: &'a DataStore,
    config: &'a Config,
    regexes: RefCell<HashMap<String, Regex>>,
    trail: RefCell<Vec<String>>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        plan: &'a Json,
        mapping: &'a MappingDocument,
        data: &'a DataStore,
        config: &'a Config,
    ) -> Self {
        Self {
            plan,
            mapping,
            data,
            config,
            regexes: RefCell::new(HashMap::new()),
            trail: RefCell::new(Vec::new()),
        }
    }

    pub fn plan(&self) -> &'a Json {
        self.plan
    }

    pub fn mapping(&self) -> &'a MappingDocument {
        self.mapping
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Evaluate a query from a context, routed to the plan root when needed
    pub fn query(&self, ctx: &EvaluationContext<'_>, query: &str) -> Result<Vec<Json>> {
        query::evaluate_routed(query, ctx.resource, self.plan).map_err(|source| {
            EngineError::Query {
                address: ctx.address.to_string(),
                query: query.to_string(),
                source,
            }
        })
    }

    fn regex(&self, pattern: &str, ctx: &EvaluationContext<'_>) -> Result<Regex> {
        if let Some(regex) = self.regexes.borrow().get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern).map_err(|e| EngineError::InvalidMapping {
            resource_type: ctx.resource_type.to_string(),
            message: format!("invalid pattern `{}`: {}", pattern, e),
        })?;
        self.regexes
            .borrow_mut()
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::mapping::ResourceMapping;

    /// Mapping document with one resource type built from a YAML body
    pub fn document(yaml: &str) -> MappingDocument {
        MappingDocument::from_sources("gcp", [("test.yaml", yaml)]).unwrap()
    }

    pub fn resource_mapping<'d>(document: &'d MappingDocument, resource_type: &str) -> &'d ResourceMapping {
        document.resource(resource_type).unwrap()
    }
}
