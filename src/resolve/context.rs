//! Evaluation contexts
//!
//! A context is created per resource instance and per nested list item. It
//! is never mutated: descending into an item builds a child that points back
//! at its parent, which is how variable lookups escape item scopes.

use crate::mapping::{Definitions, ItemMapping, ResourceMapping};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Properties and variables visible from a context
#[derive(Debug, Clone, Copy)]
pub struct MappingScope<'a> {
    pub properties: &'a BTreeMap<String, Definitions>,
    pub variables: &'a BTreeMap<String, Definitions>,
}

impl<'a> From<&'a ResourceMapping> for MappingScope<'a> {
    fn from(mapping: &'a ResourceMapping) -> Self {
        Self {
            properties: &mapping.properties,
            variables: &mapping.variables,
        }
    }
}

impl<'a> From<&'a ItemMapping> for MappingScope<'a> {
    fn from(item: &'a ItemMapping) -> Self {
        Self {
            properties: &item.properties,
            variables: &item.variables,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// JSON subtree of the resource, or of the list item
    pub resource: &'a Json,
    pub scope: MappingScope<'a>,
    pub address: &'a str,
    pub resource_type: &'a str,
    pub provider: &'a str,
    parent: Option<&'a EvaluationContext<'a>>,
    depth: usize,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        resource: &'a Json,
        scope: MappingScope<'a>,
        address: &'a str,
        resource_type: &'a str,
        provider: &'a str,
    ) -> Self {
        Self {
            resource,
            scope,
            address,
            resource_type,
            provider,
            parent: None,
            depth: 0,
        }
    }

    /// Child context for one element of a list-valued property
    pub fn descend(&'a self, item: &'a Json, scope: MappingScope<'a>) -> EvaluationContext<'a> {
        EvaluationContext {
            resource: item,
            scope,
            address: self.address,
            resource_type: self.resource_type,
            provider: self.provider,
            parent: Some(self),
            depth: self.depth + 1,
        }
    }

    /// The resource-level context this one descends from
    pub fn root(&self) -> &EvaluationContext<'a> {
        let mut current = self;
        while let Some(parent) = current.parent {
            current = parent;
        }
        current
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
