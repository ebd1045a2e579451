//! Resource extraction driver
//!
//! Enumerates the instances of every mapped resource type in a plan, resolves
//! their identification and specs, and adds an identification-only record
//! for every other planned resource that is not ignored.

mod spec;
mod strategy;
mod units;

pub use spec::{
    DiskClass, Extraction, NormalizedResourceSpec, ResourceIdentification, ResourceSpecs,
    UnresolvedResource,
};
pub use strategy::{properties, MappedSpecExtractor, SpecExtractor, SpecExtractors};
pub use units::DataUnit;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::mapping::{MappingDocument, ResourceMapping};
use crate::query;
use crate::resolve::{DataStore, EvaluationContext, MappingScope, Resolver, Value};
use properties::*;
use serde_json::Value as Json;
use std::collections::HashSet;
use strategy::{number, text};

/// Extract every resource of a plan with the default strategies
pub fn extract_all(
    plan: &Json,
    mapping: &MappingDocument,
    data: &DataStore,
    config: &Config,
) -> Result<Extraction> {
    Driver::new(plan, mapping, data, config, &SpecExtractors::default()).run()
}

pub struct Driver<'a> {
    resolver: Resolver<'a>,
    extractors: &'a SpecExtractors,
    extraction: Extraction,
    seen: HashSet<String>,
}

impl<'a> Driver<'a> {
    pub fn new(
        plan: &'a Json,
        mapping: &'a MappingDocument,
        data: &'a DataStore,
        config: &'a Config,
        extractors: &'a SpecExtractors,
    ) -> Self {
        Self {
            resolver: Resolver::new(plan, mapping, data, config),
            extractors,
            extraction: Extraction::default(),
            seen: HashSet::new(),
        }
    }

    /// Fatal errors abort the run, per-instance errors end up in `unresolved`
    pub fn run(mut self) -> Result<Extraction> {
        let mapping = self.resolver.mapping();

        for (resource_type, resource_mapping) in &mapping.resources {
            if mapping.is_ignored(resource_type) {
                tracing::debug!("skipping ignored mapped type {}", resource_type);
                continue;
            }
            self.extract_type(resource_type, resource_mapping)?;
        }

        self.collect_unsupported();

        tracing::info!(
            "extracted {} resources ({} supported), {} unresolved",
            self.extraction.resources.len(),
            self.extraction.supported().count(),
            self.extraction.unresolved.len()
        );
        Ok(self.extraction)
    }

    fn extract_type(&mut self, resource_type: &str, resource_mapping: &ResourceMapping) -> Result<()> {
        let plan = self.resolver.plan();

        for template in &resource_mapping.paths {
            let instances = query::evaluate(template, plan).map_err(|e| EngineError::InvalidMapping {
                resource_type: resource_type.to_string(),
                message: format!("instance path `{}` failed: {}", template, e),
            })?;

            let instances: Vec<&Json> = instances
                .iter()
                .flat_map(|matched| match matched {
                    Json::Array(elements) => elements.iter().collect(),
                    Json::Null => Vec::new(),
                    other => vec![other],
                })
                .collect();
            tracing::debug!("{}: {} instances via `{}`", resource_type, instances.len(), template);

            for instance in instances {
                let address = instance_address(instance, resource_type);
                if !self.seen.insert(address.clone()) {
                    return Err(EngineError::DuplicateAddress(address));
                }

                match self.extract_instance(instance, &address, resource_type, resource_mapping) {
                    Ok(spec) => {
                        self.extraction.resources.insert(address, spec);
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::warn!("unresolved {}: {}", address, e);
                        self.extraction.unresolved.push(UnresolvedResource {
                            address,
                            resource_type: resource_type.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn extract_instance(
        &self,
        instance: &Json,
        address: &str,
        resource_type: &str,
        resource_mapping: &ResourceMapping,
    ) -> Result<NormalizedResourceSpec> {
        let resolver = &self.resolver;
        let provider = resolver.mapping().provider.as_str();
        let ctx = EvaluationContext::new(
            instance,
            MappingScope::from(resource_mapping),
            address,
            resource_type,
            provider,
        );

        let name = match text(&ctx, resolver, NAME)? {
            Some(name) => name,
            None => instance_name(instance, address),
        };
        let region = match text(&ctx, resolver, REGION)? {
            Some(region) => Some(region),
            None => text(&ctx, resolver, ZONE)?.map(|zone| region_from_zone(&zone)),
        };
        let index = match resolver.resolve_scalar_property(&ctx, INDEX)? {
            Some(index) => Some(index.value.to_json()),
            None => instance.get("index").filter(|i| !i.is_null()).cloned(),
        };
        let count = number(&ctx, resolver, COUNT)?
            .map(|n| n.max(0.0).round() as u32)
            .unwrap_or(1);
        let replication_factor = replication_factor(&ctx, resolver)?;

        let specs = self
            .extractors
            .for_type(resource_type)
            .extract_specs(&ctx, resolver)?;

        Ok(NormalizedResourceSpec {
            identification: ResourceIdentification {
                name,
                resource_type: resource_type.to_string(),
                provider: provider.to_string(),
                region,
                address: address.to_string(),
                index,
                count,
                replication_factor,
            },
            specs: Some(specs),
        })
    }

    /// Planned resources no mapping matched, minus data sources and ignored types
    fn collect_unsupported(&mut self) {
        let mapping = self.resolver.mapping();
        let Some(root) = self.resolver.plan().pointer("/planned_values/root_module") else {
            return;
        };

        let mut modules = vec![root];
        while let Some(module) = modules.pop() {
            if let Some(children) = module.get("child_modules").and_then(Json::as_array) {
                modules.extend(children);
            }

            for resource in module
                .get("resources")
                .and_then(Json::as_array)
                .into_iter()
                .flatten()
            {
                if resource.get("mode").and_then(Json::as_str) == Some("data") {
                    continue;
                }
                let resource_type = resource
                    .get("type")
                    .and_then(Json::as_str)
                    .unwrap_or_default();
                if mapping.is_ignored(resource_type) {
                    continue;
                }
                let address = instance_address(resource, resource_type);
                if !self.seen.insert(address.clone()) {
                    continue;
                }

                tracing::debug!("unsupported resource {}", address);
                let spec = unsupported(resource, &address, resource_type, &mapping.provider);
                self.extraction.resources.insert(address, spec);
            }
        }
    }
}

fn unsupported(resource: &Json, address: &str, resource_type: &str, provider: &str) -> NormalizedResourceSpec {
    let values = resource.get("values");
    let attribute = |key: &str| {
        values
            .and_then(|v| v.get(key))
            .and_then(Json::as_str)
            .map(str::to_string)
    };
    let region = attribute("region").or_else(|| attribute("zone").map(|zone| region_from_zone(&zone)));

    NormalizedResourceSpec {
        identification: ResourceIdentification {
            name: instance_name(resource, address),
            resource_type: resource_type.to_string(),
            provider: provider.to_string(),
            region,
            address: address.to_string(),
            index: resource.get("index").filter(|i| !i.is_null()).cloned(),
            count: 1,
            replication_factor: 1,
        },
        specs: None,
    }
}

/// Plan address, or `<type>.<name>` for instances without one
fn instance_address(instance: &Json, resource_type: &str) -> String {
    if let Some(address) = instance.get("address").and_then(Json::as_str) {
        return address.to_string();
    }
    let name = instance
        .get("name")
        .and_then(Json::as_str)
        .unwrap_or("unnamed");
    format!("{}.{}", resource_type, name)
}

fn instance_name(instance: &Json, address: &str) -> String {
    instance
        .get("name")
        .and_then(Json::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| address.rsplit('.').next().unwrap_or(address).to_string())
}

/// `us-central1-a` (or a zone URL) -> `us-central1`
fn region_from_zone(zone: &str) -> String {
    let zone = extract_short_name(zone);
    let parts: Vec<&str> = zone.rsplitn(2, '-').collect();
    if parts.len() == 2 {
        parts[1].to_string()
    } else {
        zone.to_string()
    }
}

fn extract_short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Number of zones a resource is replicated to, at least 1
fn replication_factor(ctx: &EvaluationContext<'_>, resolver: &Resolver<'_>) -> Result<u32> {
    let factor = match resolver.resolve_scalar_property(ctx, REPLICATION_FACTOR)? {
        None => 1,
        Some(resolved) => match &resolved.value {
            Value::List(zones) => zones.len() as u32,
            other => other
                .as_f64()
                .map_err(|e| strategy::mismatch(ctx, REPLICATION_FACTOR, e))?
                .round() as u32,
        },
    };
    Ok(factor.max(1))
}
