//! Spec extraction strategies
//!
//! The driver asks a [`SpecExtractors`] table for the strategy of each
//! resource type. Every type falls back to [`MappedSpecExtractor`], which
//! reads the well-known properties below from the mapping declarations.

use super::spec::{DiskClass, ResourceSpecs};
use super::units::DataUnit;
use crate::error::{EngineError, Result, TypeMismatch};
use crate::resolve::{EvaluationContext, ItemRecord, PropertyValue, Resolver, Value, ValueWithUnit};
use std::collections::HashMap;

/// Property names the extractors read
pub mod properties {
    pub const NAME: &str = "name";
    pub const REGION: &str = "region";
    pub const ZONE: &str = "zone";
    pub const INDEX: &str = "index";
    pub const COUNT: &str = "count";
    pub const REPLICATION_FACTOR: &str = "replication_factor";
    pub const VCPUS: &str = "vCPUs";
    pub const MEMORY: &str = "memory";
    pub const CPU_PLATFORM: &str = "cpu_platform";
    pub const GPUS: &str = "gpus";
    pub const GUEST_ACCELERATOR: &str = "guest_accelerator";
    pub const STORAGE: &str = "storage";

    // item properties
    pub const SIZE: &str = "size";
    pub const TYPE: &str = "type";
}

use properties::*;

pub trait SpecExtractor: Send + Sync {
    fn extract_specs(&self, ctx: &EvaluationContext<'_>, resolver: &Resolver<'_>) -> Result<ResourceSpecs>;
}

/// Reads specs from the declared mapping properties
#[derive(Debug, Default, Clone, Copy)]
pub struct MappedSpecExtractor;

impl SpecExtractor for MappedSpecExtractor {
    fn extract_specs(&self, ctx: &EvaluationContext<'_>, resolver: &Resolver<'_>) -> Result<ResourceSpecs> {
        let mut specs = ResourceSpecs {
            vcpus: number(ctx, resolver, VCPUS)?.map(|n| n.round() as u32).unwrap_or(0),
            memory_mb: memory_mb(ctx, resolver)?,
            cpu_platform: text(ctx, resolver, CPU_PLATFORM)?,
            ..ResourceSpecs::default()
        };

        for name in [GPUS, GUEST_ACCELERATOR] {
            if let Some(value) = resolver.resolve_property(ctx, name)? {
                specs.gpu_types.extend(gpu_types(ctx, name, &value)?);
            }
        }

        for disk in resolver.resolve_list_property(ctx, STORAGE)? {
            let size_gb = disk_size_gb(ctx, &disk)?;
            specs.add_storage(disk_class(resolver, &disk), size_gb);
        }

        Ok(specs)
    }
}

/// Resource type -> extraction strategy
pub struct SpecExtractors {
    strategies: HashMap<String, Box<dyn SpecExtractor>>,
    fallback: MappedSpecExtractor,
}

impl Default for SpecExtractors {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecExtractors {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
            fallback: MappedSpecExtractor,
        }
    }

    pub fn register(&mut self, resource_type: impl Into<String>, extractor: Box<dyn SpecExtractor>) {
        self.strategies.insert(resource_type.into(), extractor);
    }

    pub fn for_type(&self, resource_type: &str) -> &dyn SpecExtractor {
        match self.strategies.get(resource_type) {
            Some(extractor) => extractor.as_ref(),
            None => &self.fallback,
        }
    }
}

pub(crate) fn mismatch(ctx: &EvaluationContext<'_>, property: &str, source: TypeMismatch) -> EngineError {
    EngineError::TypeMismatch {
        address: ctx.address.to_string(),
        property: property.to_string(),
        source,
    }
}

pub(crate) fn number(ctx: &EvaluationContext<'_>, resolver: &Resolver<'_>, name: &str) -> Result<Option<f64>> {
    resolver
        .resolve_scalar_property(ctx, name)?
        .map(|v| v.value.as_f64().map_err(|e| mismatch(ctx, name, e)))
        .transpose()
}

pub(crate) fn text(ctx: &EvaluationContext<'_>, resolver: &Resolver<'_>, name: &str) -> Result<Option<String>> {
    Ok(resolver
        .resolve_scalar_property(ctx, name)?
        .map(|v| v.value.to_text()))
}

/// Unit a property declared; a missing or unknown unit is a configuration error
fn declared_unit(ctx: &EvaluationContext<'_>, name: &str, value: &ValueWithUnit) -> Result<DataUnit> {
    let unit = value.unit.as_deref().unwrap_or_default();
    unit.parse().map_err(|_| EngineError::UnknownUnit {
        address: ctx.address.to_string(),
        property: name.to_string(),
        unit: unit.to_string(),
    })
}

fn memory_mb(ctx: &EvaluationContext<'_>, resolver: &Resolver<'_>) -> Result<f64> {
    let Some(memory) = resolver.resolve_scalar_property(ctx, MEMORY)? else {
        return Ok(0.0);
    };
    let unit = declared_unit(ctx, MEMORY, &memory)?;
    let amount = memory.value.as_f64().map_err(|e| mismatch(ctx, MEMORY, e))?;
    Ok(unit.to_megabytes(amount))
}

/// Accelerators as a flat multiset: `{type: T, count: N}` becomes N entries of T
fn gpu_types(ctx: &EvaluationContext<'_>, name: &str, value: &PropertyValue) -> Result<Vec<String>> {
    let mut types = Vec::new();
    match value {
        PropertyValue::Scalar(scalar) => match &scalar.value {
            Value::List(entries) => types.extend(
                entries
                    .iter()
                    .filter(|e| **e != Value::Null)
                    .map(Value::to_text),
            ),
            Value::Null => {}
            other => types.push(other.to_text()),
        },
        PropertyValue::List(items) => {
            for item in items {
                let Some(kind) = item.scalar(TYPE) else {
                    continue;
                };
                let count = match item.scalar(COUNT) {
                    Some(count) => count.value.as_f64().map_err(|e| mismatch(ctx, name, e))?,
                    None => 1.0,
                };
                let kind = kind.value.to_text();
                types.extend(std::iter::repeat(kind).take(count.max(0.0).round() as usize));
            }
        }
    }
    Ok(types)
}

/// Disk size in gigabytes; a size without unit is already in gigabytes
fn disk_size_gb(ctx: &EvaluationContext<'_>, disk: &ItemRecord) -> Result<f64> {
    let Some(size) = disk.scalar(SIZE) else {
        return Ok(0.0);
    };
    let amount = size.value.as_f64().map_err(|e| mismatch(ctx, STORAGE, e))?;
    let unit = match size.unit {
        Some(_) => declared_unit(ctx, STORAGE, size)?,
        None => DataUnit::GB,
    };
    Ok(unit.to_gigabytes(amount))
}

/// Storage class of a disk item, classifying raw disk types through the taxonomy
fn disk_class(resolver: &Resolver<'_>, disk: &ItemRecord) -> DiskClass {
    let fallback = resolver.config().fallback_disk_class;
    let Some(kind) = disk.scalar(TYPE) else {
        return fallback;
    };
    let kind = kind.value.to_text();
    kind.parse::<DiskClass>()
        .or_else(|_| resolver.classify_disk(&kind).parse())
        .unwrap_or(fallback)
}
