//! Declarative mapping layer
//!
//! Resource extraction is driven by mapping declarations rather than code,
//! allowing new resource types to be supported without code changes.
//!
//! - [`schema`] - Serde types of the declaration format
//! - [`registry`] - Loads, merges, validates and caches declarations per provider
//!
//! Declarations for GCP are embedded from `src/resources/mappings/gcp/`.

mod registry;
pub mod schema;

pub use registry::{MappingDocument, MappingRegistry, DISK_TYPES_TAXONOMY};
pub use schema::{
    Definitions, DiskTypes, GeneralConfig, ItemMapping, PropertyDefinition, Reference,
    ReferenceKind, RegexRule, ResourceMapping,
};
