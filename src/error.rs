//! Engine errors
//!
//! Configuration errors (broken mapping declarations, missing reference data,
//! unknown units) abort a run. Everything else is scoped to one resource
//! instance and is collected by the driver as an unresolved resource.

use crate::query::QueryError;
use std::path::PathBuf;

/// Value had a different shape than the consumer required
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct TypeMismatch {
    pub expected: &'static str,
    pub found: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to read mapping declaration {path}: {source}")]
    MappingIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed mapping declaration {origin}: {message}")]
    MalformedMapping { origin: String, message: String },

    #[error("invalid mapping for {resource_type}: {message}")]
    InvalidMapping {
        resource_type: String,
        message: String,
    },

    #[error("no mapping declarations found for provider '{0}'")]
    UnknownProvider(String),

    #[error("reference data file '{0}' not found")]
    MissingDataFile(String),

    #[error("reference data file '{name}' is malformed: {message}")]
    MalformedDataFile { name: String, message: String },

    #[error("{address}: unknown unit '{unit}' for property {property}")]
    UnknownUnit {
        address: String,
        property: String,
        unit: String,
    },

    #[error("duplicate resource address {0}")]
    DuplicateAddress(String),

    #[error("{address}: property {property} is ambiguous, `{query}` yielded {count} values")]
    Ambiguous {
        address: String,
        property: String,
        query: String,
        count: usize,
    },

    #[error("{address}: value '{value}' does not match pattern `{pattern}` (group {group})")]
    RegexMismatch {
        address: String,
        value: String,
        pattern: String,
        group: usize,
    },

    #[error("{address}: validator `{validator}` rejected value {value}: {source}")]
    Validation {
        address: String,
        validator: String,
        value: String,
        source: QueryError,
    },

    #[error("{address}: query `{query}` failed: {source}")]
    Query {
        address: String,
        query: String,
        source: QueryError,
    },

    #[error("{address}: property {property}: {source}")]
    TypeMismatch {
        address: String,
        property: String,
        source: TypeMismatch,
    },

    #[error("{address}: cyclic resolution ({chain})")]
    CyclicResolution { address: String, chain: String },
}

impl EngineError {
    /// Fatal errors indicate a broken deployment and abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MappingIo { .. }
                | Self::MalformedMapping { .. }
                | Self::InvalidMapping { .. }
                | Self::UnknownProvider(_)
                | Self::MissingDataFile(_)
                | Self::MalformedDataFile { .. }
                | Self::UnknownUnit { .. }
                | Self::DuplicateAddress(_)
        )
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
