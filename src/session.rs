//! Extraction session
//!
//! Owns everything that outlives a single plan: configuration, the mapping
//! registry and the reference data tables. Both caches are filled lazily and
//! shared by every extraction run through the session.

use crate::config::Config;
use crate::error::Result;
use crate::extract::{Driver, Extraction, SpecExtractors};
use crate::mapping::{MappingDocument, MappingRegistry};
use crate::resolve::DataStore;
use serde_json::Value;
use std::sync::Arc;

pub struct Session {
    config: Config,
    registry: MappingRegistry,
    data: DataStore,
    extractors: SpecExtractors,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            registry: MappingRegistry::new(config.mappings_dir.clone()),
            data: DataStore::new(config.data_dir.clone()),
            extractors: SpecExtractors::default(),
            config,
        }
    }

    /// Replace the spec extraction strategies
    pub fn with_extractors(mut self, extractors: SpecExtractors) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mapping(&self, provider: &str) -> Result<Arc<MappingDocument>> {
        self.registry.load(provider)
    }

    /// Extract every resource of a plan document
    pub fn extract(&self, plan: &Value, provider: &str) -> Result<Extraction> {
        let mapping = self.registry.load(provider)?;
        tracing::info!("extracting {} plan with {} mapped types", provider, mapping.resources.len());
        Driver::new(plan, &mapping, &self.data, &self.config, &self.extractors).run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use serde_json::json;

    #[test]
    fn test_unknown_provider_is_fatal() {
        let session = Session::new(Config::default());
        let err = session.extract(&json!({}), "nowhere").unwrap_err();
        assert!(matches!(err, EngineError::UnknownProvider(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_plan_yields_nothing() {
        let session = Session::new(Config::default());
        let extraction = session.extract(&json!({}), "gcp").unwrap();
        assert!(extraction.resources.is_empty());
        assert!(extraction.unresolved.is_empty());
    }
}
