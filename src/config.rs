//! Configuration Management
//!
//! Handles persistent configuration for planspec. Numeric engine assumptions
//! stored here are readable from mapping declarations via `${config.<key>}`.

use crate::extract::DiskClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Assumptions used by downstream estimation, per provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Average CPU utilization ratio
    #[serde(default = "default_utilization")]
    pub avg_cpu_use: f64,
    /// Average GPU utilization ratio
    #[serde(default = "default_utilization")]
    pub avg_gpu_use: f64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            avg_cpu_use: default_utilization(),
            avg_gpu_use: default_utilization(),
        }
    }
}

fn default_utilization() -> f64 {
    0.5
}

fn default_provider() -> String {
    "gcp".to_string()
}

fn default_providers() -> BTreeMap<String, ProviderSettings> {
    BTreeMap::from([("gcp".to_string(), ProviderSettings::default())])
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider used when none is given on the command line
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Extra mapping declarations, `<dir>/<provider>/*.yaml`
    #[serde(default)]
    pub mappings_dir: Option<PathBuf>,
    /// Reference data files shadowing the embedded ones
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Storage class used when a disk type is unknown and the taxonomy has no default
    #[serde(default)]
    pub fallback_disk_class: DiskClass,
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            mappings_dir: None,
            data_dir: None,
            fallback_disk_class: DiskClass::default(),
            providers: default_providers(),
        }
    }
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("planspec").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Read a numeric setting by dotted key, e.g. `providers.gcp.avg_cpu_use`
    pub fn numeric(&self, key: &str) -> Option<f64> {
        let tree = serde_json::to_value(self).ok()?;
        let mut current = &tree;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        current.as_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider, "gcp");
        assert_eq!(config.fallback_disk_class, DiskClass::Ssd);
    }

    #[test]
    fn test_numeric_lookup() {
        let config = Config::default();
        assert_eq!(config.numeric("providers.gcp.avg_cpu_use"), Some(0.5));
        assert_eq!(config.numeric("providers.aws.avg_cpu_use"), None);
        assert_eq!(config.numeric("provider"), None);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"providers": {"gcp": {"avg_cpu_use": 0.8}}}"#).unwrap();
        assert_eq!(config.numeric("providers.gcp.avg_cpu_use"), Some(0.8));
        assert_eq!(config.numeric("providers.gcp.avg_gpu_use"), Some(0.5));
        assert_eq!(config.provider, "gcp");
    }
}
