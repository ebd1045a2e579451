//! Normalized output records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Binary storage classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskClass {
    #[default]
    #[serde(rename = "SSD", alias = "ssd")]
    Ssd,
    #[serde(rename = "HDD", alias = "hdd")]
    Hdd,
}

impl fmt::Display for DiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskClass::Ssd => write!(f, "SSD"),
            DiskClass::Hdd => write!(f, "HDD"),
        }
    }
}

impl FromStr for DiskClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SSD" => Ok(DiskClass::Ssd),
            "HDD" => Ok(DiskClass::Hdd),
            other => Err(format!("unknown storage class '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceIdentification {
    pub name: String,
    pub resource_type: String,
    pub provider: String,
    pub region: Option<String>,
    /// Hierarchical address, including enclosing module names
    pub address: String,
    /// `count` / `for_each` index, when the instance has one
    pub index: Option<serde_json::Value>,
    pub count: u32,
    pub replication_factor: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceSpecs {
    pub vcpus: u32,
    pub memory_mb: f64,
    pub ssd_storage_gb: f64,
    pub hdd_storage_gb: f64,
    /// One entry per accelerator, repeated by count
    pub gpu_types: Vec<String>,
    pub cpu_platform: Option<String>,
}

impl ResourceSpecs {
    pub fn add_storage(&mut self, class: DiskClass, size_gb: f64) {
        match class {
            DiskClass::Ssd => self.ssd_storage_gb += size_gb,
            DiskClass::Hdd => self.hdd_storage_gb += size_gb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResourceSpec {
    pub identification: ResourceIdentification,
    /// `None` for resources no mapping knows how to read
    pub specs: Option<ResourceSpecs>,
}

impl NormalizedResourceSpec {
    pub fn is_supported(&self) -> bool {
        self.specs.is_some()
    }
}

/// Instance that matched a mapping but could not be resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedResource {
    pub address: String,
    pub resource_type: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    pub resources: BTreeMap<String, NormalizedResourceSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedResource>,
}

impl Extraction {
    pub fn supported(&self) -> impl Iterator<Item = &NormalizedResourceSpec> {
        self.resources.values().filter(|r| r.is_supported())
    }

    pub fn unsupported(&self) -> impl Iterator<Item = &NormalizedResourceSpec> {
        self.resources.values().filter(|r| !r.is_supported())
    }
}
