//! Mapping declaration schema
//!
//! Declarations are YAML documents of the form
//!
//! ```yaml
//! general:
//!   disk_types: { default: SSD, types: { pd-standard: HDD } }
//!   json_data: { machine_types: gcp_machine_types.json }
//!   ignored_resources: [google_project_service]
//! compute_resource:
//!   google_compute_disk:
//!     paths: '.planned_values | all_select("type"; "google_compute_disk")'
//!     properties:
//!       storage:
//!         - item:
//!             - paths: .values
//!               properties:
//!                 size: [{ paths: .size, unit: gb }]
//! ```

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Definitions for one property, tried in order
pub type Definitions = Vec<PropertyDefinition>;

/// Accept either a single string or a list of strings
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(path) => vec![path],
        OneOrMany::Many(paths) => paths,
    })
}

/// One declaration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingFile {
    #[serde(default)]
    pub general: Option<GeneralConfig>,
    #[serde(default)]
    pub compute_resource: BTreeMap<String, ResourceMapping>,
}

/// Provider-wide settings shared by every resource mapping
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default)]
    pub disk_types: DiskTypes,
    /// Logical table name -> reference data file name
    #[serde(default)]
    pub json_data: BTreeMap<String, String>,
    /// Resource types dropped from the output (exact names or regexes)
    #[serde(default)]
    pub ignored_resources: Vec<String>,
}

impl GeneralConfig {
    /// Union with a later file: entries of `other` win key by key
    pub fn merge(&mut self, other: GeneralConfig) {
        if other.disk_types.default.is_some() {
            self.disk_types.default = other.disk_types.default;
        }
        self.disk_types.types.extend(other.disk_types.types);
        self.json_data.extend(other.json_data);
        for pattern in other.ignored_resources {
            if !self.ignored_resources.contains(&pattern) {
                self.ignored_resources.push(pattern);
            }
        }
    }
}

/// Disk-type taxonomy: provider disk type -> storage class
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskTypes {
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub types: BTreeMap<String, String>,
}

/// How to find and read one resource type
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceMapping {
    /// Queries enumerating instances of this type in the plan
    #[serde(deserialize_with = "one_or_many")]
    pub paths: Vec<String>,
    /// Named values usable as `${name}` placeholders
    #[serde(default)]
    pub variables: BTreeMap<String, Definitions>,
    #[serde(default)]
    pub properties: BTreeMap<String, Definitions>,
}

/// One way of resolving a property
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyDefinition {
    #[serde(default, deserialize_with = "one_or_many")]
    pub paths: Vec<String>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Used only when no path yields a value
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub reference: Option<Reference>,
    #[serde(default)]
    pub regex: Option<RegexRule>,
    /// Query run with the resolved value as input; an evaluation error rejects it
    #[serde(default)]
    pub validator: Option<String>,
    /// Shape of each element when the property is list-valued
    #[serde(default)]
    pub item: Vec<ItemMapping>,
}

impl PropertyDefinition {
    pub fn is_list(&self) -> bool {
        !self.item.is_empty()
    }
}

/// Nested mapping describing one element of a list-valued property
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemMapping {
    #[serde(deserialize_with = "one_or_many")]
    pub paths: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, Definitions>,
    #[serde(default)]
    pub properties: BTreeMap<String, Definitions>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegexRule {
    pub pattern: String,
    #[serde(default = "default_group")]
    pub group: usize,
}

fn default_group() -> usize {
    1
}

/// Post-processing of a raw value; at most one strategy may be populated
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    /// Logical name of a table declared in `general.json_data`
    #[serde(default)]
    pub json_file: Option<String>,
    /// Field (or `.query`) projected from the looked-up entry or plan match
    #[serde(default)]
    pub property: Option<String>,
    /// Provider taxonomy name, only `disk_types` is known
    #[serde(default)]
    pub general: Option<String>,
    /// Plan queries where `${key}` is replaced by the raw value
    #[serde(default, deserialize_with = "one_or_many")]
    pub paths: Vec<String>,
    #[serde(default)]
    pub return_path: bool,
}

/// The populated strategy of a [`Reference`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceKind<'a> {
    JsonFile {
        table: &'a str,
        property: Option<&'a str>,
    },
    General(&'a str),
    Plan {
        paths: &'a [String],
        property: Option<&'a str>,
        return_path: bool,
    },
    Identity,
}

impl Reference {
    /// Names of the populated strategies, used to reject ambiguous declarations
    pub fn populated_strategies(&self) -> Vec<&'static str> {
        let mut populated = Vec::new();
        if self.json_file.is_some() {
            populated.push("json_file");
        }
        if self.general.is_some() {
            populated.push("general");
        }
        if !self.paths.is_empty() {
            populated.push("paths");
        }
        populated
    }

    /// Strategy to apply; declarations are validated at load so at most one is set
    pub fn kind(&self) -> ReferenceKind<'_> {
        if let Some(table) = self.json_file.as_deref() {
            ReferenceKind::JsonFile {
                table,
                property: self.property.as_deref(),
            }
        } else if let Some(name) = self.general.as_deref() {
            ReferenceKind::General(name)
        } else if !self.paths.is_empty() {
            ReferenceKind::Plan {
                paths: &self.paths,
                property: self.property.as_deref(),
                return_path: self.return_path,
            }
        } else {
            ReferenceKind::Identity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_accept_single_string() {
        let def: PropertyDefinition = serde_yaml::from_str("paths: .values.size").unwrap();
        assert_eq!(def.paths, vec![".values.size".to_string()]);
    }

    #[test]
    fn test_paths_accept_list() {
        let def: PropertyDefinition =
            serde_yaml::from_str("paths: [.values.size, .values.disk_size_gb]").unwrap();
        assert_eq!(def.paths.len(), 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let parsed: Result<PropertyDefinition, _> = serde_yaml::from_str("pathz: .values.size");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_regex_group_defaults_to_one() {
        let rule: RegexRule = serde_yaml::from_str("pattern: '^(.*)-[a-z]$'").unwrap();
        assert_eq!(rule.group, 1);
    }

    #[test]
    fn test_reference_kinds() {
        let reference: Reference =
            serde_yaml::from_str("json_file: machine_types\nproperty: vcpus").unwrap();
        assert_eq!(
            reference.kind(),
            ReferenceKind::JsonFile {
                table: "machine_types",
                property: Some("vcpus")
            }
        );

        let reference: Reference = serde_yaml::from_str("general: disk_types").unwrap();
        assert_eq!(reference.kind(), ReferenceKind::General("disk_types"));

        assert_eq!(Reference::default().kind(), ReferenceKind::Identity);
    }

    #[test]
    fn test_general_merge_later_wins() {
        let mut base: GeneralConfig =
            serde_yaml::from_str("disk_types: {default: SSD, types: {pd-standard: HDD}}").unwrap();
        let later: GeneralConfig =
            serde_yaml::from_str("disk_types: {types: {pd-standard: SSD, pd-extreme: SSD}}").unwrap();
        base.merge(later);
        assert_eq!(base.disk_types.default.as_deref(), Some("SSD"));
        assert_eq!(base.disk_types.types["pd-standard"], "SSD");
        assert_eq!(base.disk_types.types.len(), 2);
    }
}
