//! Mapping Registry - Load and merge mapping declarations
//!
//! Every provider has a set of declarations compiled into the binary, and an
//! optional directory of extra declarations (`<mappings_dir>/<provider>/*.yaml`)
//! applied after them. Files are merged in order: a resource type declared in
//! a later file replaces the earlier declaration entirely, `general` sections
//! are unioned key by key.

use super::schema::{Definitions, GeneralConfig, MappingFile, ReferenceKind, ResourceMapping};
use crate::error::{EngineError, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Embedded mapping declarations (compiled into the binary): provider, origin, content
const EMBEDDED_MAPPINGS: &[(&str, &str, &str)] = &[
    (
        "gcp",
        "gcp/general.yaml",
        include_str!("../resources/mappings/gcp/general.yaml"),
    ),
    (
        "gcp",
        "gcp/compute.yaml",
        include_str!("../resources/mappings/gcp/compute.yaml"),
    ),
    (
        "gcp",
        "gcp/disks.yaml",
        include_str!("../resources/mappings/gcp/disks.yaml"),
    ),
    (
        "gcp",
        "gcp/sql.yaml",
        include_str!("../resources/mappings/gcp/sql.yaml"),
    ),
];

/// Only taxonomy reachable through `reference.general`
pub const DISK_TYPES_TAXONOMY: &str = "disk_types";

/// Merged, validated mapping declarations of one provider
#[derive(Debug)]
pub struct MappingDocument {
    pub provider: String,
    pub general: GeneralConfig,
    pub resources: BTreeMap<String, ResourceMapping>,
    ignored: Vec<Regex>,
}

impl MappingDocument {
    /// Parse and merge declaration sources in order
    pub fn from_sources<'s, I>(provider: &str, sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'s str, &'s str)>,
    {
        let mut general = GeneralConfig::default();
        let mut resources = BTreeMap::new();

        for (origin, content) in sources {
            let partial: MappingFile =
                serde_yaml::from_str(content).map_err(|e| EngineError::MalformedMapping {
                    origin: origin.to_string(),
                    message: e.to_string(),
                })?;
            tracing::debug!(
                "merging mapping declaration {} ({} resource types)",
                origin,
                partial.compute_resource.len()
            );
            if let Some(partial_general) = partial.general {
                general.merge(partial_general);
            }
            resources.extend(partial.compute_resource);
        }

        let ignored = general
            .ignored_resources
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    EngineError::InvalidMapping {
                        resource_type: "general".to_string(),
                        message: format!("invalid ignore pattern `{}`: {}", pattern, e),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let document = Self {
            provider: provider.to_string(),
            general,
            resources,
            ignored,
        };
        document.validate()?;
        Ok(document)
    }

    /// Get a resource mapping by type
    pub fn resource(&self, resource_type: &str) -> Option<&ResourceMapping> {
        self.resources.get(resource_type)
    }

    /// Get all declared resource types
    pub fn resource_types(&self) -> Vec<&str> {
        self.resources.keys().map(|s| s.as_str()).collect()
    }

    /// Whether a resource type matches one of the provider's ignore patterns
    pub fn is_ignored(&self, resource_type: &str) -> bool {
        self.ignored.iter().any(|re| re.is_match(resource_type))
    }

    fn validate(&self) -> Result<()> {
        for (resource_type, mapping) in &self.resources {
            if mapping.paths.is_empty() {
                return Err(invalid(resource_type, "no instance paths declared"));
            }
            self.validate_definitions(resource_type, &mapping.variables)?;
            self.validate_definitions(resource_type, &mapping.properties)?;
        }
        Ok(())
    }

    fn validate_definitions(
        &self,
        resource_type: &str,
        definitions: &BTreeMap<String, Definitions>,
    ) -> Result<()> {
        for (name, defs) in definitions {
            let lists = defs.iter().filter(|d| d.is_list()).count();
            if lists != 0 && lists != defs.len() {
                return Err(invalid(
                    resource_type,
                    format!("property {} mixes list and scalar definitions", name),
                ));
            }

            for def in defs {
                if let Some(rule) = &def.regex {
                    Regex::new(&rule.pattern).map_err(|e| {
                        invalid(
                            resource_type,
                            format!("property {}: invalid regex `{}`: {}", name, rule.pattern, e),
                        )
                    })?;
                }

                if let Some(reference) = &def.reference {
                    let populated = reference.populated_strategies();
                    if populated.len() > 1 {
                        return Err(invalid(
                            resource_type,
                            format!(
                                "property {}: reference declares several strategies ({})",
                                name,
                                populated.join(", ")
                            ),
                        ));
                    }
                    match reference.kind() {
                        ReferenceKind::JsonFile { table, .. }
                            if !self.general.json_data.contains_key(table) =>
                        {
                            return Err(invalid(
                                resource_type,
                                format!(
                                    "property {}: reference data '{}' is not declared in general.json_data",
                                    name, table
                                ),
                            ));
                        }
                        ReferenceKind::General(taxonomy) if taxonomy != DISK_TYPES_TAXONOMY => {
                            return Err(invalid(
                                resource_type,
                                format!("property {}: unknown general taxonomy '{}'", name, taxonomy),
                            ));
                        }
                        _ => {}
                    }
                }

                for item in &def.item {
                    if item.paths.is_empty() {
                        return Err(invalid(
                            resource_type,
                            format!("property {}: item without paths", name),
                        ));
                    }
                    self.validate_definitions(resource_type, &item.variables)?;
                    self.validate_definitions(resource_type, &item.properties)?;
                }
            }
        }
        Ok(())
    }
}

fn invalid(resource_type: &str, message: impl Into<String>) -> EngineError {
    EngineError::InvalidMapping {
        resource_type: resource_type.to_string(),
        message: message.into(),
    }
}

/// Per-provider cache of merged mapping documents
///
/// The first `load` of a provider builds its document while holding the lock,
/// so concurrent callers never build the same provider twice.
pub struct MappingRegistry {
    mappings_dir: Option<PathBuf>,
    include_embedded: bool,
    documents: Mutex<HashMap<String, Arc<MappingDocument>>>,
}

impl MappingRegistry {
    pub fn new(mappings_dir: Option<PathBuf>) -> Self {
        Self {
            mappings_dir,
            include_embedded: true,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Registry reading only from `mappings_dir`, without the compiled-in declarations
    pub fn from_dir_only(mappings_dir: PathBuf) -> Self {
        Self {
            mappings_dir: Some(mappings_dir),
            include_embedded: false,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Get the merged document of a provider (built on first access)
    pub fn load(&self, provider: &str) -> Result<Arc<MappingDocument>> {
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(document) = documents.get(provider) {
            return Ok(Arc::clone(document));
        }

        let document = Arc::new(self.build(provider)?);
        tracing::info!(
            "loaded {} mapping: {} resource types",
            provider,
            document.resources.len()
        );
        documents.insert(provider.to_string(), Arc::clone(&document));
        Ok(document)
    }

    fn build(&self, provider: &str) -> Result<MappingDocument> {
        let mut sources: Vec<(String, String)> = Vec::new();

        if self.include_embedded {
            sources.extend(
                EMBEDDED_MAPPINGS
                    .iter()
                    .filter(|(p, _, _)| *p == provider)
                    .map(|(_, origin, content)| (origin.to_string(), content.to_string())),
            );
        }

        if let Some(dir) = &self.mappings_dir {
            sources.extend(read_declaration_dir(&dir.join(provider))?);
        }

        if sources.is_empty() {
            return Err(EngineError::UnknownProvider(provider.to_string()));
        }

        MappingDocument::from_sources(
            provider,
            sources.iter().map(|(o, c)| (o.as_str(), c.as_str())),
        )
    }
}

/// Read every `*.yaml` / `*.yml` file of a directory, sorted by file name
fn read_declaration_dir(dir: &Path) -> Result<Vec<(String, String)>> {
    if !dir.is_dir() {
        tracing::debug!("no mapping directory at {:?}", dir);
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|source| EngineError::MappingIo {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let content = std::fs::read_to_string(&path).map_err(|source| EngineError::MappingIo {
                path: path.clone(),
                source,
            })?;
            Ok((path.display().to_string(), content))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DISK_MAPPING: &str = r#"
compute_resource:
  google_compute_disk:
    paths: '.planned_values | all_select("type"; "google_compute_disk")'
    properties:
      name:
        - paths: .name
"#;

    #[test]
    fn test_embedded_gcp_mapping_loads() {
        let registry = MappingRegistry::new(None);
        let document = registry.load("gcp").unwrap();
        assert!(document.resource("google_compute_instance").is_some());
        assert!(document.resource("google_compute_disk").is_some());
        assert!(document.general.json_data.contains_key("machine_types"));
    }

    #[test]
    fn test_load_is_memoized() {
        let registry = MappingRegistry::new(None);
        let first = registry.load("gcp").unwrap();
        let second = registry.load("gcp").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_provider() {
        let registry = MappingRegistry::new(None);
        assert!(matches!(
            registry.load("nowhere"),
            Err(EngineError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_later_file_replaces_resource_entirely() {
        let later = r#"
compute_resource:
  google_compute_disk:
    paths: '.planned_values | all_select("type"; "google_compute_disk")'
    properties:
      region:
        - paths: .values.region
"#;
        let document =
            MappingDocument::from_sources("gcp", [("a.yaml", DISK_MAPPING), ("b.yaml", later)])
                .unwrap();
        let disk = document.resource("google_compute_disk").unwrap();
        assert!(disk.properties.contains_key("region"));
        assert!(!disk.properties.contains_key("name"));
    }

    #[test]
    fn test_malformed_declaration_is_fatal() {
        let err = MappingDocument::from_sources("gcp", [("broken.yaml", "{{not yaml")]).unwrap_err();
        assert!(matches!(err, EngineError::MalformedMapping { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_reference_with_two_strategies_rejected() {
        let yaml = r#"
general:
  json_data: { machine_types: gcp_machine_types.json }
compute_resource:
  google_compute_instance:
    paths: .x
    properties:
      vCPUs:
        - paths: .values.machine_type
          reference: { json_file: machine_types, general: disk_types }
"#;
        let err = MappingDocument::from_sources("gcp", [("x.yaml", yaml)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMapping { .. }));
    }

    #[test]
    fn test_undeclared_json_table_rejected() {
        let yaml = r#"
compute_resource:
  google_compute_instance:
    paths: .x
    properties:
      vCPUs:
        - paths: .values.machine_type
          reference: { json_file: machine_types, property: vcpus }
"#;
        assert!(MappingDocument::from_sources("gcp", [("x.yaml", yaml)]).is_err());
    }

    #[test]
    fn test_ignore_patterns_exact_and_regex() {
        let yaml = r#"
general:
  ignored_resources:
    - google_project_service
    - google_service_account.*
"#;
        let document = MappingDocument::from_sources("gcp", [("x.yaml", yaml)]).unwrap();
        assert!(document.is_ignored("google_project_service"));
        assert!(document.is_ignored("google_service_account_key"));
        assert!(!document.is_ignored("google_project_service_identity"));
        assert!(!document.is_ignored("google_compute_disk"));
    }

    #[test]
    fn test_directory_declarations_override_embedded() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("gcp")).unwrap();
        fs::write(temp_dir.path().join("gcp/override.yaml"), DISK_MAPPING).unwrap();
        fs::write(temp_dir.path().join("gcp/notes.txt"), "ignored").unwrap();

        let registry = MappingRegistry::new(Some(temp_dir.path().to_path_buf()));
        let document = registry.load("gcp").unwrap();
        let disk = document.resource("google_compute_disk").unwrap();
        assert_eq!(disk.properties.len(), 1);
        assert!(document.resource("google_compute_instance").is_some());
    }

    #[test]
    fn test_directory_only_registry() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("gcp")).unwrap();
        fs::write(temp_dir.path().join("gcp/disk.yml"), DISK_MAPPING).unwrap();

        let registry = MappingRegistry::from_dir_only(temp_dir.path().to_path_buf());
        let document = registry.load("gcp").unwrap();
        assert_eq!(document.resource_types(), vec!["google_compute_disk"]);
    }
}
