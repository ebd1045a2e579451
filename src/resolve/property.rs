//! Property resolution
//!
//! Scalar and list-valued properties share one primitive,
//! [`Resolver::resolve_definitions`]. List properties recurse through their
//! `item` sub-mappings, each matched element getting its own child context.

use super::context::{EvaluationContext, MappingScope};
use super::value::{Value, ValueWithUnit};
use super::{Resolver, MAX_RESOLUTION_DEPTH, UNRESOLVED_PLACEHOLDER};
use crate::error::{EngineError, Result, TypeMismatch};
use crate::mapping::{ItemMapping, PropertyDefinition};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// A resolved property: one value, or one record per matched list element
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(ValueWithUnit),
    List(Vec<ItemRecord>),
}

/// Resolved properties of one list element (a disk, an accelerator)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemRecord {
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ItemRecord {
    pub fn scalar(&self, name: &str) -> Option<&ValueWithUnit> {
        match self.properties.get(name) {
            Some(PropertyValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> &[ItemRecord] {
        match self.properties.get(name) {
            Some(PropertyValue::List(items)) => items,
            _ => &[],
        }
    }
}

impl<'a> Resolver<'a> {
    /// Resolve a property declared in the context's scope; `None` if undeclared or absent
    pub fn resolve_property(&self, ctx: &EvaluationContext<'_>, name: &str) -> Result<Option<PropertyValue>> {
        let Some(defs) = ctx.scope.properties.get(name) else {
            return Ok(None);
        };

        if defs.iter().any(PropertyDefinition::is_list) {
            let items = self.resolve_list_definitions(ctx, name, defs)?;
            return Ok(Some(PropertyValue::List(items)));
        }
        Ok(self.resolve_definitions(ctx, name, defs)?.map(PropertyValue::Scalar))
    }

    pub fn resolve_scalar_property(&self, ctx: &EvaluationContext<'_>, name: &str) -> Result<Option<ValueWithUnit>> {
        match self.resolve_property(ctx, name)? {
            Some(PropertyValue::Scalar(value)) => Ok(Some(value)),
            Some(PropertyValue::List(_)) => Err(shape_error(ctx, name, "scalar", "list")),
            None => Ok(None),
        }
    }

    /// Items of a list property; an absent property is an empty list
    pub fn resolve_list_property(&self, ctx: &EvaluationContext<'_>, name: &str) -> Result<Vec<ItemRecord>> {
        match self.resolve_property(ctx, name)? {
            Some(PropertyValue::List(items)) => Ok(items),
            Some(PropertyValue::Scalar(_)) => Err(shape_error(ctx, name, "list", "scalar")),
            None => Ok(Vec::new()),
        }
    }

    /// Try each definition in order until one yields a value
    pub(super) fn resolve_definitions(
        &self,
        ctx: &EvaluationContext<'_>,
        name: &str,
        defs: &[PropertyDefinition],
    ) -> Result<Option<ValueWithUnit>> {
        for def in defs {
            if let Some(value) = self.resolve_definition(ctx, name, def)? {
                return Ok(Some(ValueWithUnit {
                    value,
                    unit: def.unit.clone(),
                }));
            }
        }
        tracing::trace!("{}: {} has no value", ctx.address, name);
        Ok(None)
    }

    fn resolve_definition(
        &self,
        ctx: &EvaluationContext<'_>,
        name: &str,
        def: &PropertyDefinition,
    ) -> Result<Option<Value>> {
        for template in &def.paths {
            let Some(raw) = self.lookup_paths(ctx, name, template)? else {
                continue;
            };
            if let Some(value) = self.apply_pipeline(raw, def, ctx)? {
                return Ok(Some(value));
            }
        }

        let default = match &def.default {
            None | Some(Json::Null) => return Ok(None),
            Some(Json::String(template)) => {
                let expanded = self.expand(template, ctx)?;
                if expanded == UNRESOLVED_PLACEHOLDER {
                    return Ok(None);
                }
                Value::String(expanded)
            }
            Some(other) => Value::from(other),
        };
        self.apply_pipeline(default, def, ctx)
    }

    /// Single non-null match of one path, more than one is ambiguous.
    ///
    /// A match that is only the unresolved marker (`"${machine_type}"` with
    /// no machine type) counts as no match.
    fn lookup_paths(&self, ctx: &EvaluationContext<'_>, name: &str, template: &str) -> Result<Option<Value>> {
        let query = self.expand(template, ctx)?;
        let mut matches: Vec<Json> = self
            .query(ctx, &query)?
            .into_iter()
            .filter(|v| !v.is_null() && v.as_str() != Some(UNRESOLVED_PLACEHOLDER))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop().map(|v| Value::from(&v))),
            count => Err(EngineError::Ambiguous {
                address: ctx.address.to_string(),
                property: name.to_string(),
                query,
                count,
            }),
        }
    }

    /// regex, then reference, then validator
    fn apply_pipeline(&self, raw: Value, def: &PropertyDefinition, ctx: &EvaluationContext<'_>) -> Result<Option<Value>> {
        let value = match &def.regex {
            Some(rule) => Value::String(self.extract(&raw, rule, ctx)?),
            None => raw,
        };

        let value = match &def.reference {
            Some(reference) => match self.resolve_reference(value, reference, ctx)? {
                Some(value) => value,
                None => return Ok(None),
            },
            None => value,
        };

        if let Some(validator) = &def.validator {
            self.validate(&value, validator, ctx)?;
        }
        Ok(Some(value))
    }

    fn resolve_list_definitions(
        &self,
        ctx: &EvaluationContext<'_>,
        name: &str,
        defs: &[PropertyDefinition],
    ) -> Result<Vec<ItemRecord>> {
        if ctx.depth() >= MAX_RESOLUTION_DEPTH {
            return Err(EngineError::CyclicResolution {
                address: ctx.address.to_string(),
                chain: format!("{} nested deeper than {} levels", name, MAX_RESOLUTION_DEPTH),
            });
        }

        for def in defs {
            let mut records = Vec::new();
            for item in &def.item {
                for template in &item.paths {
                    let query = self.expand(template, ctx)?;
                    for matched in self.query(ctx, &query)? {
                        for element in collect_items(&matched) {
                            records.push(self.resolve_item(ctx, element, item)?);
                        }
                    }
                }
            }

            if records.is_empty() {
                if let (Some(default), Some(item)) = (&def.default, def.item.first()) {
                    for element in collect_items(default) {
                        records.push(self.resolve_item(ctx, element, item)?);
                    }
                }
            }

            if !records.is_empty() {
                tracing::trace!("{}: {} resolved to {} items", ctx.address, name, records.len());
                return Ok(records);
            }
        }
        Ok(Vec::new())
    }

    fn resolve_item(&self, ctx: &EvaluationContext<'_>, element: &Json, item: &ItemMapping) -> Result<ItemRecord> {
        let child = ctx.descend(element, MappingScope::from(item));
        let mut record = ItemRecord::default();
        for name in item.properties.keys() {
            if let Some(value) = self.resolve_property(&child, name)? {
                record.properties.insert(name.clone(), value);
            }
        }
        Ok(record)
    }
}

/// Elements of a match: each entry of an array, the value itself otherwise
fn collect_items(value: &Json) -> Vec<&Json> {
    match value {
        Json::Null => Vec::new(),
        Json::Array(elements) => elements.iter().filter(|e| !e.is_null()).collect(),
        other => vec![other],
    }
}

fn shape_error(ctx: &EvaluationContext<'_>, name: &str, expected: &'static str, found: &'static str) -> EngineError {
    EngineError::TypeMismatch {
        address: ctx.address.to_string(),
        property: name.to_string(),
        source: TypeMismatch { expected, found },
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{document, resource_mapping};
    use super::super::DataStore;
    use super::*;
    use crate::config::Config;
    use crate::mapping::MappingDocument;
    use serde_json::json;

    const MAPPING: &str = r#"
general:
  disk_types:
    types: { pd-standard: HDD, pd-ssd: SSD }
  json_data:
    machine_types: gcp_machine_types.json
compute_resource:
  google_compute_instance:
    paths: .x
    variables:
      machine_type:
        - paths: .values.machine_type
    properties:
      vCPUs:
        - paths: .values.machine_type
          reference: { json_file: machine_types, property: vcpus }
        - paths: .values.machine_type
          regex: { pattern: '^custom-(\d+)-\d+$' }
      fallback_cpus:
        - paths: .values.machine_type
          reference: { json_file: machine_types, property: vcpus }
          default: 2
      templated_cpus:
        - paths: '"${machine_type}"'
          regex: { pattern: '^custom-(\d+)-\d+$' }
      templated_default:
        - paths: .values.family
          default: '${machine_type}'
      zone:
        - paths: [.values.zone, .values.location]
      labels:
        - paths: .values.labels[]
      validated:
        - paths: .values.size
          validator: 'if . > 0 then . else error("must be positive") end'
      storage:
        - item:
            - paths: .values.boot_disk[].initialize_params
              properties:
                size:
                  - paths: .size
                    unit: gb
                    default: 10
                type:
                  - paths: .type
                    default: pd-standard
                    reference: { general: disk_types }
                machine:
                  - paths: '.x["${machine_type}"]'
                    default: '${machine_type}'
"#;

    struct Fixture {
        doc: MappingDocument,
        data: DataStore,
        config: Config,
        plan: Json,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                doc: document(MAPPING),
                data: DataStore::new(None),
                config: Config::default(),
                plan: json!({}),
            }
        }

        fn with<T>(&self, resource: Json, f: impl FnOnce(&Resolver<'_>, &EvaluationContext<'_>) -> T) -> T {
            let resolver = Resolver::new(&self.plan, &self.doc, &self.data, &self.config);
            let ctx = EvaluationContext::new(
                &resource,
                MappingScope::from(resource_mapping(&self.doc, "google_compute_instance")),
                "google_compute_instance.vm",
                "google_compute_instance",
                "gcp",
            );
            f(&resolver, &ctx)
        }
    }

    fn scalar(fixture: &Fixture, resource: Json, name: &str) -> Result<Option<Value>> {
        fixture.with(resource, |resolver, ctx| {
            Ok(resolver.resolve_scalar_property(ctx, name)?.map(|v| v.value))
        })
    }

    #[test]
    fn test_first_definition_with_value_wins() {
        let fixture = Fixture::new();
        let vcpus = scalar(&fixture, json!({"values": {"machine_type": "n1-standard-8"}}), "vCPUs").unwrap();
        assert_eq!(vcpus, Some(Value::Number(8.0)));
    }

    #[test]
    fn test_table_miss_falls_through_to_next_definition() {
        let fixture = Fixture::new();
        let vcpus = scalar(&fixture, json!({"values": {"machine_type": "custom-6-20480"}}), "vCPUs").unwrap();
        assert_eq!(vcpus, Some(Value::String("6".into())));
    }

    #[test]
    fn test_table_miss_falls_back_to_default() {
        let fixture = Fixture::new();
        let cpus = scalar(
            &fixture,
            json!({"values": {"machine_type": "zz-imaginary-1"}}),
            "fallback_cpus",
        )
        .unwrap();
        assert_eq!(cpus, Some(Value::Number(2.0)));
    }

    #[test]
    fn test_paths_are_tried_in_order() {
        let fixture = Fixture::new();
        let zone = scalar(&fixture, json!({"values": {"location": "europe-west1-b"}}), "zone").unwrap();
        assert_eq!(zone, Some(Value::String("europe-west1-b".into())));
    }

    #[test]
    fn test_missing_property_is_none() {
        let fixture = Fixture::new();
        assert_eq!(scalar(&fixture, json!({"values": {}}), "zone").unwrap(), None);
        assert_eq!(scalar(&fixture, json!({"values": {}}), "undeclared").unwrap(), None);
    }

    #[test]
    fn test_multiple_matches_are_ambiguous() {
        let fixture = Fixture::new();
        let err = scalar(&fixture, json!({"values": {"labels": ["a", "b"]}}), "labels").unwrap_err();
        match err {
            EngineError::Ambiguous { address, property, count, .. } => {
                assert_eq!(address, "google_compute_instance.vm");
                assert_eq!(property, "labels");
                assert_eq!(count, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_variable_is_no_value() {
        let fixture = Fixture::new();
        let resource = json!({"values": {"zone": "us-central1-a"}});
        assert_eq!(scalar(&fixture, resource.clone(), "templated_cpus").unwrap(), None);
        assert_eq!(scalar(&fixture, resource, "templated_default").unwrap(), None);
        assert_eq!(
            scalar(&fixture, json!({"values": {"machine_type": "custom-4-8192"}}), "templated_cpus").unwrap(),
            Some(Value::String("4".into()))
        );
    }

    #[test]
    fn test_regex_mismatch_is_an_error() {
        let fixture = Fixture::new();
        let err = scalar(&fixture, json!({"values": {"machine_type": "weird"}}), "vCPUs").unwrap_err();
        assert!(matches!(err, EngineError::RegexMismatch { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_validator_failure_is_an_error() {
        let fixture = Fixture::new();
        assert!(scalar(&fixture, json!({"values": {"size": 0}}), "validated").is_err());
        assert_eq!(
            scalar(&fixture, json!({"values": {"size": 5}}), "validated").unwrap(),
            Some(Value::Number(5.0))
        );
    }

    #[test]
    fn test_list_property_resolves_each_item() {
        let fixture = Fixture::new();
        let resource = json!({"values": {
            "machine_type": "n1-standard-1",
            "boot_disk": [
                {"initialize_params": {"size": 100, "type": "pd-ssd"}},
                {"initialize_params": {}}
            ]
        }});
        let items = fixture
            .with(resource, |resolver, ctx| resolver.resolve_list_property(ctx, "storage"))
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].scalar("size").unwrap().value, Value::Number(100.0));
        assert_eq!(items[0].scalar("size").unwrap().unit.as_deref(), Some("gb"));
        assert_eq!(items[0].scalar("type").unwrap().value, Value::String("SSD".into()));
        assert_eq!(items[1].scalar("size").unwrap().value, Value::Number(10.0));
        assert_eq!(items[1].scalar("type").unwrap().value, Value::String("HDD".into()));
        // item variables fall back to the resource-level mapping
        assert_eq!(
            items[1].scalar("machine").unwrap().value,
            Value::String("n1-standard-1".into())
        );
    }

    #[test]
    fn test_absent_list_is_empty() {
        let fixture = Fixture::new();
        let items = fixture
            .with(json!({"values": {}}), |resolver, ctx| {
                resolver.resolve_list_property(ctx, "storage")
            })
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_shape_mismatch() {
        let fixture = Fixture::new();
        let err = fixture
            .with(json!({"values": {}}), |resolver, ctx| {
                resolver.resolve_scalar_property(ctx, "storage")
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }
}
