//! Schema registry and descriptor loading.

use crate::descriptor::{DescriptorBuilder, EntityDescriptor, SemanticType};
use crate::error::{SchemaError, SchemaResult};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// The process-wide descriptor registry.
///
/// One registry is constructed at startup and passed by handle to every
/// collaborator; there is no ambient global state. Descriptors are
/// immutable once registered and are replaced only by an explicit
/// administrative `register` call.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    descriptors: RwLock<HashMap<String, Arc<EntityDescriptor>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, replacing any prior definition.
    pub fn register(&self, descriptor: EntityDescriptor) {
        self.descriptors
            .write()
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
    }

    /// Looks up the descriptor for an entity name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity` if nothing is registered under the name.
    pub fn describe(&self, entity: &str) -> SchemaResult<Arc<EntityDescriptor>> {
        self.descriptors
            .read()
            .get(entity)
            .cloned()
            .ok_or_else(|| SchemaError::unknown_entity(entity))
    }

    /// Names of all registered entities, sorted.
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Loads descriptor definitions from a JSON document.
    ///
    /// The document is a list of entity definitions:
    ///
    /// ```json
    /// [{
    ///   "name": "Person",
    ///   "fields": [
    ///     {"name": "id", "type": "id"},
    ///     {"name": "name", "type": "text", "column": "full_name"}
    ///   ],
    ///   "primaryKey": ["id"],
    ///   "versionField": null,
    ///   "neverCache": false
    /// }]
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed JSON and `InvalidDescriptor` for
    /// definitions that fail validation.
    pub fn load_json(&self, json: &str) -> SchemaResult<usize> {
        let defs: Vec<EntityDef> =
            serde_json::from_str(json).map_err(|e| SchemaError::parse(e.to_string()))?;
        let count = defs.len();
        for def in defs {
            self.register(def.build()?);
        }
        Ok(count)
    }
}

/// Raw serde shape of one entity definition.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EntityDef {
    name: String,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    partition: Option<String>,
    fields: Vec<FieldDef>,
    primary_key: Vec<String>,
    #[serde(default)]
    version_field: Option<String>,
    #[serde(default)]
    never_cache: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FieldDef {
    name: String,
    #[serde(rename = "type")]
    semantic: SemanticType,
    #[serde(default)]
    column: Option<String>,
}

impl EntityDef {
    fn build(self) -> SchemaResult<EntityDescriptor> {
        let mut builder: DescriptorBuilder = EntityDescriptor::builder(self.name);
        if let Some(table) = self.table {
            builder = builder.table(table);
        }
        if let Some(partition) = self.partition {
            builder = builder.partition(partition);
        }
        for field in self.fields {
            builder = match field.column {
                Some(column) => builder.field_with_column(field.name, field.semantic, column),
                None => builder.field(field.name, field.semantic),
            };
        }
        builder = builder.primary_key(self.primary_key);
        if let Some(vf) = self.version_field {
            builder = builder.version_field(vf);
        }
        builder.never_cache(self.never_cache).build()
    }
}
