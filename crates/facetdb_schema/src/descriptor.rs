//! Entity descriptors.
//!
//! A descriptor is the immutable metadata for one entity: its fields in
//! declared order, the column each maps to, the primary key subset, an
//! optional version-stamp field for optimistic locking, and cache policy.
//! Descriptors are built once at startup and shared as `Arc` handles.

use crate::error::{SchemaError, SchemaResult};
use serde::Deserialize;

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    /// Identifier (sequence-assigned integer).
    Id,
    /// Signed integer.
    Integer,
    /// Floating point number.
    Float,
    /// Text string.
    Text,
    /// Boolean flag.
    Boolean,
    /// Point in time, stored as epoch milliseconds.
    Timestamp,
}

impl SemanticType {
    /// Whether values of this type are integers on the wire.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            SemanticType::Id | SemanticType::Integer | SemanticType::Timestamp
        )
    }
}

/// One field of an entity: name, semantic type, and column mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name (what application code uses).
    pub name: String,
    /// Semantic type.
    pub semantic: SemanticType,
    /// Column name in the underlying table.
    pub column: String,
}

/// Immutable metadata for one entity.
///
/// Field order is significant: the condition compiler emits field-map
/// clauses in declared order so that logically identical filters compile
/// to byte-identical SQL, and SELECT lists are stable across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    name: String,
    table: String,
    partition: String,
    fields: Vec<FieldDescriptor>,
    primary_key: Vec<String>,
    version_field: Option<String>,
    never_cache: bool,
}

impl EntityDescriptor {
    /// Starts building a descriptor for the named entity.
    ///
    /// The table name defaults to the entity name; the partition defaults
    /// to `"primary"`.
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the storage partition this entity lives in.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Fields in declared order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by name, erroring on unknown names.
    pub fn require_field(&self, name: &str) -> SchemaResult<&FieldDescriptor> {
        self.field(name)
            .ok_or_else(|| SchemaError::unknown_field(&self.name, name))
    }

    /// Primary key field names, in declared field order.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Whether the named field is part of the primary key.
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    /// The optimistic-lock version field, if the entity has one.
    pub fn version_field(&self) -> Option<&str> {
        self.version_field.as_deref()
    }

    /// Whether this entity must never enter the query cache.
    pub fn never_cache(&self) -> bool {
        self.never_cache
    }

    /// Comma-joined column list in declared field order.
    pub fn column_list(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.column.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Builder for [`EntityDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    name: String,
    table: Option<String>,
    partition: String,
    fields: Vec<FieldDescriptor>,
    primary_key: Vec<String>,
    version_field: Option<String>,
    never_cache: bool,
}

impl DescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            partition: "primary".to_string(),
            fields: Vec::new(),
            primary_key: Vec::new(),
            version_field: None,
            never_cache: false,
        }
    }

    /// Overrides the table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets the storage partition.
    #[must_use]
    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Adds a field whose column name equals its field name.
    #[must_use]
    pub fn field(self, name: impl Into<String>, semantic: SemanticType) -> Self {
        let name = name.into();
        let column = name.clone();
        self.field_with_column(name, semantic, column)
    }

    /// Adds a field with an explicit column mapping.
    #[must_use]
    pub fn field_with_column(
        mut self,
        name: impl Into<String>,
        semantic: SemanticType,
        column: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            semantic,
            column: column.into(),
        });
        self
    }

    /// Marks the named fields as the primary key.
    #[must_use]
    pub fn primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the optimistic-lock version field.
    #[must_use]
    pub fn version_field(mut self, name: impl Into<String>) -> Self {
        self.version_field = Some(name.into());
        self
    }

    /// Excludes this entity from the query cache.
    #[must_use]
    pub fn never_cache(mut self, value: bool) -> Self {
        self.never_cache = value;
        self
    }

    /// Validates and builds the descriptor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDescriptor` if the entity has no fields, a field
    /// name repeats, the primary key is empty or names unknown fields,
    /// or the version field is unknown, non-integral, or part of the key.
    pub fn build(self) -> SchemaResult<EntityDescriptor> {
        let name = self.name;
        if self.fields.is_empty() {
            return Err(SchemaError::invalid_descriptor(&name, "no fields declared"));
        }
        for (i, f) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|g| g.name == f.name) {
                return Err(SchemaError::invalid_descriptor(
                    &name,
                    format!("duplicate field {}", f.name),
                ));
            }
        }
        if self.primary_key.is_empty() {
            return Err(SchemaError::invalid_descriptor(
                &name,
                "no primary key declared",
            ));
        }
        for key in &self.primary_key {
            if !self.fields.iter().any(|f| &f.name == key) {
                return Err(SchemaError::invalid_descriptor(
                    &name,
                    format!("primary key references unknown field {key}"),
                ));
            }
        }
        if let Some(ref vf) = self.version_field {
            let field = self
                .fields
                .iter()
                .find(|f| &f.name == vf)
                .ok_or_else(|| {
                    SchemaError::invalid_descriptor(
                        &name,
                        format!("version field {vf} is not declared"),
                    )
                })?;
            if !field.semantic.is_integral() {
                return Err(SchemaError::invalid_descriptor(
                    &name,
                    format!("version field {vf} must be an integer type"),
                ));
            }
            if self.primary_key.iter().any(|k| k == vf) {
                return Err(SchemaError::invalid_descriptor(
                    &name,
                    format!("version field {vf} cannot be part of the primary key"),
                ));
            }
        }

        // Keep the key in declared field order regardless of how the
        // builder received it.
        let mut primary_key: Vec<String> = Vec::with_capacity(self.primary_key.len());
        for f in &self.fields {
            if self.primary_key.iter().any(|k| k == &f.name) {
                primary_key.push(f.name.clone());
            }
        }

        Ok(EntityDescriptor {
            table: self.table.unwrap_or_else(|| name.clone()),
            name,
            partition: self.partition,
            fields: self.fields,
            primary_key,
            version_field: self.version_field,
            never_cache: self.never_cache,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityDescriptor {
        EntityDescriptor::builder("Person")
            .field("id", SemanticType::Id)
            .field("name", SemanticType::Text)
            .field("age", SemanticType::Integer)
            .primary_key(["id"])
            .build()
            .unwrap()
    }

    #[test]
    fn builds_with_defaults() {
        let desc = person();
        assert_eq!(desc.name(), "Person");
        assert_eq!(desc.table(), "Person");
        assert_eq!(desc.partition(), "primary");
        assert_eq!(desc.primary_key(), ["id"]);
        assert!(desc.is_primary_key("id"));
        assert!(!desc.is_primary_key("age"));
        assert!(!desc.never_cache());
        assert_eq!(desc.column_list(), "id, name, age");
    }

    #[test]
    fn field_lookup() {
        let desc = person();
        assert_eq!(desc.field("age").unwrap().semantic, SemanticType::Integer);
        assert!(desc.field("missing").is_none());
        assert!(matches!(
            desc.require_field("missing"),
            Err(SchemaError::UnknownField { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_fields() {
        let err = EntityDescriptor::builder("Broken")
            .field("a", SemanticType::Id)
            .field("a", SemanticType::Text)
            .primary_key(["a"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor { .. }));
    }

    #[test]
    fn rejects_unknown_primary_key() {
        let err = EntityDescriptor::builder("Broken")
            .field("a", SemanticType::Id)
            .primary_key(["b"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor { .. }));
    }

    #[test]
    fn rejects_missing_primary_key() {
        let err = EntityDescriptor::builder("Broken")
            .field("a", SemanticType::Id)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor { .. }));
    }

    #[test]
    fn version_field_must_be_integral() {
        let err = EntityDescriptor::builder("Broken")
            .field("id", SemanticType::Id)
            .field("rev", SemanticType::Text)
            .primary_key(["id"])
            .version_field("rev")
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor { .. }));
    }

    #[test]
    fn primary_key_normalized_to_field_order() {
        let desc = EntityDescriptor::builder("Pair")
            .field("left", SemanticType::Id)
            .field("right", SemanticType::Id)
            .primary_key(["right", "left"])
            .build()
            .unwrap();
        assert_eq!(desc.primary_key(), ["left", "right"]);
    }

    #[test]
    fn explicit_column_mapping() {
        let desc = EntityDescriptor::builder("Person")
            .field_with_column("firstName", SemanticType::Text, "first_name")
            .field("id", SemanticType::Id)
            .primary_key(["id"])
            .build()
            .unwrap();
        assert_eq!(desc.field("firstName").unwrap().column, "first_name");
        assert_eq!(desc.column_list(), "first_name, id");
    }
}
