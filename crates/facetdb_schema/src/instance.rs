//! Entity instances.

use crate::descriptor::EntityDescriptor;
use crate::error::{SchemaError, SchemaResult};
use crate::value::FieldValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A field-name to value mapping, as used for filters and primary keys.
pub type FieldValues = BTreeMap<String, FieldValue>;

/// One record of an entity, bound to exactly one descriptor.
///
/// Field names are checked against the descriptor when a value is set,
/// so an instance can never carry a field its entity does not declare.
/// An instance holding exactly the primary key fields is a "primary key
/// instance" and is the only shape valid for identity lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInstance {
    descriptor: Arc<EntityDescriptor>,
    values: FieldValues,
}

impl EntityInstance {
    /// Creates an empty instance of the described entity.
    pub fn new(descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            descriptor,
            values: BTreeMap::new(),
        }
    }

    /// Creates an instance pre-populated from a field-value map.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` for any field the descriptor does not declare.
    pub fn with_values(
        descriptor: Arc<EntityDescriptor>,
        values: FieldValues,
    ) -> SchemaResult<Self> {
        let mut instance = Self::new(descriptor);
        for (field, value) in values {
            instance.set(&field, value)?;
        }
        Ok(instance)
    }

    /// Builds an instance by resolving each declared field through a
    /// column lookup, typically a row returned by the statement executor.
    ///
    /// Columns that resolve to `None` or `Null` are left unset.
    pub fn from_columns<F>(descriptor: Arc<EntityDescriptor>, mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<FieldValue>,
    {
        let mut values = BTreeMap::new();
        for field in descriptor.fields() {
            if let Some(value) = lookup(&field.column) {
                if !value.is_null() {
                    values.insert(field.name.clone(), value);
                }
            }
        }
        Self { descriptor, values }
    }

    /// The descriptor this instance is bound to.
    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    /// The entity name.
    pub fn entity_name(&self) -> &str {
        self.descriptor.name()
    }

    /// Sets a field value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if the descriptor does not declare the field.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> SchemaResult<()> {
        self.descriptor.require_field(field)?;
        let value = value.into();
        if value.is_null() {
            self.values.remove(field);
        } else {
            self.values.insert(field.to_string(), value);
        }
        Ok(())
    }

    /// Reads a field value; `None` when unset.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Reads a field value, mapping unset to `Null`.
    pub fn get_or_null(&self, field: &str) -> FieldValue {
        self.values.get(field).cloned().unwrap_or(FieldValue::Null)
    }

    /// The set field values.
    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    /// Projects the primary key fields.
    ///
    /// # Errors
    ///
    /// Returns `MissingKeyField` if any primary key field is unset.
    pub fn primary_key(&self) -> SchemaResult<FieldValues> {
        let mut key = BTreeMap::new();
        for field in self.descriptor.primary_key() {
            let value = self.values.get(field).ok_or_else(|| {
                SchemaError::missing_key_field(self.descriptor.name(), field)
            })?;
            key.insert(field.clone(), value.clone());
        }
        Ok(key)
    }

    /// Whether this instance holds exactly the primary key fields.
    pub fn is_primary_key_only(&self) -> bool {
        self.values.len() == self.descriptor.primary_key().len()
            && self
                .values
                .keys()
                .all(|f| self.descriptor.is_primary_key(f))
    }

    /// Returns a copy with `overlay`'s set fields written over this
    /// instance's values. Both must be bound to the same descriptor.
    pub fn merged(&self, overlay: &EntityInstance) -> EntityInstance {
        let mut merged = self.clone();
        for (field, value) in overlay.values() {
            merged.values.insert(field.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SemanticType;

    fn person() -> Arc<EntityDescriptor> {
        Arc::new(
            EntityDescriptor::builder("Person")
                .field("id", SemanticType::Id)
                .field("name", SemanticType::Text)
                .field("age", SemanticType::Integer)
                .primary_key(["id"])
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn set_and_get() {
        let mut p = EntityInstance::new(person());
        p.set("name", "Ann").unwrap();
        p.set("age", 30i64).unwrap();
        assert_eq!(p.get("name"), Some(&FieldValue::Text("Ann".into())));
        assert_eq!(p.get_or_null("id"), FieldValue::Null);
    }

    #[test]
    fn rejects_unknown_field_at_boundary() {
        let mut p = EntityInstance::new(person());
        let err = p.set("height", 180i64).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { .. }));
    }

    #[test]
    fn setting_null_unsets() {
        let mut p = EntityInstance::new(person());
        p.set("age", 30i64).unwrap();
        p.set("age", FieldValue::Null).unwrap();
        assert_eq!(p.get("age"), None);
    }

    #[test]
    fn primary_key_projection() {
        let mut p = EntityInstance::new(person());
        assert!(matches!(
            p.primary_key(),
            Err(SchemaError::MissingKeyField { .. })
        ));
        p.set("id", 1i64).unwrap();
        let key = p.primary_key().unwrap();
        assert_eq!(key.get("id"), Some(&FieldValue::Integer(1)));

        assert!(p.is_primary_key_only());
        p.set("age", 30i64).unwrap();
        assert!(!p.is_primary_key_only());
    }

    #[test]
    fn from_columns_skips_nulls() {
        let p = EntityInstance::from_columns(person(), |col| match col {
            "id" => Some(FieldValue::Integer(1)),
            "name" => Some(FieldValue::Null),
            _ => None,
        });
        assert_eq!(p.get("id"), Some(&FieldValue::Integer(1)));
        assert_eq!(p.get("name"), None);
        assert_eq!(p.get("age"), None);
    }

    #[test]
    fn merged_overlays_set_fields() {
        let desc = person();
        let mut base = EntityInstance::new(Arc::clone(&desc));
        base.set("id", 1i64).unwrap();
        base.set("name", "Ann").unwrap();
        base.set("age", 30i64).unwrap();

        let mut patch = EntityInstance::new(desc);
        patch.set("id", 1i64).unwrap();
        patch.set("age", 31i64).unwrap();

        let merged = base.merged(&patch);
        assert_eq!(merged.get("name"), Some(&FieldValue::Text("Ann".into())));
        assert_eq!(merged.get("age"), Some(&FieldValue::Integer(31)));
    }
}
