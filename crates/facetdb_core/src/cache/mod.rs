//! Multi-tier query cache.
//!
//! Three independent stores per entity:
//! - identity: full primary key to a single instance
//! - filter: exact filter field-value set to an ordered instance list
//! - universe: entity name to the ordered list of all its instances
//!
//! The filter store's key space is data-dependent and unbounded, so
//! invalidation is driven by the field-set registry: every filter put
//! records the exact field-name set used, and a write drops the candidate
//! keys built by projecting the written instance's values onto each
//! registered set: the current values always, and the pre-write values
//! too when they differ, because a field change can move a row into or
//! out of a cached filter result without changing its primary key.
//!
//! A miss is `None`, never an error; cache failures degrade to executor
//! pass-through at the delegator layer. Entries are replaced wholesale
//! and stored as defensive copies, so a caller mutating a returned
//! instance cannot corrupt the cache.

use facetdb_schema::{EntityDescriptor, EntityInstance, FieldValue, FieldValues};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A set of field names, as registered by filter puts.
pub type FieldNameSet = BTreeSet<String>;

/// Cache key: entity name plus a name-sorted field-value vector.
///
/// Both identity keys (the full primary key) and filter keys (an exact
/// filter field-value set) take this shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    entity: String,
    fields: Vec<(String, FieldValue)>,
}

impl CacheKey {
    fn new(entity: &str, values: &FieldValues) -> Self {
        Self {
            entity: entity.to_string(),
            // BTreeMap iteration is already name-sorted.
            fields: values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// The multi-tier query cache.
#[derive(Debug, Default)]
pub struct QueryCache {
    identity: RwLock<HashMap<CacheKey, EntityInstance>>,
    filters: RwLock<HashMap<CacheKey, Arc<Vec<EntityInstance>>>>,
    universe: RwLock<HashMap<String, Arc<Vec<EntityInstance>>>>,
    field_sets: RwLock<HashMap<String, HashSet<FieldNameSet>>>,
}

impl QueryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a single instance by full primary key.
    pub fn get_identity(
        &self,
        descriptor: &EntityDescriptor,
        key: &FieldValues,
    ) -> Option<EntityInstance> {
        if descriptor.never_cache() {
            return None;
        }
        self.identity
            .read()
            .get(&CacheKey::new(descriptor.name(), key))
            .cloned()
    }

    /// Stores a single instance under its primary key.
    ///
    /// Rejected silently for never-cache entities or instances missing
    /// primary key fields.
    pub fn put_identity(&self, descriptor: &EntityDescriptor, instance: &EntityInstance) {
        if descriptor.never_cache() {
            debug!(entity = descriptor.name(), "identity put rejected: never-cache entity");
            return;
        }
        let Ok(key) = instance.primary_key() else {
            debug!(entity = descriptor.name(), "identity put rejected: incomplete primary key");
            return;
        };
        self.identity
            .write()
            .insert(CacheKey::new(descriptor.name(), &key), instance.clone());
    }

    /// Reads a filter result by its exact field-value set.
    pub fn get_filter(
        &self,
        descriptor: &EntityDescriptor,
        fields: &FieldValues,
    ) -> Option<Vec<EntityInstance>> {
        if descriptor.never_cache() {
            return None;
        }
        self.filters
            .read()
            .get(&CacheKey::new(descriptor.name(), fields))
            .map(|list| list.as_ref().clone())
    }

    /// Stores a filter result and registers its field-name set.
    ///
    /// The registration is an atomic add-if-absent per entity; only the
    /// set of names matters, not how often it has been used.
    pub fn put_filter(
        &self,
        descriptor: &EntityDescriptor,
        fields: &FieldValues,
        instances: &[EntityInstance],
    ) {
        if descriptor.never_cache() {
            debug!(entity = descriptor.name(), "filter put rejected: never-cache entity");
            return;
        }
        let names: FieldNameSet = fields.keys().cloned().collect();
        self.field_sets
            .write()
            .entry(descriptor.name().to_string())
            .or_default()
            .insert(names);
        self.filters.write().insert(
            CacheKey::new(descriptor.name(), fields),
            Arc::new(instances.to_vec()),
        );
    }

    /// Reads the all-rows list for an entity.
    pub fn get_all(&self, descriptor: &EntityDescriptor) -> Option<Vec<EntityInstance>> {
        if descriptor.never_cache() {
            return None;
        }
        self.universe
            .read()
            .get(descriptor.name())
            .map(|list| list.as_ref().clone())
    }

    /// Stores the all-rows list for an entity.
    pub fn put_all(&self, descriptor: &EntityDescriptor, instances: &[EntityInstance]) {
        if descriptor.never_cache() {
            debug!(entity = descriptor.name(), "universe put rejected: never-cache entity");
            return;
        }
        self.universe
            .write()
            .insert(descriptor.name().to_string(), Arc::new(instances.to_vec()));
    }

    /// Drops every entry a write could have made stale.
    ///
    /// `current` is the post-write image (for a delete, the pre-image);
    /// `original` is the pre-write image on updates, `None` on create
    /// and delete paths, which invalidate single-sided.
    pub fn invalidate_write(
        &self,
        descriptor: &EntityDescriptor,
        current: &EntityInstance,
        original: Option<&EntityInstance>,
    ) {
        let entity = descriptor.name();

        // Any single write invalidates "all rows"; there is no cheaper
        // incremental update.
        self.universe.write().remove(entity);

        {
            let mut identity = self.identity.write();
            if let Ok(key) = current.primary_key() {
                identity.remove(&CacheKey::new(entity, &key));
            }
            if let Some(orig) = original {
                if let Ok(key) = orig.primary_key() {
                    identity.remove(&CacheKey::new(entity, &key));
                }
            }
        }

        let sets: Vec<FieldNameSet> = match self.field_sets.read().get(entity) {
            Some(sets) => sets.iter().cloned().collect(),
            None => return,
        };
        let mut filters = self.filters.write();
        for set in &sets {
            let current_key = project(entity, current, set);
            filters.remove(&current_key);
            if let Some(orig) = original {
                if set.iter().any(|f| orig.get_or_null(f) != current.get_or_null(f)) {
                    filters.remove(&project(entity, orig, set));
                }
            }
        }
    }

    /// Drops every entry for one entity, in all three stores.
    ///
    /// A clear on an entity that was never cached is a no-op.
    pub fn clear_entity(&self, entity: &str) {
        self.identity.write().retain(|key, _| key.entity != entity);
        self.filters.write().retain(|key, _| key.entity != entity);
        self.universe.write().remove(entity);
        debug!(entity, "entity cache cleared");
    }

    /// Drops every entry in all stores, for all entities.
    pub fn clear_all(&self) {
        self.identity.write().clear();
        self.filters.write().clear();
        self.universe.write().clear();
        debug!("all caches cleared");
    }

    /// The filter field-name sets registered for an entity.
    pub fn registered_field_sets(&self, entity: &str) -> Vec<FieldNameSet> {
        self.field_sets
            .read()
            .get(entity)
            .map(|sets| sets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Entry counts (identity, filter, universe), for diagnostics.
    pub fn entry_counts(&self) -> (usize, usize, usize) {
        (
            self.identity.read().len(),
            self.filters.read().len(),
            self.universe.read().len(),
        )
    }
}

/// Builds the filter-store key for one registered field-name set by
/// projecting an instance's values onto it (unset fields project as null).
fn project(entity: &str, instance: &EntityInstance, set: &FieldNameSet) -> CacheKey {
    let values: FieldValues = set
        .iter()
        .map(|f| (f.clone(), instance.get_or_null(f)))
        .collect();
    CacheKey::new(entity, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_schema::SemanticType;

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

    fn secret() -> Arc<EntityDescriptor> {
        Arc::new(
            EntityDescriptor::builder("Secret")
                .field("id", SemanticType::Id)
                .primary_key(["id"])
                .never_cache(true)
                .build()
                .unwrap(),
        )
    }

    fn instance(desc: &Arc<EntityDescriptor>, id: i64, name: &str, age: i64) -> EntityInstance {
        let mut p = EntityInstance::new(Arc::clone(desc));
        p.set("id", id).unwrap();
        p.set("name", name).unwrap();
        p.set("age", age).unwrap();
        p
    }

    fn fields(pairs: &[(&str, FieldValue)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn identity_round_trip() {
        let cache = QueryCache::new();
        let desc = person();
        let ann = instance(&desc, 1, "Ann", 30);
        cache.put_identity(&desc, &ann);

        let key = fields(&[("id", FieldValue::Integer(1))]);
        assert_eq!(cache.get_identity(&desc, &key), Some(ann));
        assert_eq!(
            cache.get_identity(&desc, &fields(&[("id", FieldValue::Integer(2))])),
            None
        );
    }

    #[test]
    fn returned_copies_are_defensive() {
        let cache = QueryCache::new();
        let desc = person();
        cache.put_identity(&desc, &instance(&desc, 1, "Ann", 30));

        let key = fields(&[("id", FieldValue::Integer(1))]);
        let mut copy = cache.get_identity(&desc, &key).unwrap();
        copy.set("name", "Mallory").unwrap();

        let fresh = cache.get_identity(&desc, &key).unwrap();
        assert_eq!(fresh.get("name"), Some(&FieldValue::Text("Ann".into())));
    }

    #[test]
    fn never_cache_rejects_puts_and_gets() {
        let cache = QueryCache::new();
        let desc = secret();
        let mut s = EntityInstance::new(Arc::clone(&desc));
        s.set("id", 1i64).unwrap();

        cache.put_identity(&desc, &s);
        cache.put_filter(&desc, &fields(&[("id", FieldValue::Integer(1))]), &[s.clone()]);
        cache.put_all(&desc, &[s]);

        assert_eq!(cache.entry_counts(), (0, 0, 0));
        assert!(cache
            .get_identity(&desc, &fields(&[("id", FieldValue::Integer(1))]))
            .is_none());
    }

    #[test]
    fn field_set_registry_deduplicates() {
        let cache = QueryCache::new();
        let desc = person();
        let by_age_30 = fields(&[("age", FieldValue::Integer(30))]);
        let by_age_31 = fields(&[("age", FieldValue::Integer(31))]);
        cache.put_filter(&desc, &by_age_30, &[]);
        cache.put_filter(&desc, &by_age_31, &[]);

        let sets = cache.registered_field_sets("Person");
        assert_eq!(sets.len(), 1);
        assert!(sets[0].contains("age"));
    }

    #[test]
    fn write_invalidates_universe_and_identity() {
        let cache = QueryCache::new();
        let desc = person();
        let ann = instance(&desc, 1, "Ann", 30);
        cache.put_identity(&desc, &ann);
        cache.put_all(&desc, &[ann.clone()]);

        cache.invalidate_write(&desc, &ann, None);
        assert_eq!(cache.entry_counts(), (0, 0, 0));
    }

    #[test]
    fn two_sided_filter_invalidation() {
        let cache = QueryCache::new();
        let desc = person();
        let before = instance(&desc, 1, "Ann", 30);
        let after = instance(&desc, 1, "Ann", 31);

        let by_30 = fields(&[("age", FieldValue::Integer(30))]);
        let by_31 = fields(&[("age", FieldValue::Integer(31))]);
        cache.put_filter(&desc, &by_30, &[before.clone()]);
        cache.put_filter(&desc, &by_31, &[]);

        cache.invalidate_write(&desc, &after, Some(&before));

        assert!(cache.get_filter(&desc, &by_30).is_none());
        assert!(cache.get_filter(&desc, &by_31).is_none());
    }

    #[test]
    fn unrelated_filter_entries_survive() {
        let cache = QueryCache::new();
        let desc = person();
        let ann = instance(&desc, 1, "Ann", 30);
        let bob = instance(&desc, 2, "Bob", 50);

        let by_30 = fields(&[("age", FieldValue::Integer(30))]);
        let by_50 = fields(&[("age", FieldValue::Integer(50))]);
        cache.put_filter(&desc, &by_30, &[ann.clone()]);
        cache.put_filter(&desc, &by_50, &[bob]);

        // Ann's write projects onto {age} as 30/31, not 50.
        let after = instance(&desc, 1, "Ann", 31);
        cache.invalidate_write(&desc, &after, Some(&ann));

        assert!(cache.get_filter(&desc, &by_30).is_none());
        assert!(cache.get_filter(&desc, &by_50).is_some());
    }

    #[test]
    fn clear_entity_is_scoped() {
        let cache = QueryCache::new();
        let person_desc = person();
        let other = Arc::new(
            EntityDescriptor::builder("Order")
                .field("id", SemanticType::Id)
                .primary_key(["id"])
                .build()
                .unwrap(),
        );
        cache.put_identity(&person_desc, &instance(&person_desc, 1, "Ann", 30));
        let mut order = EntityInstance::new(Arc::clone(&other));
        order.set("id", 7i64).unwrap();
        cache.put_identity(&other, &order);

        cache.clear_entity("Person");
        assert_eq!(cache.entry_counts(), (1, 0, 0));
        assert!(cache
            .get_identity(&other, &fields(&[("id", FieldValue::Integer(7))]))
            .is_some());
    }

    #[test]
    fn clear_uncached_entity_is_noop() {
        let cache = QueryCache::new();
        cache.clear_entity("Ghost");
        assert_eq!(cache.entry_counts(), (0, 0, 0));
    }
}
