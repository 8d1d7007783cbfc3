//! Entity delegator.
//!
//! Thin orchestration over the other subsystems: validates and compiles
//! conditions, probes the query cache, falls through to the statement
//! executor of the entity's partition, wraps rows as instances, and
//! performs cache invalidation on every write path. Cache probes and
//! populates never fail a caller operation.

use crate::cache::QueryCache;
use crate::condition::{compile, validate, CompiledCondition, Condition};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::invalidation::{InvalidationSink, NoopInvalidationSink};
use crate::sequence::SequenceAllocator;
use facetdb_exec::{collect_rows, Row, StatementExecutor};
use facetdb_schema::{
    EntityDescriptor, EntityInstance, FieldValue, FieldValues, SchemaRegistry,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds a [`Delegator`] from its collaborators.
#[derive(Default)]
pub struct DelegatorBuilder {
    registry: Option<Arc<SchemaRegistry>>,
    partitions: HashMap<String, Arc<dyn StatementExecutor>>,
    sink: Option<Arc<dyn InvalidationSink>>,
    config: EngineConfig,
}

impl DelegatorBuilder {
    /// Starts an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: None,
            partitions: HashMap::new(),
            sink: None,
            config: EngineConfig::default(),
        }
    }

    /// Sets the schema registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Registers the executor serving one named storage partition.
    #[must_use]
    pub fn partition(
        mut self,
        name: impl Into<String>,
        executor: Arc<dyn StatementExecutor>,
    ) -> Self {
        self.partitions.insert(name.into(), executor);
        self
    }

    /// Sets the invalidation sink. Defaults to [`NoopInvalidationSink`].
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn InvalidationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the delegator.
    ///
    /// # Errors
    ///
    /// `Validation` when no registry was supplied or the configured
    /// sequence partition has no registered executor.
    pub fn build(self) -> EngineResult<Delegator> {
        let registry = self
            .registry
            .ok_or_else(|| EngineError::validation("delegator requires a schema registry"))?;
        let sequence_executor = self
            .partitions
            .get(&self.config.sequence_partition)
            .cloned()
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "no executor registered for sequence partition {}",
                    self.config.sequence_partition
                ))
            })?;
        let sequences = SequenceAllocator::new(sequence_executor, &self.config);
        Ok(Delegator {
            registry,
            partitions: self.partitions,
            cache: QueryCache::new(),
            sequences,
            sink: self
                .sink
                .unwrap_or_else(|| Arc::new(NoopInvalidationSink)),
            config: self.config,
        })
    }
}

/// Orchestrates entity reads and writes over partitioned executors.
pub struct Delegator {
    registry: Arc<SchemaRegistry>,
    partitions: HashMap<String, Arc<dyn StatementExecutor>>,
    cache: QueryCache,
    sequences: SequenceAllocator,
    sink: Arc<dyn InvalidationSink>,
    config: EngineConfig,
}

impl std::fmt::Debug for Delegator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delegator")
            .field("partitions", &self.partitions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Delegator {
    /// Starts building a delegator.
    #[must_use]
    pub fn builder() -> DelegatorBuilder {
        DelegatorBuilder::new()
    }

    /// The query cache, exposed for inspection.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Looks up one instance by its full primary key.
    ///
    /// The key must name exactly the descriptor's primary-key fields, no
    /// more and no fewer.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-exact key set, `NotFound` when no row
    /// matches.
    pub fn find_by_primary_key(
        &self,
        entity: &str,
        key: &FieldValues,
    ) -> EngineResult<EntityInstance> {
        let descriptor = self.registry.describe(entity)?;
        self.require_exact_key(&descriptor, key)?;

        if let Some(hit) = self.cache.get_identity(&descriptor, key) {
            return Ok(hit);
        }

        let compiled = compile(&Condition::field_map(key.clone()), &descriptor)?;
        let rows = self.select(&descriptor, &compiled)?;
        let instance = rows
            .first()
            .map(|row| instance_from_row(&descriptor, row))
            .ok_or_else(|| EngineError::not_found(entity, render_key(key)))?;

        self.cache.put_identity(&descriptor, &instance);
        Ok(instance)
    }

    /// Finds all instances matching an exact field-to-value filter.
    ///
    /// Results are served from the filter store when present; a populate
    /// registers the filter's field-name set for later invalidation.
    pub fn find_by_filter(
        &self,
        entity: &str,
        fields: &FieldValues,
    ) -> EngineResult<Vec<EntityInstance>> {
        let descriptor = self.registry.describe(entity)?;

        if let Some(hit) = self.cache.get_filter(&descriptor, fields) {
            return Ok(hit);
        }

        let compiled = compile(&Condition::field_map(fields.clone()), &descriptor)?;
        let instances = self.select_instances(&descriptor, &compiled)?;
        self.cache.put_filter(&descriptor, fields, &instances);
        Ok(instances)
    }

    /// Returns every instance of the entity, via the universe store.
    pub fn find_all(&self, entity: &str) -> EngineResult<Vec<EntityInstance>> {
        let descriptor = self.registry.describe(entity)?;

        if let Some(hit) = self.cache.get_all(&descriptor) {
            return Ok(hit);
        }

        let instances = self.select_instances(&descriptor, &CompiledCondition::empty())?;
        self.cache.put_all(&descriptor, &instances);
        Ok(instances)
    }

    /// Finds instances matching an arbitrary condition tree.
    ///
    /// Uncached: the filter store keys only exact field-value sets.
    pub fn find_by_condition(
        &self,
        entity: &str,
        condition: &Condition,
    ) -> EngineResult<Vec<EntityInstance>> {
        let descriptor = self.registry.describe(entity)?;
        validate(condition, &descriptor)?;
        let compiled = compile(condition, &descriptor)?;
        self.select_instances(&descriptor, &compiled)
    }

    /// Inserts a new instance.
    ///
    /// All declared columns are written, unset fields as NULL. When the
    /// descriptor carries a version stamp and the instance does not, the
    /// stamp starts at 1. Returns the stored image.
    ///
    /// # Errors
    ///
    /// `Validation` when the primary key is incomplete.
    pub fn create(&self, instance: &EntityInstance) -> EngineResult<EntityInstance> {
        let descriptor = Arc::clone(instance.descriptor());
        let mut stored = instance.clone();
        if let Some(vf) = descriptor.version_field() {
            if stored.get(vf).is_none() {
                stored.set(vf, 1i64)?;
            }
        }
        stored
            .primary_key()
            .map_err(|_| EngineError::validation("create requires the full primary key"))?;

        let columns: Vec<&str> = descriptor.fields().iter().map(|f| f.column.as_str()).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            descriptor.table(),
            columns.join(", "),
            placeholders
        );
        let binds: Vec<FieldValue> = descriptor
            .fields()
            .iter()
            .map(|f| stored.get_or_null(&f.name))
            .collect();
        self.executor_for(&descriptor)?.execute(&sql, &binds)?;

        debug!(entity = descriptor.name(), "created instance");
        self.cache.invalidate_write(&descriptor, &stored, None);
        self.sink.instance_changed(&stored, None);
        Ok(stored)
    }

    /// Updates an existing instance by its primary key.
    ///
    /// Only the non-key fields present on `instance` are written. When
    /// the descriptor carries a version stamp the update is optimistic:
    /// the stamp the caller holds (or, if unset, the stored one) must
    /// still match, and the stored stamp is advanced by one. Returns the
    /// post-write image.
    ///
    /// # Errors
    ///
    /// `Validation` when the key is incomplete or no fields are set,
    /// `NotFound` when the row does not exist, `Constraint` when the
    /// version stamp has moved.
    pub fn update(&self, instance: &EntityInstance) -> EngineResult<EntityInstance> {
        let descriptor = Arc::clone(instance.descriptor());
        let key = instance
            .primary_key()
            .map_err(|_| EngineError::validation("update requires the full primary key"))?;

        let original = self
            .read_by_key(&descriptor, &key)?
            .ok_or_else(|| EngineError::not_found(descriptor.name(), render_key(&key)))?;

        let set_fields: Vec<&str> = descriptor
            .fields()
            .iter()
            .filter(|f| {
                !descriptor.is_primary_key(&f.name)
                    && descriptor.version_field() != Some(f.name.as_str())
                    && instance.get(&f.name).is_some()
            })
            .map(|f| f.name.as_str())
            .collect();
        if set_fields.is_empty() {
            return Err(EngineError::validation("update sets no fields"));
        }

        let mut sets: Vec<String> = Vec::new();
        let mut binds: Vec<FieldValue> = Vec::new();
        for field in &set_fields {
            let column = &descriptor.require_field(field)?.column;
            sets.push(format!("{column} = ?"));
            binds.push(instance.get_or_null(field));
        }

        let expected = match descriptor.version_field() {
            Some(vf) => {
                let held = instance
                    .get(vf)
                    .or_else(|| original.get(vf))
                    .and_then(FieldValue::as_integer)
                    .unwrap_or(0);
                let column = &descriptor.require_field(vf)?.column;
                sets.push(format!("{column} = ?"));
                binds.push(FieldValue::Integer(held + 1));
                Some((vf.to_string(), column.clone(), held))
            }
            None => None,
        };

        let filter = compile(&Condition::field_map(key.clone()), &descriptor)?;
        let mut where_clause = filter.clause.clone();
        binds.extend(filter.binds.iter().cloned());
        if let Some((_, column, held)) = &expected {
            where_clause.push_str(&format!(" AND {column} = ?"));
            binds.push(FieldValue::Integer(*held));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            descriptor.table(),
            sets.join(", "),
            where_clause
        );
        let affected = self.executor_for(&descriptor)?.execute(&sql, &binds)?;

        if affected == 0 {
            // Distinguish a moved version stamp from a vanished row.
            return match self.read_by_key(&descriptor, &key)? {
                Some(_) => {
                    let held = expected.as_ref().map_or(0, |(_, _, held)| *held);
                    Err(EngineError::constraint(descriptor.name(), held))
                }
                None => Err(EngineError::not_found(descriptor.name(), render_key(&key))),
            };
        }

        let mut post = original.merged(instance);
        if let Some((vf, _, held)) = &expected {
            post.set(vf, held + 1)?;
        }

        debug!(entity = descriptor.name(), "updated instance");
        self.cache.invalidate_write(&descriptor, &post, Some(&original));
        self.sink.instance_changed(&post, Some(&original));
        Ok(post)
    }

    /// Deletes one instance by its full primary key.
    ///
    /// # Errors
    ///
    /// `NotFound` when no row matches the key.
    pub fn delete(&self, entity: &str, key: &FieldValues) -> EngineResult<()> {
        let descriptor = self.registry.describe(entity)?;
        self.require_exact_key(&descriptor, key)?;

        let original = self
            .read_by_key(&descriptor, key)?
            .ok_or_else(|| EngineError::not_found(entity, render_key(key)))?;

        let filter = compile(&Condition::field_map(key.clone()), &descriptor)?;
        let sql = format!("DELETE FROM {} WHERE {}", descriptor.table(), filter.clause);
        self.executor_for(&descriptor)?.execute(&sql, &filter.binds)?;

        debug!(entity, "deleted instance");
        self.cache.invalidate_write(&descriptor, &original, None);
        self.sink.instance_changed(&original, None);
        Ok(())
    }

    /// Stores a batch of instances, creating or updating each by key.
    ///
    /// The batch runs inside one transaction per affected partition. A
    /// transaction is begun only on partitions with none already active,
    /// committed only if this call began it, and every begun transaction
    /// is rolled back before the first failure propagates.
    pub fn store_all(&self, instances: &[EntityInstance]) -> EngineResult<usize> {
        if instances.is_empty() {
            return Ok(0);
        }

        let mut begun: Vec<Arc<dyn StatementExecutor>> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        for instance in instances {
            let descriptor = instance.descriptor();
            let partition = self.partition_name(descriptor);
            if seen.iter().any(|p| p == &partition) {
                continue;
            }
            let executor = self.executor_for(descriptor)?;
            if !executor.in_transaction() {
                executor.begin()?;
                begun.push(Arc::clone(executor));
            }
            seen.push(partition);
        }

        let result = self.store_each(instances);
        match result {
            Ok(count) => {
                for (index, executor) in begun.iter().enumerate() {
                    if let Err(e) = executor.commit() {
                        warn!(partitions = begun.len(), "batch commit failed, rolling back");
                        // The failed partition may still hold its transaction
                        // open; roll it and every uncommitted one back so the
                        // executors are reusable after the error.
                        for open in &begun[index..] {
                            let _ = open.rollback();
                        }
                        return Err(e.into());
                    }
                }
                Ok(count)
            }
            Err(e) => {
                warn!(partitions = begun.len(), "batch store failed, rolling back");
                for executor in &begun {
                    // Rollback failures are secondary to the original error.
                    let _ = executor.rollback();
                }
                Err(e)
            }
        }
    }

    /// Allocates the next identifier for the named sequence.
    pub fn next_seq(&self, name: &str) -> EngineResult<u64> {
        self.sequences.next(name)
    }

    /// Drops every cached result for one entity and notifies the sink.
    pub fn clear_cache(&self, entity: &str) {
        self.cache.clear_entity(entity);
        self.sink.entity_cleared(entity);
    }

    /// Drops every cached result and notifies the sink.
    pub fn clear_all_caches(&self) {
        self.cache.clear_all();
        self.sink.all_cleared();
    }

    fn store_each(&self, instances: &[EntityInstance]) -> EngineResult<usize> {
        let mut count = 0;
        for instance in instances {
            let descriptor = instance.descriptor();
            let key = instance
                .primary_key()
                .map_err(|_| EngineError::validation("store requires the full primary key"))?;
            if self.read_by_key(descriptor, &key)?.is_some() {
                self.update(instance)?;
            } else {
                self.create(instance)?;
            }
            count += 1;
        }
        Ok(count)
    }

    fn require_exact_key(
        &self,
        descriptor: &EntityDescriptor,
        key: &FieldValues,
    ) -> EngineResult<()> {
        let pk = descriptor.primary_key();
        if key.len() == pk.len() && pk.iter().all(|f| key.contains_key(f)) {
            Ok(())
        } else {
            Err(EngineError::validation(format!(
                "lookup on {} requires exactly the primary key fields [{}]",
                descriptor.name(),
                pk.join(", ")
            )))
        }
    }

    fn partition_name(&self, descriptor: &EntityDescriptor) -> String {
        if self.partitions.contains_key(descriptor.partition()) {
            descriptor.partition().to_string()
        } else {
            self.config.default_partition.clone()
        }
    }

    fn executor_for(
        &self,
        descriptor: &EntityDescriptor,
    ) -> EngineResult<&Arc<dyn StatementExecutor>> {
        self.partitions
            .get(descriptor.partition())
            .or_else(|| self.partitions.get(&self.config.default_partition))
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "no executor registered for partition {}",
                    descriptor.partition()
                ))
            })
    }

    fn read_by_key(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        key: &FieldValues,
    ) -> EngineResult<Option<EntityInstance>> {
        let compiled = compile(&Condition::field_map(key.clone()), descriptor)?;
        let rows = self.select(descriptor, &compiled)?;
        Ok(rows.first().map(|row| instance_from_row(descriptor, row)))
    }

    fn select(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        compiled: &CompiledCondition,
    ) -> EngineResult<Vec<Row>> {
        let mut sql = format!(
            "SELECT {} FROM {}",
            descriptor.column_list(),
            descriptor.table()
        );
        if !compiled.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&compiled.clause);
        }
        let cursor = self.executor_for(descriptor)?.query(&sql, &compiled.binds)?;
        Ok(collect_rows(cursor)?)
    }

    fn select_instances(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        compiled: &CompiledCondition,
    ) -> EngineResult<Vec<EntityInstance>> {
        let rows = self.select(descriptor, compiled)?;
        Ok(rows
            .iter()
            .map(|row| instance_from_row(descriptor, row))
            .collect())
    }
}

fn instance_from_row(descriptor: &Arc<EntityDescriptor>, row: &Row) -> EntityInstance {
    EntityInstance::from_columns(Arc::clone(descriptor), |column| row.get(column).cloned())
}

fn render_key(key: &FieldValues) -> String {
    let parts: Vec<String> = key.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("[{}]", parts.join(", "))
}
