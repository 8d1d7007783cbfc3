//! Cache invalidation fan-out.
//!
//! The delegator invalidates its own [`crate::QueryCache`] directly; the
//! sink is the seam for propagating the same events further, for example
//! to peer processes sharing the durable store.

use facetdb_schema::EntityInstance;

/// Receives cache invalidation events emitted by the delegator.
///
/// Implementations must be cheap and infallible: the write that caused
/// the event has already been applied, so a sink cannot veto it.
pub trait InvalidationSink: Send + Sync {
    /// A single instance was created, updated, or deleted.
    ///
    /// `current` is the written image (for a delete, the image that was
    /// removed) and `original` the pre-write image when the write
    /// replaced one. Carrying whole images lets a remote process project
    /// the same candidate cache keys this process dropped, against
    /// whatever field sets its own cache has registered.
    fn instance_changed(&self, current: &EntityInstance, original: Option<&EntityInstance>);

    /// Every cached result for the entity was dropped.
    fn entity_cleared(&self, entity: &str);

    /// All caches were dropped.
    fn all_cleared(&self);
}

/// Sink that discards every event. The default when no distribution
/// layer is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidationSink;

impl InvalidationSink for NoopInvalidationSink {
    fn instance_changed(&self, _current: &EntityInstance, _original: Option<&EntityInstance>) {}

    fn entity_cleared(&self, _entity: &str) {}

    fn all_cleared(&self) {}
}
