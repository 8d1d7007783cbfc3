//! # FacetDB Core
//!
//! The FacetDB engine: condition compilation, query caching, sequence
//! allocation, and the entity delegator that ties them together over
//! partitioned statement executors.
//!
//! The delegator is the public entrypoint. A typical setup registers
//! descriptors in a [`SchemaRegistry`], wires one
//! [`StatementExecutor`](facetdb_exec::StatementExecutor) per storage
//! partition, and routes every read and write through a [`Delegator`]:
//!
//! ```
//! use facetdb_core::{Delegator, EngineConfig};
//! use facetdb_exec::MemoryExecutor;
//! use facetdb_schema::{EntityDescriptor, SchemaRegistry, SemanticType};
//! use std::sync::Arc;
//!
//! # fn main() -> facetdb_core::EngineResult<()> {
//! let registry = Arc::new(SchemaRegistry::new());
//! registry.register(
//!     EntityDescriptor::builder("person")
//!         .field("id", SemanticType::Id)
//!         .field("name", SemanticType::Text)
//!         .primary_key(["id"])
//!         .build()?,
//! );
//!
//! let engine = Delegator::builder()
//!     .registry(registry)
//!     .partition("primary", Arc::new(MemoryExecutor::new()))
//!     .config(EngineConfig::new())
//!     .build()?;
//!
//! let id = engine.next_seq("person")?;
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod condition;
mod config;
mod delegator;
mod error;
mod invalidation;
mod sequence;

pub use cache::{FieldNameSet, QueryCache};
pub use condition::{
    compile, validate, CompareOp, Comparison, CompiledCondition, Condition, JoinOp, Operand,
};
pub use config::EngineConfig;
pub use delegator::{Delegator, DelegatorBuilder};
pub use error::{EngineError, EngineResult};
pub use invalidation::{InvalidationSink, NoopInvalidationSink};
pub use sequence::SequenceAllocator;

pub use facetdb_schema::SchemaRegistry;
