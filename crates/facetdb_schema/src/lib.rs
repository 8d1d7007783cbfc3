//! # FacetDB Schema
//!
//! Value model and entity metadata for FacetDB.
//!
//! This crate provides:
//! - `FieldValue`, the dynamic typed cell stored in entity instances
//! - Entity descriptors (fields, column mappings, primary keys)
//! - `EntityInstance`, a schema-validated record bound to a descriptor
//! - `SchemaRegistry`, the process-wide descriptor registry

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod descriptor;
mod error;
mod instance;
mod registry;
mod value;

pub use descriptor::{DescriptorBuilder, EntityDescriptor, FieldDescriptor, SemanticType};
pub use error::{SchemaError, SchemaResult};
pub use instance::{EntityInstance, FieldValues};
pub use registry::SchemaRegistry;
pub use value::FieldValue;
