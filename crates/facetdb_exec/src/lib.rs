//! # FacetDB Exec
//!
//! The statement-execution boundary of FacetDB.
//!
//! This crate defines the collaborator contract the engine drives its
//! relational backend through: parameterized statement execution, row
//! cursors, and transaction control including suspend/resume. It also
//! ships an in-memory implementation for tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod executor;
mod memory;
mod parse;

pub use error::{ExecError, ExecResult};
pub use executor::{collect_rows, Row, RowCursor, StatementExecutor, TxToken};
pub use memory::MemoryExecutor;
