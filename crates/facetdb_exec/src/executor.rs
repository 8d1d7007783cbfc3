//! Statement executor trait definition.

use crate::error::ExecResult;
use facetdb_schema::FieldValue;
use std::collections::BTreeMap;

/// One row returned by a query: column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, FieldValue>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a row from column/value pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldValue)>,
        S: Into<String>,
    {
        Self {
            columns: pairs.into_iter().map(|(c, v)| (c.into(), v)).collect(),
        }
    }

    /// Sets a column value.
    pub fn set(&mut self, column: impl Into<String>, value: FieldValue) {
        self.columns.insert(column.into(), value);
    }

    /// Reads a column value; `None` if the column is absent.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns.get(column)
    }

    /// Reads a column value, mapping absence to `Null`.
    pub fn get_or_null(&self, column: &str) -> FieldValue {
        self.columns.get(column).cloned().unwrap_or(FieldValue::Null)
    }
}

/// A forward-readable cursor over query results.
pub trait RowCursor: Send {
    /// Advances to the next row, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching the next row fails.
    fn advance(&mut self) -> ExecResult<Option<Row>>;
}

/// Opaque handle to a suspended transaction.
///
/// The transaction scope is an explicit value threaded through the code
/// that suspends and resumes it, never discovered from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxToken(u64);

impl TxToken {
    /// Wraps a raw token id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw token id.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Executes parameterized statements against one relational partition.
///
/// This is the external collaborator boundary of the engine: a
/// conventional parameterized call/response driver is assumed behind it.
/// Implementations must be safe to share across threads; transaction
/// state is per-connection, controlled through `begin`/`commit`/
/// `rollback` and detachable with `suspend`/`resume`.
///
/// # Implementors
///
/// - [`crate::MemoryExecutor`] - in-memory tables, for tests
pub trait StatementExecutor: Send + Sync {
    /// Executes a query and returns a row cursor.
    ///
    /// # Errors
    ///
    /// Returns an error on syntax, bind-count, or transport failures.
    fn query(&self, sql: &str, binds: &[FieldValue]) -> ExecResult<Box<dyn RowCursor>>;

    /// Executes a data-modification statement, returning the affected row count.
    ///
    /// # Errors
    ///
    /// Returns an error on syntax, bind-count, or transport failures.
    fn execute(&self, sql: &str, binds: &[FieldValue]) -> ExecResult<u64>;

    /// Begins a transaction on this connection.
    ///
    /// # Errors
    ///
    /// Returns `TransactionActive` if one is already open.
    fn begin(&self) -> ExecResult<()>;

    /// Commits the active transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoTransaction` if none is active.
    fn commit(&self) -> ExecResult<()>;

    /// Rolls back the active transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoTransaction` if none is active.
    fn rollback(&self) -> ExecResult<()>;

    /// Detaches the active transaction, if any, so that subsequent
    /// statements on this connection commit independently of it.
    ///
    /// Returns `None` when no transaction is active.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    fn suspend(&self) -> ExecResult<Option<TxToken>>;

    /// Re-attaches a previously suspended transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownToken` for a stale token and `TransactionActive`
    /// if another transaction was started in the meantime.
    fn resume(&self, token: TxToken) -> ExecResult<()>;

    /// Whether a transaction is currently active on this connection.
    fn in_transaction(&self) -> bool;
}

/// Drains a cursor into a vector.
///
/// # Errors
///
/// Propagates the first cursor failure.
pub fn collect_rows(mut cursor: Box<dyn RowCursor>) -> ExecResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.advance()? {
        rows.push(row);
    }
    Ok(rows)
}
