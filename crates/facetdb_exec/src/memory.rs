//! In-memory statement executor for testing.

use crate::error::{ExecError, ExecResult};
use crate::executor::{Row, RowCursor, StatementExecutor, TxToken};
use crate::parse::{self, MemRow, ParsedStatement, SetValue, Statement};
use facetdb_schema::FieldValue;
use parking_lot::Mutex;
use std::collections::HashMap;

/// An in-memory statement executor for testing.
///
/// Tables are plain row vectors guarded by one mutex; each statement is
/// atomic. Only the statement shapes the engine emits are supported (see
/// the parse module). Transaction semantics are deliberately simple:
/// writes are visible immediately (read-uncommitted) and rollback
/// restores a first-touch snapshot of each table the transaction wrote.
/// `suspend` shelves the whole undo state, so statements executed while
/// suspended auto-commit and survive a later rollback of the resumed
/// transaction, which is the behavior the sequence allocator's refill
/// depends on.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<MemRow>>,
    active: Option<TxUndo>,
    suspended: HashMap<u64, TxUndo>,
    next_token: u64,
}

/// First-touch table snapshots for the active transaction.
#[derive(Debug, Default)]
struct TxUndo {
    saved: HashMap<String, Vec<MemRow>>,
}

impl MemoryState {
    /// Records the pre-image of a table before the active transaction
    /// first writes it.
    fn touch(&mut self, table: &str) {
        if let Some(undo) = self.active.as_mut() {
            if !undo.saved.contains_key(table) {
                let snapshot = self.tables.get(table).cloned().unwrap_or_default();
                undo.saved.insert(table.to_string(), snapshot);
            }
        }
    }
}

impl MemoryExecutor {
    /// Creates an empty executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row directly into a table, bypassing statement parsing.
    pub fn insert_row<I, S>(&self, table: &str, pairs: I)
    where
        I: IntoIterator<Item = (S, FieldValue)>,
        S: Into<String>,
    {
        let row: MemRow = pairs.into_iter().map(|(c, v)| (c.into(), v)).collect();
        let mut state = self.state.lock();
        state.tables.entry(table.to_string()).or_default().push(row);
    }

    /// Number of rows currently in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map_or(0, |rows| rows.len())
    }

    fn parse_checked(sql: &str, binds: &[FieldValue]) -> ExecResult<ParsedStatement> {
        let parsed = parse::parse_statement(sql)?;
        if parsed.placeholders != binds.len() {
            return Err(ExecError::BindCount {
                expected: parsed.placeholders,
                actual: binds.len(),
            });
        }
        Ok(parsed)
    }
}

/// Cursor over materialized result rows.
struct MemoryCursor {
    rows: std::vec::IntoIter<Row>,
}

impl RowCursor for MemoryCursor {
    fn advance(&mut self) -> ExecResult<Option<Row>> {
        Ok(self.rows.next())
    }
}

impl StatementExecutor for MemoryExecutor {
    fn query(&self, sql: &str, binds: &[FieldValue]) -> ExecResult<Box<dyn RowCursor>> {
        let parsed = Self::parse_checked(sql, binds)?;
        let Statement::Select {
            columns,
            table,
            filter,
        } = parsed.statement
        else {
            return Err(ExecError::syntax("query expects a SELECT statement"));
        };

        let state = self.state.lock();
        let empty = Vec::new();
        let rows = state.tables.get(&table).unwrap_or(&empty);
        let mut out = Vec::new();
        for row in rows {
            let selected = match &filter {
                Some(expr) => parse::eval(expr, row, binds),
                None => true,
            };
            if selected {
                out.push(Row::from_pairs(columns.iter().map(|c| {
                    (
                        c.clone(),
                        row.get(c).cloned().unwrap_or(FieldValue::Null),
                    )
                })));
            }
        }
        tracing::trace!(table = %table, rows = out.len(), "memory select");
        Ok(Box::new(MemoryCursor {
            rows: out.into_iter(),
        }))
    }

    fn execute(&self, sql: &str, binds: &[FieldValue]) -> ExecResult<u64> {
        let parsed = Self::parse_checked(sql, binds)?;
        let mut state = self.state.lock();
        match parsed.statement {
            Statement::Select { .. } => Err(ExecError::syntax(
                "execute does not accept SELECT statements",
            )),
            Statement::Insert {
                table,
                columns,
                binds: indices,
            } => {
                state.touch(&table);
                let mut row = MemRow::new();
                for (column, index) in columns.into_iter().zip(indices) {
                    let value = binds[index].clone();
                    if !value.is_null() {
                        row.insert(column, value);
                    }
                }
                state.tables.entry(table).or_default().push(row);
                Ok(1)
            }
            Statement::Update {
                table,
                sets,
                filter,
            } => {
                state.touch(&table);
                let rows = state.tables.entry(table).or_default();
                let mut affected = 0u64;
                for row in rows.iter_mut() {
                    let selected = match &filter {
                        Some(expr) => parse::eval(expr, row, binds),
                        None => true,
                    };
                    if !selected {
                        continue;
                    }
                    for (column, set) in &sets {
                        match set {
                            SetValue::Bind(index) => {
                                let value = binds[*index].clone();
                                if value.is_null() {
                                    row.remove(column);
                                } else {
                                    row.insert(column.clone(), value);
                                }
                            }
                            SetValue::Increment(index) => {
                                let delta = binds[*index].as_integer().ok_or_else(|| {
                                    ExecError::syntax("increment requires an integer bind")
                                })?;
                                let current = row
                                    .get(column)
                                    .and_then(FieldValue::as_integer)
                                    .unwrap_or(0);
                                row.insert(column.clone(), FieldValue::Integer(current + delta));
                            }
                        }
                    }
                    affected += 1;
                }
                Ok(affected)
            }
            Statement::Delete { table, filter } => {
                state.touch(&table);
                let rows = state.tables.entry(table).or_default();
                let before = rows.len();
                rows.retain(|row| match &filter {
                    Some(expr) => !parse::eval(expr, row, binds),
                    None => false,
                });
                Ok((before - rows.len()) as u64)
            }
        }
    }

    fn begin(&self) -> ExecResult<()> {
        let mut state = self.state.lock();
        if state.active.is_some() {
            return Err(ExecError::TransactionActive);
        }
        state.active = Some(TxUndo::default());
        Ok(())
    }

    fn commit(&self) -> ExecResult<()> {
        let mut state = self.state.lock();
        state.active.take().ok_or(ExecError::NoTransaction)?;
        Ok(())
    }

    fn rollback(&self) -> ExecResult<()> {
        let mut state = self.state.lock();
        let undo = state.active.take().ok_or(ExecError::NoTransaction)?;
        for (table, snapshot) in undo.saved {
            state.tables.insert(table, snapshot);
        }
        Ok(())
    }

    fn suspend(&self) -> ExecResult<Option<TxToken>> {
        let mut state = self.state.lock();
        match state.active.take() {
            Some(undo) => {
                state.next_token += 1;
                let token = TxToken::new(state.next_token);
                state.suspended.insert(token.id(), undo);
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    fn resume(&self, token: TxToken) -> ExecResult<()> {
        let mut state = self.state.lock();
        let undo = state
            .suspended
            .remove(&token.id())
            .ok_or(ExecError::UnknownToken(token.id()))?;
        if state.active.is_some() {
            // Put it back so the caller can retry after resolving.
            state.suspended.insert(token.id(), undo);
            return Err(ExecError::TransactionActive);
        }
        state.active = Some(undo);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::collect_rows;

    fn seeded() -> MemoryExecutor {
        let exec = MemoryExecutor::new();
        exec.insert_row(
            "person",
            [
                ("id", FieldValue::Integer(1)),
                ("name", FieldValue::Text("Ann".into())),
                ("age", FieldValue::Integer(30)),
            ],
        );
        exec.insert_row(
            "person",
            [
                ("id", FieldValue::Integer(2)),
                ("name", FieldValue::Text("Bob".into())),
                ("age", FieldValue::Integer(41)),
            ],
        );
        exec
    }

    #[test]
    fn select_with_filter() {
        let exec = seeded();
        let cursor = exec
            .query(
                "SELECT id, name FROM person WHERE age = ?",
                &[FieldValue::Integer(30)],
            )
            .unwrap();
        let rows = collect_rows(cursor).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&FieldValue::Integer(1)));
        assert_eq!(rows[0].get("name"), Some(&FieldValue::Text("Ann".into())));
    }

    #[test]
    fn insert_update_delete() {
        let exec = seeded();
        let inserted = exec
            .execute(
                "INSERT INTO person (id, name, age) VALUES (?, ?, ?)",
                &[
                    FieldValue::Integer(3),
                    FieldValue::Text("Cid".into()),
                    FieldValue::Integer(20),
                ],
            )
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(exec.row_count("person"), 3);

        let updated = exec
            .execute(
                "UPDATE person SET age = ? WHERE id = ?",
                &[FieldValue::Integer(21), FieldValue::Integer(3)],
            )
            .unwrap();
        assert_eq!(updated, 1);

        let deleted = exec
            .execute("DELETE FROM person WHERE id = ?", &[FieldValue::Integer(3)])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(exec.row_count("person"), 2);
    }

    #[test]
    fn bind_count_mismatch() {
        let exec = seeded();
        let err = exec
            .query("SELECT id FROM person WHERE age = ?", &[])
            .err()
            .unwrap();
        assert_eq!(
            err,
            ExecError::BindCount {
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn null_bind_unsets_column() {
        let exec = seeded();
        exec.execute(
            "UPDATE person SET age = ? WHERE id = ?",
            &[FieldValue::Null, FieldValue::Integer(1)],
        )
        .unwrap();
        let rows = collect_rows(
            exec.query(
                "SELECT age FROM person WHERE id = ?",
                &[FieldValue::Integer(1)],
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(rows[0].get_or_null("age"), FieldValue::Null);
    }

    #[test]
    fn rollback_restores_touched_tables() {
        let exec = seeded();
        exec.begin().unwrap();
        exec.execute("DELETE FROM person", &[]).unwrap();
        assert_eq!(exec.row_count("person"), 0);
        exec.rollback().unwrap();
        assert_eq!(exec.row_count("person"), 2);
    }

    #[test]
    fn commit_keeps_changes() {
        let exec = seeded();
        exec.begin().unwrap();
        exec.execute("DELETE FROM person WHERE id = ?", &[FieldValue::Integer(1)])
            .unwrap();
        exec.commit().unwrap();
        assert_eq!(exec.row_count("person"), 1);
    }

    #[test]
    fn only_one_transaction_at_a_time() {
        let exec = seeded();
        exec.begin().unwrap();
        assert_eq!(exec.begin(), Err(ExecError::TransactionActive));
        exec.rollback().unwrap();
        assert_eq!(exec.commit(), Err(ExecError::NoTransaction));
    }

    #[test]
    fn suspended_writes_survive_rollback() {
        let exec = seeded();
        exec.begin().unwrap();
        exec.execute("DELETE FROM person WHERE id = ?", &[FieldValue::Integer(1)])
            .unwrap();

        // Work done while suspended auto-commits.
        let token = exec.suspend().unwrap().unwrap();
        assert!(!exec.in_transaction());
        exec.insert_row("sequence_value", [
            ("seq_name", FieldValue::Text("orders".into())),
            ("seq_value", FieldValue::Integer(100)),
        ]);
        exec.execute(
            "UPDATE sequence_value SET seq_value = seq_value + ? WHERE seq_name = ?",
            &[FieldValue::Integer(50), FieldValue::Text("orders".into())],
        )
        .unwrap();

        exec.resume(token).unwrap();
        assert!(exec.in_transaction());
        exec.rollback().unwrap();

        // The caller's delete is undone, the suspended-interval advance is not.
        assert_eq!(exec.row_count("person"), 2);
        let rows = collect_rows(
            exec.query(
                "SELECT seq_value FROM sequence_value WHERE seq_name = ?",
                &[FieldValue::Text("orders".into())],
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(rows[0].get("seq_value"), Some(&FieldValue::Integer(150)));
    }

    #[test]
    fn suspend_without_transaction() {
        let exec = seeded();
        assert_eq!(exec.suspend().unwrap(), None);
        assert!(matches!(
            exec.resume(TxToken::new(99)),
            Err(ExecError::UnknownToken(99))
        ));
    }
}
