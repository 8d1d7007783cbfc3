//! Sequence bank allocator.
//!
//! Mints globally unique ascending identifiers in banks: a refill
//! reserves a contiguous range from one durable counter row per sequence
//! name, and `next` hands the range out locally without further round
//! trips. The reservation is optimistic advance-then-verify rather than
//! row-locked: advance the counter unconditionally, read it back, and
//! retry with jittered backoff when a concurrent allocator interleaved.
//! Cooperating processes sharing the counter row stay disjoint because
//! every successful verification proves this allocator owned the whole
//! advanced span.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use facetdb_exec::{collect_rows, ExecError, StatementExecutor};
use facetdb_schema::FieldValue;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SEQUENCE_TABLE: &str = "sequence_value";
const NAME_COLUMN: &str = "seq_name";
const VALUE_COLUMN: &str = "seq_value";

/// The reserved range for one sequence name: `[next, limit)`.
#[derive(Debug, Default)]
struct Bank {
    next: u64,
    limit: u64,
}

impl Bank {
    fn is_empty(&self) -> bool {
        self.next >= self.limit
    }
}

/// Allocates unique ascending identifiers from banked durable counters.
///
/// Refill for a given name is single-flight within the process: the
/// per-name mutex is held across the durable round trip. That trades
/// throughput on the refill path for simplicity; callers hitting a
/// ready bank only hold the mutex long enough to take one value.
pub struct SequenceAllocator {
    executor: Arc<dyn StatementExecutor>,
    banks: Mutex<HashMap<String, Arc<Mutex<Bank>>>>,
    bank_size: u64,
    start: u64,
    max_retries: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for SequenceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceAllocator")
            .field("bank_size", &self.bank_size)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl SequenceAllocator {
    /// Creates an allocator over the executor holding the counter table.
    pub fn new(executor: Arc<dyn StatementExecutor>, config: &EngineConfig) -> Self {
        Self {
            executor,
            banks: Mutex::new(HashMap::new()),
            bank_size: config.bank_size,
            start: config.sequence_start,
            max_retries: config.sequence_max_retries,
            retry_delay: config.sequence_retry_delay,
        }
    }

    /// Returns the next identifier for the named sequence.
    ///
    /// Values are strictly increasing per name and never repeated for
    /// the life of the durable counter, across all cooperating
    /// processes. Any ambient transaction on the executor is suspended
    /// around the refill round trip so the counter advance commits
    /// immediately, and resumed before this returns, success or failure.
    ///
    /// # Errors
    ///
    /// `Allocation` when the refill retry ceiling is exceeded,
    /// `DataSource` when the durable store is unreachable.
    pub fn next(&self, name: &str) -> EngineResult<u64> {
        let bank = {
            let mut banks = self.banks.lock();
            Arc::clone(banks.entry(name.to_string()).or_default())
        };
        let mut bank = bank.lock();
        if bank.is_empty() {
            self.refill(name, &mut bank)?;
        }
        let value = bank.next;
        bank.next += 1;
        Ok(value)
    }

    /// Refills the bank, leaving it empty on failure (no partial range).
    fn refill(&self, name: &str, bank: &mut Bank) -> EngineResult<()> {
        let suspended = self.executor.suspend()?;
        let result = self.reserve_range(name);
        if let Some(token) = suspended {
            self.executor.resume(token)?;
        }
        match result {
            Ok((low, high)) => {
                bank.next = low;
                bank.limit = high;
                debug!(sequence = name, low, high, "sequence bank refilled");
                Ok(())
            }
            Err(e) => {
                bank.next = 0;
                bank.limit = 0;
                Err(e)
            }
        }
    }

    /// One advance-then-verify reservation, with bounded retries.
    fn reserve_range(&self, name: &str) -> EngineResult<(u64, u64)> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if attempts > self.max_retries {
                return Err(EngineError::allocation(name, attempts - 1));
            }

            let Some(v1) = self.read_counter(name)? else {
                // First use of this name anywhere: seed the row and retry
                // from the read. A racing seeder's row bounces our insert
                // off the primary key; the re-read then finds it.
                match self.insert_counter(name) {
                    Ok(()) | Err(EngineError::DataSource(ExecError::Duplicate { .. })) => {}
                    Err(e) => return Err(e),
                }
                continue;
            };

            self.executor.execute(
                &format!(
                    "UPDATE {SEQUENCE_TABLE} SET {VALUE_COLUMN} = {VALUE_COLUMN} + ? WHERE {NAME_COLUMN} = ?"
                ),
                &[
                    FieldValue::Integer(self.bank_size as i64),
                    FieldValue::Text(name.to_string()),
                ],
            )?;

            let v2 = self.read_counter(name)?.ok_or_else(|| {
                EngineError::DataSource(ExecError::connection(format!(
                    "sequence row for {name} vanished during refill"
                )))
            })?;

            if v2 == v1 + self.bank_size {
                return Ok((v1, v2));
            }

            // Another allocator interleaved between our read and verify.
            // The advanced span is abandoned (a gap, never a duplicate).
            warn!(
                sequence = name,
                attempt = attempts,
                expected = v1 + self.bank_size,
                observed = v2,
                "sequence refill collision, backing off"
            );
            self.backoff();
        }
    }

    fn read_counter(&self, name: &str) -> EngineResult<Option<u64>> {
        let cursor = self.executor.query(
            &format!("SELECT {VALUE_COLUMN} FROM {SEQUENCE_TABLE} WHERE {NAME_COLUMN} = ?"),
            &[FieldValue::Text(name.to_string())],
        )?;
        let rows = collect_rows(cursor)?;
        match rows.first() {
            Some(row) => {
                let value = row.get(VALUE_COLUMN).and_then(FieldValue::as_integer).ok_or_else(
                    || {
                        EngineError::DataSource(ExecError::connection(format!(
                            "sequence row for {name} holds a non-integer counter"
                        )))
                    },
                )?;
                Ok(Some(value as u64))
            }
            None => Ok(None),
        }
    }

    fn insert_counter(&self, name: &str) -> EngineResult<()> {
        self.executor.execute(
            &format!(
                "INSERT INTO {SEQUENCE_TABLE} ({NAME_COLUMN}, {VALUE_COLUMN}) VALUES (?, ?)"
            ),
            &[
                FieldValue::Text(name.to_string()),
                FieldValue::Integer(self.start as i64),
            ],
        )?;
        Ok(())
    }

    fn backoff(&self) {
        let max = self.retry_delay.as_millis() as u64;
        if max == 0 {
            return;
        }
        let jitter = rand::thread_rng().gen_range(1..=max);
        std::thread::sleep(Duration::from_millis(jitter));
    }
}
