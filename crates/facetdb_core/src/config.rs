//! Engine configuration.

use std::time::Duration;

/// Configuration for constructing a [`crate::Delegator`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Partition entities map to when their descriptor names none.
    pub default_partition: String,

    /// Partition holding the durable sequence counter table.
    pub sequence_partition: String,

    /// How many identifiers one refill reserves from the durable counter.
    pub bank_size: u64,

    /// Starting value written when a sequence row does not exist yet.
    pub sequence_start: u64,

    /// How many refill attempts to make before reporting allocation failure.
    pub sequence_max_retries: u32,

    /// Upper bound of the random backoff between refill attempts.
    pub sequence_retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_partition: "primary".to_string(),
            sequence_partition: "primary".to_string(),
            bank_size: 100,
            sequence_start: 10_000,
            sequence_max_retries: 5,
            sequence_retry_delay: Duration::from_millis(20),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default partition name.
    #[must_use]
    pub fn default_partition(mut self, name: impl Into<String>) -> Self {
        self.default_partition = name.into();
        self
    }

    /// Sets the partition holding the sequence counter table.
    #[must_use]
    pub fn sequence_partition(mut self, name: impl Into<String>) -> Self {
        self.sequence_partition = name.into();
        self
    }

    /// Sets the sequence bank size.
    #[must_use]
    pub const fn bank_size(mut self, size: u64) -> Self {
        self.bank_size = size;
        self
    }

    /// Sets the starting value for new sequence rows.
    #[must_use]
    pub const fn sequence_start(mut self, start: u64) -> Self {
        self.sequence_start = start;
        self
    }

    /// Sets the refill retry ceiling.
    #[must_use]
    pub const fn sequence_max_retries(mut self, retries: u32) -> Self {
        self.sequence_max_retries = retries;
        self
    }

    /// Sets the refill backoff ceiling.
    #[must_use]
    pub const fn sequence_retry_delay(mut self, delay: Duration) -> Self {
        self.sequence_retry_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.default_partition, "primary");
        assert_eq!(config.bank_size, 100);
        assert_eq!(config.sequence_start, 10_000);
        assert_eq!(config.sequence_max_retries, 5);
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::new()
            .bank_size(10)
            .sequence_start(1)
            .sequence_max_retries(2)
            .sequence_retry_delay(Duration::from_millis(1))
            .sequence_partition("audit");
        assert_eq!(config.bank_size, 10);
        assert_eq!(config.sequence_start, 1);
        assert_eq!(config.sequence_partition, "audit");
    }
}
