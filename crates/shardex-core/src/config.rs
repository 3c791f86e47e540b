//! Runtime tuning for index maintenance.
//!
//! Loaded from TOML; every key is optional and falls back to its default.

use crate::error::{ErrorOrigin, InternalError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

///
/// IndexConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    pub default_max_entries_per_bucket: usize,
    pub partitions_per_index: u32,
    pub lazy_update_delay_ms: u64,
    pub workflow_batch_size: usize,
    pub retry_backoff_ms: u64,
    pub query_batch_size: usize,
    pub mailbox_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            default_max_entries_per_bucket: 1024,
            partitions_per_index: 8,
            lazy_update_delay_ms: 100,
            workflow_batch_size: 64,
            retry_backoff_ms: 50,
            query_batch_size: 32,
            mailbox_capacity: 256,
        }
    }
}

impl IndexConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, InternalError> {
        let config: Self = toml::from_str(input).map_err(|err| {
            InternalError::configuration(ErrorOrigin::Config, format!("invalid index config: {err}"))
        })?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings that would stall the queue or produce empty partitions.
    pub fn validate(&self) -> Result<(), InternalError> {
        let zero = [
            ("default_max_entries_per_bucket", self.default_max_entries_per_bucket == 0),
            ("partitions_per_index", self.partitions_per_index == 0),
            ("lazy_update_delay_ms", self.lazy_update_delay_ms == 0),
            ("retry_backoff_ms", self.retry_backoff_ms == 0),
            ("workflow_batch_size", self.workflow_batch_size == 0),
            ("query_batch_size", self.query_batch_size == 0),
            ("mailbox_capacity", self.mailbox_capacity == 0),
        ];

        for (key, is_zero) in zero {
            if is_zero {
                return Err(InternalError::configuration(
                    ErrorOrigin::Config,
                    format!("index config '{key}' must be greater than zero"),
                ));
            }
        }

        Ok(())
    }

    #[must_use]
    pub const fn lazy_update_delay(&self) -> Duration {
        Duration::from_millis(self.lazy_update_delay_ms)
    }

    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
