//! Transfer engine configuration.
//!
//! Provides [`TransferConfig`], the set of knobs recognized by the multipart
//! engine. Values can be built in code via the typed builder or loaded from
//! environment variables with [`TransferConfig::from_env`].

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::TransferError;

/// Default minimum part size: 8 MiB.
pub const DEFAULT_MINIMUM_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Default single-shot threshold: 8 MiB.
pub const DEFAULT_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Service ceiling on the number of parts in one session.
pub const DEFAULT_MAX_PART_COUNT: u32 = 10_000;

/// Multipart transfer configuration.
///
/// All fields default to the service's documented behavior. When
/// `maximum_memory_usage_in_bytes` is unset the upload path may buffer two
/// parts at a time.
///
/// # Examples
///
/// ```
/// use ruststack_transfer_core::config::TransferConfig;
///
/// let config = TransferConfig::default();
/// assert_eq!(config.minimum_part_size_in_bytes, 8 * 1024 * 1024);
/// assert_eq!(config.memory_budget(), 16 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    /// Preferred size of every part but the last.
    #[builder(default = DEFAULT_MINIMUM_PART_SIZE)]
    pub minimum_part_size_in_bytes: u64,

    /// Objects at or below this size are always transferred in one request.
    #[builder(default = DEFAULT_THRESHOLD)]
    pub threshold_in_bytes: u64,

    /// Upper bound on bytes buffered for unsent upload parts.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_memory_usage_in_bytes: Option<u64>,

    /// Maximum number of parts the service accepts in one session.
    #[builder(default = DEFAULT_MAX_PART_COUNT)]
    pub max_part_count: u32,

    /// Cap on concurrently in-flight range-copy requests (unbounded if unset).
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_copy_parts: Option<usize>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            minimum_part_size_in_bytes: DEFAULT_MINIMUM_PART_SIZE,
            threshold_in_bytes: DEFAULT_THRESHOLD,
            maximum_memory_usage_in_bytes: None,
            max_part_count: DEFAULT_MAX_PART_COUNT,
            max_concurrent_copy_parts: None,
        }
    }
}

impl TransferConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TRANSFER_MINIMUM_PART_SIZE` | `8388608` |
    /// | `TRANSFER_THRESHOLD` | `8388608` |
    /// | `TRANSFER_MAXIMUM_MEMORY_USAGE` | *(unset, 2 × part size)* |
    /// | `TRANSFER_MAX_PART_COUNT` | `10000` |
    /// | `TRANSFER_MAX_CONCURRENT_COPY_PARTS` | *(unset, unbounded)* |
    ///
    /// Values that fail to parse are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_transfer_core::config::TransferConfig;
    ///
    /// let config = TransferConfig::from_env();
    /// assert!(config.max_part_count > 0);
    /// ```
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_number("TRANSFER_MINIMUM_PART_SIZE") {
            config.minimum_part_size_in_bytes = n;
        }
        if let Some(n) = env_number("TRANSFER_THRESHOLD") {
            config.threshold_in_bytes = n;
        }
        if let Some(n) = env_number("TRANSFER_MAXIMUM_MEMORY_USAGE") {
            config.maximum_memory_usage_in_bytes = Some(n);
        }
        if let Some(n) = env_number("TRANSFER_MAX_PART_COUNT") {
            config.max_part_count = n;
        }
        if let Some(n) = env_number("TRANSFER_MAX_CONCURRENT_COPY_PARTS") {
            config.max_concurrent_copy_parts = Some(n);
        }

        config
    }

    /// The effective upload memory budget in bytes.
    #[must_use]
    pub fn memory_budget(&self) -> u64 {
        self.maximum_memory_usage_in_bytes
            .unwrap_or_else(|| self.minimum_part_size_in_bytes.saturating_mul(2))
    }

    /// Check the configuration for values the engine cannot run with.
    ///
    /// Called before any request is issued, so a bad configuration never
    /// reaches the network.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.minimum_part_size_in_bytes == 0 {
            return Err(TransferError::configuration(
                "minimumPartSizeInBytes must be greater than zero",
            ));
        }
        if self.max_part_count == 0 {
            return Err(TransferError::configuration(
                "maxPartCount must be greater than zero",
            ));
        }
        if self.max_concurrent_copy_parts == Some(0) {
            return Err(TransferError::configuration(
                "maxConcurrentCopyParts must be greater than zero when set",
            ));
        }
        let budget = self.memory_budget();
        if budget < self.minimum_part_size_in_bytes {
            return Err(TransferError::configuration(format!(
                "maximumMemoryUsageInBytes ({budget}) must be at least the part size ({})",
                self.minimum_part_size_in_bytes
            )));
        }
        // An upload of unknown length buffers up to the threshold before the
        // path is chosen.
        if self.threshold_in_bytes > budget {
            return Err(TransferError::configuration(format!(
                "thresholdInBytes ({}) must not exceed maximumMemoryUsageInBytes ({budget})",
                self.threshold_in_bytes
            )));
        }
        Ok(())
    }
}

/// Parse a numeric environment variable, ignoring missing or malformed values.
fn env_number<N: std::str::FromStr>(name: &str) -> Option<N> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
