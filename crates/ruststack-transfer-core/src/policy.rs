//! Part sizing.
//!
//! [`SizePolicy`] decides whether an object is transferred in one request or
//! split into parts, and computes a [`PartPlan`] that stays under the
//! service's part-count ceiling.

use crate::config::TransferConfig;
use crate::sequencer::PartRangeSequencer;

/// Size thresholds for choosing and planning multipart transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    part_size: u64,
    threshold: u64,
    max_part_count: u32,
}

impl SizePolicy {
    /// Create a policy.
    ///
    /// `part_size` and `max_part_count` must be non-zero; [`TransferConfig::validate`]
    /// guarantees this for policies built from a configuration.
    #[must_use]
    pub fn new(part_size: u64, threshold: u64, max_part_count: u32) -> Self {
        debug_assert!(part_size > 0, "part size must be positive");
        debug_assert!(max_part_count > 0, "part ceiling must be positive");
        Self {
            part_size,
            threshold,
            max_part_count,
        }
    }

    /// Build the policy described by a configuration.
    #[must_use]
    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(
            config.minimum_part_size_in_bytes,
            config.threshold_in_bytes,
            config.max_part_count,
        )
    }

    /// Configured part size.
    #[must_use]
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Single-request threshold.
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Service ceiling on parts per session.
    #[must_use]
    pub fn max_part_count(&self) -> u32 {
        self.max_part_count
    }

    /// Largest object transferred in a single request.
    #[must_use]
    pub fn single_request_limit(&self) -> u64 {
        self.part_size.max(self.threshold)
    }

    /// Whether an object of `total_size` bytes goes through a multipart session.
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_transfer_core::policy::SizePolicy;
    ///
    /// let policy = SizePolicy::new(8 << 20, 8 << 20, 10_000);
    /// assert!(!policy.use_multipart(0));
    /// assert!(!policy.use_multipart(8 << 20));
    /// assert!(policy.use_multipart((8 << 20) + 1));
    /// ```
    #[must_use]
    pub fn use_multipart(&self, total_size: u64) -> bool {
        total_size > self.single_request_limit()
    }

    /// Part size that keeps `total_size` within the part ceiling.
    ///
    /// Equal to the configured part size unless that would need more than
    /// `max_part_count` parts, in which case it is raised to
    /// `ceil(total_size / max_part_count)`.
    #[must_use]
    pub fn effective_part_size(&self, total_size: u64) -> u64 {
        let minimum_to_fit = total_size.div_ceil(u64::from(self.max_part_count));
        self.part_size.max(minimum_to_fit)
    }

    /// Compute the part layout for an object of `total_size` bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_transfer_core::policy::SizePolicy;
    ///
    /// const MIB: u64 = 1024 * 1024;
    /// let plan = SizePolicy::new(8 * MIB, 8 * MIB, 10_000).plan(100 * MIB);
    /// assert_eq!(plan.part_count(), 13);
    /// assert_eq!(plan.last_part_size(), 4 * MIB);
    /// assert!(!plan.is_scaled());
    /// ```
    #[must_use]
    pub fn plan(&self, total_size: u64) -> PartPlan {
        let part_size = self.effective_part_size(total_size);
        let part_count = u32::try_from(total_size.div_ceil(part_size))
            .unwrap_or(self.max_part_count)
            .min(self.max_part_count);
        PartPlan {
            total_size,
            part_size,
            part_count,
            scaled: part_size > self.part_size,
        }
    }
}

/// The part layout of one multipart transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    total_size: u64,
    part_size: u64,
    part_count: u32,
    scaled: bool,
}

impl PartPlan {
    /// Object size in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Effective part size (all parts but the last).
    #[must_use]
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Number of parts.
    #[must_use]
    pub fn part_count(&self) -> u32 {
        self.part_count
    }

    /// Whether the part size was raised above the configured value to fit
    /// the part ceiling.
    #[must_use]
    pub fn is_scaled(&self) -> bool {
        self.scaled
    }

    /// Size of the final part; `0` for an empty object.
    #[must_use]
    pub fn last_part_size(&self) -> u64 {
        if self.part_count == 0 {
            return 0;
        }
        self.total_size - u64::from(self.part_count - 1) * self.part_size
    }

    /// Enumerate the parts of this plan.
    #[must_use]
    pub fn parts(&self) -> PartRangeSequencer {
        PartRangeSequencer::new(self.total_size, self.part_size)
    }
}
