//! Failure and latency injection.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Transport operations, for counting and fault targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `probe`
    Probe,
    /// `initiate_session`
    Initiate,
    /// `upload_part`
    UploadPart,
    /// `copy_part`
    CopyPart,
    /// `finalize`
    Finalize,
    /// `abort`
    Abort,
    /// `copy_object`
    CopyObject,
    /// `put_object`
    PutObject,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Probe,
        Self::Initiate,
        Self::UploadPart,
        Self::CopyPart,
        Self::Finalize,
        Self::Abort,
        Self::CopyObject,
        Self::PutObject,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Whether the operation belongs to a multipart session.
    #[must_use]
    pub fn is_session_operation(self) -> bool {
        matches!(
            self,
            Self::Initiate | Self::UploadPart | Self::CopyPart | Self::Finalize | Self::Abort
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Probe => "probe",
            Self::Initiate => "initiate_session",
            Self::UploadPart => "upload_part",
            Self::CopyPart => "copy_part",
            Self::Finalize => "finalize",
            Self::Abort => "abort",
            Self::CopyObject => "copy_object",
            Self::PutObject => "put_object",
        };
        f.write_str(name)
    }
}

/// Which calls fail and how long calls take.
///
/// Delays are applied before the failure check, so a delayed failing part
/// fails after its siblings have completed.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ruststack_transfer_memory::faults::{FaultPlan, Operation};
///
/// let plan = FaultPlan::default()
///     .fail_part(7)
///     .delay_part(7, Duration::from_millis(50))
///     .fail(Operation::Abort);
/// assert!(plan.fails_part(7));
/// assert!(plan.fails(Operation::Abort));
/// assert!(!plan.fails_part(6));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    failing: HashSet<Operation>,
    failing_parts: HashSet<u32>,
    delays: HashMap<Operation, Duration>,
    part_delays: HashMap<u32, Duration>,
    held_parts: HashMap<u32, Arc<Notify>>,
}

impl FaultPlan {
    /// Fail every call of `operation`.
    #[must_use]
    pub fn fail(mut self, operation: Operation) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Fail the upload or copy of `part_number`.
    #[must_use]
    pub fn fail_part(mut self, part_number: u32) -> Self {
        self.failing_parts.insert(part_number);
        self
    }

    /// Delay every call of `operation`.
    #[must_use]
    pub fn delay(mut self, operation: Operation, delay: Duration) -> Self {
        self.delays.insert(operation, delay);
        self
    }

    /// Delay the upload or copy of `part_number`, overriding the operation delay.
    #[must_use]
    pub fn delay_part(mut self, part_number: u32, delay: Duration) -> Self {
        self.part_delays.insert(part_number, delay);
        self
    }

    /// Park the upload or copy of `part_number` until `release` is notified.
    ///
    /// The hold comes before any delay or failure of that part.
    #[must_use]
    pub fn hold_part(mut self, part_number: u32, release: Arc<Notify>) -> Self {
        self.held_parts.insert(part_number, release);
        self
    }

    /// Whether calls of `operation` fail.
    #[must_use]
    pub fn fails(&self, operation: Operation) -> bool {
        self.failing.contains(&operation)
    }

    /// Whether `part_number` fails.
    #[must_use]
    pub fn fails_part(&self, part_number: u32) -> bool {
        self.failing_parts.contains(&part_number)
    }

    pub(crate) fn hold_for(&self, part_number: Option<u32>) -> Option<Arc<Notify>> {
        part_number.and_then(|n| self.held_parts.get(&n).cloned())
    }

    pub(crate) fn delay_for(&self, operation: Operation, part_number: Option<u32>) -> Option<Duration> {
        part_number
            .and_then(|n| self.part_delays.get(&n))
            .or_else(|| self.delays.get(&operation))
            .copied()
    }
}
