//! Upload memory budget.
//!
//! [`MemoryBudgetGate`] bounds the bytes held by parts that have been read
//! from the source stream but not yet resolved by the store. Acquisition
//! suspends on a [`tokio::sync::Semaphore`]; the [`BudgetPermit`] returns its
//! bytes when dropped, whether the part succeeded, failed, or was cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::TransferError;

/// Errors raised by the budget gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    /// A single acquisition asks for more than the whole budget.
    #[error("cannot reserve {requested} bytes from a memory budget of {maximum} bytes")]
    ExceedsBudget {
        /// Requested bytes.
        requested: u64,
        /// Configured maximum.
        maximum: u64,
    },

    /// The gate was closed while waiting.
    #[error("memory budget gate closed")]
    Closed,
}

impl From<BudgetError> for TransferError {
    fn from(err: BudgetError) -> Self {
        match err {
            BudgetError::ExceedsBudget { .. } => Self::configuration(err.to_string()),
            BudgetError::Closed => Self::Internal(err.into()),
        }
    }
}

/// A byte-counting gate with suspend/resume semantics.
///
/// Semaphore permits are counted in units of `unit` bytes so that budgets
/// larger than `u32::MAX` bytes stay addressable by a single
/// `acquire_many`. Requests are rounded up to whole units, which only makes
/// the gate more conservative.
///
/// # Examples
///
/// ```
/// use ruststack_transfer_core::budget::MemoryBudgetGate;
///
/// # tokio_test::block_on(async {
/// let gate = MemoryBudgetGate::new(16).unwrap();
/// let first = gate.acquire(8).await.unwrap();
/// let second = gate.acquire(8).await.unwrap();
/// assert_eq!(gate.in_use(), 16);
/// assert!(gate.try_acquire(8).is_none());
///
/// drop(first);
/// assert!(gate.try_acquire(8).is_some());
/// # drop(second);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBudgetGate {
    semaphore: Arc<Semaphore>,
    maximum: u64,
    unit: u64,
    in_use: Arc<AtomicU64>,
    peak: Arc<AtomicU64>,
}

impl MemoryBudgetGate {
    /// Create a gate admitting at most `maximum` bytes at a time.
    pub fn new(maximum: u64) -> Result<Self, TransferError> {
        if maximum == 0 {
            return Err(TransferError::configuration(
                "maximumMemoryUsageInBytes must be greater than zero",
            ));
        }
        let unit = maximum.div_ceil(u64::from(u32::MAX)).max(1);
        let capacity = usize::try_from(maximum / unit)
            .map_err(|_| TransferError::configuration("memory budget does not fit this platform"))?;

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            maximum,
            unit,
            in_use: Arc::new(AtomicU64::new(0)),
            peak: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Configured maximum in bytes.
    #[must_use]
    pub fn maximum(&self) -> u64 {
        self.maximum
    }

    /// Bytes currently held by outstanding permits.
    #[must_use]
    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::Acquire)
    }

    /// Highest value [`in_use`](Self::in_use) has reached.
    #[must_use]
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Acquire)
    }

    /// Bytes that can be acquired without waiting.
    #[must_use]
    pub fn available(&self) -> u64 {
        u64::try_from(self.semaphore.available_permits()).unwrap_or(u64::MAX) * self.unit
    }

    /// Check that a request of `bytes` can ever be granted.
    ///
    /// Used before opening a session so an oversized part is reported as a
    /// configuration problem instead of a wait that never ends.
    pub fn check(&self, bytes: u64) -> Result<(), BudgetError> {
        self.units_for(bytes).map(|_| ())
    }

    /// Reserve `bytes`, suspending until enough budget is released.
    pub async fn acquire(&self, bytes: u64) -> Result<BudgetPermit, BudgetError> {
        let units = self.units_for(bytes)?;
        let permit = Arc::clone(&self.semaphore)
            .acquire_many_owned(units)
            .await
            .map_err(|_| BudgetError::Closed)?;
        Ok(self.grant(permit, bytes))
    }

    /// Reserve `bytes` only if they are available right now.
    #[must_use]
    pub fn try_acquire(&self, bytes: u64) -> Option<BudgetPermit> {
        let units = self.units_for(bytes).ok()?;
        let permit = Arc::clone(&self.semaphore)
            .try_acquire_many_owned(units)
            .ok()?;
        Some(self.grant(permit, bytes))
    }

    /// Close the gate, failing every pending and future acquisition.
    pub fn close(&self) {
        self.semaphore.close();
    }

    fn units_for(&self, bytes: u64) -> Result<u32, BudgetError> {
        let exceeds = BudgetError::ExceedsBudget {
            requested: bytes,
            maximum: self.maximum,
        };
        let units = bytes.div_ceil(self.unit);
        if units
            .checked_mul(self.unit)
            .is_none_or(|rounded| rounded > self.maximum)
        {
            return Err(exceeds);
        }
        u32::try_from(units).map_err(|_| exceeds)
    }

    fn grant(&self, permit: OwnedSemaphorePermit, bytes: u64) -> BudgetPermit {
        let held = self.in_use.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak.fetch_max(held, Ordering::AcqRel);
        BudgetPermit {
            _permit: permit,
            bytes,
            in_use: Arc::clone(&self.in_use),
        }
    }
}

/// Bytes reserved from a [`MemoryBudgetGate`], released on drop.
#[derive(Debug)]
pub struct BudgetPermit {
    _permit: OwnedSemaphorePermit,
    bytes: u64,
    in_use: Arc<AtomicU64>,
}

impl BudgetPermit {
    /// Reserved bytes.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for BudgetPermit {
    fn drop(&mut self) {
        self.in_use.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
