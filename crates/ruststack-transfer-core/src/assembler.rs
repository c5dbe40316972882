//! Concurrent collection of part results.
//!
//! [`CompletionAssembler`] owns one write-once slot per part. Part tasks
//! record their results in whatever order they finish; finalize reads the
//! slots back in part-number order.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::types::PartResult;

/// Sentinel for an assembler whose part count is not known yet.
const UNSEALED: u32 = u32::MAX;

/// Errors raised while recording or reading part results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblerError {
    /// The part number is zero or beyond the slot array.
    #[error("part number {part_number} is outside 1..={capacity}")]
    PartOutOfRange {
        /// Offending part number.
        part_number: u32,
        /// Number of slots.
        capacity: u32,
    },

    /// The slot for this part was already written.
    #[error("part {part_number} was recorded twice")]
    DuplicatePart {
        /// Offending part number.
        part_number: u32,
    },

    /// Not every expected part has been recorded.
    #[error("part {missing} has not been recorded")]
    Incomplete {
        /// Lowest missing part number.
        missing: u32,
    },
}

/// Whether a successful [`CompletionAssembler::record`] completed the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// More parts are outstanding.
    Pending,
    /// This call filled the last outstanding slot.
    Complete,
}

/// Fixed-capacity, write-once slots indexed by `part_number - 1`.
///
/// Writes to distinct slots never contend. The [`Recorded::Complete`] signal
/// is reported exactly once per assembler, by whichever call observes the
/// final slot being filled.
///
/// # Examples
///
/// ```
/// use ruststack_transfer_core::assembler::{CompletionAssembler, Recorded};
/// use ruststack_transfer_core::types::PartResult;
///
/// let assembler = CompletionAssembler::new(2);
/// assert_eq!(assembler.record(PartResult::new(2, "b")), Ok(Recorded::Pending));
/// assert_eq!(assembler.record(PartResult::new(1, "a")), Ok(Recorded::Complete));
///
/// let ordered = assembler.ordered().unwrap();
/// assert_eq!(ordered[0].part_number, 1);
/// assert_eq!(ordered[1].part_number, 2);
/// ```
#[derive(Debug)]
pub struct CompletionAssembler {
    slots: Box<[OnceLock<PartResult>]>,
    expected: AtomicU32,
    recorded: AtomicU32,
    completed: AtomicBool,
}

impl CompletionAssembler {
    /// Create an assembler expecting exactly `part_count` parts.
    #[must_use]
    pub fn new(part_count: u32) -> Self {
        let assembler = Self::with_slots(part_count, part_count);
        // An empty set is complete from the start.
        if part_count == 0 {
            assembler.completed.store(true, Ordering::Release);
        }
        assembler
    }

    /// Create an assembler with `capacity` slots whose part count is fixed
    /// later by [`seal`](Self::seal). Used when the total is only known once
    /// the source is drained.
    #[must_use]
    pub fn open(capacity: u32) -> Self {
        Self::with_slots(capacity, UNSEALED)
    }

    fn with_slots(capacity: u32, expected: u32) -> Self {
        let slots = (0..capacity).map(|_| OnceLock::new()).collect();
        Self {
            slots,
            expected: AtomicU32::new(expected),
            recorded: AtomicU32::new(0),
            completed: AtomicBool::new(false),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        u32::try_from(self.slots.len()).unwrap_or(u32::MAX)
    }

    /// Number of parts recorded so far.
    #[must_use]
    pub fn recorded(&self) -> u32 {
        self.recorded.load(Ordering::Acquire)
    }

    /// Expected part count, once known.
    #[must_use]
    pub fn expected(&self) -> Option<u32> {
        match self.expected.load(Ordering::Acquire) {
            UNSEALED => None,
            n => Some(n),
        }
    }

    /// Whether every expected part has been recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.expected()
            .is_some_and(|expected| self.recorded() >= expected)
    }

    /// Write a part result into slot `part_number - 1`.
    pub fn record(&self, result: PartResult) -> Result<Recorded, AssemblerError> {
        let part_number = result.part_number;
        let capacity = self.capacity();
        let index = part_number
            .checked_sub(1)
            .filter(|index| *index < capacity)
            .ok_or(AssemblerError::PartOutOfRange {
                part_number,
                capacity,
            })?;

        self.slots[index as usize]
            .set(result)
            .map_err(|_| AssemblerError::DuplicatePart { part_number })?;

        self.recorded.fetch_add(1, Ordering::AcqRel);
        Ok(self.check_complete())
    }

    /// Fix the expected part count of an [`open`](Self::open) assembler.
    ///
    /// Returns [`Recorded::Complete`] if every part was already recorded and
    /// no earlier call reported completion.
    pub fn seal(&self, part_count: u32) -> Result<Recorded, AssemblerError> {
        if part_count > self.capacity() {
            return Err(AssemblerError::PartOutOfRange {
                part_number: part_count,
                capacity: self.capacity(),
            });
        }
        self.expected.store(part_count, Ordering::Release);
        Ok(self.check_complete())
    }

    /// All expected results, sorted ascending by part number.
    pub fn ordered(&self) -> Result<Vec<PartResult>, AssemblerError> {
        let expected = self
            .expected()
            .ok_or(AssemblerError::Incomplete { missing: 1 })?;
        self.slots
            .iter()
            .take(expected as usize)
            .zip(1u32..)
            .map(|(slot, part_number)| {
                slot.get()
                    .cloned()
                    .ok_or(AssemblerError::Incomplete {
                        missing: part_number,
                    })
            })
            .collect()
    }

    fn check_complete(&self) -> Recorded {
        if self.is_complete()
            && self
                .completed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            Recorded::Complete
        } else {
            Recorded::Pending
        }
    }
}
