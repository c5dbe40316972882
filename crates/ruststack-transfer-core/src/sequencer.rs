//! Lazy enumeration of part ranges.

use std::iter::FusedIterator;

use crate::types::{ByteRange, PartDescriptor};

/// Iterator over the [`PartDescriptor`]s partitioning `[0, total_size)`.
///
/// Part numbers start at 1 and increase without gaps; every part but the
/// last covers exactly `part_size` bytes. The sequence cannot be resumed;
/// a retried transfer builds a new sequencer.
///
/// # Examples
///
/// ```
/// use ruststack_transfer_core::sequencer::PartRangeSequencer;
///
/// let parts: Vec<_> = PartRangeSequencer::new(10, 4).collect();
/// assert_eq!(parts.len(), 3);
/// assert_eq!(parts[2].range.to_string(), "bytes=8-9");
/// ```
#[derive(Debug, Clone)]
pub struct PartRangeSequencer {
    total_size: u64,
    part_size: u64,
    total_parts: u32,
    next_part: u32,
}

impl PartRangeSequencer {
    /// Create a sequencer splitting `total_size` bytes into `part_size` chunks.
    ///
    /// A zero `part_size` yields no parts; so does a layout needing more than
    /// `u32::MAX` parts, which no valid [`SizePolicy`](crate::policy::SizePolicy)
    /// produces.
    #[must_use]
    pub fn new(total_size: u64, part_size: u64) -> Self {
        let total_parts = if part_size == 0 {
            0
        } else {
            u32::try_from(total_size.div_ceil(part_size)).unwrap_or(0)
        };
        Self {
            total_size,
            part_size,
            total_parts,
            next_part: 1,
        }
    }

    /// Number of parts in the full sequence.
    #[must_use]
    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }
}

impl Iterator for PartRangeSequencer {
    type Item = PartDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_part > self.total_parts {
            return None;
        }
        let part_number = self.next_part;
        let start = u64::from(part_number - 1) * self.part_size;
        if start >= self.total_size {
            return None;
        }
        let end = (start + self.part_size).min(self.total_size) - 1;
        self.next_part += 1;

        Some(PartDescriptor {
            part_number,
            range: ByteRange::new(start, end),
            total_parts: self.total_parts,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (u64::from(self.total_parts) + 1).saturating_sub(u64::from(self.next_part));
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PartRangeSequencer {}

impl FusedIterator for PartRangeSequencer {}
