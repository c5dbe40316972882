//! Stored objects and open multipart sessions.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use ruststack_transfer_core::{ObjectId, PartResult, TransportError, TransportErrorKind};

use crate::etag::{BodyDigest, composite_etag};

/// A committed object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object bytes.
    pub data: Bytes,
    /// Entity tag.
    pub etag: String,
    /// Number of parts it was assembled from; `None` for single requests.
    pub parts_count: Option<u32>,
}

impl StoredObject {
    /// Object written in one request.
    #[must_use]
    pub fn single(data: Bytes) -> Self {
        let etag = BodyDigest::of(&data).etag();
        Self {
            data,
            etag,
            parts_count: None,
        }
    }
}

/// One uploaded or copied part.
#[derive(Debug, Clone)]
pub(crate) struct StoredPart {
    pub(crate) data: Bytes,
    pub(crate) digest: BodyDigest,
    pub(crate) etag: String,
}

impl StoredPart {
    pub(crate) fn new(data: Bytes) -> Self {
        let digest = BodyDigest::of(&data);
        let etag = digest.etag();
        Self { data, digest, etag }
    }
}

/// An open multipart session.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub(crate) target: ObjectId,
    /// Parts keyed by part number; a re-upload replaces the earlier part.
    pub(crate) parts: BTreeMap<u32, StoredPart>,
}

impl Session {
    pub(crate) fn new(target: ObjectId) -> Self {
        Self {
            target,
            parts: BTreeMap::new(),
        }
    }

    /// Check the caller's part list and concatenate the listed parts.
    ///
    /// The list must be non-empty, strictly ascending, contiguous from 1,
    /// cover every stored part, and carry the stored entity tags.
    pub(crate) fn assemble(&self, listed: &[PartResult]) -> Result<StoredObject, TransportError> {
        if listed.is_empty() {
            return Err(TransportError::new(
                TransportErrorKind::InvalidPart,
                "you must specify at least one part",
            ));
        }

        let mut data = BytesMut::new();
        let mut digests = Vec::with_capacity(listed.len());
        let mut previous = 0u32;
        for part in listed {
            if part.part_number <= previous {
                return Err(TransportError::new(
                    TransportErrorKind::InvalidPartOrder,
                    format!(
                        "part {} listed after part {previous}; the list must be in ascending order",
                        part.part_number
                    ),
                ));
            }
            if part.part_number != previous + 1 {
                return Err(TransportError::new(
                    TransportErrorKind::InvalidPart,
                    format!("part {} is missing from the list", previous + 1),
                ));
            }
            previous = part.part_number;

            let stored = self.parts.get(&part.part_number).ok_or_else(|| {
                TransportError::new(
                    TransportErrorKind::InvalidPart,
                    format!("part {} was never uploaded", part.part_number),
                )
            })?;
            if stored.etag != part.etag {
                return Err(TransportError::new(
                    TransportErrorKind::InvalidPart,
                    format!("entity tag of part {} does not match", part.part_number),
                ));
            }
            data.extend_from_slice(&stored.data);
            digests.push(stored.digest.clone());
        }

        if let Some((&unlisted, _)) = self.parts.range(previous + 1..).next() {
            return Err(TransportError::new(
                TransportErrorKind::InvalidPart,
                format!("uploaded part {unlisted} is not listed"),
            ));
        }

        Ok(StoredObject {
            data: data.freeze(),
            etag: composite_etag(&digests),
            parts_count: Some(previous),
        })
    }
}
