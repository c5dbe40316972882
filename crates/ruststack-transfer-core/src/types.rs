//! Plain data records exchanged between the engine and its transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Location of an object in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectId {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Specific version to read (source side only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

impl ObjectId {
    /// Create an object identifier for the latest version of `bucket/key`.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    /// Pin the identifier to a specific version.
    #[must_use]
    pub fn with_version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)?;
        if let Some(version_id) = &self.version_id {
            write!(f, "?versionId={version_id}")?;
        }
        Ok(())
    }
}

/// Identifier of a server-side multipart session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a session identifier returned by the service.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the session identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open multipart session and the object it will produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    /// Session identifier returned by initiate.
    pub id: SessionId,
    /// Destination object.
    pub target: ObjectId,
}

/// Inclusive byte range `[start, end]` within an object.
///
/// # Examples
///
/// ```
/// use ruststack_transfer_core::types::ByteRange;
///
/// let range = ByteRange::new(0, 499);
/// assert_eq!(range.len(), 500);
/// assert_eq!(range.to_string(), "bytes=0-499");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Create a range covering `start..=end`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`; ranges are only built by the sequencer,
    /// which never produces an empty range.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        assert!(start <= end, "byte range start {start} is past end {end}");
        Self { start, end }
    }

    /// First byte offset.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte offset (inclusive).
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// One part of a multipart transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartDescriptor {
    /// 1-based part number.
    pub part_number: u32,
    /// Byte range of the source covered by this part.
    pub range: ByteRange,
    /// Number of parts in the session.
    pub total_parts: u32,
}

/// Completion token of one part, as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartResult {
    /// 1-based part number.
    pub part_number: u32,
    /// Opaque entity tag assigned by the store.
    pub etag: String,
}

impl PartResult {
    /// Create a part result.
    #[must_use]
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Metadata returned by a probe of the source object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectProbe {
    /// Exact object size in bytes.
    pub content_length: u64,
    /// Entity tag of the probed object, if reported.
    pub etag: Option<String>,
}

/// Server-side copy of one object to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Object to copy from.
    pub source: ObjectId,
    /// Object to create.
    pub destination: ObjectId,
}

impl CopyRequest {
    /// Create a copy request.
    #[must_use]
    pub fn new(source: ObjectId, destination: ObjectId) -> Self {
        Self {
            source,
            destination,
        }
    }
}

/// Upload of a byte stream into one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Object to create.
    pub destination: ObjectId,
    /// Exact stream length, when known upfront.
    pub content_length: Option<u64>,
}

impl UploadRequest {
    /// Upload of a stream whose length is discovered by draining it.
    #[must_use]
    pub fn new(destination: ObjectId) -> Self {
        Self {
            destination,
            content_length: None,
        }
    }

    /// Declare the stream length upfront.
    #[must_use]
    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.content_length = Some(content_length);
        self
    }
}

/// Final response of a completed transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    /// Entity tag of the created object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Version of the created object, when versioning is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// Location reported by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Number of parts finalized; `None` for single-request transfers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts_count: Option<u32>,
}
