//! The storage capability consumed by the engine.
//!
//! [`Transport`] is everything the engine needs from the object store: a
//! metadata probe, the multipart session lifecycle, and the two single-request
//! operations used below the multipart threshold. Signing, retries, and wire
//! marshalling live behind it.
//!
//! # Object safety
//!
//! The trait uses `#[async_trait]` so it can be held as `Arc<dyn Transport>`.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::types::{
    ByteRange, ObjectId, ObjectProbe, PartResult, SessionId, TransferResponse, TransferSession,
};

/// Coarse classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The object does not exist.
    NotFound,
    /// The caller may not access the object.
    AccessDenied,
    /// The multipart session does not exist.
    NoSuchUpload,
    /// A part is missing or its entity tag does not match.
    InvalidPart,
    /// The part list was not in ascending order.
    InvalidPartOrder,
    /// The request timed out.
    Timeout,
    /// Any other error reported by the service.
    Service,
    /// A client-side failure (connection, dispatch, ...).
    Other,
}

impl TransportErrorKind {
    /// Stable name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AccessDenied => "AccessDenied",
            Self::NoSuchUpload => "NoSuchUpload",
            Self::InvalidPart => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::Timeout => "Timeout",
            Self::Service => "Service",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single transport operation.
///
/// # Examples
///
/// ```
/// use ruststack_transfer_core::transport::{TransportError, TransportErrorKind};
///
/// let err = TransportError::new(TransportErrorKind::NotFound, "no such key: a.bin");
/// assert_eq!(err.kind(), TransportErrorKind::NotFound);
/// assert_eq!(err.to_string(), "NotFound: no such key: a.bin");
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TransportError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The failure classification.
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Asynchronous access to a multipart-capable object store.
///
/// Every call is attempted exactly once from the engine's point of view; any
/// retry policy belongs to the implementation.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Read the size of an existing object.
    async fn probe(&self, object: &ObjectId) -> Result<ObjectProbe, TransportError>;

    /// Open a multipart session that will produce `target`.
    async fn initiate_session(&self, target: &ObjectId) -> Result<SessionId, TransportError>;

    /// Upload one part's bytes into the session.
    async fn upload_part(
        &self,
        session: &TransferSession,
        part_number: u32,
        body: Bytes,
    ) -> Result<PartResult, TransportError>;

    /// Copy `range` of `source` into the session as one part.
    async fn copy_part(
        &self,
        session: &TransferSession,
        part_number: u32,
        source: &ObjectId,
        range: ByteRange,
    ) -> Result<PartResult, TransportError>;

    /// Commit the session from parts sorted ascending by part number.
    async fn finalize(
        &self,
        session: &TransferSession,
        parts: &[PartResult],
    ) -> Result<TransferResponse, TransportError>;

    /// Release the session's server-side resources without committing.
    async fn abort(&self, session: &TransferSession) -> Result<(), TransportError>;

    /// Copy an object in one request.
    async fn copy_object(
        &self,
        source: &ObjectId,
        destination: &ObjectId,
    ) -> Result<TransferResponse, TransportError>;

    /// Store an object in one request.
    async fn put_object(
        &self,
        destination: &ObjectId,
        body: Bytes,
    ) -> Result<TransferResponse, TransportError>;
}

macro_rules! forward_transport {
    ($ty:ty) => {
        #[async_trait]
        impl<T: Transport + ?Sized> Transport for $ty {
            async fn probe(&self, object: &ObjectId) -> Result<ObjectProbe, TransportError> {
                (**self).probe(object).await
            }

            async fn initiate_session(
                &self,
                target: &ObjectId,
            ) -> Result<SessionId, TransportError> {
                (**self).initiate_session(target).await
            }

            async fn upload_part(
                &self,
                session: &TransferSession,
                part_number: u32,
                body: Bytes,
            ) -> Result<PartResult, TransportError> {
                (**self).upload_part(session, part_number, body).await
            }

            async fn copy_part(
                &self,
                session: &TransferSession,
                part_number: u32,
                source: &ObjectId,
                range: ByteRange,
            ) -> Result<PartResult, TransportError> {
                (**self).copy_part(session, part_number, source, range).await
            }

            async fn finalize(
                &self,
                session: &TransferSession,
                parts: &[PartResult],
            ) -> Result<TransferResponse, TransportError> {
                (**self).finalize(session, parts).await
            }

            async fn abort(&self, session: &TransferSession) -> Result<(), TransportError> {
                (**self).abort(session).await
            }

            async fn copy_object(
                &self,
                source: &ObjectId,
                destination: &ObjectId,
            ) -> Result<TransferResponse, TransportError> {
                (**self).copy_object(source, destination).await
            }

            async fn put_object(
                &self,
                destination: &ObjectId,
                body: Bytes,
            ) -> Result<TransferResponse, TransportError> {
                (**self).put_object(destination, body).await
            }
        }
    };
}

forward_transport!(Arc<T>);
forward_transport!(Box<T>);
