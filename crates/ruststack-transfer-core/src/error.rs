//! Transfer engine error types.
//!
//! [`TransferError`] is the single failure type a caller observes. Failures
//! that happen after a multipart session was opened carry the session id and
//! a [`Compensation`] record describing whether the session was aborted.
//!
//! # Usage
//!
//! ```
//! use ruststack_transfer_core::error::{Compensation, TransferError};
//!
//! let err = TransferError::configuration("part size must be positive");
//! assert!(matches!(err.compensation(), Compensation::NotRequired));
//! assert!(err.session_id().is_none());
//! ```

use std::fmt;

use crate::transport::TransportError;
use crate::types::SessionId;

/// What happened to the server-side session after a failure.
#[derive(Debug)]
pub enum Compensation {
    /// No session existed, nothing to clean up.
    NotRequired,
    /// The session was aborted.
    Aborted,
    /// The abort request itself failed; the session may linger.
    AbortFailed(TransportError),
}

impl Compensation {
    /// Whether an abort call was issued.
    #[must_use]
    pub fn attempted(&self) -> bool {
        !matches!(self, Self::NotRequired)
    }
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequired => f.write_str("no compensation required"),
            Self::Aborted => f.write_str("session aborted"),
            Self::AbortFailed(err) => write!(f, "abort failed: {err}"),
        }
    }
}

/// Multipart transfer error.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    // -----------------------------------------------------------------------
    // Failures before a session exists
    // -----------------------------------------------------------------------
    /// The configuration cannot be used; raised before any request.
    #[error("invalid transfer configuration: {message}")]
    Configuration {
        /// What is wrong.
        message: String,
    },

    /// The source object could not be probed.
    #[error("failed to retrieve metadata from the source object {object}")]
    Probe {
        /// Probed object.
        object: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },

    /// The multipart session could not be opened.
    #[error("failed to initiate multipart upload for {target}")]
    SessionInitiation {
        /// Destination object.
        target: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },

    /// The single-request transfer failed; the transport error is forwarded as is.
    #[error(transparent)]
    Request(TransportError),

    // -----------------------------------------------------------------------
    // Failures after a session exists
    // -----------------------------------------------------------------------
    /// A part request failed.
    #[error("part {part_number} failed in session {session_id} ({compensation})")]
    Part {
        /// Session the part belonged to.
        session_id: SessionId,
        /// 1-based number of the failed part.
        part_number: u32,
        /// Transport failure.
        #[source]
        source: TransportError,
        /// Outcome of the abort.
        compensation: Compensation,
    },

    /// The finalize request failed.
    #[error("failed to complete session {session_id} ({compensation})")]
    Finalize {
        /// Session being finalized.
        session_id: SessionId,
        /// Transport failure.
        #[source]
        source: TransportError,
        /// Outcome of the abort.
        compensation: Compensation,
    },

    /// Reading the upload source failed.
    #[error("failed to read part {part_number} from the upload source ({compensation})")]
    SourceRead {
        /// Session, if one was opened before the read failed.
        session_id: Option<SessionId>,
        /// Part being buffered.
        part_number: u32,
        /// I/O failure from the stream.
        #[source]
        source: std::io::Error,
        /// Outcome of the abort.
        compensation: Compensation,
    },

    /// The upload source produced a different number of bytes than declared.
    #[error(
        "upload source produced {actual} bytes, expected {expected} ({compensation})"
    )]
    ContentLengthMismatch {
        /// Session, if one was opened.
        session_id: Option<SessionId>,
        /// Declared length.
        expected: u64,
        /// Bytes actually produced (a lower bound when the stream ran long).
        actual: u64,
        /// Outcome of the abort.
        compensation: Compensation,
    },

    /// The upload source needs more parts than the service accepts.
    #[error(
        "upload source exceeds {max_part_count} parts in session {session_id} ({compensation})"
    )]
    PartLimitExceeded {
        /// Session being filled.
        session_id: SessionId,
        /// Part ceiling.
        max_part_count: u32,
        /// Outcome of the abort.
        compensation: Compensation,
    },

    /// The caller cancelled the transfer.
    #[error("transfer cancelled ({compensation})")]
    Cancelled {
        /// Session, if one was opened.
        session_id: Option<SessionId>,
        /// Outcome of the abort.
        compensation: Compensation,
    },

    /// The engine itself failed inside an open session: a part task panicked
    /// or the completion slots were inconsistent.
    #[error("internal failure in session {session_id} ({compensation})")]
    SessionInternal {
        /// Session that was open.
        session_id: SessionId,
        /// Part being processed, when the failure belongs to one.
        part_number: Option<u32>,
        /// What went wrong.
        #[source]
        source: anyhow::Error,
        /// Outcome of the abort.
        compensation: Compensation,
    },

    // -----------------------------------------------------------------------
    // Internal / catch-all
    // -----------------------------------------------------------------------
    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Shared `NotRequired` value for variants without a compensation record.
static NOT_REQUIRED: Compensation = Compensation::NotRequired;

impl TransferError {
    /// Build a [`TransferError::Configuration`].
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// The compensation record of this failure.
    #[must_use]
    pub fn compensation(&self) -> &Compensation {
        match self {
            Self::Part { compensation, .. }
            | Self::Finalize { compensation, .. }
            | Self::SourceRead { compensation, .. }
            | Self::ContentLengthMismatch { compensation, .. }
            | Self::PartLimitExceeded { compensation, .. }
            | Self::SessionInternal { compensation, .. }
            | Self::Cancelled { compensation, .. } => compensation,
            _ => &NOT_REQUIRED,
        }
    }

    /// The session the failure happened in, if one was opened.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Part { session_id, .. }
            | Self::Finalize { session_id, .. }
            | Self::PartLimitExceeded { session_id, .. }
            | Self::SessionInternal { session_id, .. } => Some(session_id),
            Self::SourceRead { session_id, .. }
            | Self::ContentLengthMismatch { session_id, .. }
            | Self::Cancelled { session_id, .. } => session_id.as_ref(),
            _ => None,
        }
    }

    /// The part that failed, for part-level failures.
    #[must_use]
    pub fn part_number(&self) -> Option<u32> {
        match self {
            Self::Part { part_number, .. } | Self::SourceRead { part_number, .. } => {
                Some(*part_number)
            }
            Self::SessionInternal { part_number, .. } => *part_number,
            _ => None,
        }
    }

    /// Whether the transfer ended because the caller cancelled it.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The underlying transport error, if the failure came from the store.
    #[must_use]
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Probe { source, .. }
            | Self::SessionInitiation { source, .. }
            | Self::Part { source, .. }
            | Self::Finalize { source, .. }
            | Self::Request(source) => Some(source),
            _ => None,
        }
    }
}
