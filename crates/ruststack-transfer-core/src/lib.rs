//! Multipart transfer engine for RustStack.
//!
//! This crate turns large object copies and uploads into concurrent
//! range-bounded part requests against a multipart-capable object store,
//! then commits them as one object. Callers see a single request and a
//! single outcome.
//!
//! # Architecture
//!
//! ```text
//! MultipartClient (copy / upload -> TransferHandle)
//!        |
//!        v
//!   SizePolicy ── single request? ──> Transport::copy_object / put_object
//!        |
//!        v
//!   orchestrator (probe, initiate, dispatch, finalize | abort)
//!        |            |                 |
//!        v            v                 v
//!  PartRangeSequencer MemoryBudgetGate  CompletionAssembler
//!        |
//!        v
//!   Transport (in-memory store, aws-sdk-s3, ...)
//! ```
//!
//! The engine spawns Tokio tasks for the transfer and its parts but never
//! installs a tracing subscriber or builds a runtime.

pub mod assembler;
pub mod budget;
pub mod client;
pub mod config;
pub mod error;
pub mod handle;
mod orchestrator;
pub mod policy;
pub mod sequencer;
pub mod source;
pub mod transport;
pub mod types;

pub use client::MultipartClient;
pub use config::TransferConfig;
pub use error::{Compensation, TransferError};
pub use handle::TransferHandle;
pub use orchestrator::TransferOutcome;
pub use transport::{Transport, TransportError, TransportErrorKind};
pub use types::{
    ByteRange, CopyRequest, ObjectId, ObjectProbe, PartResult, SessionId, TransferResponse,
    TransferSession, UploadRequest,
};
