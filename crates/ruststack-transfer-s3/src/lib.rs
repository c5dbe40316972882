//! S3 transport for the RustStack transfer engine.
//!
//! [`S3Transport`] maps each engine call onto one `aws-sdk-s3` request:
//! `HeadObject` for probes, the multipart upload family for sessions and
//! parts, and `CopyObject`/`PutObject` for transfers below the threshold.
//! Service errors are classified into [`TransportErrorKind`]s by their S3
//! error code, falling back to the HTTP status.
//!
//! [`TransportErrorKind`]: ruststack_transfer_core::TransportErrorKind

pub mod config;
pub mod transport;

pub use config::S3TransportConfig;
pub use transport::S3Transport;
