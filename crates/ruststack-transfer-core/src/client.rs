//! Caller-facing multipart client.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::handle::TransferHandle;
use crate::orchestrator::{copy, upload};
use crate::policy::SizePolicy;
use crate::source::PartReader;
use crate::transport::Transport;
use crate::types::{CopyRequest, UploadRequest};

/// Wraps a [`Transport`] and turns large copies and uploads into multipart
/// sessions.
///
/// Everything else goes straight to the wrapped transport via
/// [`transport`](Self::transport).
///
/// # Examples
///
/// ```ignore
/// let client = MultipartClient::new(transport, TransferConfig::default())?;
/// let response = client
///     .copy(CopyRequest::new(
///         ObjectId::new("src-bucket", "big.bin"),
///         ObjectId::new("dst-bucket", "big.bin"),
///     ))
///     .await?;
/// ```
#[derive(Debug)]
pub struct MultipartClient<T> {
    transport: Arc<T>,
    config: TransferConfig,
    policy: SizePolicy,
}

impl<T> Clone for MultipartClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            policy: self.policy,
        }
    }
}

impl<T: Transport> MultipartClient<T> {
    /// Create a client. Fails with [`TransferError::Configuration`] before
    /// any request if `config` is unusable.
    pub fn new(transport: T, config: TransferConfig) -> Result<Self, TransferError> {
        Self::from_shared(Arc::new(transport), config)
    }

    /// Create a client over a transport shared with other owners.
    pub fn from_shared(transport: Arc<T>, config: TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let policy = SizePolicy::from_config(&config);
        Ok(Self {
            transport,
            config,
            policy,
        })
    }

    /// The wrapped transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// The size policy derived from the configuration.
    #[must_use]
    pub fn policy(&self) -> SizePolicy {
        self.policy
    }

    /// Start a server-side copy.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn copy(&self, request: CopyRequest) -> TransferHandle {
        let cancel = CancellationToken::new();
        let transfer = copy::run(
            Arc::clone(&self.transport),
            self.policy,
            self.config.max_concurrent_copy_parts,
            request,
            cancel.clone(),
        );
        TransferHandle::spawn(cancel, transfer)
    }

    /// Start an upload of `stream` into `request.destination`.
    ///
    /// When `request.content_length` is set the stream must produce exactly
    /// that many bytes.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn upload<S>(&self, request: UploadRequest, stream: S) -> TransferHandle
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let transfer = upload::run(
            Arc::clone(&self.transport),
            self.policy,
            self.config.memory_budget(),
            request,
            PartReader::new(stream),
            cancel.clone(),
        );
        TransferHandle::spawn(cancel, transfer)
    }

    /// Upload an in-memory payload; its length is declared from `body`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn upload_bytes(&self, request: UploadRequest, body: Bytes) -> TransferHandle {
        let request = request.with_content_length(body.len() as u64);
        self.upload(request, futures::stream::iter([Ok(body)]))
    }
}
