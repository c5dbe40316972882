//! Cancellable handle to a running transfer.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::orchestrator::TransferOutcome;

pin_project! {
    /// A transfer running on the Tokio runtime.
    ///
    /// The handle is returned before any request is issued. Await it (or
    /// call [`join`](Self::join)) for the single terminal outcome. Dropping
    /// the handle detaches the transfer; only [`cancel`](Self::cancel) stops
    /// it.
    #[derive(Debug)]
    pub struct TransferHandle {
        #[pin]
        task: JoinHandle<TransferOutcome>,
        cancel: CancellationToken,
    }
}

impl TransferHandle {
    /// Spawn `transfer` and return its handle.
    pub(crate) fn spawn<F>(cancel: CancellationToken, transfer: F) -> Self
    where
        F: Future<Output = TransferOutcome> + Send + 'static,
    {
        Self {
            task: tokio::spawn(transfer),
            cancel,
        }
    }

    /// Request cancellation.
    ///
    /// A pending probe or initiate is dropped, in-flight parts are cancelled,
    /// and an open session is aborted. The outcome becomes
    /// [`TransferError::Cancelled`] unless the transfer already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the outcome is ready.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Token that cancels this transfer; can be tied to a parent token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the outcome.
    pub async fn join(self) -> TransferOutcome {
        self.await
    }
}

impl Future for TransferHandle {
    type Output = TransferOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        Poll::Ready(match ready!(this.task.poll(cx)) {
            Ok(outcome) => outcome,
            Err(err) => Err(TransferError::Internal(
                anyhow::Error::new(err).context("transfer task did not complete"),
            )),
        })
    }
}
