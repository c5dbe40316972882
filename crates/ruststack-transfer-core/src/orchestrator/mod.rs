//! Transfer state machines.
//!
//! Both flows share one shape:
//!
//! ```text
//! probe / decide ──> single request ──────────────────────────> response
//!        │
//!        v
//!    initiate ──> dispatch parts (JoinSet) ──> finalize ──────> response
//!                        │                        │
//!                        └── failure / cancel ────┴──> abort ──> error
//! ```
//!
//! [`SessionRun`] owns everything that exists once a session is open: the
//! part tasks, the completion slots, and the one-shot compensation path.
//! It is consumed by [`SessionRun::finish`] or [`SessionRun::fail`], so a
//! session is finalized or aborted exactly once, never both.

pub(crate) mod copy;
pub(crate) mod upload;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assembler::{AssemblerError, CompletionAssembler, Recorded};
use crate::budget::{BudgetPermit, MemoryBudgetGate};
use crate::error::{Compensation, TransferError};
use crate::source::PartReader;
use crate::transport::{Transport, TransportError};
use crate::types::{ObjectId, PartResult, TransferResponse, TransferSession};

/// Final result of one transfer.
pub type TransferOutcome = Result<TransferResponse, TransferError>;

/// Why a part task did not record a result.
#[derive(Debug, thiserror::Error)]
enum PartError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Assembly(#[from] AssemblerError),
}

type PartOutput = (u32, Result<Recorded, PartError>);

/// First failure observed after the session was opened.
#[derive(Debug)]
pub(crate) enum Stop {
    Cancelled,
    Part {
        part_number: u32,
        source: TransportError,
    },
    Finalize(TransportError),
    SourceRead {
        part_number: u32,
        source: std::io::Error,
    },
    LengthMismatch {
        expected: u64,
        actual: u64,
    },
    PartLimit {
        max_part_count: u32,
    },
    Internal {
        part_number: Option<u32>,
        source: anyhow::Error,
    },
}

impl Stop {
    fn internal(part_number: Option<u32>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            part_number,
            source: source.into(),
        }
    }
}

/// Await `future` unless `cancel` fires first.
pub(crate) async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

/// Error for a transfer cancelled before any session existed.
pub(crate) fn cancelled_before_session() -> TransferError {
    TransferError::Cancelled {
        session_id: None,
        compensation: Compensation::NotRequired,
    }
}

/// Open a multipart session for `target`.
pub(crate) async fn open_session<T: Transport>(
    transport: &T,
    target: &ObjectId,
    cancel: &CancellationToken,
) -> Result<TransferSession, TransferError> {
    match until_cancelled(cancel, transport.initiate_session(target)).await {
        None => Err(cancelled_before_session()),
        Some(Err(source)) => Err(TransferError::SessionInitiation {
            target: target.to_string(),
            source,
        }),
        Some(Ok(id)) => {
            debug!(object = %target, session_id = %id, "multipart session initiated");
            Ok(TransferSession {
                id,
                target: target.clone(),
            })
        }
    }
}

/// An open session and its in-flight part requests.
pub(crate) struct SessionRun<T> {
    transport: Arc<T>,
    session: Arc<TransferSession>,
    assembler: Arc<CompletionAssembler>,
    cancel: CancellationToken,
    tasks: JoinSet<PartOutput>,
    /// Part number of every spawned task, to name the part of a panicked task.
    task_parts: HashMap<Id, u32>,
}

impl<T: Transport> SessionRun<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        session: TransferSession,
        assembler: CompletionAssembler,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            session: Arc::new(session),
            assembler: Arc::new(assembler),
            cancel,
            tasks: JoinSet::new(),
            task_parts: HashMap::new(),
        }
    }

    pub(crate) fn transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }

    pub(crate) fn session(&self) -> Arc<TransferSession> {
        Arc::clone(&self.session)
    }

    /// Number of part requests still running.
    pub(crate) fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Spawn one part request. Its result lands in the completion slots as
    /// soon as it resolves; `permit` is held until then.
    pub(crate) fn spawn_part<F>(&mut self, part_number: u32, permit: Option<BudgetPermit>, request: F)
    where
        F: Future<Output = Result<PartResult, TransportError>> + Send + 'static,
    {
        let assembler = Arc::clone(&self.assembler);
        let task = self.tasks.spawn(async move {
            let result = request.await;
            drop(permit);
            let recorded = result
                .map_err(PartError::from)
                .and_then(|part| assembler.record(part).map_err(PartError::from));
            (part_number, recorded)
        });
        self.task_parts.insert(task.id(), part_number);
    }

    /// Wait for the next part to resolve. `Ok(false)` means none are left.
    pub(crate) async fn next_settled(&mut self) -> Result<bool, Stop> {
        let joined = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(Stop::Cancelled),
            joined = self.tasks.join_next() => joined,
        };
        match joined {
            None => Ok(false),
            Some(joined) => self.settle(joined).map(|()| true),
        }
    }

    /// Wait for every in-flight part to resolve.
    pub(crate) async fn drain(&mut self) -> Result<(), Stop> {
        while self.next_settled().await? {}
        Ok(())
    }

    /// Await `future` while reaping finished parts, so a part failure or a
    /// cancellation interrupts a slow source read or a budget wait.
    pub(crate) async fn drive<F: Future>(&mut self, future: F) -> Result<F::Output, Stop> {
        let mut future = std::pin::pin!(future);
        loop {
            let joined = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Stop::Cancelled),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => joined,
                output = &mut future => return Ok(output),
            };
            self.settle(joined)?;
        }
    }

    /// Reserve upload budget for one part.
    pub(crate) async fn acquire(
        &mut self,
        gate: &MemoryBudgetGate,
        bytes: u64,
    ) -> Result<BudgetPermit, Stop> {
        self.drive(gate.acquire(bytes))
            .await?
            .map_err(|err| Stop::internal(None, err))
    }

    /// Read the body of `part_number` from the upload source.
    pub(crate) async fn read(
        &mut self,
        reader: &mut PartReader,
        part_number: u32,
        len: usize,
    ) -> Result<bytes::Bytes, Stop> {
        self.drive(reader.read_part(len))
            .await?
            .map_err(|source| Stop::SourceRead {
                part_number,
                source,
            })
    }

    /// Fix the part count once the upload source is drained.
    pub(crate) fn seal(&self, part_count: u32) -> Result<(), Stop> {
        match self.assembler.seal(part_count) {
            Ok(Recorded::Complete) => {
                debug!(session_id = %self.session.id, part_count, "all parts recorded");
                Ok(())
            }
            Ok(Recorded::Pending) => Ok(()),
            Err(err) => Err(Stop::internal(None, err)),
        }
    }

    fn settle(&self, joined: Result<PartOutput, JoinError>) -> Result<(), Stop> {
        match joined {
            Ok((part_number, Ok(recorded))) => {
                debug!(session_id = %self.session.id, part_number, "part completed");
                if recorded == Recorded::Complete {
                    debug!(
                        session_id = %self.session.id,
                        part_count = self.assembler.recorded(),
                        "all parts recorded"
                    );
                }
                Ok(())
            }
            Ok((part_number, Err(PartError::Transport(source)))) => Err(Stop::Part {
                part_number,
                source,
            }),
            Ok((part_number, Err(PartError::Assembly(err)))) => Err(Stop::internal(
                Some(part_number),
                anyhow::Error::new(err).context(format!("failed to record part {part_number}")),
            )),
            Err(err) => {
                let part_number = self.task_parts.get(&err.id()).copied();
                Err(Stop::internal(
                    part_number,
                    anyhow::Error::new(err).context("part task did not complete"),
                ))
            }
        }
    }

    /// Wait for the remaining parts and commit the session.
    pub(crate) async fn finish(mut self) -> Result<TransferResponse, TransferError> {
        if let Err(stop) = self.drain().await {
            return Err(self.fail(stop).await);
        }
        let parts = match self.assembler.ordered() {
            Ok(parts) => parts,
            Err(err) => return Err(self.fail(Stop::internal(None, err)).await),
        };

        let finalized = until_cancelled(
            &self.cancel,
            self.transport.finalize(&self.session, &parts),
        )
        .await;
        match finalized {
            None => Err(self.fail(Stop::Cancelled).await),
            Some(Err(source)) => Err(self.fail(Stop::Finalize(source)).await),
            Some(Ok(mut response)) => {
                let part_count = u32::try_from(parts.len()).unwrap_or(u32::MAX);
                response.parts_count.get_or_insert(part_count);
                info!(
                    target_object = %self.session.target,
                    session_id = %self.session.id,
                    part_count,
                    "multipart transfer completed"
                );
                Ok(response)
            }
        }
    }

    /// Cancel outstanding parts, abort the session, and build the error for
    /// the first failure.
    pub(crate) async fn fail(mut self, stop: Stop) -> TransferError {
        self.cancel_parts().await;
        let compensation = self.compensate().await;
        let session_id = self.session.id.clone();

        match stop {
            Stop::Cancelled => TransferError::Cancelled {
                session_id: Some(session_id),
                compensation,
            },
            Stop::Part {
                part_number,
                source,
            } => TransferError::Part {
                session_id,
                part_number,
                source,
                compensation,
            },
            Stop::Finalize(source) => TransferError::Finalize {
                session_id,
                source,
                compensation,
            },
            Stop::SourceRead {
                part_number,
                source,
            } => TransferError::SourceRead {
                session_id: Some(session_id),
                part_number,
                source,
                compensation,
            },
            Stop::LengthMismatch { expected, actual } => TransferError::ContentLengthMismatch {
                session_id: Some(session_id),
                expected,
                actual,
                compensation,
            },
            Stop::PartLimit { max_part_count } => TransferError::PartLimitExceeded {
                session_id,
                max_part_count,
                compensation,
            },
            Stop::Internal {
                part_number,
                source,
            } => TransferError::SessionInternal {
                session_id,
                part_number,
                source,
                compensation,
            },
        }
    }

    async fn cancel_parts(&mut self) {
        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next().await {
            if let Ok((part_number, Err(err))) = joined {
                warn!(
                    session_id = %self.session.id,
                    part_number,
                    error = %err,
                    "suppressed failure of a sibling part"
                );
            }
        }
    }

    async fn compensate(&self) -> Compensation {
        match self.transport.abort(&self.session).await {
            Ok(()) => {
                debug!(session_id = %self.session.id, "multipart session aborted");
                Compensation::Aborted
            }
            Err(err) => {
                warn!(
                    session_id = %self.session.id,
                    error = %err,
                    "failed to abort multipart session"
                );
                Compensation::AbortFailed(err)
            }
        }
    }
}

impl<T> std::fmt::Debug for SessionRun<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRun")
            .field("session", &self.session)
            .field("in_flight", &self.tasks.len())
            .field("recorded", &self.assembler.recorded())
            .finish_non_exhaustive()
    }
}
