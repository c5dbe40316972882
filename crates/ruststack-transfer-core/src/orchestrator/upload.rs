//! Streamed upload: buffer the source into part-sized bodies under the
//! memory budget and upload each as it fills.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    SessionRun, Stop, TransferOutcome, cancelled_before_session, open_session, until_cancelled,
};
use crate::assembler::CompletionAssembler;
use crate::budget::MemoryBudgetGate;
use crate::error::{Compensation, TransferError};
use crate::policy::{PartPlan, SizePolicy};
use crate::source::PartReader;
use crate::transport::Transport;
use crate::types::{ObjectId, UploadRequest};

pub(crate) async fn run<T: Transport>(
    transport: Arc<T>,
    policy: SizePolicy,
    memory_budget: u64,
    request: UploadRequest,
    reader: PartReader,
    cancel: CancellationToken,
) -> TransferOutcome {
    let UploadRequest {
        destination,
        content_length,
    } = request;
    let upload = Upload {
        transport,
        policy,
        memory_budget,
        destination,
        reader,
        cancel,
    };
    match content_length {
        Some(expected) => upload.declared(expected).await,
        None => upload.streamed().await,
    }
}

struct Upload<T> {
    transport: Arc<T>,
    policy: SizePolicy,
    memory_budget: u64,
    destination: ObjectId,
    reader: PartReader,
    cancel: CancellationToken,
}

impl<T: Transport> Upload<T> {
    /// The caller declared the stream length: plan every part upfront.
    async fn declared(mut self, expected: u64) -> TransferOutcome {
        if !self.policy.use_multipart(expected) {
            let len = to_len(expected.saturating_add(1))?;
            let body = match until_cancelled(&self.cancel, self.reader.read_part(len)).await {
                None => return Err(cancelled_before_session()),
                Some(Err(source)) => return Err(source_read_before_session(source)),
                Some(Ok(body)) => body,
            };
            if body.len() as u64 != expected {
                return Err(TransferError::ContentLengthMismatch {
                    session_id: None,
                    expected,
                    actual: body.len() as u64,
                    compensation: Compensation::NotRequired,
                });
            }
            return self.put(body).await;
        }

        let plan = self.policy.plan(expected);
        let gate = MemoryBudgetGate::new(self.memory_budget)?;
        gate.check(plan.part_size())?;
        to_len(plan.part_size())?;

        let session = open_session(self.transport.as_ref(), &self.destination, &self.cancel).await?;
        if plan.is_scaled() {
            info!(
                session_id = %session.id,
                configured_part_size = self.policy.part_size(),
                part_size = plan.part_size(),
                max_part_count = self.policy.max_part_count(),
                "part size raised to stay within the part ceiling"
            );
        }
        debug!(
            session_id = %session.id,
            part_size = plan.part_size(),
            part_count = plan.part_count(),
            "uploading declared-length stream"
        );

        let mut run = SessionRun::new(
            Arc::clone(&self.transport),
            session,
            CompletionAssembler::new(plan.part_count()),
            self.cancel.clone(),
        );
        match dispatch_planned(&mut run, &gate, &mut self.reader, &plan).await {
            Ok(()) => run.finish().await,
            Err(stop) => Err(run.fail(stop).await),
        }
    }

    /// Length unknown: buffer just past the single-request limit to choose
    /// the path, then cut parts of the configured size until the stream ends.
    async fn streamed(mut self) -> TransferOutcome {
        let limit = self.policy.single_request_limit();
        let peek = to_len(limit.saturating_add(1))?;
        let buffered = match until_cancelled(&self.cancel, self.reader.fill(peek)).await {
            None => return Err(cancelled_before_session()),
            Some(Err(source)) => return Err(source_read_before_session(source)),
            Some(Ok(buffered)) => buffered,
        };

        if buffered as u64 <= limit {
            let body = match self.reader.read_part(buffered).await {
                Ok(body) => body,
                Err(source) => return Err(source_read_before_session(source)),
            };
            return self.put(body).await;
        }

        let part_size = self.policy.part_size();
        let gate = MemoryBudgetGate::new(self.memory_budget)?;
        gate.check(part_size)?;
        let len = to_len(part_size)?;

        let session = open_session(self.transport.as_ref(), &self.destination, &self.cancel).await?;
        debug!(
            session_id = %session.id,
            part_size,
            "uploading stream of unknown length"
        );

        let mut run = SessionRun::new(
            Arc::clone(&self.transport),
            session,
            CompletionAssembler::open(self.policy.max_part_count()),
            self.cancel.clone(),
        );
        let max_part_count = self.policy.max_part_count();
        match dispatch_streamed(&mut run, &gate, &mut self.reader, len, max_part_count).await {
            Ok(()) => run.finish().await,
            Err(stop) => Err(run.fail(stop).await),
        }
    }

    async fn put(self, body: bytes::Bytes) -> TransferOutcome {
        debug!(destination = %self.destination, size = body.len(), "uploading in a single request");
        match until_cancelled(&self.cancel, self.transport.put_object(&self.destination, body)).await {
            None => Err(cancelled_before_session()),
            Some(result) => result.map_err(TransferError::Request),
        }
    }
}

async fn dispatch_planned<T: Transport>(
    run: &mut SessionRun<T>,
    gate: &MemoryBudgetGate,
    reader: &mut PartReader,
    plan: &PartPlan,
) -> Result<(), Stop> {
    for part in plan.parts() {
        let len = part.range.len();
        let permit = run.acquire(gate, len).await?;
        let body = run
            .read(reader, part.part_number, usize::try_from(len).unwrap_or(usize::MAX))
            .await?;
        if (body.len() as u64) < len {
            return Err(Stop::LengthMismatch {
                expected: plan.total_size(),
                actual: reader.consumed(),
            });
        }

        let transport = run.transport();
        let session = run.session();
        let part_number = part.part_number;
        run.spawn_part(part_number, Some(permit), async move {
            transport.upload_part(&session, part_number, body).await
        });
    }

    let drained = run
        .drive(reader.is_drained())
        .await?
        .map_err(|source| Stop::SourceRead {
            part_number: plan.part_count(),
            source,
        })?;
    if !drained {
        return Err(Stop::LengthMismatch {
            expected: plan.total_size(),
            actual: reader.consumed() + reader.buffered() as u64,
        });
    }
    Ok(())
}

async fn dispatch_streamed<T: Transport>(
    run: &mut SessionRun<T>,
    gate: &MemoryBudgetGate,
    reader: &mut PartReader,
    part_size: usize,
    max_part_count: u32,
) -> Result<(), Stop> {
    let mut part_count = 0u32;
    loop {
        let permit = run.acquire(gate, part_size as u64).await?;
        let body = run.read(reader, part_count + 1, part_size).await?;
        if body.is_empty() {
            break;
        }
        if part_count == max_part_count {
            return Err(Stop::PartLimit { max_part_count });
        }
        part_count += 1;

        let last = body.len() < part_size;
        let transport = run.transport();
        let session = run.session();
        let part_number = part_count;
        run.spawn_part(part_number, Some(permit), async move {
            transport.upload_part(&session, part_number, body).await
        });
        if last {
            break;
        }
    }
    run.seal(part_count)
}

fn to_len(bytes: u64) -> Result<usize, TransferError> {
    usize::try_from(bytes).map_err(|_| {
        TransferError::configuration(format!("{bytes} bytes cannot be buffered on this platform"))
    })
}

fn source_read_before_session(source: std::io::Error) -> TransferError {
    TransferError::SourceRead {
        session_id: None,
        part_number: 1,
        source,
        compensation: Compensation::NotRequired,
    }
}
