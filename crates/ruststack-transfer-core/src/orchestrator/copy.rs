//! Server-side copy: probe, then a single `copy_object` or one range copy
//! per part.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{SessionRun, TransferOutcome, cancelled_before_session, open_session, until_cancelled};
use crate::assembler::CompletionAssembler;
use crate::error::TransferError;
use crate::policy::SizePolicy;
use crate::transport::Transport;
use crate::types::CopyRequest;

pub(crate) async fn run<T: Transport>(
    transport: Arc<T>,
    policy: SizePolicy,
    max_concurrent_parts: Option<usize>,
    request: CopyRequest,
    cancel: CancellationToken,
) -> TransferOutcome {
    let CopyRequest {
        source,
        destination,
    } = request;

    let probe = match until_cancelled(&cancel, transport.probe(&source)).await {
        None => return Err(cancelled_before_session()),
        Some(Err(err)) => {
            return Err(TransferError::Probe {
                object: source.to_string(),
                source: err,
            });
        }
        Some(Ok(probe)) => probe,
    };
    let total_size = probe.content_length;
    debug!(source = %source, destination = %destination, total_size, "probed copy source");

    if !policy.use_multipart(total_size) {
        debug!(source = %source, total_size, "copying in a single request");
        return match until_cancelled(&cancel, transport.copy_object(&source, &destination)).await
        {
            None => Err(cancelled_before_session()),
            Some(result) => result.map_err(TransferError::Request),
        };
    }

    let session = open_session(transport.as_ref(), &destination, &cancel).await?;
    let plan = policy.plan(total_size);
    if plan.is_scaled() {
        info!(
            session_id = %session.id,
            configured_part_size = policy.part_size(),
            part_size = plan.part_size(),
            max_part_count = policy.max_part_count(),
            "part size raised to stay within the part ceiling"
        );
    }
    debug!(
        session_id = %session.id,
        part_size = plan.part_size(),
        part_count = plan.part_count(),
        "dispatching range copies"
    );

    let source = Arc::new(source);
    let mut run = SessionRun::new(
        transport,
        session,
        CompletionAssembler::new(plan.part_count()),
        cancel,
    );
    let mut parts = plan.parts();

    loop {
        while max_concurrent_parts.is_none_or(|cap| run.in_flight() < cap) {
            let Some(part) = parts.next() else {
                break;
            };
            let transport = run.transport();
            let session = run.session();
            let source = Arc::clone(&source);
            run.spawn_part(part.part_number, None, async move {
                transport
                    .copy_part(&session, part.part_number, &source, part.range)
                    .await
            });
        }

        match run.next_settled().await {
            Ok(true) => {}
            Ok(false) => break,
            Err(stop) => return Err(run.fail(stop).await),
        }
    }

    run.finish().await
}
