//! Cancellation tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;
    use ruststack_transfer_core::{
        Compensation, CopyRequest, ObjectId, TransferConfig, TransferError, UploadRequest,
    };
    use ruststack_transfer_memory::{FaultPlan, MemoryTransport, Operation};

    use crate::{chunked, memory_client, payload, small_parts, wait_for};

    fn request() -> CopyRequest {
        CopyRequest::new(ObjectId::new("src", "a.bin"), ObjectId::new("dst", "b.bin"))
    }

    #[tokio::test]
    async fn test_should_cancel_pending_probe_without_compensation() {
        let transport = Arc::new(MemoryTransport::with_faults(
            FaultPlan::default().delay(Operation::Probe, Duration::from_secs(30)),
        ));
        transport.insert_object("src", "a.bin", payload(4096));
        let client = memory_client(&transport, TransferConfig::default());

        let handle = client.copy(request());
        wait_for(|| transport.calls().probe == 1).await;
        handle.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap_or_else(|_| panic!("cancelled copy did not finish"))
            .expect_err("cancelled");

        assert!(
            matches!(
                err,
                TransferError::Cancelled {
                    session_id: None,
                    compensation: Compensation::NotRequired,
                }
            ),
            "{err}"
        );
        assert_eq!(transport.calls().session_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_abort_session_when_cancelled_mid_parts() {
        let transport = Arc::new(MemoryTransport::with_faults(
            FaultPlan::default().delay(Operation::CopyPart, Duration::from_secs(30)),
        ));
        transport.insert_object("src", "a.bin", payload(4 * 1024));
        let client = memory_client(&transport, small_parts(1024));

        let handle = client.copy(request());
        wait_for(|| transport.calls().copy_part == 4).await;
        handle.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap_or_else(|_| panic!("cancelled copy did not finish"))
            .expect_err("cancelled");

        assert!(err.is_cancelled(), "{err}");
        assert!(err.session_id().is_some());
        assert!(matches!(err.compensation(), Compensation::Aborted));
        let calls = transport.calls();
        assert_eq!(calls.abort, 1);
        assert_eq!(calls.finalize, 0);
        assert_eq!(transport.open_sessions(), 0);
        assert!(transport.object("dst", "b.bin").is_none());
    }

    #[tokio::test]
    async fn test_should_abort_upload_cancelled_while_stream_stalls() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));
        let stream = chunked(payload(2048), 512).chain(futures::stream::pending());

        let handle = client.upload(UploadRequest::new(ObjectId::new("dst", "b.bin")), stream);
        wait_for(|| transport.calls().initiate == 1).await;
        handle.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap_or_else(|_| panic!("cancelled upload did not finish"))
            .expect_err("cancelled");

        assert!(err.is_cancelled(), "{err}");
        assert!(matches!(err.compensation(), Compensation::Aborted));
        assert_eq!(transport.calls().abort, 1);
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_should_abort_when_cancelled_during_finalize() {
        let transport = Arc::new(MemoryTransport::with_faults(
            FaultPlan::default().delay(Operation::Finalize, Duration::from_secs(30)),
        ));
        transport.insert_object("src", "a.bin", payload(4 * 1024));
        let client = memory_client(&transport, small_parts(1024));

        let handle = client.copy(request());
        wait_for(|| transport.calls().finalize == 1).await;
        handle.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap_or_else(|_| panic!("cancelled copy did not finish"))
            .expect_err("cancelled");

        assert!(err.is_cancelled(), "{err}");
        assert_eq!(transport.calls().abort, 1);
        assert_eq!(transport.open_sessions(), 0);
    }
}
