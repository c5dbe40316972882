//! Streamed upload tests.

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use ruststack_transfer_core::{
        ByteRange, Compensation, MultipartClient, ObjectId, ObjectProbe, PartResult, SessionId,
        TransferConfig, TransferError, TransferResponse, TransferSession, Transport,
        TransportError, UploadRequest,
    };
    use ruststack_transfer_memory::{FaultPlan, MemoryTransport, Operation};

    use crate::{MIB, chunked, memory_client, payload, small_parts};

    fn destination() -> ObjectId {
        ObjectId::new("dst", "upload.bin")
    }

    /// Memory transport whose part task panics on one part number.
    #[derive(Debug)]
    struct PanickingPart {
        inner: Arc<MemoryTransport>,
        part_number: u32,
    }

    #[async_trait]
    impl Transport for PanickingPart {
        async fn probe(&self, object: &ObjectId) -> Result<ObjectProbe, TransportError> {
            self.inner.probe(object).await
        }

        async fn initiate_session(&self, target: &ObjectId) -> Result<SessionId, TransportError> {
            self.inner.initiate_session(target).await
        }

        async fn upload_part(
            &self,
            session: &TransferSession,
            part_number: u32,
            body: Bytes,
        ) -> Result<PartResult, TransportError> {
            assert_ne!(part_number, self.part_number, "upload of part {part_number} blew up");
            self.inner.upload_part(session, part_number, body).await
        }

        async fn copy_part(
            &self,
            session: &TransferSession,
            part_number: u32,
            source: &ObjectId,
            range: ByteRange,
        ) -> Result<PartResult, TransportError> {
            assert_ne!(part_number, self.part_number, "copy of part {part_number} blew up");
            self.inner.copy_part(session, part_number, source, range).await
        }

        async fn finalize(
            &self,
            session: &TransferSession,
            parts: &[PartResult],
        ) -> Result<TransferResponse, TransportError> {
            self.inner.finalize(session, parts).await
        }

        async fn abort(&self, session: &TransferSession) -> Result<(), TransportError> {
            self.inner.abort(session).await
        }

        async fn copy_object(
            &self,
            source: &ObjectId,
            destination: &ObjectId,
        ) -> Result<TransferResponse, TransportError> {
            self.inner.copy_object(source, destination).await
        }

        async fn put_object(
            &self,
            destination: &ObjectId,
            body: Bytes,
        ) -> Result<TransferResponse, TransportError> {
            self.inner.put_object(destination, body).await
        }
    }

    #[tokio::test]
    async fn test_should_hold_at_most_two_parts_within_sixteen_mib_budget() {
        let transport = Arc::new(MemoryTransport::with_faults(
            FaultPlan::default().delay(Operation::UploadPart, Duration::from_millis(300)),
        ));
        let config = TransferConfig::builder()
            .maximum_memory_usage_in_bytes(16 * MIB as u64)
            .build();
        let client = memory_client(&transport, config);

        let data = Bytes::from(vec![3u8; 24 * MIB]);
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let stream = chunked(data.clone(), MIB).inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                counter.fetch_add(chunk.len(), Ordering::SeqCst);
            }
        });

        let handle = client.upload(
            UploadRequest::new(destination()).with_content_length(data.len() as u64),
            stream,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            pulled.load(Ordering::SeqCst),
            16 * MIB,
            "the third part must wait for budget before reading the stream"
        );

        let response = handle.await.unwrap_or_else(|e| panic!("upload: {e}"));
        assert_eq!(response.parts_count, Some(3));
        assert!(transport.max_in_flight_parts() <= 2);
        assert_eq!(pulled.load(Ordering::SeqCst), 24 * MIB);
        assert_eq!(
            transport.object("dst", "upload.bin").map(|o| o.data),
            Some(data)
        );
    }

    #[tokio::test]
    async fn test_should_upload_declared_stream_in_parts() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));
        let data = payload(5 * 1024 + 17);

        let response = client
            .upload(
                UploadRequest::new(destination()).with_content_length(data.len() as u64),
                chunked(data.clone(), 700),
            )
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));

        assert_eq!(response.parts_count, Some(6));
        assert!(response.etag.as_deref().is_some_and(|e| e.ends_with("-6\"")));
        assert_eq!(transport.calls().upload_part, 6);
        assert_eq!(
            transport.object("dst", "upload.bin").map(|o| o.data),
            Some(data)
        );
    }

    #[tokio::test]
    async fn test_should_put_small_payload_in_single_request() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));
        let data = payload(1024);

        client
            .upload_bytes(UploadRequest::new(destination()), data.clone())
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));

        assert_eq!(transport.calls().put_object, 1);
        assert_eq!(transport.calls().session_calls(), 0);
        assert_eq!(
            transport.object("dst", "upload.bin").map(|o| o.data),
            Some(data)
        );
    }

    #[tokio::test]
    async fn test_should_reject_short_stream_before_any_request() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));

        let err = client
            .upload(
                UploadRequest::new(destination()).with_content_length(100),
                chunked(payload(50), 16),
            )
            .await
            .expect_err("short stream");

        assert!(
            matches!(
                err,
                TransferError::ContentLengthMismatch {
                    session_id: None,
                    expected: 100,
                    actual: 50,
                    ..
                }
            ),
            "{err}"
        );
        assert_eq!(transport.calls().put_object, 0);
        assert_eq!(transport.calls().session_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_abort_when_declared_stream_runs_short() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));

        let err = client
            .upload(
                UploadRequest::new(destination()).with_content_length(5000),
                chunked(payload(4000), 1000),
            )
            .await
            .expect_err("short stream");

        assert!(
            matches!(
                err,
                TransferError::ContentLengthMismatch {
                    expected: 5000,
                    actual: 4000,
                    compensation: Compensation::Aborted,
                    ..
                }
            ),
            "{err}"
        );
        assert!(err.session_id().is_some());
        assert_eq!(transport.calls().abort, 1);
        assert_eq!(transport.calls().finalize, 0);
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_should_abort_when_declared_stream_runs_long() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));

        let err = client
            .upload(
                UploadRequest::new(destination()).with_content_length(3000),
                chunked(payload(3500), 500),
            )
            .await
            .expect_err("long stream");

        assert!(
            matches!(
                err,
                TransferError::ContentLengthMismatch { expected: 3000, .. }
            ),
            "{err}"
        );
        assert!(err.compensation().attempted());
        assert_eq!(transport.calls().finalize, 0);
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_should_upload_stream_of_unknown_length() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));
        let data = payload(3 * 1024 + 512);

        let response = client
            .upload(UploadRequest::new(destination()), chunked(data.clone(), 300))
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));

        assert_eq!(response.parts_count, Some(4));
        assert_eq!(transport.calls().upload_part, 4);
        assert_eq!(
            transport.object("dst", "upload.bin").map(|o| o.data),
            Some(data)
        );
    }

    #[tokio::test]
    async fn test_should_upload_part_aligned_stream_of_unknown_length() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));
        let data = payload(3 * 1024);

        let response = client
            .upload(UploadRequest::new(destination()), chunked(data.clone(), 1024))
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));

        assert_eq!(response.parts_count, Some(3));
        assert_eq!(
            transport.object("dst", "upload.bin").map(|o| o.data),
            Some(data)
        );
    }

    #[tokio::test]
    async fn test_should_put_short_stream_of_unknown_length() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));

        client
            .upload(UploadRequest::new(destination()), chunked(payload(900), 100))
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));

        assert_eq!(transport.calls().put_object, 1);
        assert_eq!(transport.calls().session_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_abort_when_stream_exceeds_part_ceiling() {
        let transport = Arc::new(MemoryTransport::new());
        let config = TransferConfig::builder()
            .minimum_part_size_in_bytes(1024)
            .threshold_in_bytes(1024)
            .max_part_count(3)
            .build();
        let client = memory_client(&transport, config);

        let err = client
            .upload(UploadRequest::new(destination()), chunked(payload(5000), 512))
            .await
            .expect_err("too many parts");

        assert!(
            matches!(
                err,
                TransferError::PartLimitExceeded {
                    max_part_count: 3,
                    compensation: Compensation::Aborted,
                    ..
                }
            ),
            "{err}"
        );
        assert!(transport.calls().upload_part <= 3);
        assert_eq!(transport.calls().abort, 1);
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_should_abort_when_source_fails_mid_stream() {
        let transport = Arc::new(MemoryTransport::new());
        let client = memory_client(&transport, small_parts(1024));
        let data = payload(2048);
        let stream = chunked(data, 1024).chain(futures::stream::iter([Err(io::Error::other(
            "disk went away",
        ))]));

        let err = client
            .upload(UploadRequest::new(destination()), stream)
            .await
            .expect_err("source fails");

        assert!(
            matches!(
                err,
                TransferError::SourceRead {
                    session_id: Some(_),
                    part_number: 3,
                    compensation: Compensation::Aborted,
                    ..
                }
            ),
            "{err}"
        );
        assert_eq!(transport.calls().abort, 1);
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_should_abort_once_when_part_upload_fails() {
        let transport = Arc::new(MemoryTransport::with_faults(
            FaultPlan::default().fail_part(2),
        ));
        let client = memory_client(&transport, small_parts(1024));

        let err = client
            .upload_bytes(UploadRequest::new(destination()), payload(4 * 1024))
            .await
            .expect_err("part 2 fails");

        assert_eq!(err.part_number(), Some(2));
        assert!(matches!(err.compensation(), Compensation::Aborted));
        assert_eq!(transport.calls().abort, 1);
        assert_eq!(transport.calls().finalize, 0);
        assert!(transport.object("dst", "upload.bin").is_none());
    }

    #[tokio::test]
    async fn test_should_reject_scaled_part_beyond_budget_before_any_request() {
        let transport = Arc::new(MemoryTransport::new());
        let config = TransferConfig::builder()
            .minimum_part_size_in_bytes(1024)
            .threshold_in_bytes(1024)
            .max_part_count(2)
            .build();
        let client = memory_client(&transport, config);

        let err = client
            .upload_bytes(UploadRequest::new(destination()), payload(10 * 1024))
            .await
            .expect_err("scaled part exceeds budget");

        assert!(matches!(err, TransferError::Configuration { .. }), "{err}");
        assert_eq!(transport.calls().session_calls(), 0);
    }

    #[test]
    fn test_should_reject_threshold_above_budget_before_any_request() {
        let transport = Arc::new(MemoryTransport::new());
        let config = TransferConfig::builder()
            .minimum_part_size_in_bytes(8 * 1024)
            .threshold_in_bytes(64 * 1024)
            .maximum_memory_usage_in_bytes(16 * 1024)
            .build();

        let err = MultipartClient::from_shared(Arc::clone(&transport), config)
            .err()
            .unwrap_or_else(|| panic!("threshold above budget accepted"));

        assert!(matches!(err, TransferError::Configuration { .. }), "{err}");
        assert_eq!(transport.calls().session_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_bound_path_decision_read_of_unknown_length_by_budget() {
        let transport = Arc::new(MemoryTransport::with_faults(
            FaultPlan::default().delay(Operation::UploadPart, Duration::from_millis(300)),
        ));
        let config = TransferConfig::builder()
            .minimum_part_size_in_bytes(8 * 1024)
            .threshold_in_bytes(16 * 1024)
            .maximum_memory_usage_in_bytes(16 * 1024)
            .build();
        let client = memory_client(&transport, config);

        let data = payload(128 * 1024);
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let stream = chunked(data.clone(), 1024).inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                counter.fetch_add(chunk.len(), Ordering::SeqCst);
            }
        });

        let handle = client.upload(UploadRequest::new(destination()), stream);
        tokio::time::sleep(Duration::from_millis(100)).await;
        // The budget plus the one chunk that crosses the threshold.
        assert!(
            pulled.load(Ordering::SeqCst) <= 17 * 1024,
            "pulled {} bytes",
            pulled.load(Ordering::SeqCst)
        );

        let response = handle.await.unwrap_or_else(|e| panic!("upload: {e}"));
        assert_eq!(response.parts_count, Some(16));
        assert_eq!(
            transport.object("dst", "upload.bin").map(|o| o.data),
            Some(data)
        );
    }

    #[tokio::test]
    async fn test_should_abort_with_session_context_when_part_task_panics() {
        let inner = Arc::new(MemoryTransport::new());
        let transport = Arc::new(PanickingPart {
            inner: Arc::clone(&inner),
            part_number: 2,
        });
        crate::init_tracing();
        let client = MultipartClient::from_shared(transport, small_parts(1024))
            .unwrap_or_else(|e| panic!("config: {e}"));

        let err = client
            .upload_bytes(UploadRequest::new(destination()), payload(4 * 1024))
            .await
            .expect_err("part 2 panics");

        assert!(
            matches!(
                err,
                TransferError::SessionInternal {
                    part_number: Some(2),
                    compensation: Compensation::Aborted,
                    ..
                }
            ),
            "unexpected error: {err}"
        );
        assert!(err.session_id().is_some());
        assert_eq!(inner.calls().abort, 1);
        assert_eq!(inner.calls().finalize, 0);
        assert_eq!(inner.open_sessions(), 0);
    }
}
