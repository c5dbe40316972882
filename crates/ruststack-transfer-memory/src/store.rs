//! The in-memory [`Transport`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use ruststack_transfer_core::{
    ByteRange, ObjectId, ObjectProbe, PartResult, SessionId, TransferResponse, TransferSession,
    Transport, TransportError, TransportErrorKind,
};
use tracing::{debug, trace};

use crate::faults::{FaultPlan, Operation};
use crate::state::{Session, StoredObject, StoredPart};

/// Composite key identifying a stored object: `(bucket, key)`.
type ObjectKey = (String, String);

/// Number of calls made to each operation, failed calls included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `probe` calls.
    pub probe: u64,
    /// `initiate_session` calls.
    pub initiate: u64,
    /// `upload_part` calls.
    pub upload_part: u64,
    /// `copy_part` calls.
    pub copy_part: u64,
    /// `finalize` calls.
    pub finalize: u64,
    /// `abort` calls.
    pub abort: u64,
    /// `copy_object` calls.
    pub copy_object: u64,
    /// `put_object` calls.
    pub put_object: u64,
}

impl CallCounts {
    /// Calls that belong to a multipart session.
    #[must_use]
    pub fn session_calls(&self) -> u64 {
        self.initiate + self.upload_part + self.copy_part + self.finalize + self.abort
    }
}

/// Object store kept entirely in memory.
///
/// Behaves like the service's multipart API: sessions collect parts keyed by
/// part number, `finalize` validates the part list strictly, and entity tags
/// follow the service's MD5 format. Versioning is not modeled; a source
/// `version_id` is ignored.
///
/// Thread-safe: objects and sessions live in [`DashMap`]s, so concurrent
/// part requests for one session only contend on that session's entry.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    objects: DashMap<ObjectKey, StoredObject>,
    sessions: DashMap<String, Session>,
    calls: [AtomicU64; Operation::ALL.len()],
    in_flight_parts: Arc<AtomicUsize>,
    max_in_flight_parts: AtomicUsize,
    faults: RwLock<FaultPlan>,
}

impl MemoryTransport {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with faults injected.
    #[must_use]
    pub fn with_faults(faults: FaultPlan) -> Self {
        let transport = Self::default();
        *transport.faults.write() = faults;
        transport
    }

    /// Replace the fault plan.
    pub fn set_faults(&self, faults: FaultPlan) {
        *self.faults.write() = faults;
    }

    /// Store an object directly, bypassing call accounting.
    pub fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>) -> String {
        let object = StoredObject::single(data.into());
        let etag = object.etag.clone();
        self.objects
            .insert((bucket.to_owned(), key.to_owned()), object);
        etag
    }

    /// A stored object, if present.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .get(&(bucket.to_owned(), key.to_owned()))
            .map(|entry| entry.value().clone())
    }

    /// Number of sessions neither finalized nor aborted.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Identifiers of the open sessions.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions
            .iter()
            .map(|entry| SessionId::new(entry.key().clone()))
            .collect()
    }

    /// Part numbers stored in an open session.
    #[must_use]
    pub fn session_parts(&self, session_id: &SessionId) -> Option<Vec<u32>> {
        self.sessions
            .get(session_id.as_str())
            .map(|session| session.parts.keys().copied().collect())
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        let count = |op: Operation| self.calls[op.index()].load(Ordering::Acquire);
        CallCounts {
            probe: count(Operation::Probe),
            initiate: count(Operation::Initiate),
            upload_part: count(Operation::UploadPart),
            copy_part: count(Operation::CopyPart),
            finalize: count(Operation::Finalize),
            abort: count(Operation::Abort),
            copy_object: count(Operation::CopyObject),
            put_object: count(Operation::PutObject),
        }
    }

    /// Highest number of part requests that were running at the same time.
    #[must_use]
    pub fn max_in_flight_parts(&self) -> usize {
        self.max_in_flight_parts.load(Ordering::Acquire)
    }

    /// Count the call, apply the configured delay, then fail if requested.
    async fn enter(&self, op: Operation, part_number: Option<u32>) -> Result<(), TransportError> {
        self.calls[op.index()].fetch_add(1, Ordering::AcqRel);
        let (hold, delay, fails) = {
            let faults = self.faults.read();
            let fails = faults.fails(op) || part_number.is_some_and(|n| faults.fails_part(n));
            (faults.hold_for(part_number), faults.delay_for(op, part_number), fails)
        };
        if let Some(release) = hold {
            trace!(operation = %op, ?part_number, "holding part");
            release.notified().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            trace!(operation = %op, ?part_number, "injecting failure");
            return Err(TransportError::new(
                TransportErrorKind::Service,
                format!("injected failure: {op}"),
            ));
        }
        Ok(())
    }

    fn track_part(&self) -> InFlightGuard {
        let now = self.in_flight_parts.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight_parts.fetch_max(now, Ordering::AcqRel);
        InFlightGuard {
            counter: Arc::clone(&self.in_flight_parts),
        }
    }

    fn source(&self, object: &ObjectId) -> Result<StoredObject, TransportError> {
        self.objects
            .get(&(object.bucket.clone(), object.key.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                TransportError::new(
                    TransportErrorKind::NotFound,
                    format!("the specified key does not exist: {object}"),
                )
            })
    }

    fn store_part(
        &self,
        session: &TransferSession,
        part_number: u32,
        data: Bytes,
    ) -> Result<PartResult, TransportError> {
        let part = StoredPart::new(data);
        let mut entry = self
            .sessions
            .get_mut(session.id.as_str())
            .ok_or_else(|| no_such_upload(&session.id))?;
        let result = PartResult::new(part_number, part.etag.clone());
        entry.parts.insert(part_number, part);
        Ok(result)
    }
}

/// Decrements the in-flight part counter when a part call ends or is dropped.
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

fn no_such_upload(id: &SessionId) -> TransportError {
    TransportError::new(
        TransportErrorKind::NoSuchUpload,
        format!("the specified upload does not exist: {id}"),
    )
}

fn response_for(target: &ObjectId, object: &StoredObject) -> TransferResponse {
    TransferResponse {
        etag: Some(object.etag.clone()),
        version_id: None,
        location: Some(format!("/{}/{}", target.bucket, target.key)),
        parts_count: object.parts_count,
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn probe(&self, object: &ObjectId) -> Result<ObjectProbe, TransportError> {
        self.enter(Operation::Probe, None).await?;
        let stored = self.source(object)?;
        Ok(ObjectProbe {
            content_length: stored.data.len() as u64,
            etag: Some(stored.etag),
        })
    }

    async fn initiate_session(&self, target: &ObjectId) -> Result<SessionId, TransportError> {
        self.enter(Operation::Initiate, None).await?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.insert(id.clone(), Session::new(target.clone()));
        debug!(object = %target, upload_id = %id, "session created");
        Ok(SessionId::new(id))
    }

    async fn upload_part(
        &self,
        session: &TransferSession,
        part_number: u32,
        body: Bytes,
    ) -> Result<PartResult, TransportError> {
        let _guard = self.track_part();
        self.enter(Operation::UploadPart, Some(part_number)).await?;
        trace!(upload_id = %session.id, part_number, size = body.len(), "storing uploaded part");
        self.store_part(session, part_number, body)
    }

    async fn copy_part(
        &self,
        session: &TransferSession,
        part_number: u32,
        source: &ObjectId,
        range: ByteRange,
    ) -> Result<PartResult, TransportError> {
        let _guard = self.track_part();
        self.enter(Operation::CopyPart, Some(part_number)).await?;
        let stored = self.source(source)?;
        let size = stored.data.len() as u64;
        if range.end() >= size {
            return Err(TransportError::new(
                TransportErrorKind::InvalidPart,
                format!("range {range} is outside {source} of {size} bytes"),
            ));
        }
        let start = usize::try_from(range.start()).unwrap_or(usize::MAX);
        let end = usize::try_from(range.end()).unwrap_or(usize::MAX);
        trace!(upload_id = %session.id, part_number, %range, "storing copied part");
        self.store_part(session, part_number, stored.data.slice(start..=end))
    }

    async fn finalize(
        &self,
        session: &TransferSession,
        parts: &[PartResult],
    ) -> Result<TransferResponse, TransportError> {
        self.enter(Operation::Finalize, None).await?;
        let object = {
            let entry = self
                .sessions
                .get(session.id.as_str())
                .ok_or_else(|| no_such_upload(&session.id))?;
            entry.assemble(parts)?
        };
        let (_, open) = self
            .sessions
            .remove(session.id.as_str())
            .ok_or_else(|| no_such_upload(&session.id))?;

        let response = response_for(&open.target, &object);
        debug!(
            upload_id = %session.id,
            object = %open.target,
            size = object.data.len(),
            parts = parts.len(),
            "session finalized"
        );
        self.objects
            .insert((open.target.bucket, open.target.key), object);
        Ok(response)
    }

    async fn abort(&self, session: &TransferSession) -> Result<(), TransportError> {
        self.enter(Operation::Abort, None).await?;
        let (_, aborted) = self
            .sessions
            .remove(session.id.as_str())
            .ok_or_else(|| no_such_upload(&session.id))?;
        debug!(upload_id = %session.id, parts = aborted.parts.len(), "session aborted");
        Ok(())
    }

    async fn copy_object(
        &self,
        source: &ObjectId,
        destination: &ObjectId,
    ) -> Result<TransferResponse, TransportError> {
        self.enter(Operation::CopyObject, None).await?;
        let stored = self.source(source)?;
        let object = StoredObject::single(stored.data);
        let response = response_for(destination, &object);
        self.objects
            .insert((destination.bucket.clone(), destination.key.clone()), object);
        Ok(response)
    }

    async fn put_object(
        &self,
        destination: &ObjectId,
        body: Bytes,
    ) -> Result<TransferResponse, TransportError> {
        self.enter(Operation::PutObject, None).await?;
        let object = StoredObject::single(body);
        let response = response_for(destination, &object);
        self.objects
            .insert((destination.bucket.clone(), destination.key.clone()), object);
        Ok(response)
    }
}
