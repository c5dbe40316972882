//! End-to-end tests for the RustStack transfer engine.
//!
//! Most tests drive [`MultipartClient`] against the in-memory transport and
//! run with a plain `cargo test`. The `test_s3` module talks to a live
//! S3-compatible endpoint and is marked `#[ignore]`; run it with:
//! ```text
//! S3_ENDPOINT_URL=http://localhost:4566 \
//!     cargo test -p ruststack-transfer-integration -- --ignored
//! ```

use std::io;
use std::sync::{Arc, Once};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use ruststack_transfer_core::{MultipartClient, TransferConfig};
use ruststack_transfer_memory::MemoryTransport;

static INIT: Once = Once::new();

/// One mebibyte.
pub const MIB: usize = 1024 * 1024;

/// Initialize tracing (once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Client over a shared in-memory transport.
#[must_use]
pub fn memory_client(
    transport: &Arc<MemoryTransport>,
    config: TransferConfig,
) -> MultipartClient<MemoryTransport> {
    init_tracing();
    MultipartClient::from_shared(Arc::clone(transport), config)
        .unwrap_or_else(|e| panic!("invalid test config: {e}"))
}

/// Config with `part` byte parts and an equal threshold.
#[must_use]
pub fn small_parts(part: u64) -> TransferConfig {
    TransferConfig::builder()
        .minimum_part_size_in_bytes(part)
        .threshold_in_bytes(part)
        .build()
}

/// Deterministic, non-repeating-per-part payload of `len` bytes.
#[must_use]
pub fn payload(len: usize) -> Bytes {
    (0..len)
        .map(|i| u8::try_from((i * 31 + i / 251) % 256).unwrap_or_default())
        .collect::<Vec<_>>()
        .into()
}

/// Stream `data` in chunks of `chunk` bytes.
pub fn chunked(data: Bytes, chunk: usize) -> impl Stream<Item = io::Result<Bytes>> + Send {
    let chunks: Vec<io::Result<Bytes>> = (0..data.len())
        .step_by(chunk)
        .map(|start| Ok(data.slice(start..(start + chunk).min(data.len()))))
        .collect();
    futures::stream::iter(chunks)
}

/// Poll `condition` until it holds, for at most two seconds.
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Generate a unique name for a test bucket or key.
#[must_use]
pub fn unique_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

mod test_cancel;
mod test_s3;
mod test_upload;
