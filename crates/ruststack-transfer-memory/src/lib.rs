//! In-memory object store transport for the RustStack transfer engine.
//!
//! [`MemoryTransport`] implements [`ruststack_transfer_core::Transport`] on
//! top of [`dashmap::DashMap`]s. It keeps the bookkeeping a real store does
//! for multipart sessions and adds what tests need on top: per-operation
//! call counts, the peak number of concurrent part requests, and a
//! [`FaultPlan`] for failure and latency injection.
//!
//! ```
//! use bytes::Bytes;
//! use ruststack_transfer_memory::MemoryTransport;
//!
//! let transport = MemoryTransport::new();
//! transport.insert_object("bucket", "key", Bytes::from_static(b"hello"));
//! assert_eq!(transport.object("bucket", "key").map(|o| o.data.len()), Some(5));
//! ```

pub mod etag;
pub mod faults;
pub mod state;
pub mod store;

pub use faults::{FaultPlan, Operation};
pub use store::{CallCounts, MemoryTransport};
