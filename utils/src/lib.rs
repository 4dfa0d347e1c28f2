//! Shared infrastructure utilities for phasegate.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`jsonl`**: Append-only structured logs (audit events, metrics)

pub mod atomic_write;
pub mod jsonl;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, atomic_write,
    atomic_write_with_options, touch_marker,
};
pub use jsonl::JsonlLog;
