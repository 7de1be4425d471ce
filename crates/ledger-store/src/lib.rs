//! Transaction log and object history store.
//!
//! This crate provides:
//! - [`Store`]: the interface the execution engine reads and writes through
//! - [`LedgerStore`]: the shared implementation, with history simplification
//! - [`MemoryBackend`] / [`FsBackend`]: where the tables actually live
//! - [`StoreMetrics`]: per-instance counters, reported when the store closes

pub mod errors;
pub mod fs;
pub mod memory;
pub mod metrics;
pub mod paths;
pub mod store;

pub use errors::StoreError;
pub use fs::FsBackend;
pub use memory::MemoryBackend;
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use store::{LedgerStore, Store, StoreBackend, View};

/// A store keeping everything in memory.
pub type MemoryStore = LedgerStore<MemoryBackend>;

/// A store persisting committed transactions under a directory.
pub type FsStore = LedgerStore<FsBackend>;
