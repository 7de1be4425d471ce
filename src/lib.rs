//! Ledger Sandbox
//!
//! A deterministic transaction execution engine over a history-simplifying
//! ledger store:
//!
//! - **Types** ([`types`]): references, requests, responses and updates
//! - **Store** ([`store`]): transaction log and per-object histories, in
//!   memory or on disk
//! - **Engine** ([`engine`]): gas accounting, sandboxed code, response builders
//!   and the node
//!
//! [`open_node`] builds a node from a configuration, on disk when
//! `store_dir` is set.

use anyhow::{Context, Result};
use tracing::info;

pub use ledger_sandbox_core as engine;
pub use ledger_sandbox_store as store;
pub use ledger_sandbox_types as types;

pub use ledger_sandbox_core::{
    Bootstrap, GasCostModel, Node, NodeConfig, NodeError, SignatureKind, TransactionRejected,
    ViewRequest,
};
pub use ledger_sandbox_store::{FsBackend, FsStore, MemoryBackend, MemoryStore, Store};

/// A node over either kind of store.
pub enum AnyNode {
    Memory(Node<MemoryStore>),
    Fs(Node<FsStore>),
}

/// Opens a node as configured: a filesystem store under `store_dir`, or an
/// in-memory one.
pub fn open_node(config: NodeConfig) -> Result<AnyNode> {
    match config.store_dir.clone() {
        Some(dir) => {
            let backend = FsBackend::open(&dir)
                .with_context(|| format!("Failed to open store at {}", dir.display()))?;
            info!(dir = %dir.display(), "opened filesystem store");
            Ok(AnyNode::Fs(Node::new(config, FsStore::new(backend))?))
        }
        None => Ok(AnyNode::Memory(Node::new(
            config,
            MemoryStore::new(MemoryBackend::new()),
        )?)),
    }
}

pub mod prelude {
    //! The types most programs need.
    pub use ledger_sandbox_core::{Node, NodeConfig, NodeError, ViewRequest};
    pub use ledger_sandbox_store::{FsStore, MemoryStore, Store};
    pub use ledger_sandbox_types::{
        Classpath, ConstructorCallRequest, ConstructorSignature, InstanceMethodCallRequest,
        JarStoreRequest, MethodSignature, RequestHeader, StaticMethodCallRequest,
        StorageReference, StorageType, StorageValue, TransactionReference, TransactionRequest,
        TransactionResponse,
    };
}
