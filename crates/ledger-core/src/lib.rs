//! Ledger Sandbox Core
//!
//! Deterministic execution engine for smart-contract transactions.
//!
//! # Features
//!
//! - **Gas accounting**: every unit of CPU, RAM and storage is charged;
//!   failures burn the whole gas limit
//! - **Sandboxed code**: installed code units run under a whitelist, with
//!   bounded call depth and checked arithmetic
//! - **Response builders**: one per kind of request, rejecting anything
//!   that cannot be paid for before it takes effect
//! - **Node**: assigns references, pushes responses and runs views
//!
//! # Core Modules
//!
//! - [`gas`]: cost model and per-transaction charger
//! - [`sandbox`]: code units, loader, heap and interpreter
//! - [`builders`]: request to response
//! - [`node`]: the transaction pipeline
//!
//! # Example
//!
//! ```
//! use ledger_sandbox_core::{Node, NodeConfig};
//! use ledger_sandbox_store::{MemoryBackend, MemoryStore};
//!
//! let node = Node::new(
//!     NodeConfig::default().with_chain_id("local"),
//!     MemoryStore::new(MemoryBackend::new()),
//! )?;
//! let boot = node.bootstrap(1_000_000, "", |_| Vec::new())?;
//! assert_eq!(node.get_manifest()?, Some(boot.manifest));
//! # Ok::<(), anyhow::Error>(())
//! ```

#![allow(clippy::too_many_arguments)]

pub mod builders;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod gas;
pub mod node;
pub mod sandbox;

pub use builders::{build_response, build_view, BuildContext, BuilderOutcome};
pub use cache::LoaderCache;
pub use config::NodeConfig;
pub use crypto::{Ed25519Signature, EmptySignature, SignatureAlgorithm, SignatureKind};
pub use errors::{NodeError, TransactionRejected};
pub use gas::{GasCharger, GasCostModel, OutOfGas};
pub use node::{Bootstrap, Node, ViewRequest, BOOTSTRAP_GAS_LIMIT};
pub use sandbox::{base_code_unit, ClassDef, CodeUnit, ConstructorDef, Instruction, MethodDef};
