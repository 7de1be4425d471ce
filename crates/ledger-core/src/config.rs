//! Node configuration.
//!
//! A configuration starts from [`NodeConfig::default`] or a JSON file and can
//! be adjusted with `with_*` builders and `LEDGER_*` environment variables.
//!
//! ```
//! use ledger_sandbox_core::config::NodeConfig;
//!
//! let config = NodeConfig::default()
//!     .with_chain_id("testnet")
//!     .with_max_dependencies(8);
//! assert_eq!(config.max_dependencies, 8);
//! ```

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use ledger_sandbox_types::env_utils::{env_flag, env_string, env_var};

use crate::crypto::SignatureKind;
use crate::gas::GasCostModel;

/// Default maximal number of code units in a classpath.
pub const DEFAULT_MAX_DEPENDENCIES: usize = 20;

/// Default maximal cumulative size of the code units in a classpath, in bytes.
pub const DEFAULT_MAX_DEPENDENCIES_SIZE: u64 = 1_000_000;

/// Default maximal depth of nested calls in the sandbox.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Default gas limit enforced on view calls.
pub const DEFAULT_MAX_GAS_PER_VIEW: u64 = 1_000_000;

/// Default number of linked classpaths kept by the loader cache.
pub const DEFAULT_LOADER_CACHE_SIZE: usize = 64;

/// Configuration of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Chain identifier that non-initial requests must carry.
    pub chain_id: String,

    /// Maximal number of code units in a classpath (default: 20).
    pub max_dependencies: usize,

    /// Maximal cumulative size of the code units in a classpath
    /// (default: 1,000,000 bytes).
    pub max_dependencies_size: u64,

    /// Maximal depth of nested calls before `lang.StackOverflowError`.
    pub max_call_depth: usize,

    /// Gas limit of view calls, whatever their request states.
    pub max_gas_per_view: u64,

    /// Number of linked classpaths kept in memory. Zero disables the cache.
    pub loader_cache_size: usize,

    /// How request signatures are checked.
    pub signature: SignatureKind,

    /// Commit the store after every transaction.
    ///
    /// When false, transactions stay pending until [`crate::Node::commit`];
    /// uncommitted reads still see them.
    pub auto_commit: bool,

    /// Directory of a filesystem store, if any.
    pub store_dir: Option<PathBuf>,

    /// Gas costs.
    pub gas: GasCostModel,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            max_dependencies: DEFAULT_MAX_DEPENDENCIES,
            max_dependencies_size: DEFAULT_MAX_DEPENDENCIES_SIZE,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_gas_per_view: DEFAULT_MAX_GAS_PER_VIEW,
            loader_cache_size: DEFAULT_LOADER_CACHE_SIZE,
            signature: SignatureKind::Empty,
            auto_commit: true,
            store_dir: None,
            gas: GasCostModel::default(),
        }
    }
}

impl NodeConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file. Missing fields take their
    /// default value.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        serde_json::from_str(&json)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))
    }

    /// Apply `LEDGER_*` environment overrides.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `LEDGER_CHAIN_ID` | `chain_id` |
    /// | `LEDGER_MAX_DEPENDENCIES` | `max_dependencies` |
    /// | `LEDGER_MAX_DEPENDENCIES_SIZE` | `max_dependencies_size` |
    /// | `LEDGER_MAX_CALL_DEPTH` | `max_call_depth` |
    /// | `LEDGER_MAX_GAS_PER_VIEW` | `max_gas_per_view` |
    /// | `LEDGER_AUTO_COMMIT` | `auto_commit` |
    /// | `LEDGER_STORE_DIR` | `store_dir` |
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(chain_id) = env_string("LEDGER_CHAIN_ID") {
            self.chain_id = chain_id;
        }
        if let Some(max) = env_var("LEDGER_MAX_DEPENDENCIES") {
            self.max_dependencies = max;
        }
        if let Some(max) = env_var("LEDGER_MAX_DEPENDENCIES_SIZE") {
            self.max_dependencies_size = max;
        }
        if let Some(depth) = env_var("LEDGER_MAX_CALL_DEPTH") {
            self.max_call_depth = depth;
        }
        if let Some(gas) = env_var("LEDGER_MAX_GAS_PER_VIEW") {
            self.max_gas_per_view = gas;
        }
        if let Some(auto_commit) = env_flag("LEDGER_AUTO_COMMIT") {
            self.auto_commit = auto_commit;
        }
        if let Some(dir) = env_string("LEDGER_STORE_DIR") {
            self.store_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    pub fn with_max_dependencies(mut self, max: usize) -> Self {
        self.max_dependencies = max;
        self
    }

    pub fn with_max_dependencies_size(mut self, max: u64) -> Self {
        self.max_dependencies_size = max;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_gas_per_view(mut self, gas: u64) -> Self {
        self.max_gas_per_view = gas;
        self
    }

    pub fn with_loader_cache_size(mut self, size: usize) -> Self {
        self.loader_cache_size = size;
        self
    }

    pub fn with_signature(mut self, signature: SignatureKind) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub fn with_gas_cost_model(mut self, gas: GasCostModel) -> Self {
        self.gas = gas;
        self
    }
}
