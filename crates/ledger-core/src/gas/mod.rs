//! Gas metering for transaction execution.
//!
//! # Architecture
//!
//! 1. **Cost Model** - [`GasCostModel`], pure functions from resource usage
//!    to gas units, configured per node
//! 2. **Gas Charger** - [`GasCharger`], the per-transaction account of gas
//!    consumed for CPU, RAM and storage
//!
//! Response builders charge the base cost, the request size and the loaded
//! classpath through the charger before running any code; the interpreter
//! charges every instruction, allocation and activation record as it runs.

pub mod charger;
pub mod cost_model;

pub use charger::{GasCharger, OutOfGas};
pub use cost_model::{
    GasCostModel, DEFAULT_CPU_BASE_TRANSACTION_COST, DEFAULT_CPU_COST_FOR_GETTING_RESPONSE,
    DEFAULT_STORAGE_COST_PER_BYTE,
};
