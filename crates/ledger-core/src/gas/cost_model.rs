//! Gas cost model.
//!
//! Maps resource usage to gas units. Every function is total and monotonic:
//! more bytes, steps or slots never cost less. Arithmetic saturates, so huge
//! inputs cost `u64::MAX` rather than wrapping around.

use serde::{Deserialize, Serialize};

// =============================================================================
// Default Gas Constants
// =============================================================================

/// Fixed CPU cost of every non-initial transaction.
pub const DEFAULT_CPU_BASE_TRANSACTION_COST: u64 = 10;

/// Storage cost of each byte of an encoded request or response.
pub const DEFAULT_STORAGE_COST_PER_BYTE: u64 = 1;

/// CPU cost of fetching a response from the store.
pub const DEFAULT_CPU_COST_FOR_GETTING_RESPONSE: u64 = 10;

/// Costs of the execution of the sandboxed code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasCostModel {
    // ========== Transaction Base Costs ==========
    /// Fixed CPU cost of a transaction
    pub cpu_base_transaction_cost: u64,
    /// Storage cost per byte of encoded request or response
    pub storage_cost_per_byte: u64,
    /// CPU cost of each response lookup in the store
    pub cpu_cost_for_getting_response: u64,

    // ========== Instruction Costs ==========
    /// CPU cost of a plain instruction
    pub cpu_cost_of_instruction: u64,
    /// CPU cost of reading or writing a field
    pub cpu_cost_of_field_access: u64,
    /// CPU cost of calling a method or constructor
    pub cpu_cost_of_invoke: u64,
    /// CPU cost of allocating an object
    pub cpu_cost_of_allocation: u64,
    /// CPU cost of calling a whitelisted native
    pub cpu_cost_of_native: u64,

    // ========== Memory Costs ==========
    /// RAM cost of an object header
    pub ram_cost_of_object: u64,
    /// RAM cost of each field of an allocated object
    pub ram_cost_of_field: u64,
    /// RAM cost of an activation record
    pub ram_cost_of_activation_record: u64,
    /// RAM cost of each local variable slot of an activation record
    pub ram_cost_of_activation_slot: u64,
    /// Bytes of string data covered by one unit of RAM gas
    pub ram_bytes_per_string_unit: u64,

    // ========== Code Loading Costs ==========
    /// Fixed CPU cost of loading a code unit
    pub cpu_cost_for_loading_jar: u64,
    /// Bytes of loaded code covered by one unit of CPU gas
    pub cpu_bytes_per_loading_unit: u64,
    /// Fixed RAM cost of keeping a code unit resident
    pub ram_cost_for_loading_jar: u64,
    /// Bytes of resident code covered by one unit of RAM gas
    pub ram_bytes_per_loading_unit: u64,
    /// Fixed CPU cost of installing a code unit
    pub cpu_cost_for_installing_jar: u64,
    /// Bytes of installed code covered by one unit of CPU gas
    pub cpu_bytes_per_installing_unit: u64,
    /// Fixed RAM cost of installing a code unit
    pub ram_cost_for_installing_jar: u64,
    /// Bytes of installed code covered by one unit of RAM gas
    pub ram_bytes_per_installing_unit: u64,
}

impl Default for GasCostModel {
    fn default() -> Self {
        Self {
            cpu_base_transaction_cost: DEFAULT_CPU_BASE_TRANSACTION_COST,
            storage_cost_per_byte: DEFAULT_STORAGE_COST_PER_BYTE,
            cpu_cost_for_getting_response: DEFAULT_CPU_COST_FOR_GETTING_RESPONSE,
            cpu_cost_of_instruction: 1,
            cpu_cost_of_field_access: 2,
            cpu_cost_of_invoke: 10,
            cpu_cost_of_allocation: 10,
            cpu_cost_of_native: 5,
            ram_cost_of_object: 4,
            ram_cost_of_field: 1,
            ram_cost_of_activation_record: 10,
            ram_cost_of_activation_slot: 1,
            ram_bytes_per_string_unit: 8,
            cpu_cost_for_loading_jar: 10,
            cpu_bytes_per_loading_unit: 200,
            ram_cost_for_loading_jar: 10,
            ram_bytes_per_loading_unit: 40,
            cpu_cost_for_installing_jar: 100,
            cpu_bytes_per_installing_unit: 400,
            ram_cost_for_installing_jar: 10,
            ram_bytes_per_installing_unit: 40,
        }
    }
}

/// `fixed + length / per_unit`, treating a zero divisor as "free per byte".
fn linear(fixed: u64, length: u64, per_unit: u64) -> u64 {
    match length.checked_div(per_unit) {
        Some(units) => fixed.saturating_add(units),
        None => fixed,
    }
}

impl GasCostModel {
    /// Storage cost of `bytes` bytes of encoded data.
    pub fn storage_cost_of_bytes(&self, bytes: u64) -> u64 {
        bytes.saturating_mul(self.storage_cost_per_byte)
    }

    /// CPU cost of fetching the response of a transaction from the store.
    pub fn cpu_cost_for_getting_response_at(&self) -> u64 {
        self.cpu_cost_for_getting_response
    }

    /// RAM cost of allocating an object with `fields` fields.
    pub fn ram_cost_of_object(&self, fields: u64) -> u64 {
        self.ram_cost_of_object
            .saturating_add(fields.saturating_mul(self.ram_cost_of_field))
    }

    /// RAM cost of an activation record with `slots` local slots.
    pub fn ram_cost_of_activation(&self, slots: u64) -> u64 {
        self.ram_cost_of_activation_record
            .saturating_add(slots.saturating_mul(self.ram_cost_of_activation_slot))
    }

    /// RAM cost of a freshly built string of `bytes` bytes, rounded up.
    pub fn ram_cost_of_string(&self, bytes: u64) -> u64 {
        if self.ram_bytes_per_string_unit == 0 {
            return 0;
        }
        bytes.div_ceil(self.ram_bytes_per_string_unit)
    }

    /// CPU cost of loading a code unit of `length` bytes.
    pub fn cpu_cost_for_loading_jar(&self, length: u64) -> u64 {
        linear(
            self.cpu_cost_for_loading_jar,
            length,
            self.cpu_bytes_per_loading_unit,
        )
    }

    /// RAM cost of keeping a code unit of `length` bytes resident.
    pub fn ram_cost_for_loading_jar(&self, length: u64) -> u64 {
        linear(
            self.ram_cost_for_loading_jar,
            length,
            self.ram_bytes_per_loading_unit,
        )
    }

    /// CPU cost of verifying and installing a code unit of `length` bytes.
    pub fn cpu_cost_for_installing_jar(&self, length: u64) -> u64 {
        linear(
            self.cpu_cost_for_installing_jar,
            length,
            self.cpu_bytes_per_installing_unit,
        )
    }

    /// RAM cost of installing a code unit of `length` bytes.
    pub fn ram_cost_for_installing_jar(&self, length: u64) -> u64 {
        linear(
            self.ram_cost_for_installing_jar,
            length,
            self.ram_bytes_per_installing_unit,
        )
    }
}
