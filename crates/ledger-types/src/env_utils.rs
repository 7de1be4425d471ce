//! Environment variable parsing utilities.
//!
//! Used by the node configuration to apply `LEDGER_*` overrides on top of a
//! file or default configuration.
//!
//! # Example
//!
//! ```
//! use ledger_sandbox_types::env_utils::{env_var, env_var_or};
//!
//! let depth: usize = env_var_or("LEDGER_MAX_CALL_DEPTH", 64);
//! let limit: Option<u64> = env_var("LEDGER_MAX_GAS_PER_VIEW");
//! ```

use std::str::FromStr;

/// Parse an environment variable into a type that implements `FromStr`.
///
/// Returns `None` if the variable is not set or cannot be parsed.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse an environment variable with a default value.
///
/// Returns the default if the variable is not set or cannot be parsed.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// Read a boolean environment variable.
///
/// `"1"`, `"true"`, `"yes"` and `"on"` (case-insensitive) are true, any
/// other value is false. Returns `None` if the variable is not set.
pub fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Check if an environment variable is set to a truthy value, with a default.
pub fn env_bool_or(key: &str, default: bool) -> bool {
    env_flag(key).unwrap_or(default)
}

/// Get a non-empty environment variable as a string.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
