//! Encoding utilities for hex, base64 and BCS.
//!
//! Shared by the store (persisted records and file names) and the engine
//! (public keys, signatures, code units).

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::references::{StorageReference, TransactionReference};

// =============================================================================
// Reference Parsing
// =============================================================================

/// Parse a transaction reference with context-aware error message.
///
/// # Arguments
/// * `s` - Hex string (with or without 0x prefix)
/// * `context` - Description for error messages (e.g., "classpath", "jar")
pub fn parse_transaction_reference(s: &str, context: &str) -> Result<TransactionReference> {
    s.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {} '{}': {}", context, s, e))
}

/// Parse a storage reference (`<transaction>#<progressive>`) with
/// context-aware error message.
pub fn parse_storage_reference(s: &str, context: &str) -> Result<StorageReference> {
    s.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {} '{}': {}", context, s, e))
}

/// Parse a hex string to raw bytes.
///
/// # Arguments
/// * `hex_str` - Hex string (with or without 0x prefix)
/// * `context` - Description for error messages
pub fn parse_hex_bytes(hex_str: &str, context: &str) -> Result<Vec<u8>> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| anyhow!("Invalid {} hex '{}': {}", context, hex_str, e))
}

/// File-system friendly name of an object: `<transaction>_<progressive>`.
pub fn storage_reference_file_name(reference: &StorageReference) -> String {
    format!("{}_{:x}", reference.transaction, reference.progressive)
}

// =============================================================================
// Base64 Encoding/Decoding
// =============================================================================

/// Encode bytes to base64 string.
pub fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode base64 string to bytes with context-aware error message.
///
/// # Arguments
/// * `b64` - Base64 encoded string
/// * `context` - Description for error messages (e.g., "public key", "signature")
pub fn base64_decode(b64: &str, context: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| anyhow!("Failed to decode {} from base64: {}", context, e))
}

// =============================================================================
// BCS
// =============================================================================

/// Encode a value to BCS with context-aware error message.
pub fn bcs_encode<T: Serialize>(value: &T, context: &str) -> Result<Vec<u8>> {
    bcs::to_bytes(value).map_err(|e| anyhow!("Failed to encode {} to BCS: {}", context, e))
}

/// Decode a value from BCS with context-aware error message.
pub fn bcs_decode<T: DeserializeOwned>(bytes: &[u8], context: &str) -> Result<T> {
    bcs::from_bytes(bytes).map_err(|e| anyhow!("Failed to decode {} from BCS: {}", context, e))
}
