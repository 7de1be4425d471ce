//! Path utilities for the filesystem layout of the store.
//!
//! ```text
//! <root>/transactions/<reference>/request.bcs
//! <root>/transactions/<reference>/response.bcs
//! <root>/transactions/<reference>/response.txt
//! <root>/transactions/<reference>/error.txt
//! <root>/histories/<transaction>_<progressive>.bcs
//! <root>/manifest.json
//! ```

use anyhow::{anyhow, Result};
use ledger_sandbox_types::encoding::storage_reference_file_name;
use ledger_sandbox_types::{StorageReference, TransactionReference};
use std::path::{Path, PathBuf};

/// Directory holding every transaction.
pub fn transactions_dir(root: &Path) -> PathBuf {
    root.join("transactions")
}

/// Directory holding the records of one transaction.
pub fn transaction_dir(root: &Path, reference: TransactionReference) -> PathBuf {
    transactions_dir(root).join(reference.to_string())
}

pub fn request_path(root: &Path, reference: TransactionReference) -> PathBuf {
    transaction_dir(root, reference).join("request.bcs")
}

pub fn response_path(root: &Path, reference: TransactionReference) -> PathBuf {
    transaction_dir(root, reference).join("response.bcs")
}

/// Human-readable rendering of the response, for operators.
pub fn response_text_path(root: &Path, reference: TransactionReference) -> PathBuf {
    transaction_dir(root, reference).join("response.txt")
}

pub fn error_path(root: &Path, reference: TransactionReference) -> PathBuf {
    transaction_dir(root, reference).join("error.txt")
}

pub fn history_path(root: &Path, object: &StorageReference) -> PathBuf {
    root.join("histories")
        .join(format!("{}.bcs", storage_reference_file_name(object)))
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join("manifest.json")
}

/// Ensure all parent directories exist for a path.
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

/// Write a file atomically (write to .tmp, then rename).
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("tmp")
    ));
    std::fs::write(&tmp_path, contents)
        .map_err(|e| anyhow!("Failed to write temp file {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        anyhow!(
            "Failed to rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;
    Ok(())
}

/// Write a JSON file atomically (compact format, no pretty printing).
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value).map_err(|e| anyhow!("Failed to serialize JSON: {}", e))?;
    atomic_write(path, &json)
}

/// Read a file, returning `None` if it does not exist.
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow!("Failed to read {}: {}", path.display(), e)),
    }
}
