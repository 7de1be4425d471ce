//! Filesystem-backed store backend.
//!
//! Pending writes live in memory until `commit`, which writes one directory
//! per transaction plus one file per object history. Every file is written
//! atomically, so a crash leaves either the old or the new version of it.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ledger_sandbox_types::encoding::{bcs_decode, bcs_encode};
use ledger_sandbox_types::{
    StorageReference, TransactionReference, TransactionRequest, TransactionResponse,
};

use crate::memory::Tables;
use crate::paths::{
    atomic_write, atomic_write_json, error_path, history_path, manifest_path, read_if_exists,
    request_path, response_path, response_text_path, transactions_dir,
};
use crate::store::{StoreBackend, View};

#[derive(Debug, Serialize, Deserialize)]
struct ManifestRecord {
    manifest: StorageReference,
}

/// Backend persisting committed writes under a root directory.
pub struct FsBackend {
    root: PathBuf,
    pending: Tables,
    last_committed: Option<TransactionReference>,
}

impl FsBackend {
    /// Opens (or creates) a store directory, restoring the last reference
    /// found in it.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .map_err(|e| anyhow!("Failed to create store root {}: {}", root.display(), e))?;

        let last_committed = scan_last_reference(&root)?;
        debug!(root = %root.display(), last = ?last_committed, "opened store directory");

        Ok(Self {
            root,
            pending: Tables::default(),
            last_committed,
        })
    }

    /// Get the store root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_bcs<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
        context: &str,
    ) -> Result<Option<T>> {
        match read_if_exists(path)? {
            Some(bytes) => Ok(Some(bcs_decode(&bytes, context)?)),
            None => Ok(None),
        }
    }

    fn committed_response(
        &self,
        reference: TransactionReference,
    ) -> Result<Option<TransactionResponse>> {
        self.read_bcs(&response_path(&self.root, reference), "response")
    }

    fn committed_request(
        &self,
        reference: TransactionReference,
    ) -> Result<Option<TransactionRequest>> {
        self.read_bcs(&request_path(&self.root, reference), "request")
    }

    fn committed_error(&self, reference: TransactionReference) -> Result<Option<String>> {
        match read_if_exists(&error_path(&self.root, reference))? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    fn committed_history(&self, object: StorageReference) -> Result<Vec<TransactionReference>> {
        Ok(self
            .read_bcs(&history_path(&self.root, &object), "history")?
            .unwrap_or_default())
    }

    fn committed_manifest(&self) -> Result<Option<StorageReference>> {
        match read_if_exists(&manifest_path(&self.root))? {
            Some(bytes) => {
                let record: ManifestRecord = serde_json::from_slice(&bytes)
                    .map_err(|e| anyhow!("Failed to parse manifest JSON: {}", e))?;
                Ok(Some(record.manifest))
            }
            None => Ok(None),
        }
    }
}

/// Highest transaction directory name under the root.
fn scan_last_reference(root: &Path) -> Result<Option<TransactionReference>> {
    let dir = transactions_dir(root);
    if !dir.exists() {
        return Ok(None);
    }

    let entries = std::fs::read_dir(&dir)
        .map_err(|e| anyhow!("Failed to list {}: {}", dir.display(), e))?;

    let mut last = None;
    for entry in entries {
        let entry = entry.map_err(|e| anyhow!("Failed to list {}: {}", dir.display(), e))?;
        let name = entry.file_name();
        match name.to_string_lossy().parse::<TransactionReference>() {
            Ok(reference) => last = last.max(Some(reference)),
            Err(_) => warn!(entry = ?name, "ignoring unexpected entry in transactions directory"),
        }
    }
    Ok(last)
}

impl StoreBackend for FsBackend {
    fn response(
        &self,
        reference: TransactionReference,
        view: View,
    ) -> Result<Option<TransactionResponse>> {
        if view == View::Uncommitted {
            if let Some(response) = self.pending.responses.get(&reference) {
                return Ok(Some(response.clone()));
            }
        }
        self.committed_response(reference)
    }

    fn request(
        &self,
        reference: TransactionReference,
        view: View,
    ) -> Result<Option<TransactionRequest>> {
        if view == View::Uncommitted {
            if let Some(request) = self.pending.requests.get(&reference) {
                return Ok(Some(request.clone()));
            }
        }
        self.committed_request(reference)
    }

    fn error(&self, reference: TransactionReference, view: View) -> Result<Option<String>> {
        if view == View::Uncommitted {
            if let Some(error) = self.pending.errors.get(&reference) {
                return Ok(Some(error.clone()));
            }
        }
        self.committed_error(reference)
    }

    fn history(&self, object: StorageReference, view: View) -> Result<Vec<TransactionReference>> {
        if view == View::Uncommitted {
            if let Some(history) = self.pending.histories.get(&object) {
                return Ok(history.clone());
            }
        }
        self.committed_history(object)
    }

    fn manifest(&self, view: View) -> Result<Option<StorageReference>> {
        if view == View::Uncommitted && self.pending.manifest.is_some() {
            return Ok(self.pending.manifest);
        }
        self.committed_manifest()
    }

    fn last_reference(&self) -> Result<Option<TransactionReference>> {
        Ok(self.pending.last_reference().max(self.last_committed))
    }

    fn put_transaction(
        &mut self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<()> {
        self.pending.put_transaction(reference, request, response);
        Ok(())
    }

    fn put_error(
        &mut self,
        reference: TransactionReference,
        request: &TransactionRequest,
        error: &str,
    ) -> Result<()> {
        self.pending.put_error(reference, request, error);
        Ok(())
    }

    fn put_history(
        &mut self,
        object: StorageReference,
        history: Vec<TransactionReference>,
    ) -> Result<()> {
        self.pending.histories.insert(object, history);
        Ok(())
    }

    fn put_manifest(&mut self, manifest: StorageReference) -> Result<()> {
        self.pending.manifest = Some(manifest);
        Ok(())
    }

    /// Writes the pending overlay to disk. Histories and the manifest go
    /// last. The overlay is only cleared once every file is written, so a
    /// failed commit can be retried.
    fn commit(&mut self) -> Result<usize> {
        let pending = &self.pending;
        let transactions = pending.transactions();
        let last = pending.last_reference();

        for (reference, request) in &pending.requests {
            atomic_write(
                &request_path(&self.root, *reference),
                &bcs_encode(request, "request")?,
            )?;
        }
        for (reference, response) in &pending.responses {
            atomic_write(
                &response_path(&self.root, *reference),
                &bcs_encode(response, "response")?,
            )?;
            atomic_write(
                &response_text_path(&self.root, *reference),
                response.render()?.as_bytes(),
            )?;
        }
        for (reference, error) in &pending.errors {
            atomic_write(&error_path(&self.root, *reference), error.as_bytes())?;
        }
        for (object, history) in &pending.histories {
            atomic_write(
                &history_path(&self.root, object),
                &bcs_encode(history, "history")?,
            )?;
        }
        if let Some(manifest) = pending.manifest {
            atomic_write_json(&manifest_path(&self.root), &ManifestRecord { manifest })?;
        }

        self.pending = Tables::default();
        self.last_committed = self.last_committed.max(last);
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LedgerStore, Store};
    use ledger_sandbox_types::{
        Classpath, GameteCreationRequest, GameteCreationResponse, InitializationRequest, Update,
    };
    use tempfile::TempDir;

    fn gamete_request() -> TransactionRequest {
        TransactionRequest::GameteCreation(GameteCreationRequest {
            classpath: Classpath::new(TransactionReference(0), true),
            initial_amount: 100,
            public_key: String::new(),
        })
    }

    fn gamete_response(gamete: StorageReference) -> TransactionResponse {
        TransactionResponse::GameteCreation(GameteCreationResponse {
            updates: vec![Update::class_tag(gamete, "lang.Gamete", TransactionReference(0))],
            gamete,
        })
    }

    #[test]
    fn test_commit_persists_and_reopens() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let gamete = StorageReference::new(TransactionReference(1), 0);
        let manifest = StorageReference::new(TransactionReference(1), 0);

        {
            let store = LedgerStore::new(FsBackend::open(temp_dir.path())?);
            store.push(TransactionReference(1), &gamete_request(), &gamete_response(gamete))?;
            store.push(
                TransactionReference(2),
                &TransactionRequest::Initialization(InitializationRequest {
                    classpath: Classpath::new(TransactionReference(0), true),
                    manifest,
                }),
                &TransactionResponse::Initialization,
            )?;
            store.push_error(TransactionReference(3), &gamete_request(), "already initialized")?;

            assert!(store.get_response(TransactionReference(1))?.is_none());
            store.commit()?;
        }

        let reopened = LedgerStore::new(FsBackend::open(temp_dir.path())?);
        assert_eq!(reopened.last_reference()?, Some(TransactionReference(3)));
        assert_eq!(
            reopened.get_response(TransactionReference(1))?,
            Some(gamete_response(gamete))
        );
        assert_eq!(reopened.get_history(gamete)?, vec![TransactionReference(1)]);
        assert_eq!(reopened.get_manifest()?, Some(manifest));
        assert_eq!(
            reopened.get_error(TransactionReference(3))?.as_deref(),
            Some("already initialized")
        );
        assert!(response_text_path(temp_dir.path(), TransactionReference(1)).exists());
        Ok(())
    }

    #[test]
    fn test_failed_commit_keeps_pending_writes() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let gamete = StorageReference::new(TransactionReference(1), 0);
        let store = LedgerStore::new(FsBackend::open(temp_dir.path())?);
        store.push(TransactionReference(1), &gamete_request(), &gamete_response(gamete))?;

        // a regular file where the histories directory should go
        let blocker = temp_dir.path().join("histories");
        std::fs::write(&blocker, b"")?;
        assert!(store.commit().is_err());
        assert_eq!(store.get_history_uncommitted(gamete)?, vec![TransactionReference(1)]);

        std::fs::remove_file(&blocker)?;
        store.commit()?;
        assert_eq!(store.get_history(gamete)?, vec![TransactionReference(1)]);
        assert!(history_path(temp_dir.path(), &gamete).exists());

        let reopened = LedgerStore::new(FsBackend::open(temp_dir.path())?);
        assert_eq!(reopened.get_history(gamete)?, vec![TransactionReference(1)]);
        assert_eq!(
            reopened.get_response(TransactionReference(1))?,
            Some(gamete_response(gamete))
        );
        Ok(())
    }

    #[test]
    fn test_uncommitted_reads_see_pending() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let gamete = StorageReference::new(TransactionReference(1), 0);
        let store = LedgerStore::new(FsBackend::open(temp_dir.path())?);

        store.push(TransactionReference(1), &gamete_request(), &gamete_response(gamete))?;
        assert!(store.get_response_uncommitted(TransactionReference(1))?.is_some());
        assert!(store.get_history(gamete)?.is_empty());
        assert_eq!(store.get_history_uncommitted(gamete)?, vec![TransactionReference(1)]);
        assert!(!response_path(temp_dir.path(), TransactionReference(1)).exists());
        Ok(())
    }
}
