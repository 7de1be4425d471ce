//! The store of a node: transaction log, object histories and manifest.
//!
//! [`Store`] is the interface seen by the engine. [`LedgerStore`] implements
//! it once on top of any [`StoreBackend`], so that history simplification
//! and locking are shared by every backend.
//!
//! # History simplification
//!
//! The history of an object lists, newest first, the transactions whose
//! responses updated it. When a response at `T` updates an object, its new
//! history is `T` followed by the old entries that still provide a field
//! not updated by a newer entry, followed by the old oldest entry, that
//! holds the class tag. Scanning the result and keeping the first update of
//! each field yields the current state of the object.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{debug, error, info, trace};

use ledger_sandbox_types::{
    StorageReference, TransactionReference, TransactionRequest, TransactionResponse, UpdateKey,
};

use crate::errors::StoreError;
use crate::metrics::{MetricsSnapshot, StoreMetrics};

/// Which writes a read can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Only writes that have been committed.
    Committed,
    /// Committed writes plus the pending ones.
    Uncommitted,
}

/// The store interface consumed by the engine.
///
/// Implementations are thread-safe: writes are serialized behind a single
/// lock per store instance.
pub trait Store: Send + Sync {
    /// The committed response at a reference.
    fn get_response(&self, reference: TransactionReference) -> Result<Option<TransactionResponse>>;

    /// The response at a reference, including pending ones.
    fn get_response_uncommitted(
        &self,
        reference: TransactionReference,
    ) -> Result<Option<TransactionResponse>>;

    /// The request at a reference, including pending and rejected ones.
    fn get_request(&self, reference: TransactionReference) -> Result<Option<TransactionRequest>>;

    /// The rejection message recorded for a reference, if it was rejected.
    fn get_error(&self, reference: TransactionReference) -> Result<Option<String>>;

    /// The committed history of an object, newest first.
    fn get_history(&self, object: StorageReference) -> Result<Vec<TransactionReference>>;

    /// The history of an object, including pending updates, newest first.
    fn get_history_uncommitted(&self, object: StorageReference)
        -> Result<Vec<TransactionReference>>;

    /// The committed manifest, once the node is initialized.
    fn get_manifest(&self) -> Result<Option<StorageReference>>;

    /// The manifest, including a pending initialization.
    fn get_manifest_uncommitted(&self) -> Result<Option<StorageReference>>;

    /// The highest reference ever pushed or rejected.
    fn last_reference(&self) -> Result<Option<TransactionReference>>;

    /// Time of the block being built, in milliseconds.
    fn get_now(&self) -> u64;

    /// Sets the time seen by transactions from now on.
    fn set_now(&self, millis: u64);

    /// Records the response of a new transaction and expands the histories
    /// of the objects it updates.
    fn push(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<()>;

    /// Overwrites the response of an already pushed transaction. Histories
    /// are left untouched.
    fn replace(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<()>;

    /// Records a rejected request. Responses, histories and the manifest are
    /// not affected.
    fn push_error(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
        error: &str,
    ) -> Result<()>;

    /// Makes every pending write durable and visible to committed reads.
    fn commit(&self) -> Result<()>;

    /// Counters of this store instance.
    fn metrics(&self) -> MetricsSnapshot;
}

/// Raw storage operations provided by a backend.
///
/// Backends keep pending writes apart from committed ones; `commit` moves
/// the former into the latter.
pub trait StoreBackend: Send + Sync {
    fn response(
        &self,
        reference: TransactionReference,
        view: View,
    ) -> Result<Option<TransactionResponse>>;

    fn request(
        &self,
        reference: TransactionReference,
        view: View,
    ) -> Result<Option<TransactionRequest>>;

    fn error(&self, reference: TransactionReference, view: View) -> Result<Option<String>>;

    fn history(&self, object: StorageReference, view: View) -> Result<Vec<TransactionReference>>;

    fn manifest(&self, view: View) -> Result<Option<StorageReference>>;

    fn last_reference(&self) -> Result<Option<TransactionReference>>;

    fn put_transaction(
        &mut self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<()>;

    fn put_error(
        &mut self,
        reference: TransactionReference,
        request: &TransactionRequest,
        error: &str,
    ) -> Result<()>;

    fn put_history(
        &mut self,
        object: StorageReference,
        history: Vec<TransactionReference>,
    ) -> Result<()>;

    fn put_manifest(&mut self, manifest: StorageReference) -> Result<()>;

    /// Returns the number of transactions made durable.
    fn commit(&mut self) -> Result<usize>;
}

/// A [`Store`] over a backend, with history simplification.
pub struct LedgerStore<B: StoreBackend> {
    backend: RwLock<B>,
    now: AtomicU64,
    metrics: StoreMetrics,
}

impl<B: StoreBackend> LedgerStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: RwLock::new(backend),
            now: AtomicU64::new(0),
            metrics: StoreMetrics::default(),
        }
    }

    /// Computes the simplified histories of the objects updated by a
    /// response at `reference`, without writing them.
    fn expanded_histories(
        &self,
        backend: &B,
        reference: TransactionReference,
        response: &TransactionResponse,
    ) -> Result<BTreeMap<StorageReference, Vec<TransactionReference>>> {
        let started = Instant::now();
        let objects: BTreeSet<StorageReference> = response
            .updates()
            .unwrap_or(&[])
            .iter()
            .map(|update| update.object())
            .collect();

        let mut histories = BTreeMap::new();
        for object in objects {
            let (history, dropped) = simplify(backend, reference, response, object)?;
            trace!(object = %object, length = history.len(), dropped, "expanded history");
            self.metrics.record_expansion(dropped);
            histories.insert(object, history);
        }
        self.metrics.record_expansion_time(started.elapsed());

        Ok(histories)
    }
}

/// The new history of `object` after the response at `reference`, and the
/// number of old entries dropped because fully shadowed.
fn simplify<B: StoreBackend>(
    backend: &B,
    reference: TransactionReference,
    response: &TransactionResponse,
    object: StorageReference,
) -> Result<(Vec<TransactionReference>, u64)> {
    let mut covered: BTreeSet<UpdateKey> =
        response.updates_of(object).map(|update| update.key()).collect();
    let old = backend.history(object, View::Uncommitted)?;

    let mut history = vec![reference];
    let mut dropped = 0;

    let Some((oldest, rest)) = old.split_last() else {
        return Ok((history, dropped));
    };

    for &previous in rest {
        if previous == reference {
            continue;
        }
        let previous_response =
            backend
                .response(previous, View::Uncommitted)?
                .ok_or(StoreError::MissingResponse {
                    object,
                    transaction: previous,
                })?;

        let keys: Vec<UpdateKey> = previous_response
            .updates_of(object)
            .map(|update| update.key())
            .collect();
        if keys.is_empty() {
            return Err(StoreError::NoUpdates {
                object,
                transaction: previous,
            }
            .into());
        }

        let mut provides_new_field = false;
        for key in keys {
            provides_new_field |= covered.insert(key);
        }

        if provides_new_field {
            history.push(previous);
        } else {
            dropped += 1;
        }
    }

    if *oldest != reference {
        history.push(*oldest);
    }

    Ok((history, dropped))
}

impl<B: StoreBackend> Store for LedgerStore<B> {
    fn get_response(&self, reference: TransactionReference) -> Result<Option<TransactionResponse>> {
        self.backend.read().response(reference, View::Committed)
    }

    fn get_response_uncommitted(
        &self,
        reference: TransactionReference,
    ) -> Result<Option<TransactionResponse>> {
        self.backend.read().response(reference, View::Uncommitted)
    }

    fn get_request(&self, reference: TransactionReference) -> Result<Option<TransactionRequest>> {
        self.backend.read().request(reference, View::Uncommitted)
    }

    fn get_error(&self, reference: TransactionReference) -> Result<Option<String>> {
        self.backend.read().error(reference, View::Uncommitted)
    }

    fn get_history(&self, object: StorageReference) -> Result<Vec<TransactionReference>> {
        self.backend.read().history(object, View::Committed)
    }

    fn get_history_uncommitted(
        &self,
        object: StorageReference,
    ) -> Result<Vec<TransactionReference>> {
        self.backend.read().history(object, View::Uncommitted)
    }

    fn get_manifest(&self) -> Result<Option<StorageReference>> {
        self.backend.read().manifest(View::Committed)
    }

    fn get_manifest_uncommitted(&self) -> Result<Option<StorageReference>> {
        self.backend.read().manifest(View::Uncommitted)
    }

    fn last_reference(&self) -> Result<Option<TransactionReference>> {
        self.backend.read().last_reference()
    }

    fn get_now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn set_now(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    fn push(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<()> {
        let mut backend = self.backend.write();

        if backend.response(reference, View::Uncommitted)?.is_some() {
            return Err(StoreError::AlreadyPushed {
                transaction: reference,
            }
            .into());
        }

        let manifest = if response.is_initialization() {
            let TransactionRequest::Initialization(initialization) = request else {
                return Err(StoreError::MismatchedInitialization {
                    transaction: reference,
                }
                .into());
            };
            if let Some(manifest) = backend.manifest(View::Uncommitted)? {
                return Err(StoreError::ManifestAlreadySet {
                    manifest,
                    transaction: reference,
                }
                .into());
            }
            Some(initialization.manifest)
        } else {
            None
        };

        let histories = self
            .expanded_histories(&backend, reference, response)
            .map_err(|e| {
                error!(reference = %reference, error = %e, "history expansion failed");
                e
            })?;

        backend.put_transaction(reference, request, response)?;
        for (object, history) in histories {
            backend.put_history(object, history)?;
        }
        if let Some(manifest) = manifest {
            info!(reference = %reference, manifest = %manifest, "recorded manifest");
            backend.put_manifest(manifest)?;
        }

        self.metrics.record_push();
        debug!(reference = %reference, kind = request.kind(), "pushed transaction");
        Ok(())
    }

    fn replace(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<()> {
        let mut backend = self.backend.write();
        if backend.response(reference, View::Uncommitted)?.is_none() {
            return Err(StoreError::NotPushed {
                transaction: reference,
            }
            .into());
        }

        backend.put_transaction(reference, request, response)?;
        self.metrics.record_replace();
        debug!(reference = %reference, kind = request.kind(), "replaced transaction");
        Ok(())
    }

    fn push_error(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
        error: &str,
    ) -> Result<()> {
        self.backend.write().put_error(reference, request, error)?;
        self.metrics.record_error();
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let committed = self.backend.write().commit()?;
        self.metrics.record_commit();
        debug!(transactions = committed, "committed store");
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<B: StoreBackend> Drop for LedgerStore<B> {
    fn drop(&mut self) {
        let snapshot = self.metrics.snapshot();
        if snapshot.pushes > 0 || snapshot.errors_recorded > 0 {
            info!("closing store\n{}", snapshot.format_report());
        }
    }
}
