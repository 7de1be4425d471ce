//! In-memory backend.
//!
//! Keeps committed and pending writes in two sets of tables. Used by tests
//! and by nodes that do not need durability.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;

use ledger_sandbox_types::{
    StorageReference, TransactionReference, TransactionRequest, TransactionResponse,
};

use crate::store::{StoreBackend, View};

/// A set of store tables. Backends use one as the pending overlay.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub requests: BTreeMap<TransactionReference, TransactionRequest>,
    pub responses: BTreeMap<TransactionReference, TransactionResponse>,
    pub errors: BTreeMap<TransactionReference, String>,
    pub histories: HashMap<StorageReference, Vec<TransactionReference>>,
    pub manifest: Option<StorageReference>,
}

impl Tables {
    /// Highest reference with a response or an error.
    pub fn last_reference(&self) -> Option<TransactionReference> {
        let last_response = self.responses.keys().next_back().copied();
        let last_error = self.errors.keys().next_back().copied();
        last_response.max(last_error)
    }

    /// Number of transactions (pushed or rejected) in these tables.
    pub fn transactions(&self) -> usize {
        self.requests.len()
    }

    /// Moves every entry of `self` into `target`, overwriting.
    pub fn merge_into(self, target: &mut Tables) {
        target.requests.extend(self.requests);
        target.responses.extend(self.responses);
        target.errors.extend(self.errors);
        target.histories.extend(self.histories);
        if self.manifest.is_some() {
            target.manifest = self.manifest;
        }
    }

    pub fn put_transaction(
        &mut self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) {
        self.requests.insert(reference, request.clone());
        self.responses.insert(reference, response.clone());
    }

    pub fn put_error(
        &mut self,
        reference: TransactionReference,
        request: &TransactionRequest,
        error: &str,
    ) {
        self.requests.insert(reference, request.clone());
        self.errors.insert(reference, error.to_string());
    }
}

/// Backend that never touches the disk.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    committed: Tables,
    pending: Tables,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks in the pending tables first when the view allows it.
    fn lookup<'a, T>(
        &'a self,
        view: View,
        select: impl Fn(&'a Tables) -> Option<&'a T>,
    ) -> Option<&'a T> {
        match view {
            View::Uncommitted => select(&self.pending).or_else(|| select(&self.committed)),
            View::Committed => select(&self.committed),
        }
    }
}

impl StoreBackend for MemoryBackend {
    fn response(
        &self,
        reference: TransactionReference,
        view: View,
    ) -> Result<Option<TransactionResponse>> {
        Ok(self
            .lookup(view, |tables| tables.responses.get(&reference))
            .cloned())
    }

    fn request(
        &self,
        reference: TransactionReference,
        view: View,
    ) -> Result<Option<TransactionRequest>> {
        Ok(self
            .lookup(view, |tables| tables.requests.get(&reference))
            .cloned())
    }

    fn error(&self, reference: TransactionReference, view: View) -> Result<Option<String>> {
        Ok(self
            .lookup(view, |tables| tables.errors.get(&reference))
            .cloned())
    }

    fn history(&self, object: StorageReference, view: View) -> Result<Vec<TransactionReference>> {
        Ok(self
            .lookup(view, |tables| tables.histories.get(&object))
            .cloned()
            .unwrap_or_default())
    }

    fn manifest(&self, view: View) -> Result<Option<StorageReference>> {
        Ok(self
            .lookup(view, |tables| tables.manifest.as_ref())
            .copied())
    }

    fn last_reference(&self) -> Result<Option<TransactionReference>> {
        Ok(self
            .pending
            .last_reference()
            .max(self.committed.last_reference()))
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

    fn commit(&mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending);
        let transactions = pending.transactions();
        pending.merge_into(&mut self.committed);
        Ok(transactions)
    }
}
