//! Store consistency errors.
//!
//! These are never caused by users: they mean that the store contradicts
//! itself, and the node must stop treating it as a source of truth.

use ledger_sandbox_types::{StorageReference, TransactionReference};

/// Inconsistencies detected by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A history names a transaction with no stored response.
    MissingResponse {
        object: StorageReference,
        transaction: TransactionReference,
    },
    /// A history names a transaction whose response does not update the object.
    NoUpdates {
        object: StorageReference,
        transaction: TransactionReference,
    },
    /// A second initialization response was pushed.
    ManifestAlreadySet {
        manifest: StorageReference,
        transaction: TransactionReference,
    },
    /// An initialization response was pushed for a request of another kind.
    MismatchedInitialization { transaction: TransactionReference },
    /// `push` was called for a reference that already has a response.
    AlreadyPushed { transaction: TransactionReference },
    /// `replace` was called for a reference that has no response.
    NotPushed { transaction: TransactionReference },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::MissingResponse {
                object,
                transaction,
            } => write!(
                f,
                "STORE_CORRUPTED: history of {} refers to transaction {} which has no response",
                object, transaction
            ),
            StoreError::NoUpdates {
                object,
                transaction,
            } => write!(
                f,
                "STORE_CORRUPTED: history of {} refers to transaction {} which does not update it",
                object, transaction
            ),
            StoreError::ManifestAlreadySet {
                manifest,
                transaction,
            } => write!(
                f,
                "STORE_CORRUPTED: transaction {} tries to set the manifest, already set to {}",
                transaction, manifest
            ),
            StoreError::MismatchedInitialization { transaction } => write!(
                f,
                "STORE_CORRUPTED: initialization response at {} does not follow an initialization request",
                transaction
            ),
            StoreError::AlreadyPushed { transaction } => {
                write!(f, "transaction {} has already been pushed", transaction)
            }
            StoreError::NotPushed { transaction } => {
                write!(f, "transaction {} cannot be replaced: it was never pushed", transaction)
            }
        }
    }
}

impl std::error::Error for StoreError {}
