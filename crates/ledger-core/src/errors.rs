//! Error types of the execution engine.
//!
//! Three disjoint outcomes can stop a transaction from completing normally:
//!
//! - **Rejection** ([`TransactionRejected`]): the request never took effect.
//!   Nothing is charged and only a diagnostic record is kept.
//! - **Failure** ([`NodeError::Failed`]): gas was bought and the nonce
//!   advanced, but the operation did not complete. A failed response with
//!   the penalty is in the store.
//! - **Exception** ([`NodeError::Exception`]): a checked throwable escaped an
//!   entry point allowed to throw it. Ledger-wise it is a success.
//!
//! Store corruption and I/O problems are neither of those and travel as
//! [`NodeError::Internal`].

use ledger_sandbox_types::{FailureCause, TransactionReference};

/// A request refused before it could take effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRejected {
    pub message: String,
}

impl TransactionRejected {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransactionRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transaction rejected: {}", self.message)
    }
}

impl std::error::Error for TransactionRejected {}

/// Errors surfaced by the node to the submitter of a request.
#[derive(Debug)]
pub enum NodeError {
    /// The request was rejected; the message explains why.
    Rejected(String),
    /// The transaction was committed as a failure.
    Failed {
        reference: TransactionReference,
        cause: FailureCause,
    },
    /// The transaction was committed with a checked exception.
    Exception {
        reference: TransactionReference,
        cause: FailureCause,
    },
    /// The store or the node is in an inconsistent state.
    Internal(anyhow::Error),
}

impl NodeError {
    /// The committed transaction, for failures and exceptions.
    pub fn reference(&self) -> Option<TransactionReference> {
        match self {
            NodeError::Failed { reference, .. } | NodeError::Exception { reference, .. } => {
                Some(*reference)
            }
            _ => None,
        }
    }

    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            NodeError::Failed { cause, .. } | NodeError::Exception { cause, .. } => Some(cause),
            _ => None,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, NodeError::Rejected(_))
    }
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeError::Rejected(message) => write!(f, "transaction rejected: {}", message),
            NodeError::Failed { reference, cause } => {
                write!(f, "transaction {} failed: {}", reference, cause)
            }
            NodeError::Exception { reference, cause } => {
                write!(f, "transaction {} threw {}", reference, cause)
            }
            NodeError::Internal(e) => write!(f, "internal error: {:#}", e),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NodeError::Internal(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<TransactionRejected> for NodeError {
    fn from(rejected: TransactionRejected) -> Self {
        NodeError::Rejected(rejected.message)
    }
}

impl From<anyhow::Error> for NodeError {
    fn from(e: anyhow::Error) -> Self {
        NodeError::Internal(e)
    }
}
