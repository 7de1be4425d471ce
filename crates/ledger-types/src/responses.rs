//! Transaction responses.
//!
//! Responses are immutable once pushed to the store. Non-initial responses
//! report the gas consumed for CPU, RAM and storage; failed responses also
//! report the penalty, so that the four figures sum to the gas limit.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::references::{Classpath, StorageReference};
use crate::updates::Update;
use crate::values::StorageValue;

/// Gas consumed by a non-initial transaction, split by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasConsumed {
    pub cpu: u64,
    pub ram: u64,
    pub storage: u64,
}

impl GasConsumed {
    pub fn new(cpu: u64, ram: u64, storage: u64) -> Self {
        Self { cpu, ram, storage }
    }

    pub fn total(&self) -> u64 {
        self.cpu
            .saturating_add(self.ram)
            .saturating_add(self.storage)
    }
}

/// The throwable that caused an exception or a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub class_name: String,
    pub message: String,
}

impl FailureCause {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.class_name)
        } else {
            write!(f, "{}: {}", self.class_name, self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarStoreInitialResponse {
    pub instrumented_jar: Vec<u8>,
    pub dependencies: Vec<Classpath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameteCreationResponse {
    pub updates: Vec<Update>,
    pub gamete: StorageReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JarStoreResponse {
    Successful {
        instrumented_jar: Vec<u8>,
        dependencies: Vec<Classpath>,
        updates: Vec<Update>,
        gas: GasConsumed,
    },
    Failed {
        updates: Vec<Update>,
        gas: GasConsumed,
        penalty: u64,
        cause: FailureCause,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstructorCallResponse {
    Successful {
        new_object: StorageReference,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    Exception {
        cause: FailureCause,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    Failed {
        updates: Vec<Update>,
        gas: GasConsumed,
        penalty: u64,
        cause: FailureCause,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodCallResponse {
    Successful {
        result: StorageValue,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    VoidSuccessful {
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    Exception {
        cause: FailureCause,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumed,
    },
    Failed {
        updates: Vec<Update>,
        gas: GasConsumed,
        penalty: u64,
        cause: FailureCause,
    },
}

/// How a transaction that took effect ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Successful,
    Exception,
    Failed,
}

/// The response of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionResponse {
    JarStoreInitial(JarStoreInitialResponse),
    GameteCreation(GameteCreationResponse),
    Initialization,
    JarStore(JarStoreResponse),
    ConstructorCall(ConstructorCallResponse),
    MethodCall(MethodCallResponse),
}

impl TransactionResponse {
    /// The updates carried by this response, if its kind carries updates.
    pub fn updates(&self) -> Option<&[Update]> {
        match self {
            TransactionResponse::JarStoreInitial(_) | TransactionResponse::Initialization => None,
            TransactionResponse::GameteCreation(r) => Some(r.updates.as_slice()),
            TransactionResponse::JarStore(
                JarStoreResponse::Successful { updates, .. }
                | JarStoreResponse::Failed { updates, .. },
            ) => Some(updates.as_slice()),
            TransactionResponse::ConstructorCall(
                ConstructorCallResponse::Successful { updates, .. }
                | ConstructorCallResponse::Exception { updates, .. }
                | ConstructorCallResponse::Failed { updates, .. },
            ) => Some(updates.as_slice()),
            TransactionResponse::MethodCall(
                MethodCallResponse::Successful { updates, .. }
                | MethodCallResponse::VoidSuccessful { updates, .. }
                | MethodCallResponse::Exception { updates, .. }
                | MethodCallResponse::Failed { updates, .. },
            ) => Some(updates.as_slice()),
        }
    }

    /// Updates of this response that refer to the given object.
    pub fn updates_of(&self, object: StorageReference) -> impl Iterator<Item = &Update> {
        self.updates()
            .unwrap_or(&[])
            .iter()
            .filter(move |update| update.object() == object)
    }

    pub fn events(&self) -> &[StorageReference] {
        match self {
            TransactionResponse::ConstructorCall(
                ConstructorCallResponse::Successful { events, .. }
                | ConstructorCallResponse::Exception { events, .. },
            ) => events.as_slice(),
            TransactionResponse::MethodCall(
                MethodCallResponse::Successful { events, .. }
                | MethodCallResponse::VoidSuccessful { events, .. }
                | MethodCallResponse::Exception { events, .. },
            ) => events.as_slice(),
            _ => &[],
        }
    }

    /// Gas consumed, for non-initial responses.
    pub fn gas(&self) -> Option<GasConsumed> {
        match self {
            TransactionResponse::JarStore(
                JarStoreResponse::Successful { gas, .. } | JarStoreResponse::Failed { gas, .. },
            ) => Some(*gas),
            TransactionResponse::ConstructorCall(
                ConstructorCallResponse::Successful { gas, .. }
                | ConstructorCallResponse::Exception { gas, .. }
                | ConstructorCallResponse::Failed { gas, .. },
            ) => Some(*gas),
            TransactionResponse::MethodCall(
                MethodCallResponse::Successful { gas, .. }
                | MethodCallResponse::VoidSuccessful { gas, .. }
                | MethodCallResponse::Exception { gas, .. }
                | MethodCallResponse::Failed { gas, .. },
            ) => Some(*gas),
            _ => None,
        }
    }

    /// Gas charged as penalty, for failed responses.
    pub fn penalty(&self) -> Option<u64> {
        match self {
            TransactionResponse::JarStore(JarStoreResponse::Failed { penalty, .. })
            | TransactionResponse::ConstructorCall(ConstructorCallResponse::Failed {
                penalty, ..
            })
            | TransactionResponse::MethodCall(MethodCallResponse::Failed { penalty, .. }) => {
                Some(*penalty)
            }
            _ => None,
        }
    }

    /// Cause of an exception or of a failure.
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            TransactionResponse::JarStore(JarStoreResponse::Failed { cause, .. })
            | TransactionResponse::ConstructorCall(
                ConstructorCallResponse::Exception { cause, .. }
                | ConstructorCallResponse::Failed { cause, .. },
            )
            | TransactionResponse::MethodCall(
                MethodCallResponse::Exception { cause, .. }
                | MethodCallResponse::Failed { cause, .. },
            ) => Some(cause),
            _ => None,
        }
    }

    pub fn outcome(&self) -> ResponseOutcome {
        match self {
            TransactionResponse::JarStore(JarStoreResponse::Failed { .. })
            | TransactionResponse::ConstructorCall(ConstructorCallResponse::Failed { .. })
            | TransactionResponse::MethodCall(MethodCallResponse::Failed { .. }) => {
                ResponseOutcome::Failed
            }
            TransactionResponse::ConstructorCall(ConstructorCallResponse::Exception { .. })
            | TransactionResponse::MethodCall(MethodCallResponse::Exception { .. }) => {
                ResponseOutcome::Exception
            }
            _ => ResponseOutcome::Successful,
        }
    }

    /// The installed code unit and its dependencies, for successful jar
    /// installations.
    pub fn installed_jar(&self) -> Option<(&[u8], &[Classpath])> {
        match self {
            TransactionResponse::JarStoreInitial(r) => {
                Some((r.instrumented_jar.as_slice(), r.dependencies.as_slice()))
            }
            TransactionResponse::JarStore(JarStoreResponse::Successful {
                instrumented_jar,
                dependencies,
                ..
            }) => Some((instrumented_jar.as_slice(), dependencies.as_slice())),
            _ => None,
        }
    }

    pub fn is_initialization(&self) -> bool {
        matches!(self, TransactionResponse::Initialization)
    }

    /// Size in bytes of the encoded response, used for storage costs.
    pub fn size(&self) -> Result<u64> {
        let bytes = bcs::to_bytes(self).context("Failed to encode response")?;
        Ok(bytes.len() as u64)
    }

    /// Human-readable rendering. Not meant to be parsed back.
    pub fn render(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to render response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::references::TransactionReference;

    fn failed() -> TransactionResponse {
        TransactionResponse::MethodCall(MethodCallResponse::Failed {
            updates: vec![],
            gas: GasConsumed::new(10, 20, 30),
            penalty: 40,
            cause: FailureCause::new("lang.OutOfGasError", ""),
        })
    }

    #[test]
    fn test_failed_response_accessors() {
        let response = failed();
        assert_eq!(response.outcome(), ResponseOutcome::Failed);
        assert_eq!(response.penalty(), Some(40));
        assert_eq!(response.gas().unwrap().total(), 60);
        assert_eq!(response.cause().unwrap().to_string(), "lang.OutOfGasError");
        assert!(response.updates().unwrap().is_empty());
    }

    #[test]
    fn test_initial_responses_have_no_updates_or_gas() {
        let response = TransactionResponse::JarStoreInitial(JarStoreInitialResponse {
            instrumented_jar: vec![1, 2],
            dependencies: vec![],
        });
        assert!(response.updates().is_none());
        assert!(response.gas().is_none());
        assert_eq!(response.installed_jar().unwrap().0, &[1, 2]);
        assert!(TransactionResponse::Initialization.is_initialization());
    }

    #[test]
    fn test_size_does_not_depend_on_gas_values() {
        let small = failed();
        let large = TransactionResponse::MethodCall(MethodCallResponse::Failed {
            updates: vec![],
            gas: GasConsumed::new(u64::MAX, u64::MAX, u64::MAX),
            penalty: u64::MAX,
            cause: FailureCause::new("lang.OutOfGasError", ""),
        });
        assert_eq!(small.size().unwrap(), large.size().unwrap());
    }

    #[test]
    fn test_updates_of_filters_by_object() {
        let a = StorageReference::new(TransactionReference(1), 0);
        let b = StorageReference::new(TransactionReference(1), 1);
        let response = TransactionResponse::GameteCreation(GameteCreationResponse {
            updates: vec![
                Update::class_tag(a, "lang.Gamete", TransactionReference(0)),
                Update::class_tag(b, "lang.Gamete", TransactionReference(0)),
            ],
            gamete: a,
        });
        assert_eq!(response.updates_of(a).count(), 1);
    }
}
