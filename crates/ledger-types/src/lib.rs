//! Shared types for the ledger-sandbox workspace.
//!
//! This crate holds the data model consumed by both the store and the
//! execution engine:
//!
//! - [`references`] - transaction and object references, classpaths
//! - [`values`] - storage types and values
//! - [`signatures`] - field, constructor and method signatures
//! - [`updates`] - updates to the state of objects
//! - [`requests`] / [`responses`] - the transaction log entries

pub mod encoding;
pub mod env_utils;
pub mod references;
pub mod requests;
pub mod responses;
pub mod signatures;
pub mod updates;
pub mod values;

// Re-export commonly used types at crate root
pub use references::{Classpath, StorageReference, TransactionReference};
pub use requests::{
    ConstructorCallRequest, GameteCreationRequest, InitializationRequest,
    InstanceMethodCallRequest, JarStoreInitialRequest, JarStoreRequest, RequestHeader,
    StaticMethodCallRequest, TransactionRequest,
};
pub use responses::{
    ConstructorCallResponse, FailureCause, GameteCreationResponse, GasConsumed,
    JarStoreInitialResponse, JarStoreResponse, MethodCallResponse, ResponseOutcome,
    TransactionResponse,
};
pub use signatures::{class_names, ConstructorSignature, FieldSignature, MethodSignature};
pub use updates::{Update, UpdateKey};
pub use values::{StorageType, StorageValue};
