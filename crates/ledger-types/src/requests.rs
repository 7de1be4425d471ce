//! Transaction requests.
//!
//! Initial requests are unsigned and free; they are only accepted before the
//! node is initialized. Every other request carries a [`RequestHeader`] that
//! names the paying caller, its nonce and the gas it is willing to buy.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::references::{Classpath, StorageReference};
use crate::signatures::{ConstructorSignature, MethodSignature};
use crate::values::StorageValue;

/// Fields shared by every non-initial request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// The externally owned account that pays for the transaction.
    pub caller: StorageReference,
    /// Must match the nonce of the caller at execution time.
    pub nonce: u128,
    pub chain_id: String,
    pub gas_limit: u64,
    pub gas_price: u64,
    /// Code available to the transaction.
    pub classpath: Classpath,
    /// Signature of [`TransactionRequest::signed_bytes`] with the caller's key.
    pub signature: Vec<u8>,
}

impl RequestHeader {
    /// A header with an empty signature.
    pub fn new(
        caller: StorageReference,
        nonce: u128,
        chain_id: impl Into<String>,
        gas_limit: u64,
        gas_price: u64,
        classpath: Classpath,
    ) -> Self {
        Self {
            caller,
            nonce,
            chain_id: chain_id.into(),
            gas_limit,
            gas_price,
            classpath,
            signature: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarStoreInitialRequest {
    /// Encoded code unit to install.
    pub jar: Vec<u8>,
    pub dependencies: Vec<Classpath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameteCreationRequest {
    pub classpath: Classpath,
    pub initial_amount: u128,
    /// Base64 encoded public key of the gamete.
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationRequest {
    pub classpath: Classpath,
    pub manifest: StorageReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarStoreRequest {
    pub header: RequestHeader,
    pub jar: Vec<u8>,
    pub dependencies: Vec<Classpath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorCallRequest {
    pub header: RequestHeader,
    pub constructor: ConstructorSignature,
    pub actuals: Vec<StorageValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMethodCallRequest {
    pub header: RequestHeader,
    pub method: MethodSignature,
    pub receiver: StorageReference,
    pub actuals: Vec<StorageValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMethodCallRequest {
    pub header: RequestHeader,
    pub method: MethodSignature,
    pub actuals: Vec<StorageValue>,
}

/// A request for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRequest {
    JarStoreInitial(JarStoreInitialRequest),
    GameteCreation(GameteCreationRequest),
    Initialization(InitializationRequest),
    JarStore(JarStoreRequest),
    ConstructorCall(ConstructorCallRequest),
    InstanceMethodCall(InstanceMethodCallRequest),
    StaticMethodCall(StaticMethodCallRequest),
}

impl TransactionRequest {
    /// True for the gas-free requests that bootstrap a node.
    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            TransactionRequest::JarStoreInitial(_)
                | TransactionRequest::GameteCreation(_)
                | TransactionRequest::Initialization(_)
        )
    }

    pub fn header(&self) -> Option<&RequestHeader> {
        match self {
            TransactionRequest::JarStore(r) => Some(&r.header),
            TransactionRequest::ConstructorCall(r) => Some(&r.header),
            TransactionRequest::InstanceMethodCall(r) => Some(&r.header),
            TransactionRequest::StaticMethodCall(r) => Some(&r.header),
            _ => None,
        }
    }

    fn header_mut(&mut self) -> Option<&mut RequestHeader> {
        match self {
            TransactionRequest::JarStore(r) => Some(&mut r.header),
            TransactionRequest::ConstructorCall(r) => Some(&mut r.header),
            TransactionRequest::InstanceMethodCall(r) => Some(&mut r.header),
            TransactionRequest::StaticMethodCall(r) => Some(&mut r.header),
            _ => None,
        }
    }

    /// Short name of the kind of request, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransactionRequest::JarStoreInitial(_) => "jar_store_initial",
            TransactionRequest::GameteCreation(_) => "gamete_creation",
            TransactionRequest::Initialization(_) => "initialization",
            TransactionRequest::JarStore(_) => "jar_store",
            TransactionRequest::ConstructorCall(_) => "constructor_call",
            TransactionRequest::InstanceMethodCall(_) => "instance_method_call",
            TransactionRequest::StaticMethodCall(_) => "static_method_call",
        }
    }

    /// The bytes covered by the signature: the encoding of the request
    /// with an empty signature.
    pub fn signed_bytes(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        if let Some(header) = unsigned.header_mut() {
            header.signature.clear();
        }
        bcs::to_bytes(&unsigned).context("Failed to encode request for signing")
    }

    /// Replaces the signature of a non-initial request. No-op for initial ones.
    pub fn set_signature(&mut self, signature: Vec<u8>) {
        if let Some(header) = self.header_mut() {
            header.signature = signature;
        }
    }

    /// Size in bytes of the encoded request, used for storage costs.
    pub fn size(&self) -> Result<u64> {
        let bytes = bcs::to_bytes(self).context("Failed to encode request")?;
        Ok(bytes.len() as u64)
    }

    /// SHA-256 of the signed bytes, hex encoded.
    pub fn digest(&self) -> Result<String> {
        let hash = Sha256::digest(self.signed_bytes()?);
        Ok(hex::encode(hash))
    }
}
