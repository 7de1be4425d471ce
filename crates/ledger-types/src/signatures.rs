//! Signatures of fields, constructors and methods.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::values::StorageType;

/// Names of the classes of the base library that the engine relies on.
pub mod class_names {
    pub const STORAGE: &str = "lang.Storage";
    pub const CONTRACT: &str = "lang.Contract";
    pub const EXTERNALLY_OWNED_ACCOUNT: &str = "lang.ExternallyOwnedAccount";
    pub const GAMETE: &str = "lang.Gamete";
    pub const EVENT: &str = "lang.Event";
    pub const MANIFEST: &str = "lang.Manifest";
}

/// A field, identified by its defining class, its name and its type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldSignature {
    pub defining_class: String,
    pub name: String,
    pub ty: StorageType,
}

impl FieldSignature {
    pub fn new(
        defining_class: impl Into<String>,
        name: impl Into<String>,
        ty: StorageType,
    ) -> Self {
        Self {
            defining_class: defining_class.into(),
            name: name.into(),
            ty,
        }
    }

    /// The balance of every contract.
    pub fn balance() -> Self {
        Self::new(class_names::CONTRACT, "balance", StorageType::BigInteger)
    }

    /// The nonce of every externally owned account.
    pub fn nonce() -> Self {
        Self::new(
            class_names::EXTERNALLY_OWNED_ACCOUNT,
            "nonce",
            StorageType::BigInteger,
        )
    }

    /// The public key of every externally owned account, base64 encoded.
    pub fn public_key() -> Self {
        Self::new(
            class_names::EXTERNALLY_OWNED_ACCOUNT,
            "publicKey",
            StorageType::String,
        )
    }

    /// The chain identifier held by the manifest.
    pub fn chain_id() -> Self {
        Self::new(class_names::MANIFEST, "chainId", StorageType::String)
    }
}

impl fmt::Display for FieldSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.defining_class, self.name, self.ty)
    }
}

/// A constructor, identified by its class and formal parameter types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstructorSignature {
    pub defining_class: String,
    pub formals: Vec<StorageType>,
}

impl ConstructorSignature {
    pub fn new(defining_class: impl Into<String>, formals: Vec<StorageType>) -> Self {
        Self {
            defining_class: defining_class.into(),
            formals,
        }
    }
}

impl fmt::Display for ConstructorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.defining_class, join(&self.formals))
    }
}

/// A method, identified by its class, name, formals and return type.
/// `returns` is `None` for void methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub defining_class: String,
    pub name: String,
    pub formals: Vec<StorageType>,
    pub returns: Option<StorageType>,
}

impl MethodSignature {
    pub fn new(
        defining_class: impl Into<String>,
        name: impl Into<String>,
        formals: Vec<StorageType>,
        returns: Option<StorageType>,
    ) -> Self {
        Self {
            defining_class: defining_class.into(),
            name: name.into(),
            formals,
            returns,
        }
    }

    pub fn is_void(&self) -> bool {
        self.returns.is_none()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let returns = self
            .returns
            .as_ref()
            .map(|ty| ty.to_string())
            .unwrap_or_else(|| "void".to_string());
        write!(
            f,
            "{} {}.{}({})",
            returns,
            self.defining_class,
            self.name,
            join(&self.formals)
        )
    }
}

fn join(types: &[StorageType]) -> String {
    types
        .iter()
        .map(|ty| ty.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_signature_display() {
        let method = MethodSignature::new(
            "test.Counter",
            "add",
            vec![StorageType::Int, StorageType::class("test.Node")],
            None,
        );
        assert_eq!(method.to_string(), "void test.Counter.add(int,test.Node)");
        assert!(method.is_void());
    }

    #[test]
    fn test_well_known_fields() {
        assert_eq!(FieldSignature::balance().defining_class, class_names::CONTRACT);
        assert_eq!(FieldSignature::nonce().ty, StorageType::BigInteger);
        assert_ne!(FieldSignature::nonce(), FieldSignature::balance());
    }
}
