//! Storage types and values.
//!
//! The same [`StorageValue`] is used for values held by live objects during
//! execution and for the values recorded by field updates in the ledger.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::references::StorageReference;

/// The declared type of a field, a formal parameter or a return value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageType {
    Boolean,
    Int,
    BigInteger,
    String,
    /// An object of the named class or of a subclass.
    Class(String),
}

impl StorageType {
    /// Shorthand for a class type.
    pub fn class(name: impl Into<String>) -> Self {
        StorageType::Class(name.into())
    }

    /// Updates of fields of this type are shipped with every snapshot of
    /// the object. Object references are materialized on demand instead.
    pub fn is_eager(&self) -> bool {
        !matches!(self, StorageType::Class(_))
    }

    /// The value a field of this type holds before being assigned.
    pub fn default_value(&self) -> StorageValue {
        match self {
            StorageType::Boolean => StorageValue::Boolean(false),
            StorageType::Int => StorageValue::Int(0),
            StorageType::BigInteger => StorageValue::BigInteger(0),
            StorageType::String => StorageValue::Null,
            StorageType::Class(_) => StorageValue::Null,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Boolean => write!(f, "boolean"),
            StorageType::Int => write!(f, "int"),
            StorageType::BigInteger => write!(f, "BigInteger"),
            StorageType::String => write!(f, "String"),
            StorageType::Class(name) => write!(f, "{}", name),
        }
    }
}

/// A value that can be held in a field or passed across a transaction
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageValue {
    Null,
    Boolean(bool),
    Int(i64),
    BigInteger(u128),
    String(String),
    Reference(StorageReference),
}

impl StorageValue {
    pub fn string(s: impl Into<String>) -> Self {
        StorageValue::String(s.into())
    }

    /// The object this value points to, if any.
    pub fn as_reference(&self) -> Option<StorageReference> {
        match self {
            StorageValue::Reference(reference) => Some(*reference),
            _ => None,
        }
    }

    pub fn as_big_integer(&self) -> Option<u128> {
        match self {
            StorageValue::BigInteger(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StorageValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StorageValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StorageValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Shallow type compatibility. Class compatibility of references is
    /// checked by the sandbox, which knows the runtime class of objects.
    pub fn fits(&self, ty: &StorageType) -> bool {
        matches!(
            (self, ty),
            (StorageValue::Boolean(_), StorageType::Boolean)
                | (StorageValue::Int(_), StorageType::Int)
                | (StorageValue::BigInteger(_), StorageType::BigInteger)
                | (StorageValue::String(_), StorageType::String)
                | (StorageValue::Null, StorageType::String)
                | (StorageValue::Null, StorageType::Class(_))
                | (StorageValue::Reference(_), StorageType::Class(_))
        )
    }
}

impl fmt::Display for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageValue::Null => write!(f, "null"),
            StorageValue::Boolean(value) => write!(f, "{}", value),
            StorageValue::Int(value) => write!(f, "{}", value),
            StorageValue::BigInteger(value) => write!(f, "{}", value),
            StorageValue::String(value) => write!(f, "\"{}\"", value),
            StorageValue::Reference(reference) => write!(f, "{}", reference),
        }
    }
}
