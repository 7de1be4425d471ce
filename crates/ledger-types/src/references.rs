//! References into the ledger.
//!
//! A [`TransactionReference`] names a transaction; a [`StorageReference`]
//! names an object by the transaction that created it and its position
//! among the objects created by that transaction.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Identifier of a transaction, assigned monotonically by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionReference(pub u64);

impl TransactionReference {
    /// The first reference ever assigned by a fresh node.
    pub const FIRST: TransactionReference = TransactionReference(0);

    /// The reference that follows this one.
    pub fn next(self) -> Self {
        TransactionReference(self.0.saturating_add(1))
    }

    /// Raw counter value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for TransactionReference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(s, 16)
            .map(TransactionReference)
            .map_err(|e| anyhow!("Invalid transaction reference '{}': {}", s, e))
    }
}

/// Identifier of an object in store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageReference {
    /// The transaction that created the object.
    pub transaction: TransactionReference,
    /// Progressive number of the object among those created by `transaction`.
    pub progressive: u64,
}

impl StorageReference {
    pub fn new(transaction: TransactionReference, progressive: u64) -> Self {
        Self {
            transaction,
            progressive,
        }
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:x}", self.transaction, self.progressive)
    }
}

impl FromStr for StorageReference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (transaction, progressive) = s
            .split_once('#')
            .ok_or_else(|| anyhow!("Invalid storage reference '{}': missing '#'", s))?;
        let progressive = u64::from_str_radix(progressive, 16)
            .map_err(|e| anyhow!("Invalid storage reference '{}': {}", s, e))?;
        Ok(Self::new(transaction.parse()?, progressive))
    }
}

/// A reference to an installed code unit, optionally pulling in its own
/// dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Classpath {
    /// The transaction that installed the code unit.
    pub jar: TransactionReference,
    /// Whether the dependencies of `jar` must be loaded as well.
    pub recursive: bool,
}

impl Classpath {
    pub fn new(jar: TransactionReference, recursive: bool) -> Self {
        Self { jar, recursive }
    }
}

impl fmt::Display for Classpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.recursive {
            write!(f, "{}(recursive)", self.jar)
        } else {
            write!(f, "{}", self.jar)
        }
    }
}
