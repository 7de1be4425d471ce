//! Updates: immutable facts about the state of objects.
//!
//! Every object starts its life with a [`Update::ClassTag`], followed by one
//! [`Update::Field`] per field. Later transactions only record the fields
//! they changed.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::references::{StorageReference, TransactionReference};
use crate::signatures::FieldSignature;
use crate::values::StorageValue;

/// An update to the state of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Update {
    /// Concrete class of an object and the jar that defines it.
    ClassTag {
        object: StorageReference,
        class_name: String,
        jar: TransactionReference,
    },
    /// A field of an object took a value.
    Field {
        object: StorageReference,
        field: FieldSignature,
        value: StorageValue,
    },
}

/// What an update is about, ignoring its value. Two updates with the same
/// object and key shadow each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateKey {
    ClassTag,
    Field(FieldSignature),
}

impl Update {
    pub fn class_tag(
        object: StorageReference,
        class_name: impl Into<String>,
        jar: TransactionReference,
    ) -> Self {
        Update::ClassTag {
            object,
            class_name: class_name.into(),
            jar,
        }
    }

    pub fn field(object: StorageReference, field: FieldSignature, value: StorageValue) -> Self {
        Update::Field {
            object,
            field,
            value,
        }
    }

    /// The object this update refers to.
    pub fn object(&self) -> StorageReference {
        match self {
            Update::ClassTag { object, .. } | Update::Field { object, .. } => *object,
        }
    }

    pub fn key(&self) -> UpdateKey {
        match self {
            Update::ClassTag { .. } => UpdateKey::ClassTag,
            Update::Field { field, .. } => UpdateKey::Field(field.clone()),
        }
    }

    /// Eager updates are shipped with every snapshot of their object. Class
    /// tags are always eager.
    pub fn is_eager(&self) -> bool {
        match self {
            Update::ClassTag { .. } => true,
            Update::Field { field, .. } => field.ty.is_eager(),
        }
    }

    pub fn is_class_tag(&self) -> bool {
        matches!(self, Update::ClassTag { .. })
    }

    fn sort_key(&self) -> (StorageReference, UpdateKey, Option<&StorageValue>) {
        match self {
            Update::ClassTag { object, .. } => (*object, UpdateKey::ClassTag, None),
            Update::Field {
                object,
                field,
                value,
            } => (*object, UpdateKey::Field(field.clone()), Some(value)),
        }
    }
}

impl PartialOrd for Update {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Update {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key()).then_with(|| match (self, other) {
            (
                Update::ClassTag {
                    class_name: a,
                    jar: ja,
                    ..
                },
                Update::ClassTag {
                    class_name: b,
                    jar: jb,
                    ..
                },
            ) => (a, ja).cmp(&(b, jb)),
            _ => Ordering::Equal,
        })
    }
}

/// Sorts and deduplicates a collection of updates, as stored in responses.
pub fn normalize(updates: impl IntoIterator<Item = Update>) -> Vec<Update> {
    updates
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
