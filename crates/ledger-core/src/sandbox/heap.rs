//! The objects of a running transaction.
//!
//! Stored objects are materialized from their history the first time the
//! transaction uses them. Every response looked up for that charges the
//! CPU cost of a response lookup. Eager fields are read at that moment;
//! lazy fields (object references) are read on first access.
//!
//! New objects receive the reference `(current transaction, progressive)`
//! at allocation and all their fields start at the default value of their
//! type.
//!
//! At the end of the transaction [`Heap::updates`] extracts what must be
//! recorded: every field of the new objects that are reachable from the
//! roots of the transaction, and the changed fields of stored objects.
//!
//! # Store utilities
//!
//! [`stored_class_tag`], [`stored_field`] and [`stored_state`] read objects
//! without gas, for the checks that precede the purchase of gas and for
//! the node's accessors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::trace;

use ledger_sandbox_store::{Store, StoreError};
use ledger_sandbox_types::updates::normalize;
use ledger_sandbox_types::{
    FieldSignature, StorageReference, StorageType, StorageValue, TransactionReference, Update,
    UpdateKey,
};

use super::loader::LoadedClasspath;
use super::throwable::{names, ExecutionFault, ExecutionResult};
use crate::gas::{GasCharger, GasCostModel};

/// Access to the state of objects, whatever their runtime representation.
pub trait ObjectCapabilities {
    fn get_field(
        &mut self,
        object: StorageReference,
        field: &FieldSignature,
    ) -> ExecutionResult<StorageValue>;

    fn set_field(
        &mut self,
        object: StorageReference,
        field: &FieldSignature,
        value: StorageValue,
    ) -> ExecutionResult<()>;

    fn get_balance(&mut self, object: StorageReference) -> ExecutionResult<u128> {
        big_integer(self.get_field(object, &FieldSignature::balance())?, "balance")
    }

    fn set_balance(&mut self, object: StorageReference, balance: u128) -> ExecutionResult<()> {
        self.set_field(
            object,
            &FieldSignature::balance(),
            StorageValue::BigInteger(balance),
        )
    }

    fn get_nonce(&mut self, object: StorageReference) -> ExecutionResult<u128> {
        big_integer(self.get_field(object, &FieldSignature::nonce())?, "nonce")
    }

    fn set_nonce(&mut self, object: StorageReference, nonce: u128) -> ExecutionResult<()> {
        self.set_field(object, &FieldSignature::nonce(), StorageValue::BigInteger(nonce))
    }
}

fn big_integer(value: StorageValue, what: &str) -> ExecutionResult<u128> {
    value.as_big_integer().ok_or_else(|| {
        ExecutionFault::thrown(
            names::CLASS_CAST,
            format!("the {} is not a BigInteger: {}", what, value),
        )
    })
}

#[derive(Debug, Clone)]
struct HeapObject {
    class_name: String,
    jar: TransactionReference,
    /// Current values of the loaded fields.
    fields: BTreeMap<FieldSignature, StorageValue>,
    /// Values of the loaded fields as found in the store. Empty for new objects.
    original: BTreeMap<FieldSignature, StorageValue>,
    is_new: bool,
}

/// Objects of one transaction, with the gas account they are charged to.
pub struct Heap<'a> {
    store: &'a dyn Store,
    classes: Arc<LoadedClasspath>,
    costs: &'a GasCostModel,
    charger: GasCharger,
    transaction: TransactionReference,
    next_progressive: u64,
    objects: BTreeMap<StorageReference, HeapObject>,
    events: Vec<StorageReference>,
}

impl<'a> Heap<'a> {
    pub fn new(
        store: &'a dyn Store,
        classes: Arc<LoadedClasspath>,
        costs: &'a GasCostModel,
        charger: GasCharger,
        transaction: TransactionReference,
    ) -> Self {
        Self {
            store,
            classes,
            costs,
            charger,
            transaction,
            next_progressive: 0,
            objects: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn store(&self) -> &'a dyn Store {
        self.store
    }

    pub fn classes(&self) -> &Arc<LoadedClasspath> {
        &self.classes
    }

    pub fn costs(&self) -> &'a GasCostModel {
        self.costs
    }

    pub fn charger(&self) -> &GasCharger {
        &self.charger
    }

    pub fn charger_mut(&mut self) -> &mut GasCharger {
        &mut self.charger
    }

    /// The transaction whose objects this heap holds.
    pub fn transaction(&self) -> TransactionReference {
        self.transaction
    }

    pub fn events(&self) -> &[StorageReference] {
        &self.events
    }

    pub fn emit(&mut self, event: StorageReference) {
        self.events.push(event);
    }

    // ===== Objects =====

    /// Allocates a new object of `class_name` with default field values.
    pub fn allocate(&mut self, class_name: &str) -> ExecutionResult<StorageReference> {
        let jar = self.classes.jar_of(class_name).ok_or_else(|| {
            ExecutionFault::thrown(
                names::ILLEGAL_STATE,
                format!("class {} cannot be instantiated", class_name),
            )
        })?;
        let fields: BTreeMap<FieldSignature, StorageValue> = self
            .classes
            .fields_of(class_name)
            .into_iter()
            .map(|field| {
                let value = field.ty.default_value();
                (field, value)
            })
            .collect();

        self.charger.charge_cpu(self.costs.cpu_cost_of_allocation)?;
        self.charger
            .charge_ram(self.costs.ram_cost_of_object(fields.len() as u64))?;

        let reference = StorageReference::new(self.transaction, self.next_progressive);
        self.next_progressive += 1;
        self.objects.insert(
            reference,
            HeapObject {
                class_name: class_name.to_string(),
                jar,
                fields,
                original: BTreeMap::new(),
                is_new: true,
            },
        );
        trace!(object = %reference, class = class_name, "allocated object");
        Ok(reference)
    }

    /// The runtime class of an object, loading it if needed.
    pub fn class_of(&mut self, object: StorageReference) -> ExecutionResult<String> {
        Ok(self.load(object)?.class_name.clone())
    }

    pub fn is_instance_of(
        &mut self,
        object: StorageReference,
        class_name: &str,
    ) -> ExecutionResult<bool> {
        let class = self.class_of(object)?;
        Ok(self.classes.is_subclass_of(&class, class_name))
    }

    fn load(&mut self, object: StorageReference) -> ExecutionResult<&mut HeapObject> {
        if !self.objects.contains_key(&object) {
            let loaded = self.deserialize(object)?;
            self.objects.insert(object, loaded);
        }
        self.objects
            .get_mut(&object)
            .ok_or_else(|| ExecutionFault::Internal(anyhow!("object {} vanished", object)))
    }

    fn deserialize(&mut self, object: StorageReference) -> ExecutionResult<HeapObject> {
        let history = self.store.get_history_uncommitted(object)?;
        if history.is_empty() {
            return Err(ExecutionFault::thrown(
                names::DESERIALIZATION,
                format!("unknown object {}", object),
            ));
        }

        let mut class_tag = None;
        let mut fields = BTreeMap::new();
        for transaction in history {
            self.charger
                .charge_cpu(self.costs.cpu_cost_for_getting_response_at())?;
            let response = self
                .store
                .get_response_uncommitted(transaction)?
                .ok_or(StoreError::MissingResponse {
                    object,
                    transaction,
                })
                .map_err(anyhow::Error::from)?;

            for update in response.updates_of(object) {
                match update {
                    Update::ClassTag {
                        class_name, jar, ..
                    } => {
                        if class_tag.is_none() {
                            class_tag = Some((class_name.clone(), *jar));
                        }
                    }
                    Update::Field { field, value, .. } if field.ty.is_eager() => {
                        fields
                            .entry(field.clone())
                            .or_insert_with(|| value.clone());
                    }
                    Update::Field { .. } => {}
                }
            }
        }

        let (class_name, jar) = class_tag.ok_or_else(|| {
            ExecutionFault::Internal(anyhow!(
                "STORE_CORRUPTED: the history of {} has no class tag",
                object
            ))
        })?;
        if !self.classes.contains(&class_name) {
            return Err(ExecutionFault::thrown(
                names::DESERIALIZATION,
                format!("class {} of {} is not in the classpath", class_name, object),
            ));
        }

        for field in self.classes.fields_of(&class_name) {
            if field.ty.is_eager() && !fields.contains_key(&field) {
                let value = field.ty.default_value();
                fields.insert(field, value);
            }
        }

        trace!(object = %object, class = %class_name, "deserialized object");
        Ok(HeapObject {
            class_name,
            jar,
            original: fields.clone(),
            fields,
            is_new: false,
        })
    }

    /// Reads a lazy field of a stored object from its history.
    fn load_lazy_field(
        &mut self,
        object: StorageReference,
        field: &FieldSignature,
    ) -> ExecutionResult<StorageValue> {
        let history = self.store.get_history_uncommitted(object)?;
        for transaction in history {
            self.charger
                .charge_cpu(self.costs.cpu_cost_for_getting_response_at())?;
            let response = self
                .store
                .get_response_uncommitted(transaction)?
                .ok_or(StoreError::MissingResponse {
                    object,
                    transaction,
                })
                .map_err(anyhow::Error::from)?;
            let found = response.updates_of(object).find_map(|update| match update {
                Update::Field { field: f, value, .. } if f == field => Some(value.clone()),
                _ => None,
            });
            if let Some(value) = found {
                return Ok(value);
            }
        }
        Ok(field.ty.default_value())
    }

    fn check_field(
        &mut self,
        object: StorageReference,
        field: &FieldSignature,
    ) -> ExecutionResult<()> {
        let class = self.class_of(object)?;
        if self.classes.has_field(&class, field) {
            Ok(())
        } else {
            Err(ExecutionFault::thrown(
                names::CLASS_CAST,
                format!("{} of class {} has no field {}", object, class, field),
            ))
        }
    }

    // ===== Updates =====

    /// The updates produced so far, for a transaction whose roots are
    /// `roots`. Events are roots as well.
    pub fn updates(&self, roots: &[StorageReference]) -> Vec<Update> {
        let mut pending: Vec<StorageReference> = roots.to_vec();
        pending.extend(self.events.iter().copied());
        pending.extend(
            self.objects
                .iter()
                .filter(|(_, object)| !object.is_new)
                .map(|(reference, _)| *reference),
        );

        let mut seen = BTreeSet::new();
        let mut updates = Vec::new();
        while let Some(reference) = pending.pop() {
            if !seen.insert(reference) {
                continue;
            }
            let Some(object) = self.objects.get(&reference) else {
                continue;
            };

            if object.is_new {
                updates.push(Update::class_tag(
                    reference,
                    object.class_name.clone(),
                    object.jar,
                ));
            }
            for (field, value) in &object.fields {
                if object.is_new || object.original.get(field) != Some(value) {
                    updates.push(Update::field(reference, field.clone(), value.clone()));
                }
                if let Some(next) = value.as_reference() {
                    pending.push(next);
                }
            }
        }

        normalize(updates)
    }
}

impl ObjectCapabilities for Heap<'_> {
    fn get_field(
        &mut self,
        object: StorageReference,
        field: &FieldSignature,
    ) -> ExecutionResult<StorageValue> {
        self.check_field(object, field)?;
        if let Some(value) = self.load(object)?.fields.get(field) {
            return Ok(value.clone());
        }

        let value = self.load_lazy_field(object, field)?;
        let loaded = self.load(object)?;
        loaded.original.insert(field.clone(), value.clone());
        loaded.fields.insert(field.clone(), value.clone());
        Ok(value)
    }

    fn set_field(
        &mut self,
        object: StorageReference,
        field: &FieldSignature,
        value: StorageValue,
    ) -> ExecutionResult<()> {
        self.check_field(object, field)?;
        if !value.fits(&field.ty) {
            return Err(ExecutionFault::thrown(
                names::CLASS_CAST,
                format!("{} cannot be stored into {}", value, field),
            ));
        }
        if let (Some(target), StorageType::Class(expected)) =
            (value.as_reference(), &field.ty)
        {
            if !self.is_instance_of(target, expected)? {
                return Err(ExecutionFault::thrown(
                    names::CLASS_CAST,
                    format!("{} is not a {}", target, expected),
                ));
            }
        }

        // lazy fields must be read before being overwritten, so that the
        // change is detected against the stored value
        if !field.ty.is_eager() {
            self.get_field(object, field)?;
        }
        self.load(object)?.fields.insert(field.clone(), value);
        Ok(())
    }
}

// =============================================================================
// Store utilities
// =============================================================================

fn stored_response(
    store: &dyn Store,
    object: StorageReference,
    transaction: TransactionReference,
) -> Result<ledger_sandbox_types::TransactionResponse> {
    store
        .get_response_uncommitted(transaction)?
        .ok_or_else(|| {
            StoreError::MissingResponse {
                object,
                transaction,
            }
            .into()
        })
}

/// The class tag of a stored object, `None` if the object does not exist.
pub fn stored_class_tag(store: &dyn Store, object: StorageReference) -> Result<Option<Update>> {
    let history = store.get_history_uncommitted(object)?;
    let Some(&creation) = history.last() else {
        return Ok(None);
    };
    let response = stored_response(store, object, creation)?;
    let tag = response
        .updates_of(object)
        .find(|update| update.is_class_tag())
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "STORE_CORRUPTED: the history of {} does not end with its class tag",
                object
            )
        })?;
    Ok(Some(tag))
}

/// The live updates of a stored object: its class tag and the latest value
/// of each field, rebuilt from its history.
pub fn stored_state(store: &dyn Store, object: StorageReference) -> Result<Vec<Update>> {
    let mut live: BTreeMap<UpdateKey, Update> = BTreeMap::new();
    for transaction in store.get_history_uncommitted(object)? {
        let response = stored_response(store, object, transaction)?;
        for update in response.updates_of(object) {
            live.entry(update.key()).or_insert_with(|| update.clone());
        }
    }
    Ok(normalize(live.into_values()))
}

/// The latest value of a field of a stored object.
pub fn stored_field(
    store: &dyn Store,
    object: StorageReference,
    field: &FieldSignature,
) -> Result<Option<StorageValue>> {
    for transaction in store.get_history_uncommitted(object)? {
        let response = stored_response(store, object, transaction)?;
        let found = response.updates_of(object).find_map(|update| match update {
            Update::Field { field: f, value, .. } if f == field => Some(value.clone()),
            _ => None,
        });
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}
