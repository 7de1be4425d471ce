//! Steps shared by every non-initial request.
//!
//! [`NonInitialTransaction::start`] runs the checks and the gas purchase in
//! a fixed order. Every problem up to the purchase is a rejection. After
//! it, the transaction either completes ([`NonInitialTransaction::complete`])
//! or fails ([`NonInitialTransaction::fail`]).

use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info};

use ledger_sandbox_types::updates::normalize;
use ledger_sandbox_types::{
    class_names, FailureCause, FieldSignature, GasConsumed, RequestHeader, StorageReference,
    StorageValue, TransactionReference, TransactionRequest, TransactionResponse, Update,
};

use super::{loader_costs, minimal_gas, BuildContext, BuildError, BuildResult, BuilderOutcome};
use crate::gas::{GasCharger, GasCostModel};
use crate::sandbox::heap::{stored_class_tag, stored_field, Heap, ObjectCapabilities};
use crate::sandbox::loader::LoadedClasspath;
use crate::sandbox::throwable::{names, ExecutionFault, Throwable};

/// Parts of a failed response.
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub updates: Vec<Update>,
    pub gas: GasConsumed,
    pub penalty: u64,
    pub cause: FailureCause,
}

/// Builds the failed response of a given kind.
pub(crate) type FailedResponse = fn(Failure) -> TransactionResponse;

/// A non-initial transaction whose caller has bought its gas.
pub(crate) struct NonInitialTransaction<'c> {
    pub heap: Heap<'c>,
    pub caller: StorageReference,
    reference: TransactionReference,
    gas_price: u64,
    view: bool,
    /// Balance and nonce of the caller right after the purchase of gas.
    reserved: Vec<Update>,
    failed: FailedResponse,
}

impl<'c> NonInitialTransaction<'c> {
    /// Validates the request and buys its gas.
    ///
    /// # Arguments
    ///
    /// * `classes` - the linked classpath of the request
    /// * `extra_gas` - gas the kind of request needs beyond the common
    ///   minimum, counted in the minimal gas
    /// * `failed` - how a failure of this kind of request looks
    /// * `view` - views skip the nonce and run under `max_gas_per_view`
    pub fn start(
        ctx: &BuildContext<'c>,
        reference: TransactionReference,
        request: &TransactionRequest,
        header: &RequestHeader,
        classes: Arc<LoadedClasspath>,
        extra_gas: u64,
        failed: FailedResponse,
        view: bool,
    ) -> Result<Self, BuildError> {
        let caller = header.caller;

        if header.chain_id != ctx.config.chain_id {
            return Err(BuildError::rejected(format!(
                "incorrect chain id: the request reports {:?} but the node requires {:?}",
                header.chain_id, ctx.config.chain_id
            )));
        }

        match stored_class_tag(ctx.store, caller)? {
            Some(Update::ClassTag { class_name, .. })
                if classes.is_subclass_of(&class_name, class_names::EXTERNALLY_OWNED_ACCOUNT) => {}
            Some(_) => {
                return Err(BuildError::rejected(format!(
                    "the caller {} is not an externally owned account",
                    caller
                )))
            }
            None => {
                return Err(BuildError::rejected(format!("unknown caller {}", caller)));
            }
        }

        verify_signature(ctx, request, header)?;

        let gas_limit = if view {
            header.gas_limit.min(ctx.config.max_gas_per_view)
        } else {
            header.gas_limit
        };
        let costs = ctx.costs();
        let minimal = minimal_gas(costs, request, gas_limit, &classes, failed, extra_gas)?;
        if gas_limit < minimal {
            return Err(BuildError::rejected(format!(
                "not enough gas to start the transaction: {} units offered, at least {} needed",
                gas_limit, minimal
            )));
        }

        let request_storage = costs.storage_cost_of_bytes(request.size()?);
        let (cpu, ram) = loader_costs(costs, &classes);
        let mut charger = GasCharger::new(gas_limit);
        charger
            .charge_cpu(costs.cpu_base_transaction_cost.saturating_add(cpu))
            .and_then(|_| charger.charge_ram(ram))
            .and_then(|_| charger.charge_storage(request_storage))
            .map_err(|e| BuildError::rejected(e.to_string()))?;

        let mut heap = Heap::new(ctx.store, classes, costs, charger, reference);
        let (balance, nonce) = caller_account(&mut heap, caller)?;

        if !view && nonce != header.nonce {
            return Err(BuildError::rejected(format!(
                "incorrect nonce: the request reports {} but the account contains {}",
                header.nonce, nonce
            )));
        }

        let cost = u128::from(gas_limit) * u128::from(header.gas_price);
        if balance < cost {
            return Err(BuildError::rejected(format!(
                "the caller {} has not enough funds to buy {} units of gas",
                caller, gas_limit
            )));
        }
        let balance = balance - cost;
        heap.set_balance(caller, balance).map_err(unexpected)?;

        let nonce = if view {
            nonce
        } else {
            let next = nonce
                .checked_add(1)
                .ok_or_else(|| BuildError::rejected("the nonce of the caller overflows"))?;
            heap.set_nonce(caller, next).map_err(unexpected)?;
            next
        };

        debug!(
            reference = %reference,
            caller = %caller,
            gas_limit,
            gas_price = header.gas_price,
            view,
            "gas reserved"
        );
        Ok(Self {
            heap,
            caller,
            reference,
            gas_price: header.gas_price,
            view,
            reserved: vec![
                Update::field(caller, FieldSignature::balance(), StorageValue::BigInteger(balance)),
                Update::field(caller, FieldSignature::nonce(), StorageValue::BigInteger(nonce)),
            ],
            failed,
        })
    }

    pub fn classes(&self) -> Arc<LoadedClasspath> {
        Arc::clone(self.heap.classes())
    }

    pub fn costs(&self) -> &'c GasCostModel {
        self.heap.costs()
    }

    /// Ends the transaction with a failure. The caller keeps the balance
    /// and nonce it had after buying gas; everything else is discarded.
    pub fn fail(self, cause: FailureCause) -> BuilderOutcome {
        let charger = self.heap.charger();
        info!(
            reference = %self.reference,
            caller = %self.caller,
            cause = %cause,
            "transaction failed"
        );
        BuilderOutcome::Failed((self.failed)(Failure {
            updates: self.reserved,
            gas: charger.consumed(),
            penalty: charger.penalty(),
            cause,
        }))
    }

    /// Ends a transaction whose code ran to completion (or to an allowed
    /// exception).
    ///
    /// `build` makes the response out of the updates, the events and the
    /// gas consumed. It is called a first time to know the size of the
    /// response, whose storage is then charged, and a second time after the
    /// refund of the unused gas. Caller balance and nonce are always among
    /// the updates, so both responses have the same size.
    pub fn complete(
        mut self,
        roots: &[StorageReference],
        build: impl Fn(Vec<Update>, Vec<StorageReference>, GasConsumed) -> TransactionResponse,
    ) -> BuildResult {
        let updates = self.updates(roots)?;
        if self.view {
            if let Some(update) = updates.iter().find(|u| !self.is_gas_update(u)) {
                let cause = Throwable::error(
                    names::SIDE_EFFECTS_IN_VIEW,
                    format!("view code modified {}", update.object()),
                )
                .cause();
                return Ok(self.fail(cause));
            }
        }

        let events = self.heap.events().to_vec();
        let candidate = build(updates, events.clone(), self.heap.charger().consumed());
        let storage = self.costs().storage_cost_of_bytes(candidate.size()?);
        if let Err(e) = self.heap.charger_mut().charge_storage(storage) {
            return Ok(self.fail(Throwable::from(e).cause()));
        }

        let refund = u128::from(self.heap.charger().unused()) * u128::from(self.gas_price);
        let balance = self.heap.get_balance(self.caller).map_err(unexpected)?;
        self.heap
            .set_balance(self.caller, balance.saturating_add(refund))
            .map_err(unexpected)?;

        let updates = self.updates(roots)?;
        let response = build(updates, events, self.heap.charger().consumed());
        debug!(
            reference = %self.reference,
            outcome = ?response.outcome(),
            refund = %refund,
            "transaction completed"
        );
        Ok(BuilderOutcome::Completed(response))
    }

    /// Updates reachable from the roots and the caller, always including
    /// the balance and the nonce of the caller.
    fn updates(&mut self, roots: &[StorageReference]) -> Result<Vec<Update>, BuildError> {
        let caller = self.caller;
        let balance = self.heap.get_balance(caller).map_err(unexpected)?;
        let nonce = self.heap.get_nonce(caller).map_err(unexpected)?;

        let mut roots = roots.to_vec();
        roots.push(caller);
        let mut updates = self.heap.updates(&roots);
        updates.push(Update::field(
            caller,
            FieldSignature::balance(),
            StorageValue::BigInteger(balance),
        ));
        updates.push(Update::field(
            caller,
            FieldSignature::nonce(),
            StorageValue::BigInteger(nonce),
        ));
        Ok(normalize(updates))
    }

    fn is_gas_update(&self, update: &Update) -> bool {
        match update {
            Update::Field { object, field, .. } => {
                *object == self.caller
                    && (*field == FieldSignature::balance() || *field == FieldSignature::nonce())
            }
            Update::ClassTag { .. } => false,
        }
    }
}

fn verify_signature(
    ctx: &BuildContext<'_>,
    request: &TransactionRequest,
    header: &RequestHeader,
) -> Result<(), BuildError> {
    let public_key = match stored_field(ctx.store, header.caller, &FieldSignature::public_key())? {
        Some(StorageValue::String(key)) => key,
        _ => {
            return Err(BuildError::rejected(format!(
                "the caller {} has no public key",
                header.caller
            )))
        }
    };

    let valid = ctx
        .signature
        .verify(&request.signed_bytes()?, &header.signature, &public_key)
        .map_err(|e| BuildError::rejected(format!("invalid request signature: {:#}", e)))?;
    if !valid {
        return Err(BuildError::rejected(format!(
            "invalid request signature ({})",
            ctx.signature.name()
        )));
    }
    Ok(())
}

/// Balance and nonce of the caller. Running out of gas while loading it
/// is a rejection: nothing has been paid yet.
fn caller_account(
    heap: &mut Heap<'_>,
    caller: StorageReference,
) -> Result<(u128, u128), BuildError> {
    let loaded = heap
        .get_balance(caller)
        .and_then(|balance| Ok((balance, heap.get_nonce(caller)?)));
    match loaded {
        Ok(account) => Ok(account),
        Err(ExecutionFault::Thrown(throwable)) => Err(BuildError::rejected(format!(
            "cannot load the caller {}: {}",
            caller, throwable
        ))),
        Err(ExecutionFault::Internal(e)) => Err(BuildError::Internal(e)),
    }
}

/// A fault on an object that was already loaded.
pub(crate) fn unexpected(fault: ExecutionFault) -> BuildError {
    match fault {
        ExecutionFault::Thrown(throwable) => {
            BuildError::Internal(anyhow!("unexpected throwable: {}", throwable))
        }
        ExecutionFault::Internal(e) => BuildError::Internal(e),
    }
}
