//! # Response builders
//!
//! One builder per kind of request turns a request into a response, or
//! refuses it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 Non-initial transaction lifecycle                    │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │ Created                                                              │
//! │ - link the classpath, check its limits                               │
//! │ - chain id, caller class, signature                                  │
//! │ CallerValidated                                                      │
//! │ - gas limit >= minimal gas                                           │
//! │ - charge base cost, request storage, classpath loading               │
//! │ - nonce matches, caller can pay gas_limit x gas_price                │
//! │ GasReserved                                                          │
//! │ - balance debited, nonce incremented                                 │
//! │ Executing                                                            │
//! │ - sandboxed code charges CPU and RAM as it runs                      │
//! │ Charged                                                              │
//! │ - success: storage of the response charged, unused gas refunded      │
//! │ - failure: the rest of the gas limit becomes the penalty             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │ Any check before GasReserved refuses the request: Rejected           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Initial requests skip gas altogether and are refused once the node is
//! initialized.

mod code_call;
mod initial;
mod jar_store;
mod non_initial;

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use ledger_sandbox_store::Store;
use ledger_sandbox_types::{
    Classpath, FailureCause, GasConsumed, TransactionReference, TransactionRequest,
    TransactionResponse,
};

use crate::cache::LoaderCache;
use crate::config::NodeConfig;
use crate::crypto::SignatureAlgorithm;
use crate::errors::TransactionRejected;
use crate::gas::GasCostModel;
use crate::sandbox::loader::{ClasspathError, ClasspathLimits, LoadedClasspath};

use non_initial::Failure;

/// What a builder made of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderOutcome {
    /// A successful or exception response, to be pushed.
    Completed(TransactionResponse),
    /// A failed response, to be pushed: the caller paid for it.
    Failed(TransactionResponse),
    /// Nothing happened.
    Rejected(TransactionRejected),
}

impl BuilderOutcome {
    /// The response to push, if any.
    pub fn response(&self) -> Option<&TransactionResponse> {
        match self {
            BuilderOutcome::Completed(response) | BuilderOutcome::Failed(response) => {
                Some(response)
            }
            BuilderOutcome::Rejected(_) => None,
        }
    }
}

/// What builders read.
pub struct BuildContext<'c> {
    pub store: &'c dyn Store,
    pub config: &'c NodeConfig,
    pub classpaths: &'c LoaderCache,
    pub signature: &'c dyn SignatureAlgorithm,
}

impl<'c> BuildContext<'c> {
    pub fn costs(&self) -> &'c GasCostModel {
        &self.config.gas
    }

    pub fn limits(&self) -> ClasspathLimits {
        ClasspathLimits::from_config(self.config)
    }
}

/// Why a builder stopped early.
#[derive(Debug)]
pub(crate) enum BuildError {
    Rejected(TransactionRejected),
    Internal(anyhow::Error),
}

impl BuildError {
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        BuildError::Rejected(TransactionRejected::new(message))
    }
}

impl From<TransactionRejected> for BuildError {
    fn from(e: TransactionRejected) -> Self {
        BuildError::Rejected(e)
    }
}

impl From<ClasspathError> for BuildError {
    fn from(e: ClasspathError) -> Self {
        BuildError::rejected(e.to_string())
    }
}

impl From<anyhow::Error> for BuildError {
    fn from(e: anyhow::Error) -> Self {
        BuildError::Internal(e)
    }
}

type BuildResult = std::result::Result<BuilderOutcome, BuildError>;

/// Builds the response of `request`, executed as transaction `reference`.
///
/// Rejections are returned as [`BuilderOutcome::Rejected`]; `Err` means
/// the store could not be read consistently.
pub fn build_response(
    ctx: &BuildContext<'_>,
    reference: TransactionReference,
    request: &TransactionRequest,
) -> Result<BuilderOutcome> {
    let result = match request {
        TransactionRequest::JarStoreInitial(r) => initial::jar_store_initial(ctx, reference, r),
        TransactionRequest::GameteCreation(r) => initial::gamete_creation(ctx, reference, r),
        TransactionRequest::Initialization(r) => initial::initialization(ctx, r),
        TransactionRequest::JarStore(r) => jar_store::jar_store(ctx, reference, request, r),
        TransactionRequest::ConstructorCall(r) => {
            code_call::constructor_call(ctx, reference, request, r)
        }
        TransactionRequest::InstanceMethodCall(r) => {
            code_call::instance_method_call(ctx, reference, request, r, false)
        }
        TransactionRequest::StaticMethodCall(r) => {
            code_call::static_method_call(ctx, reference, request, r, false)
        }
    };
    settle(reference, request, result)
}

/// Builds the response of a view request. Only method calls can be views.
pub fn build_view(
    ctx: &BuildContext<'_>,
    reference: TransactionReference,
    request: &TransactionRequest,
) -> Result<BuilderOutcome> {
    let result = match request {
        TransactionRequest::InstanceMethodCall(r) => {
            code_call::instance_method_call(ctx, reference, request, r, true)
        }
        TransactionRequest::StaticMethodCall(r) => {
            code_call::static_method_call(ctx, reference, request, r, true)
        }
        other => Err(BuildError::rejected(format!(
            "a {} request cannot be run as a view",
            other.kind()
        ))),
    };
    settle(reference, request, result)
}

fn settle(
    reference: TransactionReference,
    request: &TransactionRequest,
    result: BuildResult,
) -> Result<BuilderOutcome> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(BuildError::Rejected(rejected)) => {
            debug!(
                reference = %reference,
                kind = request.kind(),
                reason = %rejected.message,
                "request rejected"
            );
            Ok(BuilderOutcome::Rejected(rejected))
        }
        Err(BuildError::Internal(e)) => Err(e),
    }
}

// ===== Shared steps =====

/// Links `classpaths` through the loader cache. Classpath problems are
/// rejections.
pub(crate) fn link(
    ctx: &BuildContext<'_>,
    classpaths: &[Classpath],
) -> std::result::Result<Arc<LoadedClasspath>, BuildError> {
    ctx.classpaths
        .get_or_link(ctx.store, classpaths, &ctx.limits())
        .map_err(|e| match e.downcast::<ClasspathError>() {
            Ok(classpath) => classpath.into(),
            Err(e) => BuildError::Internal(e),
        })
}

/// CPU and RAM charged for loading the units of a classpath: the loading
/// cost of every unit plus a response lookup per installing transaction.
pub(crate) fn loader_costs(costs: &GasCostModel, classes: &LoadedClasspath) -> (u64, u64) {
    let mut cpu = 0u64;
    let mut ram = 0u64;
    for length in classes.lengths_of_loaded_units() {
        cpu = cpu.saturating_add(costs.cpu_cost_for_loading_jar(*length));
        ram = ram.saturating_add(costs.ram_cost_for_loading_jar(*length));
    }
    for _ in classes.transactions_of_loaded_units() {
        cpu = cpu.saturating_add(costs.cpu_cost_for_getting_response_at());
    }
    (cpu, ram)
}

/// The least gas limit that lets a request start: the base cost, the
/// storage of the request, the storage of a failed response at that limit,
/// the loading of its classpath and `extra` for kind-specific work.
pub(crate) fn minimal_gas(
    costs: &GasCostModel,
    request: &TransactionRequest,
    gas_limit: u64,
    classes: &LoadedClasspath,
    failed: non_initial::FailedResponse,
    extra: u64,
) -> Result<u64> {
    let placeholder = failed(Failure {
        updates: Vec::new(),
        gas: GasConsumed::new(gas_limit, gas_limit, gas_limit),
        penalty: gas_limit,
        cause: FailureCause::new("placeholder", "placeholder"),
    });
    let (cpu, ram) = loader_costs(costs, classes);
    Ok(costs
        .cpu_base_transaction_cost
        .saturating_add(costs.storage_cost_of_bytes(request.size()?))
        .saturating_add(costs.storage_cost_of_bytes(placeholder.size()?))
        .saturating_add(cpu)
        .saturating_add(ram)
        .saturating_add(extra))
}

#[cfg(test)]
mod tests;
