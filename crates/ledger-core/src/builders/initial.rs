//! Builders of the initial requests, which bootstrap a node.
//!
//! They are free: nothing is charged and no events are emitted. All of them
//! are refused once the node has a manifest.

use ledger_sandbox_types::{
    class_names, FieldSignature, GameteCreationRequest, GameteCreationResponse,
    InitializationRequest, JarStoreInitialRequest, JarStoreInitialResponse, StorageReference,
    StorageValue, TransactionReference, TransactionResponse, Update,
};
use tracing::info;

use super::{link, BuildContext, BuildError, BuildResult, BuilderOutcome};
use crate::gas::GasCharger;
use crate::sandbox::heap::{stored_class_tag, Heap, ObjectCapabilities};
use crate::sandbox::throwable::ExecutionFault;

fn reject_if_initialized(ctx: &BuildContext<'_>) -> Result<(), BuildError> {
    if let Some(manifest) = ctx.store.get_manifest_uncommitted()? {
        return Err(BuildError::rejected(format!(
            "cannot run an initial transaction: the node is already initialized with manifest {}",
            manifest
        )));
    }
    Ok(())
}

/// Installs a code unit without paying for it.
pub(crate) fn jar_store_initial(
    ctx: &BuildContext<'_>,
    reference: TransactionReference,
    request: &JarStoreInitialRequest,
) -> BuildResult {
    reject_if_initialized(ctx)?;
    let classes = link(ctx, &request.dependencies)?;
    classes.check_limits(Some(request.jar.len() as u64), &ctx.limits())?;
    let installed = classes.extended(&request.jar)?;

    info!(
        reference = %reference,
        bytes = request.jar.len(),
        units = installed.lengths_of_loaded_units().len(),
        "installed initial jar"
    );
    Ok(BuilderOutcome::Completed(TransactionResponse::JarStoreInitial(
        JarStoreInitialResponse {
            instrumented_jar: request.jar.clone(),
            dependencies: request.dependencies.clone(),
        },
    )))
}

/// Creates the gamete: the account holding every coin at the start.
pub(crate) fn gamete_creation(
    ctx: &BuildContext<'_>,
    reference: TransactionReference,
    request: &GameteCreationRequest,
) -> BuildResult {
    reject_if_initialized(ctx)?;
    let classes = link(ctx, &[request.classpath])?;
    if !classes.contains(class_names::GAMETE) {
        return Err(BuildError::rejected(format!(
            "class {} is not in the classpath",
            class_names::GAMETE
        )));
    }

    let mut heap = Heap::new(
        ctx.store,
        classes,
        ctx.costs(),
        GasCharger::unmetered(),
        reference,
    );
    let gamete = create_gamete(&mut heap, request).map_err(|fault| match fault {
        ExecutionFault::Thrown(throwable) => {
            BuildError::rejected(format!("cannot create the gamete: {}", throwable))
        }
        ExecutionFault::Internal(e) => BuildError::Internal(e),
    })?;

    info!(
        reference = %reference,
        gamete = %gamete,
        amount = %request.initial_amount,
        "created gamete"
    );
    Ok(BuilderOutcome::Completed(TransactionResponse::GameteCreation(
        GameteCreationResponse {
            updates: heap.updates(&[gamete]),
            gamete,
        },
    )))
}

fn create_gamete(
    heap: &mut Heap<'_>,
    request: &GameteCreationRequest,
) -> Result<StorageReference, ExecutionFault> {
    let gamete = heap.allocate(class_names::GAMETE)?;
    heap.set_balance(gamete, request.initial_amount)?;
    heap.set_nonce(gamete, 0)?;
    heap.set_field(
        gamete,
        &FieldSignature::public_key(),
        StorageValue::string(request.public_key.clone()),
    )?;
    Ok(gamete)
}

/// Marks the node as initialized, with the given manifest.
pub(crate) fn initialization(
    ctx: &BuildContext<'_>,
    request: &InitializationRequest,
) -> BuildResult {
    reject_if_initialized(ctx)?;
    let classes = link(ctx, &[request.classpath])?;

    match stored_class_tag(ctx.store, request.manifest)? {
        Some(Update::ClassTag { class_name, .. })
            if classes.is_subclass_of(&class_name, class_names::MANIFEST) =>
        {
            Ok(BuilderOutcome::Completed(TransactionResponse::Initialization))
        }
        Some(_) => Err(BuildError::rejected(format!(
            "{} is not a {}",
            request.manifest,
            class_names::MANIFEST
        ))),
        None => Err(BuildError::rejected(format!(
            "unknown manifest {}",
            request.manifest
        ))),
    }
}
