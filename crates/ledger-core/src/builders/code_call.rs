//! Builders of constructor and method calls, committed or run as views.

use ledger_sandbox_types::{
    ConstructorCallRequest, ConstructorCallResponse, FailureCause, GasConsumed,
    InstanceMethodCallRequest, MethodCallResponse, MethodSignature, StaticMethodCallRequest,
    StorageReference, StorageValue, TransactionReference, TransactionRequest, TransactionResponse,
    Update,
};

use super::non_initial::{Failure, NonInitialTransaction};
use super::{link, BuildContext, BuildError, BuildResult};
use crate::sandbox::code::Annotations;
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::loader::LoadedClasspath;
use crate::sandbox::throwable::{names, ExecutionFault, ExecutionResult, Throwable};

fn constructor_failed(failure: Failure) -> TransactionResponse {
    TransactionResponse::ConstructorCall(ConstructorCallResponse::Failed {
        updates: failure.updates,
        gas: failure.gas,
        penalty: failure.penalty,
        cause: failure.cause,
    })
}

fn method_failed(failure: Failure) -> TransactionResponse {
    TransactionResponse::MethodCall(MethodCallResponse::Failed {
        updates: failure.updates,
        gas: failure.gas,
        penalty: failure.penalty,
        cause: failure.cause,
    })
}

/// Objects passed as actuals: they are roots of the updates.
fn references_in(actuals: &[StorageValue]) -> Vec<StorageReference> {
    actuals.iter().filter_map(StorageValue::as_reference).collect()
}

pub(crate) fn constructor_call(
    ctx: &BuildContext<'_>,
    reference: TransactionReference,
    request: &TransactionRequest,
    call: &ConstructorCallRequest,
) -> BuildResult {
    let classes = link(ctx, &[call.header.classpath])?;
    let mut transaction = NonInitialTransaction::start(
        ctx,
        reference,
        request,
        &call.header,
        classes,
        0,
        constructor_failed,
        false,
    )?;

    let throws_exceptions = transaction
        .classes()
        .resolve_constructor(&call.constructor)
        .is_some_and(|constructor| constructor.annotations.throws_exceptions);
    let caller = transaction.caller;
    let result = Interpreter::new(
        &mut transaction.heap,
        ctx.store.get_now(),
        ctx.config.max_call_depth,
    )
    .construct(caller, &call.constructor, call.actuals.clone());

    let mut roots = references_in(&call.actuals);
    match result {
        Ok(object) => {
            roots.push(object);
            transaction.complete(&roots, |updates, events, gas| {
                TransactionResponse::ConstructorCall(ConstructorCallResponse::Successful {
                    new_object: object,
                    updates,
                    events,
                    gas,
                })
            })
        }
        Err(fault) => settle_fault(
            transaction,
            fault,
            throws_exceptions,
            &roots,
            |cause, updates, events, gas| {
                TransactionResponse::ConstructorCall(ConstructorCallResponse::Exception {
                    cause,
                    updates,
                    events,
                    gas,
                })
            },
        ),
    }
}

pub(crate) fn instance_method_call(
    ctx: &BuildContext<'_>,
    reference: TransactionReference,
    request: &TransactionRequest,
    call: &InstanceMethodCallRequest,
    view: bool,
) -> BuildResult {
    let classes = link(ctx, &[call.header.classpath])?;
    let mut transaction = NonInitialTransaction::start(
        ctx,
        reference,
        request,
        &call.header,
        classes,
        0,
        method_failed,
        view,
    )?;

    let annotations = declared_annotations(&transaction.classes(), &call.method);
    if let Some(cause) = view_mismatch(view, annotations, &call.method) {
        return Ok(transaction.fail(cause));
    }

    let caller = transaction.caller;
    let result = Interpreter::new(
        &mut transaction.heap,
        ctx.store.get_now(),
        ctx.config.max_call_depth,
    )
    .invoke_instance(caller, &call.method, call.receiver, call.actuals.clone());

    let mut roots = references_in(&call.actuals);
    roots.push(call.receiver);
    settle_method(transaction, result, annotations, roots)
}

pub(crate) fn static_method_call(
    ctx: &BuildContext<'_>,
    reference: TransactionReference,
    request: &TransactionRequest,
    call: &StaticMethodCallRequest,
    view: bool,
) -> BuildResult {
    let classes = link(ctx, &[call.header.classpath])?;
    let mut transaction = NonInitialTransaction::start(
        ctx,
        reference,
        request,
        &call.header,
        classes,
        0,
        method_failed,
        view,
    )?;

    let annotations = declared_annotations(&transaction.classes(), &call.method);
    if let Some(cause) = view_mismatch(view, annotations, &call.method) {
        return Ok(transaction.fail(cause));
    }

    let caller = transaction.caller;
    let result = Interpreter::new(
        &mut transaction.heap,
        ctx.store.get_now(),
        ctx.config.max_call_depth,
    )
    .invoke_static(caller, &call.method, call.actuals.clone());

    settle_method(transaction, result, annotations, references_in(&call.actuals))
}

/// Annotations of the method named by the signature, as declared in its
/// class or inherited there.
fn declared_annotations(
    classes: &LoadedClasspath,
    method: &MethodSignature,
) -> Option<Annotations> {
    classes
        .resolve_method(&method.defining_class, method)
        .map(|(_, def)| def.annotations)
}

/// Only methods annotated as views can run as views.
fn view_mismatch(
    view: bool,
    annotations: Option<Annotations>,
    method: &MethodSignature,
) -> Option<FailureCause> {
    if view && !annotations.is_some_and(|a| a.view) {
        Some(Throwable::error(names::NO_SUCH_METHOD, format!("no view method {}", method)).cause())
    } else {
        None
    }
}

fn settle_method(
    transaction: NonInitialTransaction<'_>,
    result: ExecutionResult<Option<StorageValue>>,
    annotations: Option<Annotations>,
    mut roots: Vec<StorageReference>,
) -> BuildResult {
    let throws_exceptions = annotations.is_some_and(|a| a.throws_exceptions);
    match result {
        Ok(Some(value)) => {
            roots.extend(value.as_reference());
            transaction.complete(&roots, |updates, events, gas| {
                TransactionResponse::MethodCall(MethodCallResponse::Successful {
                    result: value.clone(),
                    updates,
                    events,
                    gas,
                })
            })
        }
        Ok(None) => transaction.complete(&roots, |updates, events, gas| {
            TransactionResponse::MethodCall(MethodCallResponse::VoidSuccessful {
                updates,
                events,
                gas,
            })
        }),
        Err(fault) => settle_fault(
            transaction,
            fault,
            throws_exceptions,
            &roots,
            |cause, updates, events, gas| {
                TransactionResponse::MethodCall(MethodCallResponse::Exception {
                    cause,
                    updates,
                    events,
                    gas,
                })
            },
        ),
    }
}

/// A checked throwable escaping code allowed to throw it is an exception,
/// paid like a success. Anything else is a failure.
fn settle_fault(
    transaction: NonInitialTransaction<'_>,
    fault: ExecutionFault,
    throws_exceptions: bool,
    roots: &[StorageReference],
    exception: impl Fn(
        FailureCause,
        Vec<Update>,
        Vec<StorageReference>,
        GasConsumed,
    ) -> TransactionResponse,
) -> BuildResult {
    match fault {
        ExecutionFault::Thrown(throwable) if throwable.checked && throws_exceptions => {
            let cause = throwable.cause();
            transaction.complete(roots, |updates, events, gas| {
                exception(cause.clone(), updates, events, gas)
            })
        }
        ExecutionFault::Thrown(throwable) => Ok(transaction.fail(throwable.cause())),
        ExecutionFault::Internal(e) => Err(BuildError::Internal(e)),
    }
}
