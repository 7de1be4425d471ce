//! Builder of paid code installations.

use ledger_sandbox_types::{
    JarStoreRequest, JarStoreResponse, TransactionReference, TransactionRequest,
    TransactionResponse,
};

use super::non_initial::{Failure, NonInitialTransaction};
use super::{link, BuildContext, BuildResult};
use crate::sandbox::throwable::{names, Throwable};

fn failed(failure: Failure) -> TransactionResponse {
    TransactionResponse::JarStore(JarStoreResponse::Failed {
        updates: failure.updates,
        gas: failure.gas,
        penalty: failure.penalty,
        cause: failure.cause,
    })
}

pub(crate) fn jar_store(
    ctx: &BuildContext<'_>,
    reference: TransactionReference,
    request: &TransactionRequest,
    jar_store: &JarStoreRequest,
) -> BuildResult {
    let mut classpaths = vec![jar_store.header.classpath];
    classpaths.extend(jar_store.dependencies.iter().copied());
    let classes = link(ctx, &classpaths)?;

    let length = jar_store.jar.len() as u64;
    classes.check_limits(Some(length), &ctx.limits())?;

    let costs = ctx.costs();
    let install_cpu = costs.cpu_cost_for_installing_jar(length);
    let install_ram = costs.ram_cost_for_installing_jar(length);
    let mut transaction = NonInitialTransaction::start(
        ctx,
        reference,
        request,
        &jar_store.header,
        classes.clone(),
        install_cpu.saturating_add(install_ram),
        failed,
        false,
    )?;

    let charged = transaction
        .heap
        .charger_mut()
        .charge_cpu(install_cpu)
        .and_then(|_| transaction.heap.charger_mut().charge_ram(install_ram));
    if let Err(e) = charged {
        return Ok(transaction.fail(Throwable::from(e).cause()));
    }

    if let Err(e) = classes.extended(&jar_store.jar) {
        let cause = Throwable::error(names::VERIFICATION, e.to_string()).cause();
        return Ok(transaction.fail(cause));
    }

    transaction.complete(&[], |updates, _events, gas| {
        TransactionResponse::JarStore(JarStoreResponse::Successful {
            instrumented_jar: jar_store.jar.clone(),
            dependencies: jar_store.dependencies.clone(),
            updates,
            gas,
        })
    })
}
