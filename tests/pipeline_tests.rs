//! Transaction pipeline tests
//!
//! Test coverage areas:
//! - Nonce ordering per caller
//! - Gas conservation for successes, exceptions and failures
//! - Rejections leave no trace in the state
//! - Failures burn the whole gas limit
//! - Classpath limits refuse requests before any gas is spent

mod common;

use std::sync::Arc;

use common::{balance_of, count_of, counter_unit, nonce_of, Ledger, CHAIN};
use ledger_sandbox::prelude::*;
use ledger_sandbox::types::ResponseOutcome;

// =============================================================================
// Nonces
// =============================================================================

#[test]
fn test_nonces_must_match_exactly() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;
    assert_eq!(nonce_of(node, ledger.account), 0);

    node.add_instance_method_call_transaction(ledger.increment(ledger.header(50_000)))
        .unwrap();
    assert_eq!(nonce_of(node, ledger.account), 1);

    // stale and future nonces are rejected, not delayed
    for nonce in [0, 2, 7] {
        let mut header = ledger.header(50_000);
        header.nonce = nonce;
        let err = node
            .add_instance_method_call_transaction(ledger.increment(header))
            .unwrap_err();
        assert!(err.is_rejection(), "nonce {} was not rejected: {}", nonce, err);
    }
    assert_eq!(nonce_of(node, ledger.account), 1);
    assert_eq!(count_of(node, ledger.counter), 1);

    node.add_instance_method_call_transaction(ledger.increment(ledger.header(50_000)))
        .unwrap();
    assert_eq!(nonce_of(node, ledger.account), 2);
    assert_eq!(count_of(node, ledger.counter), 2);
}

#[test]
fn test_failures_advance_the_nonce() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;

    let err = node
        .add_static_method_call_transaction(ledger.static_call("crash", ledger.header(50_000)))
        .unwrap_err();
    assert!(matches!(err, NodeError::Failed { .. }));
    assert_eq!(nonce_of(node, ledger.account), 1);
}

#[test]
fn test_references_are_assigned_in_order() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;
    let first = node.next_reference();

    let mut stale = ledger.header(50_000);
    stale.nonce = 99;
    let _ = node.add_instance_method_call_transaction(ledger.increment(stale));
    let (second, _) = node
        .submit(TransactionRequest::InstanceMethodCall(
            ledger.increment(ledger.header(50_000)),
        ))
        .unwrap();

    // the rejection consumed a reference too
    assert_eq!(second, first.next());
    assert!(node.store().get_error(first).unwrap().is_some());
}

// =============================================================================
// Gas
// =============================================================================

fn assert_conserved(response: &TransactionResponse, gas_limit: u64, paid: u128) {
    let gas = response.gas().unwrap();
    match response.outcome() {
        ResponseOutcome::Failed => {
            assert_eq!(gas.total() + response.penalty().unwrap(), gas_limit);
            assert_eq!(paid, u128::from(gas_limit));
        }
        _ => {
            assert!(response.penalty().is_none());
            assert_eq!(paid, u128::from(gas.total()));
        }
    }
}

#[test]
fn test_gas_is_conserved_for_every_outcome() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;

    let requests = vec![
        TransactionRequest::InstanceMethodCall(ledger.increment(ledger.header(20_000))),
        TransactionRequest::StaticMethodCall(ledger.static_call("risky", ledger.header(30_000))),
        TransactionRequest::StaticMethodCall(ledger.static_call("crash", ledger.header(40_000))),
    ];
    let mut outcomes = Vec::new();
    for (nonce, mut request) in requests.into_iter().enumerate() {
        let gas_limit = match &mut request {
            TransactionRequest::InstanceMethodCall(r) => {
                r.header.nonce = nonce as u128;
                r.header.gas_limit
            }
            TransactionRequest::StaticMethodCall(r) => {
                r.header.nonce = nonce as u128;
                r.header.gas_limit
            }
            _ => unreachable!(),
        };
        let before = balance_of(node, ledger.account);
        let (_, response) = node.submit(request).unwrap();
        let paid = before - balance_of(node, ledger.account);
        assert_conserved(&response, gas_limit, paid);
        outcomes.push(response.outcome());
    }

    assert_eq!(
        outcomes,
        vec![
            ResponseOutcome::Successful,
            ResponseOutcome::Exception,
            ResponseOutcome::Failed
        ]
    );
}

#[test]
fn test_failure_consumes_exactly_the_gas_limit() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;
    assert_eq!(balance_of(node, ledger.account), 1_000_000);

    let err = node
        .add_static_method_call_transaction(ledger.static_call("crash", ledger.header(50_000)))
        .unwrap_err();

    let cause = err.cause().unwrap();
    assert_eq!(cause.class_name, "test.Crash");
    assert_eq!(cause.message, "always fails");
    assert_eq!(balance_of(node, ledger.account), 950_000);

    let response = node.get_response(err.reference().unwrap()).unwrap().unwrap();
    assert!(response.penalty().unwrap() > 0);
}

#[test]
fn test_exception_is_paid_like_a_success() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;

    let err = node
        .add_static_method_call_transaction(ledger.static_call("risky", ledger.header(50_000)))
        .unwrap_err();
    match &err {
        NodeError::Exception { cause, .. } => assert_eq!(cause.class_name, "test.RiskyException"),
        other => panic!("expected an exception, got {}", other),
    }
    assert!(balance_of(node, ledger.account) > 950_000);
    assert_eq!(nonce_of(node, ledger.account), 1);
}

#[test]
fn test_gas_price_scales_the_payment() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;

    let mut header = ledger.header(50_000);
    header.gas_price = 5;
    let before = balance_of(node, ledger.account);
    let (_, response) = node
        .submit(TransactionRequest::InstanceMethodCall(ledger.increment(header)))
        .unwrap();
    let paid = before - balance_of(node, ledger.account);
    assert_eq!(paid, 5 * u128::from(response.gas().unwrap().total()));
}

// =============================================================================
// Rejections
// =============================================================================

type Snapshot = Vec<(Vec<ledger_sandbox::types::Update>, Vec<TransactionReference>)>;

fn snapshot(ledger: &Ledger) -> Snapshot {
    [ledger.boot.gamete, ledger.account, ledger.counter]
        .into_iter()
        .map(|object| {
            (
                ledger.node.get_state(object).unwrap(),
                ledger.node.store().get_history(object).unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_rejection_has_no_side_effects() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;
    let before = snapshot(&ledger);
    let pushes = node.store().metrics().pushes;

    let mut wrong_chain = ledger.header(50_000);
    wrong_chain.chain_id = format!("{}-fork", CHAIN);
    let rejected = [
        ledger.increment(ledger.header(5)),
        ledger.increment(wrong_chain),
        ledger.increment(ledger.header(u64::MAX / 2)),
    ];
    for request in rejected {
        let err = node.add_instance_method_call_transaction(request).unwrap_err();
        assert!(err.is_rejection(), "{}", err);
    }

    assert_eq!(snapshot(&ledger), before);
    assert_eq!(node.store().metrics().pushes, pushes);
    assert_eq!(node.store().metrics().errors_recorded, 3);
}

#[test]
fn test_unknown_caller_is_rejected() {
    let ledger = Ledger::new(1_000_000);
    let mut header = ledger.header(50_000);
    header.caller = StorageReference::new(TransactionReference(9_999), 0);
    let err = ledger
        .node
        .add_instance_method_call_transaction(ledger.increment(header))
        .unwrap_err();
    assert!(err.is_rejection());
}

// =============================================================================
// Classpath limits
// =============================================================================

/// A second node over the ledger's store, with tighter limits.
fn restricted(ledger: &Ledger, config: NodeConfig) -> Node<MemoryStore> {
    Node::with_shared_store(config.with_chain_id(CHAIN), Arc::clone(ledger.node.store())).unwrap()
}

fn assert_rejected_without_effects(node: &Node<MemoryStore>, ledger: &Ledger, err: NodeError) {
    match err {
        NodeError::Rejected(message) => assert!(message.contains("dependencies"), "{}", message),
        other => panic!("expected a rejection, got {}", other),
    }
    assert_eq!(balance_of(node, ledger.account), 1_000_000);
    assert_eq!(nonce_of(node, ledger.account), 0);
    assert_eq!(count_of(node, ledger.counter), 0);
}

#[test]
fn test_too_many_dependencies_is_a_rejection() {
    let ledger = Ledger::new(1_000_000);
    let history = ledger.node.store().get_history(ledger.account).unwrap();
    let node = restricted(&ledger, NodeConfig::default().with_max_dependencies(1));
    let first = node.next_reference();

    // the counter classpath links the base library too: two units
    let err = node
        .add_instance_method_call_transaction(ledger.increment(ledger.header(50_000)))
        .unwrap_err();
    assert_rejected_without_effects(&node, &ledger, err);
    assert_eq!(node.store().get_history(ledger.account).unwrap(), history);
    assert!(node.store().get_error(first).unwrap().is_some());
    assert!(node.get_response(first).unwrap().is_none());
}

#[test]
fn test_installed_unit_counts_against_the_limits() {
    let ledger = Ledger::new(1_000_000);
    let node = restricted(&ledger, NodeConfig::default().with_max_dependencies(1));

    // one unit in the classpath, plus the one being installed
    let mut header = ledger.header(100_000);
    header.classpath = ledger.boot.classpath();
    let err = node
        .add_jar_store_transaction(JarStoreRequest {
            header,
            jar: counter_unit().to_bytes().unwrap(),
            dependencies: vec![ledger.boot.classpath()],
        })
        .unwrap_err();
    assert_rejected_without_effects(&node, &ledger, err);
}

#[test]
fn test_oversized_classpath_is_a_rejection() {
    let ledger = Ledger::new(1_000_000);
    let node = restricted(&ledger, NodeConfig::default().with_max_dependencies_size(10));

    let err = node
        .add_instance_method_call_transaction(ledger.increment(ledger.header(50_000)))
        .unwrap_err();
    assert_rejected_without_effects(&node, &ledger, err);
}
