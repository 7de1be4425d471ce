//! View call tests
//!
//! Views run like method calls on the current state but are never pushed:
//! no nonce advance, no reference consumed, no history change.

mod common;

use common::{balance_of, count_of, nonce_of, Ledger};
use ledger_sandbox::prelude::*;

#[test]
fn test_view_and_committed_call_agree() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;
    node.add_instance_method_call_transaction(ledger.increment(ledger.header(50_000)))
        .unwrap();

    let next = node.next_reference();
    let history = node.store().get_history(ledger.account).unwrap();
    let balance = balance_of(node, ledger.account);

    let viewed = node
        .run_instance_method_call_transaction(ledger.get(ledger.header(50_000)))
        .unwrap();
    assert_eq!(viewed, Some(StorageValue::Int(1)));
    assert_eq!(node.next_reference(), next);
    assert_eq!(nonce_of(node, ledger.account), 1);
    assert_eq!(balance_of(node, ledger.account), balance);
    assert_eq!(node.store().get_history(ledger.account).unwrap(), history);

    let committed = node
        .add_instance_method_call_transaction(ledger.get(ledger.header(50_000)))
        .unwrap();
    assert_eq!(committed, viewed);
    assert_eq!(node.next_reference(), next.next());
    assert_eq!(nonce_of(node, ledger.account), 2);
    assert!(balance_of(node, ledger.account) < balance);
}

#[test]
fn test_views_cannot_run_mutating_methods() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;

    let err = node
        .run_instance_method_call_transaction(ledger.increment(ledger.header(50_000)))
        .unwrap_err();
    assert!(matches!(err, NodeError::Failed { .. }));
    assert_eq!(count_of(node, ledger.counter), 0);
    assert_eq!(nonce_of(node, ledger.account), 0);
}

#[test]
fn test_view_gas_is_capped() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;

    // more than the account could pay, but views only reserve the cap
    let header = ledger.header(node.config().max_gas_per_view * 10);
    let viewed = node
        .run_instance_method_call_transaction(ledger.get(header))
        .unwrap();
    assert_eq!(viewed, Some(StorageValue::Int(0)));
}

#[test]
fn test_parallel_views_see_the_same_state() {
    let ledger = Ledger::new(1_000_000);
    let node = &ledger.node;
    for _ in 0..3 {
        node.add_instance_method_call_transaction(ledger.increment(ledger.header(50_000)))
            .unwrap();
    }

    let views: Vec<ViewRequest> = (0..32)
        .map(|i| {
            if i % 2 == 0 {
                ViewRequest::Instance(ledger.get(ledger.header(50_000)))
            } else {
                ViewRequest::Instance(InstanceMethodCallRequest {
                    header: ledger.header(50_000),
                    method: MethodSignature::new(
                        ledger_sandbox::types::class_names::CONTRACT,
                        "balance",
                        vec![],
                        Some(StorageType::BigInteger),
                    ),
                    receiver: ledger.counter,
                    actuals: vec![],
                })
            }
        })
        .collect();

    let results = node.run_views_in_parallel(views);
    assert_eq!(results.len(), 32);
    for (i, result) in results.into_iter().enumerate() {
        let expected = if i % 2 == 0 {
            StorageValue::Int(3)
        } else {
            StorageValue::BigInteger(0)
        };
        assert_eq!(result.unwrap(), Some(expected));
    }
    assert_eq!(nonce_of(node, ledger.account), 3);
}
