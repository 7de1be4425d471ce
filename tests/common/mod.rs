#![allow(dead_code)]
//! Shared test utilities for integration tests.
//!
//! - [`Ledger`]: a bootstrapped in-memory node with a funded account and a
//!   counter contract
//! - [`counter_unit`]: the test code unit
//! - state readers ([`balance_of`], [`nonce_of`])

use ledger_sandbox::engine::{ClassDef, CodeUnit, ConstructorDef, Instruction::*, MethodDef};
use ledger_sandbox::prelude::*;
use ledger_sandbox::types::{class_names, FieldSignature, Update};
use ledger_sandbox::{Bootstrap, MemoryBackend, Store};

pub const CHAIN: &str = "integration";
pub const COUNTER: &str = "test.Counter";

pub fn count_field() -> FieldSignature {
    FieldSignature::new(COUNTER, "count", StorageType::Int)
}

/// A contract with a counter, a view of it and methods that throw.
pub fn counter_unit() -> CodeUnit {
    let counter = ClassDef::new(COUNTER, Some(class_names::CONTRACT))
        .with_field("count", StorageType::Int)
        .with_constructor(ConstructorDef::new(vec![], vec![Return]))
        .with_method(MethodDef::instance(
            "increment",
            vec![],
            None,
            vec![
                Load(0),
                Load(0),
                GetField(count_field()),
                Push(StorageValue::Int(1)),
                Add,
                PutField(count_field()),
                Return,
            ],
        ))
        .with_method(
            MethodDef::instance(
                "get",
                vec![],
                Some(StorageType::Int),
                vec![Load(0), GetField(count_field()), Return],
            )
            .view(),
        )
        .with_method(MethodDef::static_method(
            "crash",
            vec![],
            None,
            vec![
                Push(StorageValue::string("always fails")),
                Throw {
                    class_name: "test.Crash".into(),
                    checked: false,
                },
            ],
        ))
        .with_method(
            MethodDef::static_method(
                "risky",
                vec![],
                None,
                vec![
                    Push(StorageValue::string("declared")),
                    Throw {
                        class_name: "test.RiskyException".into(),
                        checked: true,
                    },
                ],
            )
            .throws_exceptions(),
        );
    CodeUnit::new(vec![counter])
}

fn field_of<S: Store>(
    node: &Node<S>,
    object: StorageReference,
    field: &FieldSignature,
) -> Option<StorageValue> {
    node.get_state(object)
        .unwrap()
        .into_iter()
        .find_map(|update| match update {
            Update::Field { field: f, value, .. } if &f == field => Some(value),
            _ => None,
        })
}

pub fn balance_of<S: Store>(node: &Node<S>, object: StorageReference) -> u128 {
    field_of(node, object, &FieldSignature::balance())
        .and_then(|value| value.as_big_integer())
        .unwrap()
}

pub fn nonce_of<S: Store>(node: &Node<S>, object: StorageReference) -> u128 {
    field_of(node, object, &FieldSignature::nonce())
        .and_then(|value| value.as_big_integer())
        .unwrap()
}

pub fn count_of<S: Store>(node: &Node<S>, counter: StorageReference) -> i64 {
    field_of(node, counter, &count_field())
        .and_then(|value| value.as_int())
        .unwrap()
}

/// A node with the base library, an account holding exactly
/// `account_funds` and a counter created by the gamete.
pub struct Ledger {
    pub node: Node<MemoryStore>,
    pub boot: Bootstrap,
    /// Classpath of the counter unit.
    pub classpath: Classpath,
    pub account: StorageReference,
    pub counter: StorageReference,
}

impl Ledger {
    pub fn new(account_funds: u128) -> Self {
        let node = Node::new(
            NodeConfig::default().with_chain_id(CHAIN),
            MemoryStore::new(MemoryBackend::new()),
        )
        .unwrap();
        let boot = node
            .bootstrap(100 * account_funds.max(1_000_000), "", |_| Vec::new())
            .unwrap();

        let installed = node
            .add_jar_store_transaction(JarStoreRequest {
                header: RequestHeader::new(boot.gamete, 1, CHAIN, 100_000, 1, boot.classpath()),
                jar: counter_unit().to_bytes().unwrap(),
                dependencies: vec![boot.classpath()],
            })
            .unwrap();
        let classpath = Classpath::new(installed, true);

        let account = node
            .add_constructor_call_transaction(ConstructorCallRequest {
                header: RequestHeader::new(boot.gamete, 2, CHAIN, 100_000, 1, classpath),
                constructor: ConstructorSignature::new(
                    class_names::EXTERNALLY_OWNED_ACCOUNT,
                    vec![StorageType::BigInteger, StorageType::String],
                ),
                actuals: vec![StorageValue::BigInteger(account_funds), StorageValue::string("")],
            })
            .unwrap();

        let counter = node
            .add_constructor_call_transaction(ConstructorCallRequest {
                header: RequestHeader::new(boot.gamete, 3, CHAIN, 100_000, 1, classpath),
                constructor: ConstructorSignature::new(COUNTER, vec![]),
                actuals: vec![],
            })
            .unwrap();

        Self {
            node,
            boot,
            classpath,
            account,
            counter,
        }
    }

    /// A header for the account, at its current nonce.
    pub fn header(&self, gas_limit: u64) -> RequestHeader {
        RequestHeader::new(
            self.account,
            nonce_of(&self.node, self.account),
            CHAIN,
            gas_limit,
            1,
            self.classpath,
        )
    }

    pub fn increment(&self, header: RequestHeader) -> InstanceMethodCallRequest {
        InstanceMethodCallRequest {
            header,
            method: MethodSignature::new(COUNTER, "increment", vec![], None),
            receiver: self.counter,
            actuals: vec![],
        }
    }

    pub fn get(&self, header: RequestHeader) -> InstanceMethodCallRequest {
        InstanceMethodCallRequest {
            header,
            method: MethodSignature::new(COUNTER, "get", vec![], Some(StorageType::Int)),
            receiver: self.counter,
            actuals: vec![],
        }
    }

    pub fn static_call(&self, name: &str, header: RequestHeader) -> StaticMethodCallRequest {
        StaticMethodCallRequest {
            header,
            method: MethodSignature::new(COUNTER, name, vec![], None),
            actuals: vec![],
        }
    }
}
