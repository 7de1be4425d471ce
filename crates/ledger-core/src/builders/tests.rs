//! Builder tests: outcomes are inspected without being pushed.

use super::*;
use crate::node::{Bootstrap, Node};
use crate::sandbox::code::{ClassDef, CodeUnit, ConstructorDef, Instruction::*, MethodDef};
use crate::sandbox::throwable::names;
use ledger_sandbox_store::{MemoryBackend, MemoryStore};
use ledger_sandbox_types::{
    class_names, ConstructorCallRequest, ConstructorSignature, FieldSignature,
    InstanceMethodCallRequest, JarStoreRequest, MethodCallResponse, MethodSignature, RequestHeader,
    StaticMethodCallRequest, StorageReference, StorageType, StorageValue, Update,
};

const CHAIN: &str = "builders";
const FUNDS: u128 = 1_000_000;

fn count() -> FieldSignature {
    FieldSignature::new("test.Counter", "count", StorageType::Int)
}

fn counter_class() -> ClassDef {
    let bump = vec![
        Load(0),
        Load(0),
        GetField(count()),
        Push(StorageValue::Int(1)),
        Add,
        PutField(count()),
        Return,
    ];
    ClassDef::new("test.Counter", Some(class_names::CONTRACT))
        .with_field("count", StorageType::Int)
        .with_constructor(ConstructorDef::new(vec![], vec![Return]))
        .with_method(MethodDef::instance("increment", vec![], None, bump.clone()))
        .with_method(MethodDef::instance("sneaky", vec![], None, bump).view())
        .with_method(
            MethodDef::instance(
                "get",
                vec![],
                Some(StorageType::Int),
                vec![Load(0), GetField(count()), Return],
            )
            .view(),
        )
        .with_method(MethodDef::static_method(
            "crash",
            vec![],
            None,
            vec![
                Push(StorageValue::string("crashed")),
                Throw {
                    class_name: "test.Crash".into(),
                    checked: false,
                },
            ],
        ))
}

struct Fixture {
    node: Node<MemoryStore>,
    boot: Bootstrap,
    classpath: Classpath,
    counter: StorageReference,
}

impl Fixture {
    fn new() -> Self {
        let node = Node::new(
            NodeConfig::default().with_chain_id(CHAIN),
            MemoryStore::new(MemoryBackend::new()),
        )
        .unwrap();
        let boot = node.bootstrap(FUNDS, "", |_| Vec::new()).unwrap();

        let jar = CodeUnit::new(vec![counter_class()]).to_bytes().unwrap();
        let installed = node
            .add_jar_store_transaction(JarStoreRequest {
                header: RequestHeader::new(boot.gamete, 1, CHAIN, 50_000, 1, boot.classpath()),
                jar,
                dependencies: vec![boot.classpath()],
            })
            .unwrap();
        let classpath = Classpath::new(installed, true);

        let counter = node
            .add_constructor_call_transaction(ConstructorCallRequest {
                header: RequestHeader::new(boot.gamete, 2, CHAIN, 50_000, 1, classpath),
                constructor: ConstructorSignature::new("test.Counter", vec![]),
                actuals: vec![],
            })
            .unwrap();

        Self {
            node,
            boot,
            classpath,
            counter,
        }
    }

    fn header(&self, gas_limit: u64) -> RequestHeader {
        RequestHeader::new(self.boot.gamete, 3, CHAIN, gas_limit, 1, self.classpath)
    }

    fn call(
        &self,
        name: &str,
        returns: Option<StorageType>,
        header: RequestHeader,
    ) -> TransactionRequest {
        TransactionRequest::InstanceMethodCall(InstanceMethodCallRequest {
            header,
            method: MethodSignature::new("test.Counter", name, vec![], returns),
            receiver: self.counter,
            actuals: vec![],
        })
    }

    fn build(&self, request: &TransactionRequest) -> BuilderOutcome {
        build_response(&self.node.context(), self.node.next_reference(), request).unwrap()
    }

    fn view(&self, request: &TransactionRequest) -> BuilderOutcome {
        build_view(&self.node.context(), self.node.next_reference(), request).unwrap()
    }

    fn gamete_field(&self, field: FieldSignature) -> u128 {
        self.node
            .get_state(self.boot.gamete)
            .unwrap()
            .into_iter()
            .find_map(|update| match update {
                Update::Field { field: f, value, .. } if f == field => value.as_big_integer(),
                _ => None,
            })
            .unwrap()
    }
}

fn rejection(outcome: BuilderOutcome) -> String {
    match outcome {
        BuilderOutcome::Rejected(rejected) => rejected.message,
        other => panic!("expected a rejection, got {:?}", other),
    }
}

fn caller_updates(response: &TransactionResponse, caller: StorageReference) -> (u128, u128) {
    let mut balance = None;
    let mut nonce = None;
    for update in response.updates_of(caller) {
        if let Update::Field { field, value, .. } = update {
            if *field == FieldSignature::balance() {
                balance = value.as_big_integer();
            } else if *field == FieldSignature::nonce() {
                nonce = value.as_big_integer();
            }
        }
    }
    (balance.unwrap(), nonce.unwrap())
}

#[test]
fn test_wrong_chain_id_is_rejected() {
    let f = Fixture::new();
    let mut header = f.header(50_000);
    header.chain_id = "elsewhere".into();
    let message = rejection(f.build(&f.call("increment", None, header)));
    assert!(message.contains("chain id"));
}

#[test]
fn test_wrong_nonce_is_rejected() {
    let f = Fixture::new();
    for nonce in [2, 4] {
        let mut header = f.header(50_000);
        header.nonce = nonce;
        let message = rejection(f.build(&f.call("increment", None, header)));
        assert!(message.contains("nonce"));
    }
}

#[test]
fn test_gas_below_minimum_is_rejected() {
    let f = Fixture::new();
    let message = rejection(f.build(&f.call("increment", None, f.header(10))));
    assert!(message.contains("not enough gas"));
}

#[test]
fn test_unaffordable_gas_is_rejected() {
    let f = Fixture::new();
    let message = rejection(f.build(&f.call("increment", None, f.header(10 * FUNDS as u64))));
    assert!(message.contains("funds"));
}

#[test]
fn test_caller_must_be_an_account() {
    let f = Fixture::new();
    let mut header = f.header(50_000);
    header.caller = f.boot.manifest;
    let message = rejection(f.build(&f.call("increment", None, header)));
    assert!(message.contains("externally owned account"));
}

#[test]
fn test_unknown_classpath_is_rejected() {
    let f = Fixture::new();
    let mut header = f.header(50_000);
    header.classpath = Classpath::new(TransactionReference(999), false);
    rejection(f.build(&f.call("increment", None, header)));
}

#[test]
fn test_failure_charges_the_whole_gas_limit() {
    let f = Fixture::new();
    let balance = f.gamete_field(FieldSignature::balance());
    let request = TransactionRequest::StaticMethodCall(StaticMethodCallRequest {
        header: f.header(50_000),
        method: MethodSignature::new("test.Counter", "crash", vec![], None),
        actuals: vec![],
    });

    let response = match f.build(&request) {
        BuilderOutcome::Failed(response) => response,
        other => panic!("expected a failure, got {:?}", other),
    };
    assert_eq!(response.cause().unwrap().class_name, "test.Crash");

    let gas = response.gas().unwrap();
    assert_eq!(gas.total() + response.penalty().unwrap(), 50_000);
    assert_eq!(response.updates().unwrap().len(), 2);
    assert_eq!(
        caller_updates(&response, f.boot.gamete),
        (balance - 50_000, 4)
    );
}

#[test]
fn test_success_refunds_unused_gas() {
    let f = Fixture::new();
    let balance = f.gamete_field(FieldSignature::balance());

    let response = match f.build(&f.call("increment", None, f.header(50_000))) {
        BuilderOutcome::Completed(response) => response,
        other => panic!("expected a success, got {:?}", other),
    };
    let gas = response.gas().unwrap();
    assert!(gas.cpu > 0 && gas.ram > 0 && gas.storage > 0);

    let (new_balance, nonce) = caller_updates(&response, f.boot.gamete);
    assert_eq!(nonce, 4);
    assert_eq!(new_balance, balance - u128::from(gas.total()));
    assert!(response
        .updates_of(f.counter)
        .any(|u| matches!(u, Update::Field { value: StorageValue::Int(1), .. })));
}

#[test]
fn test_unused_gas_is_refunded_at_gas_price() {
    let f = Fixture::new();
    let balance = f.gamete_field(FieldSignature::balance());
    let mut header = f.header(10_000);
    header.gas_price = 3;

    let response = f.build(&f.call("increment", None, header)).response().cloned().unwrap();
    let gas = response.gas().unwrap();
    let (new_balance, _) = caller_updates(&response, f.boot.gamete);
    assert_eq!(new_balance, balance - 3 * u128::from(gas.total()));
}

#[test]
fn test_view_returns_without_touching_nonce() {
    let f = Fixture::new();
    let response = match f.view(&f.call("get", Some(StorageType::Int), f.header(50_000))) {
        BuilderOutcome::Completed(response) => response,
        other => panic!("expected a success, got {:?}", other),
    };
    assert!(matches!(
        response,
        TransactionResponse::MethodCall(MethodCallResponse::Successful {
            result: StorageValue::Int(0),
            ..
        })
    ));
    let (_, nonce) = caller_updates(&response, f.boot.gamete);
    assert_eq!(nonce, 3);
}

#[test]
fn test_view_ignores_nonce() {
    let f = Fixture::new();
    let mut header = f.header(50_000);
    header.nonce = 77;
    assert!(matches!(
        f.view(&f.call("get", Some(StorageType::Int), header)),
        BuilderOutcome::Completed(_)
    ));
}

#[test]
fn test_view_with_side_effects_fails() {
    let f = Fixture::new();
    let response = match f.view(&f.call("sneaky", None, f.header(50_000))) {
        BuilderOutcome::Failed(response) => response,
        other => panic!("expected a failure, got {:?}", other),
    };
    assert_eq!(response.cause().unwrap().class_name, names::SIDE_EFFECTS_IN_VIEW);
}

#[test]
fn test_view_of_non_view_method_fails() {
    let f = Fixture::new();
    let response = match f.view(&f.call("increment", None, f.header(50_000))) {
        BuilderOutcome::Failed(response) => response,
        other => panic!("expected a failure, got {:?}", other),
    };
    assert_eq!(response.cause().unwrap().class_name, names::NO_SUCH_METHOD);
}

#[test]
fn test_only_method_calls_run_as_views() {
    let f = Fixture::new();
    let request = TransactionRequest::JarStore(JarStoreRequest {
        header: f.header(50_000),
        jar: vec![],
        dependencies: vec![],
    });
    rejection(f.view(&request));
}

#[test]
fn test_undecodable_jar_fails_verification() {
    let f = Fixture::new();
    let request = TransactionRequest::JarStore(JarStoreRequest {
        header: f.header(50_000),
        jar: vec![0xff; 16],
        dependencies: vec![f.boot.classpath()],
    });
    let response = match f.build(&request) {
        BuilderOutcome::Failed(response) => response,
        other => panic!("expected a failure, got {:?}", other),
    };
    assert_eq!(response.cause().unwrap().class_name, names::VERIFICATION);
    assert_eq!(
        response.gas().unwrap().total() + response.penalty().unwrap(),
        50_000
    );
}

#[test]
fn test_jar_store_needs_installation_gas() {
    let f = Fixture::new();
    let jar = CodeUnit::new(vec![ClassDef::new("test.Empty", Some(class_names::STORAGE))])
        .to_bytes()
        .unwrap();
    let classes = link(&f.node.context(), &[f.boot.classpath(), f.boot.classpath()]).unwrap();
    let costs = f.node.config().gas.clone();
    let request = TransactionRequest::JarStore(JarStoreRequest {
        header: f.header(50_000),
        jar: jar.clone(),
        dependencies: vec![f.boot.classpath()],
    });
    let length = jar.len() as u64;
    let extra =
        costs.cpu_cost_for_installing_jar(length) + costs.ram_cost_for_installing_jar(length);
    let with_install =
        minimal_gas(&costs, &request, 50_000, &classes, jar_store_failed, extra).unwrap();
    let without = minimal_gas(&costs, &request, 50_000, &classes, jar_store_failed, 0).unwrap();
    assert_eq!(with_install, without + extra);
}

fn jar_store_failed(failure: Failure) -> TransactionResponse {
    TransactionResponse::JarStore(ledger_sandbox_types::JarStoreResponse::Failed {
        updates: failure.updates,
        gas: failure.gas,
        penalty: failure.penalty,
        cause: failure.cause,
    })
}

#[test]
fn test_initial_requests_rejected_once_initialized() {
    let f = Fixture::new();
    let request = TransactionRequest::GameteCreation(ledger_sandbox_types::GameteCreationRequest {
        classpath: f.boot.classpath(),
        initial_amount: 5,
        public_key: String::new(),
    });
    let message = rejection(f.build(&request));
    assert!(message.contains("already initialized"));
}
