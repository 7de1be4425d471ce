//! Ed25519 request signatures, end to end.

mod common;

use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};

use common::{counter_unit, CHAIN};
use ledger_sandbox::prelude::*;
use ledger_sandbox::{MemoryBackend, SignatureKind};

fn signed(mut request: TransactionRequest, key: &SigningKey) -> TransactionRequest {
    let signature = key.sign(&request.signed_bytes().unwrap());
    request.set_signature(signature.to_bytes().to_vec());
    request
}

fn node() -> Node<MemoryStore> {
    Node::new(
        NodeConfig::default()
            .with_chain_id(CHAIN)
            .with_signature(SignatureKind::Ed25519),
        MemoryStore::new(MemoryBackend::new()),
    )
    .unwrap()
}

fn public_key(key: &SigningKey) -> String {
    base64::engine::general_purpose::STANDARD.encode(key.verifying_key().as_bytes())
}

#[test]
fn test_signed_requests_are_accepted() {
    let key = SigningKey::from_bytes(&[11u8; 32]);
    let node = node();
    let boot = node
        .bootstrap(10_000_000, public_key(&key), |bytes| {
            key.sign(bytes).to_bytes().to_vec()
        })
        .unwrap();

    let request = TransactionRequest::JarStore(JarStoreRequest {
        header: RequestHeader::new(boot.gamete, 1, CHAIN, 100_000, 1, boot.classpath()),
        jar: counter_unit().to_bytes().unwrap(),
        dependencies: vec![boot.classpath()],
    });
    let (_, response) = node.submit(signed(request, &key)).unwrap();
    assert!(response.cause().is_none());
}

#[test]
fn test_bad_signatures_are_rejected() {
    let key = SigningKey::from_bytes(&[11u8; 32]);
    let intruder = SigningKey::from_bytes(&[12u8; 32]);
    let node = node();
    let boot = node
        .bootstrap(10_000_000, public_key(&key), |bytes| {
            key.sign(bytes).to_bytes().to_vec()
        })
        .unwrap();

    let request = |nonce| {
        TransactionRequest::JarStore(JarStoreRequest {
            header: RequestHeader::new(boot.gamete, nonce, CHAIN, 100_000, 1, boot.classpath()),
            jar: counter_unit().to_bytes().unwrap(),
            dependencies: vec![boot.classpath()],
        })
    };

    // signed by someone else
    let err = node.submit(signed(request(1), &intruder)).unwrap_err();
    assert!(err.is_rejection());

    // unsigned
    let err = node.submit(request(1)).unwrap_err();
    assert!(err.is_rejection());

    // tampered after signing
    let mut tampered = signed(request(1), &key);
    if let TransactionRequest::JarStore(r) = &mut tampered {
        r.header.gas_limit += 1;
    }
    let err = node.submit(tampered).unwrap_err();
    assert!(err.is_rejection());

    // the nonce never moved
    assert!(node.submit(signed(request(1), &key)).is_ok());
}

#[test]
fn test_bootstrap_needs_a_valid_gamete_signature() {
    let key = SigningKey::from_bytes(&[11u8; 32]);
    let node = node();
    let err = node
        .bootstrap(10_000_000, public_key(&key), |_| vec![0u8; 64])
        .unwrap_err();
    assert!(err.is_rejection());
    assert_eq!(node.get_manifest().unwrap(), None);
}
