//! The `lang` base library.
//!
//! Every node starts by installing this unit with an initial jar-store
//! transaction. The engine relies on its classes by name
//! ([`class_names`]): contracts hold a balance, externally owned accounts a
//! nonce and a public key, and the manifest the chain identifier.

use ledger_sandbox_types::{class_names, FieldSignature, StorageType};

use super::code::{ClassDef, CodeUnit, ConstructorDef, Instruction, MethodDef};

/// Builds the base library unit.
pub fn base_code_unit() -> CodeUnit {
    use Instruction::*;

    let storage = ClassDef::new(class_names::STORAGE, None)
        .with_constructor(ConstructorDef::new(vec![], vec![Return]));

    let contract = ClassDef::new(class_names::CONTRACT, Some(class_names::STORAGE))
        .with_field("balance", StorageType::BigInteger)
        .with_constructor(ConstructorDef::new(vec![], vec![Return]))
        .with_method(
            MethodDef::instance("receive", vec![StorageType::BigInteger], None, vec![Return])
                .payable(),
        )
        .with_method(
            MethodDef::instance(
                "balance",
                vec![],
                Some(StorageType::BigInteger),
                vec![Load(0), GetField(FieldSignature::balance()), Return],
            )
            .view(),
        );

    // (amount, publicKey): funded by the creating contract
    let account = ClassDef::new(
        class_names::EXTERNALLY_OWNED_ACCOUNT,
        Some(class_names::CONTRACT),
    )
    .with_field("nonce", StorageType::BigInteger)
    .with_field("publicKey", StorageType::String)
    .with_constructor(
        ConstructorDef::new(
            vec![StorageType::BigInteger, StorageType::String],
            vec![Load(0), Load(2), PutField(FieldSignature::public_key()), Return],
        )
        .payable(),
    )
    .with_method(
        MethodDef::instance(
            "nonce",
            vec![],
            Some(StorageType::BigInteger),
            vec![Load(0), GetField(FieldSignature::nonce()), Return],
        )
        .view(),
    )
    .with_method(
        MethodDef::instance(
            "publicKey",
            vec![],
            Some(StorageType::String),
            vec![Load(0), GetField(FieldSignature::public_key()), Return],
        )
        .view(),
    );

    let gamete = ClassDef::new(
        class_names::GAMETE,
        Some(class_names::EXTERNALLY_OWNED_ACCOUNT),
    );

    let event = ClassDef::new(class_names::EVENT, Some(class_names::STORAGE))
        .with_constructor(ConstructorDef::new(vec![], vec![Return]));

    let manifest = ClassDef::new(class_names::MANIFEST, Some(class_names::STORAGE))
        .with_field("chainId", StorageType::String)
        .with_constructor(ConstructorDef::new(
            vec![StorageType::String],
            vec![Load(0), Load(1), PutField(FieldSignature::chain_id()), Return],
        ))
        .with_method(
            MethodDef::instance(
                "getChainId",
                vec![],
                Some(StorageType::String),
                vec![Load(0), GetField(FieldSignature::chain_id()), Return],
            )
            .view(),
        );

    CodeUnit::new(vec![storage, contract, account, gamete, event, manifest])
}
