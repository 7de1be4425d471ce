//! The node: assigns references, runs builders and pushes their responses.
//!
//! ```text
//! request ──► next reference ──► builder ──┬─► Completed / Failed ──► push ──► commit
//!                                          └─► Rejected ──────────► push_error
//! ```
//!
//! Reference assignment, building and pushing happen under one mutex, so
//! transactions are applied in the order their references were assigned.
//! Views take the next reference without claiming it and are never pushed.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, error, info};

use ledger_sandbox_store::Store;
use ledger_sandbox_types::{
    class_names, Classpath, ConstructorCallRequest, ConstructorCallResponse, ConstructorSignature,
    GameteCreationRequest, GameteCreationResponse, InitializationRequest,
    InstanceMethodCallRequest, JarStoreInitialRequest, JarStoreRequest, JarStoreResponse,
    MethodCallResponse, RequestHeader, StaticMethodCallRequest, StorageReference, StorageType,
    StorageValue, TransactionReference, TransactionRequest, TransactionResponse, Update,
};

use crate::builders::{build_response, build_view, BuildContext, BuilderOutcome};
use crate::cache::LoaderCache;
use crate::config::NodeConfig;
use crate::crypto::SignatureAlgorithm;
use crate::errors::NodeError;
use crate::sandbox::heap::{stored_class_tag, stored_state};
use crate::sandbox::lang::base_code_unit;

/// Gas limit of the manifest creation run by [`Node::bootstrap`].
pub const BOOTSTRAP_GAS_LIMIT: u64 = 100_000;

/// A view call, for [`Node::run_views_in_parallel`].
#[derive(Debug, Clone)]
pub enum ViewRequest {
    Instance(InstanceMethodCallRequest),
    Static(StaticMethodCallRequest),
}

impl From<ViewRequest> for TransactionRequest {
    fn from(view: ViewRequest) -> Self {
        match view {
            ViewRequest::Instance(r) => TransactionRequest::InstanceMethodCall(r),
            ViewRequest::Static(r) => TransactionRequest::StaticMethodCall(r),
        }
    }
}

/// What [`Node::bootstrap`] created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bootstrap {
    /// The transaction that installed the `lang` base library.
    pub base: TransactionReference,
    pub gamete: StorageReference,
    pub manifest: StorageReference,
}

impl Bootstrap {
    /// Classpath of the base library.
    pub fn classpath(&self) -> Classpath {
        Classpath::new(self.base, true)
    }
}

/// A node executing transactions over a store.
pub struct Node<S: Store> {
    config: NodeConfig,
    store: Arc<S>,
    signature: Box<dyn SignatureAlgorithm>,
    classpaths: LoaderCache,
    /// The reference the next transaction gets. Held while a transaction
    /// is built and pushed.
    next_reference: Mutex<TransactionReference>,
}

impl<S: Store> Node<S> {
    /// Create a node over `store`, resuming after its last reference.
    pub fn new(config: NodeConfig, store: S) -> Result<Self> {
        Self::with_shared_store(config, Arc::new(store))
    }

    pub fn with_shared_store(config: NodeConfig, store: Arc<S>) -> Result<Self> {
        let next = store
            .last_reference()?
            .map(TransactionReference::next)
            .unwrap_or(TransactionReference::FIRST);
        info!(
            chain_id = %config.chain_id,
            next_reference = %next,
            signature = config.signature.algorithm().name(),
            "node started"
        );
        Ok(Self {
            signature: config.signature.algorithm(),
            classpaths: LoaderCache::new(config.loader_cache_size),
            next_reference: Mutex::new(next),
            store,
            config,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub(crate) fn context(&self) -> BuildContext<'_> {
        BuildContext {
            store: self.store.as_ref(),
            config: &self.config,
            classpaths: &self.classpaths,
            signature: self.signature.as_ref(),
        }
    }

    // ===== Committing transactions =====

    /// Executes `request` as the next transaction.
    ///
    /// Returns the pushed response, successful or not. Only rejections and
    /// internal faults are errors here; the `add_*` methods below also turn
    /// failures and exceptions into errors.
    pub fn submit(
        &self,
        request: TransactionRequest,
    ) -> Result<(TransactionReference, TransactionResponse), NodeError> {
        let mut next = self.next_reference.lock();
        let reference = *next;

        let outcome = build_response(&self.context(), reference, &request).map_err(internal)?;
        match outcome {
            BuilderOutcome::Rejected(rejected) => {
                self.store
                    .push_error(reference, &request, &rejected.message)
                    .map_err(internal)?;
                *next = reference.next();
                self.auto_commit()?;
                Err(rejected.into())
            }
            BuilderOutcome::Completed(response) | BuilderOutcome::Failed(response) => {
                self.store
                    .push(reference, &request, &response)
                    .map_err(internal)?;
                *next = reference.next();
                self.auto_commit()?;
                debug!(
                    reference = %reference,
                    kind = request.kind(),
                    outcome = ?response.outcome(),
                    "transaction pushed"
                );
                Ok((reference, response))
            }
        }
    }

    fn auto_commit(&self) -> Result<(), NodeError> {
        if self.config.auto_commit {
            self.store.commit().map_err(internal)?;
        }
        Ok(())
    }

    /// Makes every pushed transaction durable.
    pub fn commit(&self) -> Result<()> {
        self.store.commit()
    }

    pub fn add_jar_store_initial_transaction(
        &self,
        request: JarStoreInitialRequest,
    ) -> Result<TransactionReference, NodeError> {
        let (reference, _) = self.submit(TransactionRequest::JarStoreInitial(request))?;
        Ok(reference)
    }

    /// Returns the new gamete.
    pub fn add_gamete_creation_transaction(
        &self,
        request: GameteCreationRequest,
    ) -> Result<StorageReference, NodeError> {
        match self.submit(TransactionRequest::GameteCreation(request))? {
            (_, TransactionResponse::GameteCreation(GameteCreationResponse { gamete, .. })) => {
                Ok(gamete)
            }
            (reference, other) => Err(unexpected_response(reference, &other)),
        }
    }

    pub fn add_initialization_transaction(
        &self,
        request: InitializationRequest,
    ) -> Result<(), NodeError> {
        self.submit(TransactionRequest::Initialization(request))?;
        Ok(())
    }

    /// Installs a code unit. Returns the transaction to use in classpaths.
    pub fn add_jar_store_transaction(
        &self,
        request: JarStoreRequest,
    ) -> Result<TransactionReference, NodeError> {
        match self.submit(TransactionRequest::JarStore(request))? {
            (reference, TransactionResponse::JarStore(JarStoreResponse::Successful { .. })) => {
                Ok(reference)
            }
            (reference, TransactionResponse::JarStore(JarStoreResponse::Failed { cause, .. })) => {
                Err(NodeError::Failed { reference, cause })
            }
            (reference, other) => Err(unexpected_response(reference, &other)),
        }
    }

    /// Creates an object. Returns the new object.
    pub fn add_constructor_call_transaction(
        &self,
        request: ConstructorCallRequest,
    ) -> Result<StorageReference, NodeError> {
        let (reference, response) = self.submit(TransactionRequest::ConstructorCall(request))?;
        match response {
            TransactionResponse::ConstructorCall(ConstructorCallResponse::Successful {
                new_object,
                ..
            }) => Ok(new_object),
            TransactionResponse::ConstructorCall(ConstructorCallResponse::Exception {
                cause,
                ..
            }) => Err(NodeError::Exception { reference, cause }),
            TransactionResponse::ConstructorCall(ConstructorCallResponse::Failed {
                cause, ..
            }) => Err(NodeError::Failed { reference, cause }),
            other => Err(unexpected_response(reference, &other)),
        }
    }

    /// Calls an instance method. Returns its result, `None` for void methods.
    pub fn add_instance_method_call_transaction(
        &self,
        request: InstanceMethodCallRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        let (reference, response) = self.submit(TransactionRequest::InstanceMethodCall(request))?;
        method_result(reference, response)
    }

    pub fn add_static_method_call_transaction(
        &self,
        request: StaticMethodCallRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        let (reference, response) = self.submit(TransactionRequest::StaticMethodCall(request))?;
        method_result(reference, response)
    }

    // ===== Views =====

    /// Runs a view instance method. Nothing is pushed and no reference is
    /// consumed.
    pub fn run_instance_method_call_transaction(
        &self,
        request: InstanceMethodCallRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        self.run_view(TransactionRequest::InstanceMethodCall(request))
    }

    pub fn run_static_method_call_transaction(
        &self,
        request: StaticMethodCallRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        self.run_view(TransactionRequest::StaticMethodCall(request))
    }

    /// Runs a batch of views on the rayon thread pool. Results are in the
    /// order of `views`.
    ///
    /// Each view reads the next reference under the commit mutex, so views
    /// wait for a transaction being built or pushed, then run concurrently.
    pub fn run_views_in_parallel(
        &self,
        views: Vec<ViewRequest>,
    ) -> Vec<Result<Option<StorageValue>, NodeError>> {
        debug!(views = views.len(), "running views in parallel");
        views
            .into_par_iter()
            .map(|view| self.run_view(view.into()))
            .collect()
    }

    fn run_view(&self, request: TransactionRequest) -> Result<Option<StorageValue>, NodeError> {
        // waits for an in-flight `submit`; the lock is released right away
        let reference = *self.next_reference.lock();
        match build_view(&self.context(), reference, &request).map_err(internal)? {
            BuilderOutcome::Rejected(rejected) => Err(rejected.into()),
            BuilderOutcome::Completed(response) | BuilderOutcome::Failed(response) => {
                method_result(reference, response)
            }
        }
    }

    // ===== Consensus =====

    /// Applies a transaction delivered again by a consensus engine. A
    /// reference already in store gets its response replaced; a new one is
    /// pushed and moves the counter past it.
    pub fn redeliver(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<(), NodeError> {
        let mut next = self.next_reference.lock();
        let known = self
            .store
            .get_response_uncommitted(reference)
            .map_err(internal)?
            .is_some();
        if known {
            self.store
                .replace(reference, request, response)
                .map_err(internal)?;
        } else {
            self.store
                .push(reference, request, response)
                .map_err(internal)?;
            if reference >= *next {
                *next = reference.next();
            }
        }
        // replaced responses may carry different code
        self.classpaths.clear();
        self.auto_commit()?;
        info!(reference = %reference, replaced = known, "transaction redelivered");
        Ok(())
    }

    // ===== Accessors =====

    pub fn get_request(
        &self,
        reference: TransactionReference,
    ) -> Result<Option<TransactionRequest>> {
        self.store.get_request(reference)
    }

    /// The response of a transaction, pending ones included.
    pub fn get_response(
        &self,
        reference: TransactionReference,
    ) -> Result<Option<TransactionResponse>> {
        self.store.get_response_uncommitted(reference)
    }

    pub fn get_manifest(&self) -> Result<Option<StorageReference>> {
        self.store.get_manifest()
    }

    /// The class tag and the latest value of each field of an object,
    /// rebuilt from its history. Empty for unknown objects.
    pub fn get_state(&self, object: StorageReference) -> Result<Vec<Update>> {
        stored_state(self.store.as_ref(), object)
    }

    /// The class of an object and the transaction that installed it.
    pub fn get_class_tag(
        &self,
        object: StorageReference,
    ) -> Result<Option<(String, TransactionReference)>> {
        Ok(match stored_class_tag(self.store.as_ref(), object)? {
            Some(Update::ClassTag {
                class_name, jar, ..
            }) => Some((class_name, jar)),
            _ => None,
        })
    }

    /// The reference the next transaction will get.
    pub fn next_reference(&self) -> TransactionReference {
        *self.next_reference.lock()
    }

    // ===== Bootstrap =====

    /// Brings a fresh node to the initialized state: installs the `lang`
    /// base library, creates the gamete, lets it create the manifest and
    /// initializes the node.
    ///
    /// # Arguments
    ///
    /// * `initial_amount` - coins of the gamete; the manifest creation
    ///   reserves [`BOOTSTRAP_GAS_LIMIT`] of them at price 1
    /// * `public_key` - base64 public key of the gamete
    /// * `sign` - signs the manifest creation with the gamete's key
    pub fn bootstrap(
        &self,
        initial_amount: u128,
        public_key: impl Into<String>,
        sign: impl Fn(&[u8]) -> Vec<u8>,
    ) -> Result<Bootstrap, NodeError> {
        let jar = base_code_unit().to_bytes()?;
        let base = self.add_jar_store_initial_transaction(JarStoreInitialRequest {
            jar,
            dependencies: vec![],
        })?;
        let classpath = Classpath::new(base, true);

        let gamete = self.add_gamete_creation_transaction(GameteCreationRequest {
            classpath,
            initial_amount,
            public_key: public_key.into(),
        })?;

        let mut request = TransactionRequest::ConstructorCall(ConstructorCallRequest {
            header: RequestHeader::new(
                gamete,
                0,
                self.config.chain_id.clone(),
                BOOTSTRAP_GAS_LIMIT,
                1,
                classpath,
            ),
            constructor: ConstructorSignature::new(
                class_names::MANIFEST,
                vec![StorageType::String],
            ),
            actuals: vec![StorageValue::string(self.config.chain_id.clone())],
        });
        let signature = sign(&request.signed_bytes()?);
        request.set_signature(signature);

        let manifest = match self.submit(request)? {
            (_, TransactionResponse::ConstructorCall(ConstructorCallResponse::Successful {
                new_object,
                ..
            })) => new_object,
            (reference, response) => {
                return Err(match response.cause() {
                    Some(cause) => NodeError::Failed {
                        reference,
                        cause: cause.clone(),
                    },
                    None => unexpected_response(reference, &response),
                })
            }
        };

        self.add_initialization_transaction(InitializationRequest { classpath, manifest })?;
        info!(base = %base, gamete = %gamete, manifest = %manifest, "node bootstrapped");
        Ok(Bootstrap {
            base,
            gamete,
            manifest,
        })
    }
}

fn internal(e: anyhow::Error) -> NodeError {
    error!(error = %format!("{:#}", e), "internal fault");
    NodeError::Internal(e)
}

fn unexpected_response(
    reference: TransactionReference,
    response: &TransactionResponse,
) -> NodeError {
    internal(anyhow!(
        "unexpected response at {}: {:?}",
        reference,
        response.outcome()
    ))
}

fn method_result(
    reference: TransactionReference,
    response: TransactionResponse,
) -> Result<Option<StorageValue>, NodeError> {
    match response {
        TransactionResponse::MethodCall(MethodCallResponse::Successful { result, .. }) => {
            Ok(Some(result))
        }
        TransactionResponse::MethodCall(MethodCallResponse::VoidSuccessful { .. }) => Ok(None),
        TransactionResponse::MethodCall(MethodCallResponse::Exception { cause, .. }) => {
            Err(NodeError::Exception { reference, cause })
        }
        TransactionResponse::MethodCall(MethodCallResponse::Failed { cause, .. }) => {
            Err(NodeError::Failed { reference, cause })
        }
        other => Err(unexpected_response(reference, &other)),
    }
}
