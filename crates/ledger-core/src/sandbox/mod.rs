//! Sandboxed execution of instrumented code.
//!
//! # Architecture
//!
//! 1. **Code** - [`code`], the decoded form of installed code units
//! 2. **Loader** - [`loader`], links a classpath out of the jars in the store
//! 3. **Heap** - [`heap`], objects of a transaction and the updates they produce
//! 4. **Interpreter** - [`interpreter`], the metered stack machine
//! 5. **Whitelist** - [`whitelist`], the deterministic natives
//!
//! The `lang` base library ([`lang`]) is installed by the first transaction
//! of every node.

pub mod code;
pub mod heap;
pub mod interpreter;
pub mod lang;
pub mod loader;
pub mod throwable;
pub mod whitelist;

pub use code::{Annotations, CallKind, ClassDef, CodeUnit, ConstructorDef, Instruction, MethodDef};
pub use heap::{stored_class_tag, stored_field, stored_state, Heap, ObjectCapabilities};
pub use interpreter::Interpreter;
pub use lang::base_code_unit;
pub use loader::{ClasspathError, ClasspathLimits, LoadedClasspath};
pub use throwable::{names, ExecutionFault, ExecutionResult, Throwable};
