//! Throwables raised inside the sandbox.

use ledger_sandbox_types::FailureCause;

use crate::gas::OutOfGas;

/// Names of the throwables raised by the engine itself.
pub mod names {
    pub const OUT_OF_GAS: &str = "lang.OutOfGasError";
    pub const STACK_OVERFLOW: &str = "lang.StackOverflowError";
    pub const INSUFFICIENT_FUNDS: &str = "lang.InsufficientFundsError";
    pub const NON_WHITE_LISTED_CALL: &str = "lang.NonWhiteListedCallException";
    pub const SIDE_EFFECTS_IN_VIEW: &str = "lang.SideEffectsInViewMethodException";
    pub const NULL_POINTER: &str = "lang.NullPointerException";
    pub const CLASS_CAST: &str = "lang.ClassCastException";
    pub const ILLEGAL_ARGUMENT: &str = "lang.IllegalArgumentException";
    pub const ILLEGAL_STATE: &str = "lang.IllegalStateException";
    pub const ARITHMETIC: &str = "lang.ArithmeticException";
    pub const NO_SUCH_METHOD: &str = "lang.NoSuchMethodException";
    pub const DESERIALIZATION: &str = "lang.DeserializationError";
    pub const VERIFICATION: &str = "lang.VerificationError";
}

/// A throwable propagating through sandboxed frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throwable {
    pub class_name: String,
    pub message: String,
    /// Checked throwables (the `lang.Exception` family) may escape entry
    /// points annotated with `throws_exceptions`.
    pub checked: bool,
}

impl Throwable {
    /// A checked exception.
    pub fn exception(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
            checked: true,
        }
    }

    /// An unchecked throwable.
    pub fn error(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
            checked: false,
        }
    }

    pub fn cause(&self) -> FailureCause {
        FailureCause::new(self.class_name.clone(), self.message.clone())
    }
}

impl std::fmt::Display for Throwable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cause())
    }
}

impl From<OutOfGas> for Throwable {
    fn from(e: OutOfGas) -> Self {
        Throwable::error(names::OUT_OF_GAS, e.to_string())
    }
}

/// Why sandboxed code stopped abnormally.
#[derive(Debug)]
pub enum ExecutionFault {
    /// A throwable escaped; the transaction fails or reports an exception.
    Thrown(Throwable),
    /// The store could not be read consistently. Not the caller's fault.
    Internal(anyhow::Error),
}

impl ExecutionFault {
    pub fn thrown(class_name: &str, message: impl Into<String>) -> Self {
        ExecutionFault::Thrown(Throwable::error(class_name, message))
    }
}

impl From<Throwable> for ExecutionFault {
    fn from(throwable: Throwable) -> Self {
        ExecutionFault::Thrown(throwable)
    }
}

impl From<OutOfGas> for ExecutionFault {
    fn from(e: OutOfGas) -> Self {
        ExecutionFault::Thrown(e.into())
    }
}

impl From<anyhow::Error> for ExecutionFault {
    fn from(e: anyhow::Error) -> Self {
        ExecutionFault::Internal(e)
    }
}

impl std::fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionFault::Thrown(throwable) => write!(f, "{}", throwable),
            ExecutionFault::Internal(e) => write!(f, "internal error: {:#}", e),
        }
    }
}

/// Result of sandboxed code.
pub type ExecutionResult<T> = Result<T, ExecutionFault>;
