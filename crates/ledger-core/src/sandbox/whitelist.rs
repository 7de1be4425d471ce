//! Whitelist of native calls.
//!
//! Sandboxed code reaches the outside world only through natives, and only
//! through the deterministic ones listed here. A call is resolved before
//! any of its effects take place: unknown names, and the known
//! non-deterministic primitives, raise `lang.NonWhiteListedCallException`.

use super::throwable::{names, Throwable};

/// A whitelisted native.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    /// `lang.now()`: time of the block, in milliseconds.
    Now,
    /// `lang.emit(event)`: records an event of the transaction.
    Emit,
    /// `lang.balanceOf(contract)`.
    BalanceOf,
    /// `lang.caller()`: the caller of the enclosing `from_contract` code.
    Caller,
    /// `lang.concat(a, b)`.
    Concat,
    /// `lang.length(s)`.
    Length,
}

const WHITELIST: &[(&str, Native, u8)] = &[
    ("lang.now", Native::Now, 0),
    ("lang.emit", Native::Emit, 1),
    ("lang.balanceOf", Native::BalanceOf, 1),
    ("lang.caller", Native::Caller, 0),
    ("lang.concat", Native::Concat, 2),
    ("lang.length", Native::Length, 1),
];

/// Primitives that would make execution depend on the node running it.
const NON_DETERMINISTIC: &[&str] = &[
    "system.currentTimeMillis",
    "system.nanoTime",
    "system.random",
    "system.identityHashCode",
    "system.getenv",
];

impl Native {
    /// Whether the native pushes a result.
    pub fn returns_value(self) -> bool {
        !matches!(self, Native::Emit)
    }
}

/// Resolves a native call by name and arity.
pub fn resolve(name: &str, arity: u8) -> Result<Native, Throwable> {
    if NON_DETERMINISTIC.contains(&name) {
        return Err(Throwable::error(
            names::NON_WHITE_LISTED_CALL,
            format!("{} is not deterministic", name),
        ));
    }

    match WHITELIST.iter().find(|(n, _, _)| *n == name) {
        Some((_, native, expected)) if *expected == arity => Ok(*native),
        Some((_, _, expected)) => Err(Throwable::error(
            names::NON_WHITE_LISTED_CALL,
            format!("{} expects {} arguments, not {}", name, expected, arity),
        )),
        None => Err(Throwable::error(
            names::NON_WHITE_LISTED_CALL,
            format!("{} is not in the whitelist", name),
        )),
    }
}
