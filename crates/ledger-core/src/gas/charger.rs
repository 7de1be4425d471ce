//! Gas charger of a single transaction.
//!
//! The charger starts with the gas limit of the request and decrements it
//! for CPU, RAM and storage. A charge larger than what remains fails with
//! [`OutOfGas`] and consumes nothing. Initial transactions use an unmetered
//! charger, for which every charge is a no-op.
//!
//! # Usage
//!
//! ```
//! use ledger_sandbox_core::gas::GasCharger;
//!
//! let mut charger = GasCharger::new(1_000);
//! charger.charge_cpu(10).unwrap();
//! charger.charge_storage(200).unwrap();
//! assert_eq!(charger.remaining(), 790);
//! assert_eq!(charger.penalty(), 790);
//! ```

use ledger_sandbox_types::GasConsumed;

/// Raised when a charge exceeds the remaining gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfGas {
    /// The amount that could not be charged.
    pub requested: u64,
    /// The gas that was available.
    pub available: u64,
}

impl std::fmt::Display for OutOfGas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "out of gas: requested {} units but only {} are available",
            self.requested, self.available
        )
    }
}

impl std::error::Error for OutOfGas {}

#[derive(Debug, Clone, Copy)]
enum Category {
    Cpu,
    Ram,
    Storage,
}

/// Tracks the gas of a transaction.
#[derive(Debug, Clone)]
pub struct GasCharger {
    /// Gas limit of the request
    gas_limit: u64,
    /// Gas still available to the current computation
    remaining: u64,
    /// Gas consumed for CPU
    cpu: u64,
    /// Gas consumed for RAM allocation
    ram: u64,
    /// Gas consumed for storage
    storage: u64,
    /// False for initial transactions
    metered: bool,
    /// Gas set aside by enclosing computations, see [`Self::push_gas`]
    old_gas: Vec<u64>,
}

impl GasCharger {
    /// Create a charger for a transaction with the given gas limit.
    pub fn new(gas_limit: u64) -> Self {
        Self {
            gas_limit,
            remaining: gas_limit,
            cpu: 0,
            ram: 0,
            storage: 0,
            metered: true,
            old_gas: Vec::new(),
        }
    }

    /// Create a charger that never charges (for initial transactions).
    pub fn unmetered() -> Self {
        Self {
            metered: false,
            ..Self::new(0)
        }
    }

    pub fn is_metered(&self) -> bool {
        self.metered
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Gas available to the current computation.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Gas not yet consumed, including the gas set aside by enclosing
    /// computations.
    pub fn unused(&self) -> u64 {
        self.old_gas
            .iter()
            .fold(self.remaining, |total, gas| total.saturating_add(*gas))
    }

    pub fn charge_cpu(&mut self, amount: u64) -> Result<(), OutOfGas> {
        self.charge(amount, Category::Cpu)
    }

    pub fn charge_ram(&mut self, amount: u64) -> Result<(), OutOfGas> {
        self.charge(amount, Category::Ram)
    }

    pub fn charge_storage(&mut self, amount: u64) -> Result<(), OutOfGas> {
        self.charge(amount, Category::Storage)
    }

    fn charge(&mut self, amount: u64, category: Category) -> Result<(), OutOfGas> {
        if !self.metered {
            return Ok(());
        }
        if amount > self.remaining {
            return Err(OutOfGas {
                requested: amount,
                available: self.remaining,
            });
        }

        self.remaining -= amount;
        let counter = match category {
            Category::Cpu => &mut self.cpu,
            Category::Ram => &mut self.ram,
            Category::Storage => &mut self.storage,
        };
        *counter = counter.saturating_add(amount);
        Ok(())
    }

    /// Restricts the current computation to `amount` units of gas. The rest
    /// is set aside until the matching [`Self::pop_gas`].
    pub fn push_gas(&mut self, amount: u64) -> Result<(), OutOfGas> {
        if !self.metered {
            return Ok(());
        }
        if amount > self.remaining {
            return Err(OutOfGas {
                requested: amount,
                available: self.remaining,
            });
        }
        self.old_gas.push(self.remaining - amount);
        self.remaining = amount;
        Ok(())
    }

    /// Ends a restricted computation: its unused gas goes back to the
    /// enclosing one.
    pub fn pop_gas(&mut self) {
        if let Some(old) = self.old_gas.pop() {
            self.remaining = self.remaining.saturating_add(old);
        }
    }

    /// Gas consumed so far, per category.
    pub fn consumed(&self) -> GasConsumed {
        GasConsumed::new(self.cpu, self.ram, self.storage)
    }

    /// Gas that a failure would charge beyond what has been consumed: the
    /// limit minus CPU, RAM and storage.
    pub fn penalty(&self) -> u64 {
        self.gas_limit.saturating_sub(self.consumed().total())
    }
}
