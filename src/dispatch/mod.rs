//! Balance-sync dispatcher
//!
//! Fans a balance change out to every extension registered for the account.
//! Each call runs in isolation: its failure, panic, exhausted budget or
//! oversized return is absorbed here and never reaches the ledger operation.

pub(crate) mod gate;

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::account::ExtensionId;
use crate::config::LedgerConfig;
use crate::extension::{BalanceUpdate, ExtensionFault, Invocation};
use crate::ledger::Ledger;

/// Units charged for every mutating operation
pub const BASE_OPERATION_COST: u64 = 5_000;
/// Units charged per invocation on top of the callee's own work. This is the
/// caller's share and is never granted to the extension.
pub const CALL_OVERHEAD: u64 = 2_600;
/// Units per 32-byte word of return data copied back
pub const COPY_COST_PER_WORD: u64 = 3;

/// Cost summary of a mutating ledger operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub units_used: u64,
    /// Extension calls attempted, whatever their outcome
    pub invocations: usize,
}

pub(crate) fn copy_cost(bytes: usize) -> u64 {
    (bytes as u64).div_ceil(32) * COPY_COST_PER_WORD
}

/// Most a single invocation can cost under `config`
pub fn worst_case_invocation_cost(config: &LedgerConfig) -> u64 {
    CALL_OVERHEAD
        .saturating_add(config.extension_call_budget)
        .saturating_add(copy_cost(config.return_data_cap))
}

/// Most an operation performing `invocations` calls can cost under `config`
pub fn worst_case_operation_cost(config: &LedgerConfig, invocations: usize) -> u64 {
    worst_case_invocation_cost(config)
        .saturating_mul(invocations as u64)
        .saturating_add(BASE_OPERATION_COST)
}

pub(crate) struct Dispatcher<'a> {
    ledger: &'a Ledger,
    config: LedgerConfig,
    receipt: Receipt,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(ledger: &'a Ledger) -> Self {
        Self {
            ledger,
            config: *ledger.config(),
            receipt: Receipt { units_used: BASE_OPERATION_COST, invocations: 0 },
        }
    }

    /// Notify each of `extensions` in order
    pub(crate) fn notify_all(&mut self, extensions: &[ExtensionId], update: &BalanceUpdate<'_>) {
        for ext in extensions {
            self.notify(*ext, update);
        }
    }

    pub(crate) fn notify(&mut self, ext: ExtensionId, update: &BalanceUpdate<'_>) {
        let (consumed, copied, result) = self.invoke(ext, update);
        let cost = CALL_OVERHEAD + consumed + copy_cost(copied);

        self.receipt.invocations += 1;
        self.receipt.units_used = self.receipt.units_used.saturating_add(cost);

        match result {
            Ok(()) => debug!(
                extension = %ext,
                account = update.account,
                old = update.old_balance,
                new = update.new_balance,
                units = cost,
                "extension notified"
            ),
            Err(fault) => warn!(
                extension = %ext,
                account = update.account,
                units = cost,
                "extension notification absorbed: {}",
                fault
            ),
        }
    }

    pub(crate) fn finish(self) -> Receipt {
        self.receipt
    }

    fn invoke(&self, ext: ExtensionId, update: &BalanceUpdate<'_>) -> (u64, usize, Result<(), ExtensionFault>) {
        let Some(target) = self.ledger.resolve(&ext) else {
            return (0, 0, Err(ExtensionFault::Unavailable));
        };

        let mut call = Invocation::new(
            self.ledger,
            ext,
            self.config.extension_call_budget,
            self.config.return_data_cap,
        );
        let result = panic::catch_unwind(AssertUnwindSafe(|| target.on_balance_change(&mut call, update)))
            .unwrap_or(Err(ExtensionFault::Panicked));

        (call.consumed(), call.return_data().len(), result)
    }
}
