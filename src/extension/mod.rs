//! Extension capability
//!
//! An extension is a third-party observer attached to an account. Every time
//! the account's balance changes the ledger hands it a [`BalanceUpdate`]
//! through an [`Invocation`], which meters the work it does and caps the data
//! it may hand back.

pub mod invocation;
pub mod mirror;

pub use invocation::Invocation;
pub use mirror::MirrorExtension;

use thiserror::Error;

/// Balance of `account` before and after a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceUpdate<'a> {
    pub account: &'a str,
    pub old_balance: u64,
    pub new_balance: u64,
}

/// Ways an invocation can fail. None of these ever reach the caller of the
/// ledger operation that triggered the notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtensionFault {
    #[error("extension reverted: {0}")]
    Reverted(String),
    #[error("extension exhausted its budget")]
    OutOfBudget,
    #[error("extension trapped: {0}")]
    Trapped(String),
    #[error("extension panicked")]
    Panicked,
    #[error("extension unavailable")]
    Unavailable,
}

/// Observer notified on balance changes of the accounts it is registered for.
///
/// Native implementations run in-process and are trusted to meter themselves:
/// work is only counted, and only cut off, when charged through
/// [`Invocation::consume`]. Errors, panics, exhausted budgets and oversized
/// return data are absorbed and the triggering operation still completes.
/// Untrusted observers belong in a [`WasmExtension`](crate::vm::WasmExtension),
/// where every instruction is charged against the same budget.
///
/// Extensions may read the ledger through [`Invocation::ledger`]; any attempt
/// to mutate it while being notified is rejected.
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    fn on_balance_change(
        &self,
        call: &mut Invocation<'_>,
        update: &BalanceUpdate<'_>,
    ) -> Result<(), ExtensionFault>;
}
