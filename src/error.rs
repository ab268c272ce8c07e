use thiserror::Error;

use crate::account::{BalanceError, RegistryError};

/// Errors surfaced to callers of ledger operations.
///
/// Extension failures never appear here: they are absorbed by the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error("reentrant ledger mutation rejected")]
    Reentrancy,
    #[error("operation budget too small: required {required}, available {available}")]
    InsufficientBudget { required: u64, available: u64 },
}
