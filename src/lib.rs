pub mod account;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extension;
pub mod ledger;
pub mod scenario;
pub mod vm;

#[cfg(test)]
mod testing;

pub use account::{AccountId, ExtensionId};
pub use config::LedgerConfig;
pub use dispatch::Receipt;
pub use error::LedgerError;
pub use extension::{BalanceUpdate, Extension, ExtensionFault, Invocation, MirrorExtension};
pub use ledger::{BudgetedLedger, Ledger};
pub use vm::{ExtensionVm, WasmExtension};
