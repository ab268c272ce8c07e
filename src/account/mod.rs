//! Accounts: balances and the extensions registered against them

pub mod types;
pub mod balance;
pub mod extensions;

pub use types::{account_tag, AccountId, ExtensionId, ParseExtensionIdError};
pub use balance::{BalanceChange, BalanceError, BalanceStore};
pub use extensions::{ExtensionSet, RegistryError};
