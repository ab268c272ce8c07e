//! Extension that keeps a shadow copy of the balances it is told about.
//!
//! Useful for reward or voting-power bookkeeping that must track a token's
//! holders without being able to block the token itself.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{BalanceUpdate, Extension, ExtensionFault, Invocation};
use crate::account::AccountId;

/// Units charged per mirrored update
pub const MIRROR_UPDATE_COST: u64 = 5_000;

#[derive(Debug, Default)]
struct Shadow {
    balances: HashMap<AccountId, u64>,
    total_supply: u64,
}

#[derive(Debug)]
pub struct MirrorExtension {
    name: String,
    shadow: Mutex<Shadow>,
}

impl MirrorExtension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shadow: Mutex::new(Shadow::default()),
        }
    }

    pub fn balance_of(&self, account: &str) -> u64 {
        self.shadow
            .lock()
            .map(|s| s.balances.get(account).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_supply(&self) -> u64 {
        self.shadow.lock().map(|s| s.total_supply).unwrap_or(0)
    }
}

impl Extension for MirrorExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_balance_change(
        &self,
        call: &mut Invocation<'_>,
        update: &BalanceUpdate<'_>,
    ) -> Result<(), ExtensionFault> {
        call.consume(MIRROR_UPDATE_COST)?;

        let mut shadow = self.shadow.lock().map_err(|_| ExtensionFault::Unavailable)?;
        let previous = shadow.balances.get(update.account).copied().unwrap_or(0);
        // Take the new balance as the truth so a missed notification heals on the next one.
        let total = shadow.total_supply.saturating_sub(previous);
        shadow.total_supply = total
            .checked_add(update.new_balance)
            .ok_or_else(|| ExtensionFault::Reverted("mirrored supply overflow".to_string()))?;
        if update.new_balance == 0 {
            shadow.balances.remove(update.account);
        } else {
            shadow.balances.insert(update.account.to_string(), update.new_balance);
        }

        call.set_return_data(&[1]);
        Ok(())
    }
}
