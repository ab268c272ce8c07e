//! Balance tracking for the ledger's single asset

use std::collections::HashMap;
use super::types::AccountId;

/// Balance store for all accounts
#[derive(Clone, Debug, Default)]
pub struct BalanceStore {
    balances: HashMap<AccountId, u64>,
    total_supply: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalanceError {
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },
    #[error("balance overflow")]
    Overflow,
    #[error("invalid account")]
    InvalidAccount,
}

/// Balance of one account before and after a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: u64,
    pub after: u64,
}

impl BalanceChange {
    fn unchanged(balance: u64) -> Self {
        Self { before: balance, after: balance }
    }
}

impl BalanceStore {
    /// Create a new empty balance store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get balance for an account
    pub fn get_balance(&self, account: &str) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Accounts with a non-zero balance
    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, u64)> + '_ {
        self.balances.iter().map(|(acc, balance)| (acc, *balance))
    }

    /// Credit (add) balance to an account, increasing supply
    pub fn credit(&mut self, account: &str, amount: u64) -> Result<BalanceChange, BalanceError> {
        validate_account(account)?;
        let current = self.get_balance(account);
        if amount == 0 {
            return Ok(BalanceChange::unchanged(current));
        }

        let new_balance = current.checked_add(amount).ok_or(BalanceError::Overflow)?;
        let new_supply = self.total_supply.checked_add(amount).ok_or(BalanceError::Overflow)?;

        self.set(account, new_balance);
        self.total_supply = new_supply;
        Ok(BalanceChange { before: current, after: new_balance })
    }

    /// Debit (subtract) balance from an account, decreasing supply
    pub fn debit(&mut self, account: &str, amount: u64) -> Result<BalanceChange, BalanceError> {
        validate_account(account)?;
        let current = self.get_balance(account);
        if current < amount {
            return Err(BalanceError::InsufficientFunds { available: current, required: amount });
        }
        if amount == 0 {
            return Ok(BalanceChange::unchanged(current));
        }

        let new_balance = current - amount;
        self.set(account, new_balance);
        self.total_supply -= amount;
        Ok(BalanceChange { before: current, after: new_balance })
    }

    /// Transfer balance from one account to another.
    ///
    /// Both sides are validated before anything is written, so a failed
    /// transfer leaves the store untouched.
    pub fn transfer(
        &mut self,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(BalanceChange, BalanceChange), BalanceError> {
        validate_account(from)?;
        validate_account(to)?;

        let from_balance = self.get_balance(from);
        if from_balance < amount {
            return Err(BalanceError::InsufficientFunds { available: from_balance, required: amount });
        }
        if from == to || amount == 0 {
            let to_balance = self.get_balance(to);
            return Ok((BalanceChange::unchanged(from_balance), BalanceChange::unchanged(to_balance)));
        }

        let to_balance = self.get_balance(to);
        let new_to = to_balance.checked_add(amount).ok_or(BalanceError::Overflow)?;
        let new_from = from_balance - amount;

        self.set(from, new_from);
        self.set(to, new_to);
        Ok((
            BalanceChange { before: from_balance, after: new_from },
            BalanceChange { before: to_balance, after: new_to },
        ))
    }

    fn set(&mut self, account: &str, amount: u64) {
        if amount == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.to_string(), amount);
        }
    }
}

fn validate_account(account: &str) -> Result<(), BalanceError> {
    if account.is_empty() {
        return Err(BalanceError::InvalidAccount);
    }
    Ok(())
}
