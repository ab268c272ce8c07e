//! Token ledger with per-account extension registries
//!
//! `Ledger` is a cloneable handle. Every mutation runs through the same
//! sequence: enter the mutation gate, validate and commit under the state
//! lock, release the lock, then notify the affected extensions. A
//! notification is therefore only ever sent for a change that has already
//! happened, and extensions can read the ledger while being notified.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::account::{
    AccountId, BalanceChange, BalanceError, BalanceStore, ExtensionId, ExtensionSet, RegistryError,
};
use crate::config::LedgerConfig;
use crate::dispatch::gate::MutationGate;
use crate::dispatch::{worst_case_operation_cost, Dispatcher, Receipt};
use crate::error::LedgerError;
use crate::extension::{BalanceUpdate, Extension};


#[derive(Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

struct LedgerInner {
    config: LedgerConfig,
    state: RwLock<LedgerState>,
    deployments: RwLock<Deployments>,
    gate: MutationGate,
}

#[derive(Default)]
struct LedgerState {
    balances: BalanceStore,
    registries: HashMap<AccountId, ExtensionSet>,
}

#[derive(Default)]
struct Deployments {
    nonce: u64,
    extensions: HashMap<ExtensionId, Arc<dyn Extension>>,
}

#[derive(Debug, Clone, Copy)]
enum Operation<'a> {
    Mint { to: &'a str, amount: u64 },
    Burn { from: &'a str, amount: u64 },
    Transfer { from: &'a str, to: &'a str, amount: u64 },
    AddExtension { account: &'a str, ext: ExtensionId },
    RemoveExtension { account: &'a str, ext: ExtensionId },
    RemoveAllExtensions { account: &'a str },
}

/// Extensions to notify about one account's balance change
struct Notification {
    account: AccountId,
    change: BalanceChange,
    targets: Vec<ExtensionId>,
}

impl Notification {
    fn update(&self) -> BalanceUpdate<'_> {
        BalanceUpdate {
            account: &self.account,
            old_balance: self.change.before,
            new_balance: self.change.after,
        }
    }
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                config,
                state: RwLock::new(LedgerState::default()),
                deployments: RwLock::new(Deployments::default()),
                gate: MutationGate::default(),
            }),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    /// Make an extension callable and return the id accounts register it by
    pub fn deploy(&self, extension: Arc<dyn Extension>) -> ExtensionId {
        let mut deployments = self.inner.deployments.write().unwrap_or_else(PoisonError::into_inner);
        let id = ExtensionId::derive(deployments.nonce, extension.name());
        deployments.nonce += 1;
        debug!(extension = %id, name = extension.name(), "extension deployed");
        deployments.extensions.insert(id, extension);
        id
    }

    pub(crate) fn resolve(&self, id: &ExtensionId) -> Option<Arc<dyn Extension>> {
        self.inner
            .deployments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .extensions
            .get(id)
            .cloned()
    }

    /// Run mutations under a fixed budget of computation units
    pub fn with_budget(&self, units: u64) -> BudgetedLedger<'_> {
        BudgetedLedger { ledger: self, budget: units }
    }

    // ---- mutations ----

    pub fn mint(&self, to: &str, amount: u64) -> Result<Receipt, LedgerError> {
        self.execute(Operation::Mint { to, amount }, None)
    }

    pub fn burn(&self, from: &str, amount: u64) -> Result<Receipt, LedgerError> {
        self.execute(Operation::Burn { from, amount }, None)
    }

    pub fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<Receipt, LedgerError> {
        self.execute(Operation::Transfer { from, to, amount }, None)
    }

    /// Register `ext` for `account`. A non-zero balance is pushed to the new
    /// extension straight away as a change from 0.
    pub fn add_extension(&self, account: &str, ext: ExtensionId) -> Result<Receipt, LedgerError> {
        self.execute(Operation::AddExtension { account, ext }, None)
    }

    /// Deregister `ext`. A non-zero balance is reported to it as a change to 0.
    pub fn remove_extension(&self, account: &str, ext: ExtensionId) -> Result<Receipt, LedgerError> {
        self.execute(Operation::RemoveExtension { account, ext }, None)
    }

    /// Deregister everything, tearing extensions down from last to first
    pub fn remove_all_extensions(&self, account: &str) -> Result<Receipt, LedgerError> {
        self.execute(Operation::RemoveAllExtensions { account }, None)
    }

    // ---- views ----

    pub fn balance_of(&self, account: &str) -> u64 {
        self.read_state().balances.get_balance(account)
    }

    pub fn total_supply(&self) -> u64 {
        self.read_state().balances.total_supply()
    }

    pub fn has_extension(&self, account: &str, ext: &ExtensionId) -> bool {
        self.read_state()
            .registries
            .get(account)
            .is_some_and(|set| set.has(ext))
    }

    pub fn extensions_count(&self, account: &str) -> usize {
        self.read_state().registry_len(account)
    }

    /// Extension at `index` for `account`; `None` past the end
    pub fn extension_at(&self, account: &str, index: usize) -> Option<ExtensionId> {
        self.read_state().registries.get(account).and_then(|set| set.at(index))
    }

    pub fn extensions(&self, account: &str) -> Vec<ExtensionId> {
        self.read_state()
            .registries
            .get(account)
            .map(ExtensionSet::list)
            .unwrap_or_default()
    }

    /// Balance of `account` as seen by `ext`: the real balance while `ext` is
    /// registered for the account, zero otherwise.
    pub fn extension_balance_of(&self, ext: &ExtensionId, account: &str) -> u64 {
        let state = self.read_state();
        match state.registries.get(account) {
            Some(set) if set.has(ext) => state.balances.get_balance(account),
            _ => 0,
        }
    }

    /// Every account holding a balance or an extension, sorted
    pub fn accounts(&self) -> Vec<AccountId> {
        let state = self.read_state();
        let mut accounts: BTreeSet<AccountId> = state.balances.holders().map(|(a, _)| a.clone()).collect();
        accounts.extend(state.registries.keys().cloned());
        accounts.into_iter().collect()
    }

    fn execute(&self, op: Operation<'_>, budget: Option<u64>) -> Result<Receipt, LedgerError> {
        let _ticket = self.inner.gate.enter()?;
        let config = self.inner.config;

        let notifications = {
            let mut state = self.write_state();
            if let Some(available) = budget {
                let required = worst_case_operation_cost(&config, state.planned_invocations(&op));
                if available < required {
                    return Err(LedgerError::InsufficientBudget { required, available });
                }
            }
            state.apply(&op, &config)?
        };
        debug!(?op, accounts = notifications.len(), "ledger state committed");

        let mut dispatcher = Dispatcher::new(self);
        for notification in &notifications {
            dispatcher.notify_all(&notification.targets, &notification.update());
        }
        Ok(dispatcher.finish())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.inner.config)
            .field("total_supply", &self.total_supply())
            .finish()
    }
}

impl LedgerState {
    fn registry_len(&self, account: &str) -> usize {
        self.registries.get(account).map_or(0, ExtensionSet::count)
    }

    fn registry_targets(&self, account: &str) -> Vec<ExtensionId> {
        self.registries
            .get(account)
            .map(|set| set.as_slice().to_vec())
            .unwrap_or_default()
    }

    /// Number of extension calls `op` will make if it succeeds
    fn planned_invocations(&self, op: &Operation<'_>) -> usize {
        match *op {
            Operation::Mint { to: account, amount } | Operation::Burn { from: account, amount } => {
                if amount == 0 { 0 } else { self.registry_len(account) }
            }
            Operation::Transfer { from, to, amount } => {
                if amount == 0 || from == to {
                    0
                } else {
                    self.registry_len(from) + self.registry_len(to)
                }
            }
            Operation::AddExtension { account, .. } | Operation::RemoveExtension { account, .. } => {
                usize::from(self.balances.get_balance(account) > 0)
            }
            Operation::RemoveAllExtensions { account } => {
                if self.balances.get_balance(account) > 0 {
                    self.registry_len(account)
                } else {
                    0
                }
            }
        }
    }

    /// Validate and commit `op`, returning who must be told about it
    fn apply(&mut self, op: &Operation<'_>, config: &LedgerConfig) -> Result<Vec<Notification>, LedgerError> {
        let notifications = match *op {
            Operation::Mint { to, amount } => {
                let change = self.balances.credit(to, amount)?;
                if amount == 0 {
                    vec![]
                } else {
                    vec![self.notify_registry(to, change)]
                }
            }
            Operation::Burn { from, amount } => {
                let change = self.balances.debit(from, amount)?;
                if amount == 0 {
                    vec![]
                } else {
                    vec![self.notify_registry(from, change)]
                }
            }
            Operation::Transfer { from, to, amount } => {
                let (from_change, to_change) = self.balances.transfer(from, to, amount)?;
                if amount == 0 || from == to {
                    vec![]
                } else {
                    vec![self.notify_registry(from, from_change), self.notify_registry(to, to_change)]
                }
            }
            Operation::AddExtension { account, ext } => {
                if account.is_empty() {
                    return Err(BalanceError::InvalidAccount.into());
                }
                let set = self.registries.entry(account.to_string()).or_default();
                if let Err(e) = set.add(ext, config.max_extensions_per_account) {
                    if set.is_empty() {
                        self.registries.remove(account);
                    }
                    return Err(e.into());
                }

                let balance = self.balances.get_balance(account);
                if balance > 0 {
                    vec![notify_one(account, BalanceChange { before: 0, after: balance }, vec![ext])]
                } else {
                    vec![]
                }
            }
            Operation::RemoveExtension { account, ext } => {
                let set = self
                    .registries
                    .get_mut(account)
                    .ok_or(RegistryError::NotRegistered(ext))?;
                set.remove(&ext)?;
                if set.is_empty() {
                    self.registries.remove(account);
                }

                let balance = self.balances.get_balance(account);
                if balance > 0 {
                    vec![notify_one(account, BalanceChange { before: balance, after: 0 }, vec![ext])]
                } else {
                    vec![]
                }
            }
            Operation::RemoveAllExtensions { account } => {
                let mut removed = self
                    .registries
                    .remove(account)
                    .map(|mut set| set.clear())
                    .unwrap_or_default();

                let balance = self.balances.get_balance(account);
                if balance > 0 && !removed.is_empty() {
                    removed.reverse();
                    vec![notify_one(account, BalanceChange { before: balance, after: 0 }, removed)]
                } else {
                    vec![]
                }
            }
        };
        Ok(notifications)
    }

    fn notify_registry(&self, account: &str, change: BalanceChange) -> Notification {
        notify_one(account, change, self.registry_targets(account))
    }
}

fn notify_one(account: &str, change: BalanceChange, targets: Vec<ExtensionId>) -> Notification {
    Notification {
        account: account.to_string(),
        change,
        targets,
    }
}

/// View of a [`Ledger`] whose mutations are refused up front unless `budget`
/// covers every extension call at its full grant.
pub struct BudgetedLedger<'a> {
    ledger: &'a Ledger,
    budget: u64,
}

impl BudgetedLedger<'_> {
    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn mint(&self, to: &str, amount: u64) -> Result<Receipt, LedgerError> {
        self.ledger.execute(Operation::Mint { to, amount }, Some(self.budget))
    }

    pub fn burn(&self, from: &str, amount: u64) -> Result<Receipt, LedgerError> {
        self.ledger.execute(Operation::Burn { from, amount }, Some(self.budget))
    }

    pub fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<Receipt, LedgerError> {
        self.ledger.execute(Operation::Transfer { from, to, amount }, Some(self.budget))
    }

    pub fn add_extension(&self, account: &str, ext: ExtensionId) -> Result<Receipt, LedgerError> {
        self.ledger.execute(Operation::AddExtension { account, ext }, Some(self.budget))
    }

    pub fn remove_extension(&self, account: &str, ext: ExtensionId) -> Result<Receipt, LedgerError> {
        self.ledger.execute(Operation::RemoveExtension { account, ext }, Some(self.budget))
    }

    pub fn remove_all_extensions(&self, account: &str) -> Result<Receipt, LedgerError> {
        self.ledger.execute(Operation::RemoveAllExtensions { account }, Some(self.budget))
    }
}
