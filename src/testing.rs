//! Extensions that misbehave on purpose, for exercising the dispatcher.

use std::sync::Mutex;

use crate::account::AccountId;
use crate::error::LedgerError;
use crate::extension::{BalanceUpdate, Extension, ExtensionFault, Invocation};

pub const RECORDER_COST: u64 = 5_000;

/// Records every update it receives
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<(AccountId, u64, u64)>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<(AccountId, u64, u64)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl Extension for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_balance_change(&self, call: &mut Invocation<'_>, update: &BalanceUpdate<'_>) -> Result<(), ExtensionFault> {
        call.consume(RECORDER_COST)?;
        self.seen
            .lock()
            .unwrap()
            .push((update.account.to_string(), update.old_balance, update.new_balance));
        call.set_return_data(&[1]);
        Ok(())
    }
}

pub struct Reverting;

impl Extension for Reverting {
    fn name(&self) -> &str {
        "reverting"
    }

    fn on_balance_change(&self, _call: &mut Invocation<'_>, _update: &BalanceUpdate<'_>) -> Result<(), ExtensionFault> {
        Err(ExtensionFault::Reverted("always".to_string()))
    }
}

/// Burns its whole budget
pub struct BudgetEater;

impl Extension for BudgetEater {
    fn name(&self) -> &str {
        "budget-eater"
    }

    fn on_balance_change(&self, call: &mut Invocation<'_>, _update: &BalanceUpdate<'_>) -> Result<(), ExtensionFault> {
        loop {
            call.consume(1_000)?;
        }
    }
}

/// Does real work without ever charging for it
#[derive(Default)]
pub struct Uncharged {
    runs: Mutex<usize>,
}

impl Uncharged {
    pub fn runs(&self) -> usize {
        *self.runs.lock().unwrap()
    }
}

impl Extension for Uncharged {
    fn name(&self) -> &str {
        "uncharged"
    }

    fn on_balance_change(&self, _call: &mut Invocation<'_>, update: &BalanceUpdate<'_>) -> Result<(), ExtensionFault> {
        let mut acc = update.new_balance;
        for i in 0..100_000u64 {
            acc = std::hint::black_box(acc.wrapping_mul(31).wrapping_add(i));
        }
        std::hint::black_box(acc);
        *self.runs.lock().unwrap() += 1;
        Ok(())
    }
}

/// Tries to hand back a megabyte of return data
pub struct GasBomb {
    payload: Vec<u8>,
}

impl Default for GasBomb {
    fn default() -> Self {
        Self { payload: vec![0xff; 1 << 20] }
    }
}

impl Extension for GasBomb {
    fn name(&self) -> &str {
        "gas-bomb"
    }

    fn on_balance_change(&self, call: &mut Invocation<'_>, _update: &BalanceUpdate<'_>) -> Result<(), ExtensionFault> {
        call.consume(RECORDER_COST)?;
        call.set_return_data(&self.payload);
        Ok(())
    }
}

pub struct Panicking;

impl Extension for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn on_balance_change(&self, _call: &mut Invocation<'_>, _update: &BalanceUpdate<'_>) -> Result<(), ExtensionFault> {
        panic!("extension blew up");
    }
}

/// Tries to move funds out of the account it is watching
#[derive(Default)]
pub struct Reentrant {
    errors: Mutex<Vec<LedgerError>>,
}

impl Reentrant {
    pub fn errors(&self) -> Vec<LedgerError> {
        self.errors.lock().unwrap().clone()
    }
}

impl Extension for Reentrant {
    fn name(&self) -> &str {
        "reentrant"
    }

    fn on_balance_change(&self, call: &mut Invocation<'_>, update: &BalanceUpdate<'_>) -> Result<(), ExtensionFault> {
        let ledger = call.ledger();
        let result = ledger
            .transfer(update.account, "thief", 1)
            .and_then(|_| ledger.remove_all_extensions(update.account));
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.errors.lock().unwrap().push(e.clone());
                Err(ExtensionFault::Reverted(e.to_string()))
            }
        }
    }
}

/// Reads the ledger from inside a notification
#[derive(Default)]
pub struct Observer {
    seen: Mutex<Vec<(u64, u64)>>,
}

impl Observer {
    /// (balance_of, extension_balance_of) pairs observed
    pub fn observed(&self) -> Vec<(u64, u64)> {
        self.seen.lock().unwrap().clone()
    }
}

impl Extension for Observer {
    fn name(&self) -> &str {
        "observer"
    }

    fn on_balance_change(&self, call: &mut Invocation<'_>, update: &BalanceUpdate<'_>) -> Result<(), ExtensionFault> {
        let ledger = call.ledger();
        let me = call.extension_id();
        self.seen.lock().unwrap().push((
            ledger.balance_of(update.account),
            ledger.extension_balance_of(&me, update.account),
        ));
        Ok(())
    }
}
