use super::ExtensionFault;
use crate::account::ExtensionId;
use crate::ledger::Ledger;

/// Context of a single extension call: a computation meter with a fixed
/// ceiling and a return buffer that never grows past its cap. The meter only
/// sees what the extension charges to it.
pub struct Invocation<'a> {
    ledger: &'a Ledger,
    extension: ExtensionId,
    budget: u64,
    consumed: u64,
    return_cap: usize,
    return_data: Vec<u8>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(ledger: &'a Ledger, extension: ExtensionId, budget: u64, return_cap: usize) -> Self {
        Self {
            ledger,
            extension,
            budget,
            consumed: 0,
            return_cap,
            return_data: Vec::new(),
        }
    }

    /// Read access to the ledger that is notifying
    pub fn ledger(&self) -> &'a Ledger {
        self.ledger
    }

    pub fn extension_id(&self) -> ExtensionId {
        self.extension
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn remaining(&self) -> u64 {
        self.budget - self.consumed
    }

    /// Charge `units` of work. Going over the budget pins the meter at the
    /// ceiling and fails the invocation.
    pub fn consume(&mut self, units: u64) -> Result<(), ExtensionFault> {
        if units > self.remaining() {
            self.consumed = self.budget;
            return Err(ExtensionFault::OutOfBudget);
        }
        self.consumed += units;
        Ok(())
    }

    /// Hand data back to the caller. Only the first `return_cap` bytes are
    /// copied; the rest of `data` is never read. Returns the copied length.
    pub fn set_return_data(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(self.return_cap);
        self.return_data.clear();
        self.return_data.extend_from_slice(&data[..len]);
        len
    }

    pub fn return_data(&self) -> &[u8] {
        &self.return_data
    }

    pub fn return_cap(&self) -> usize {
        self.return_cap
    }
}
