//! Single-writer gate around ledger mutation.
//!
//! Mutations from different threads queue on the writer lock. A mutation
//! attempted by the thread that already holds the gate can only come from an
//! extension being notified, and is refused instead of queued.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::error::LedgerError;

#[derive(Debug, Default)]
pub(crate) struct MutationGate {
    writer: Mutex<()>,
    holder: Mutex<Option<ThreadId>>,
}

pub(crate) struct GateTicket<'a> {
    gate: &'a MutationGate,
    _writer: MutexGuard<'a, ()>,
}

impl MutationGate {
    pub(crate) fn enter(&self) -> Result<GateTicket<'_>, LedgerError> {
        if self.is_held_by_current_thread() {
            return Err(LedgerError::Reentrancy);
        }

        // A poisoned writer only means an earlier operation panicked outside
        // the dispatcher; state is still consistent because it is validated
        // before it is written.
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        *self.holder() = Some(thread::current().id());
        Ok(GateTicket { gate: self, _writer: writer })
    }

    pub(crate) fn is_held_by_current_thread(&self) -> bool {
        *self.holder() == Some(thread::current().id())
    }

    fn holder(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for GateTicket<'_> {
    fn drop(&mut self) {
        *self.gate.holder() = None;
    }
}
