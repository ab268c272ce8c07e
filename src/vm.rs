//! WebAssembly extension host
//!
//! Untrusted extensions ship as wasm modules and run under wasmtime with fuel
//! metering: every call is given exactly the fuel left in its [`Invocation`],
//! and running dry traps the guest instead of stalling the ledger. Linear
//! memory and table size are capped per instance, and return data is read straight out of
//! guest memory up to the invocation's return cap.
//!
//! Guest ABI:
//!
//! ```text
//! (func (export "on_balance_change")
//!     (param $account_tag i64) (param $old i64) (param $new i64)
//!     (result i64))   ;; (ptr << 32) | len of return data, 0 for none
//! ```

use std::path::Path;
use std::sync::Mutex;
use wasmtime::*;

use crate::account::account_tag;
use crate::extension::{BalanceUpdate, Extension, ExtensionFault, Invocation};

pub const ON_BALANCE_CHANGE_EXPORT: &str = "on_balance_change";
pub const MEMORY_EXPORT: &str = "memory";
/// Linear memory ceiling per extension instance
pub const MAX_GUEST_MEMORY_BYTES: usize = 16 << 20;
/// Table slots per extension instance; growing past this fails with -1
pub const MAX_GUEST_TABLE_ELEMENTS: u32 = 10_000;
/// Fuel available to a module's start function
const INSTANTIATE_FUEL: u64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("failed to create wasm engine: {0}")]
    Engine(String),
    #[error("invalid wasm module: {0}")]
    InvalidModule(String),
    #[error("failed to instantiate module: {0}")]
    Instantiation(String),
    #[error("module must export `on_balance_change(i64, i64, i64) -> i64`: {0}")]
    MissingExport(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Compiles and instantiates wasm extensions on a shared, fuel-metered engine
#[derive(Clone)]
pub struct ExtensionVm {
    engine: Engine,
}

impl ExtensionVm {
    pub fn new() -> Result<Self, VmError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        let engine = Engine::new(&config).map_err(|e| VmError::Engine(e.to_string()))?;
        Ok(Self { engine })
    }

    /// Load a module from wasm binary or wat text
    pub fn load(&self, name: &str, bytes: &[u8]) -> Result<WasmExtension, VmError> {
        let wasm = wat::parse_bytes(bytes).map_err(|e| VmError::InvalidModule(e.to_string()))?;
        let module = Module::from_binary(&self.engine, &wasm)
            .map_err(|e| VmError::InvalidModule(e.to_string()))?;

        let limits = StoreLimitsBuilder::new()
            .memory_size(MAX_GUEST_MEMORY_BYTES)
            .table_elements(MAX_GUEST_TABLE_ELEMENTS)
            .tables(1)
            .instances(1)
            .build();
        let mut store = Store::new(&self.engine, limits);
        store.limiter(|limits| limits);
        store
            .set_fuel(INSTANTIATE_FUEL)
            .map_err(|e| VmError::Engine(e.to_string()))?;

        // No host functions: a guest can observe its arguments and nothing else.
        let linker = Linker::new(&self.engine);
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| VmError::Instantiation(e.to_string()))?;

        let entry = instance
            .get_typed_func::<(i64, i64, i64), i64>(&mut store, ON_BALANCE_CHANGE_EXPORT)
            .map_err(|e| VmError::MissingExport(e.to_string()))?;
        let memory = instance.get_memory(&mut store, MEMORY_EXPORT);

        Ok(WasmExtension {
            name: name.to_string(),
            guest: Mutex::new(Guest { store, entry, memory }),
        })
    }

    pub fn load_file(&self, path: &Path) -> Result<WasmExtension, VmError> {
        let bytes = std::fs::read(path).map_err(|source| VmError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wasm".to_string());
        self.load(&name, &bytes)
    }
}

struct Guest {
    store: Store<StoreLimits>,
    entry: TypedFunc<(i64, i64, i64), i64>,
    memory: Option<Memory>,
}

/// A wasm module bound to the extension ABI. The instance, and so its
/// globals and memory, persists between notifications.
pub struct WasmExtension {
    name: String,
    guest: Mutex<Guest>,
}

impl Extension for WasmExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_balance_change(
        &self,
        call: &mut Invocation<'_>,
        update: &BalanceUpdate<'_>,
    ) -> Result<(), ExtensionFault> {
        let mut guest = self.guest.lock().map_err(|_| ExtensionFault::Unavailable)?;
        let Guest { store, entry, memory } = &mut *guest;

        let granted = call.remaining();
        store
            .set_fuel(granted)
            .map_err(|e| ExtensionFault::Trapped(e.to_string()))?;

        let args = (
            account_tag(update.account) as i64,
            update.old_balance as i64,
            update.new_balance as i64,
        );
        let result = entry.call(&mut *store, args);
        let used = granted.saturating_sub(store.get_fuel().unwrap_or(0));

        let packed = match result {
            Ok(packed) => packed as u64,
            Err(err) => {
                let _ = call.consume(used);
                return match err.downcast_ref::<Trap>() {
                    Some(Trap::OutOfFuel) => Err(ExtensionFault::OutOfBudget),
                    _ => Err(ExtensionFault::Trapped(err.to_string())),
                };
            }
        };
        call.consume(used)?;

        let ptr = (packed >> 32) as usize;
        let len = (packed & 0xffff_ffff) as usize;
        let copy = len.min(call.return_cap());
        if copy > 0 {
            // Out-of-range return data counts as none
            let end = ptr.saturating_add(copy);
            if let Some(bytes) = memory.as_ref().and_then(|m| m.data(&*store).get(ptr..end)) {
                call.set_return_data(bytes);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ExtensionId;
    use crate::config::LedgerConfig;
    use crate::ledger::Ledger;

    const WELL_BEHAVED: &str = r#"
        (module
          (memory (export "memory") 1)
          (data (i32.const 0) "\01")
          (func (export "on_balance_change") (param i64 i64 i64) (result i64)
            (i64.const 1)))
    "#;

    const SPINNER: &str = r#"
        (module
          (func (export "on_balance_change") (param i64 i64 i64) (result i64)
            (loop $spin (br $spin))
            (i64.const 0)))
    "#;

    const TRAPPING: &str = r#"
        (module
          (func (export "on_balance_change") (param i64 i64 i64) (result i64)
            unreachable))
    "#;

    // Claims 4 GiB of return data starting at 0
    const GAS_BOMB: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "on_balance_change") (param i64 i64 i64) (result i64)
            (i64.const 4294967295)))
    "#;

    const OUT_OF_BOUNDS: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "on_balance_change") (param i64 i64 i64) (result i64)
            (i64.const 0x0001000000000008)))
    "#;

    // Writes the result of an oversized table.grow to memory[0..4]
    const TABLE_GROWER: &str = r#"
        (module
          (memory (export "memory") 1)
          (table $t 1 funcref)
          (func (export "on_balance_change") (param i64 i64 i64) (result i64)
            (i32.store (i32.const 0)
              (table.grow $t (ref.null func) (i32.const 200000000)))
            (i64.const 4)))
    "#;

    fn update() -> BalanceUpdate<'static> {
        BalanceUpdate { account: "alice", old_balance: 0, new_balance: 10 }
    }

    fn run(source: &str, budget: u64) -> (Result<(), ExtensionFault>, u64, Vec<u8>) {
        let vm = ExtensionVm::new().unwrap();
        let ext = vm.load("test", source.as_bytes()).unwrap();
        let ledger = Ledger::new(LedgerConfig::default());
        let mut call = Invocation::new(&ledger, ExtensionId::derive(0, "test"), budget, 32);
        let result = ext.on_balance_change(&mut call, &update());
        (result, call.consumed(), call.return_data().to_vec())
    }

    #[test]
    fn test_well_behaved_guest_returns_data() {
        let (result, consumed, data) = run(WELL_BEHAVED, 10_000);
        assert!(result.is_ok());
        assert!(consumed > 0 && consumed < 10_000);
        assert_eq!(data, vec![1]);
    }

    #[test]
    fn test_spinning_guest_runs_out_of_fuel() {
        let (result, consumed, _) = run(SPINNER, 50_000);
        assert_eq!(result, Err(ExtensionFault::OutOfBudget));
        assert_eq!(consumed, 50_000);
    }

    #[test]
    fn test_trap_is_reported() {
        let (result, _, _) = run(TRAPPING, 10_000);
        assert!(matches!(result, Err(ExtensionFault::Trapped(_))));
    }

    #[test]
    fn test_gas_bomb_copies_only_the_cap() {
        let (result, _, data) = run(GAS_BOMB, 10_000);
        assert!(result.is_ok());
        assert_eq!(data.len(), 32);
    }

    #[test]
    fn test_out_of_bounds_return_is_ignored() {
        let (result, _, data) = run(OUT_OF_BOUNDS, 10_000);
        assert!(result.is_ok());
        assert!(data.is_empty());
    }

    #[test]
    fn test_table_growth_is_capped() {
        let (result, _, data) = run(TABLE_GROWER, 200_000);
        assert!(result.is_ok());
        assert_eq!(data, (-1i32).to_le_bytes().to_vec());
    }

    #[test]
    fn test_oversized_initial_table_rejected() {
        let vm = ExtensionVm::new().unwrap();
        let res = vm.load(
            "big-table",
            br#"(module (table 20000 funcref) (func (export "on_balance_change") (param i64 i64 i64) (result i64) (i64.const 0)))"#,
        );
        assert!(matches!(res, Err(VmError::Instantiation(_))));
    }

    #[test]
    fn test_missing_export_rejected() {
        let vm = ExtensionVm::new().unwrap();
        let res = vm.load("empty", br#"(module (func (export "run")))"#);
        assert!(matches!(res, Err(VmError::MissingExport(_))));
    }

    #[test]
    fn test_imports_are_not_satisfied() {
        let vm = ExtensionVm::new().unwrap();
        let res = vm.load(
            "importer",
            br#"(module (import "env" "transfer" (func)) (func (export "on_balance_change") (param i64 i64 i64) (result i64) (i64.const 0)))"#,
        );
        assert!(matches!(res, Err(VmError::Instantiation(_))));
    }

    #[test]
    fn test_spinning_guest_does_not_block_transfer() {
        let ledger = Ledger::new(LedgerConfig::default());
        let vm = ExtensionVm::new().unwrap();
        let spinner = ledger.deploy(std::sync::Arc::new(vm.load("spinner", SPINNER.as_bytes()).unwrap()));

        ledger.mint("alice", 100).unwrap();
        ledger.add_extension("alice", spinner).unwrap();
        let receipt = ledger.transfer("alice", "bob", 40).unwrap();

        assert_eq!(ledger.balance_of("alice"), 60);
        assert_eq!(ledger.balance_of("bob"), 40);
        assert_eq!(receipt.invocations, 1);
        assert!(receipt.units_used < 2 * ledger.config().extension_call_budget);
    }
}
