//! Scripted ledger runs
//!
//! A scenario declares extensions (built-in mirrors or wasm modules) and a
//! list of ledger operations. Running it yields a report of every step's
//! receipt or error plus the final state of each account.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::account::ExtensionId;
use crate::config::LedgerConfig;
use crate::dispatch::Receipt;
use crate::error::LedgerError;
use crate::extension::MirrorExtension;
use crate::ledger::Ledger;
use crate::vm::{ExtensionVm, VmError};

#[derive(Debug, Deserialize, Clone)]
pub struct Scenario {
    #[serde(default)]
    pub extensions: Vec<ExtensionSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    Mirror,
    Wasm,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtensionSpec {
    pub name: String,
    pub kind: ExtensionKind,
    /// Module path for `wasm` extensions, relative to the scenario file
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// Run the step under this many computation units
    pub budget: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    Mint { to: String, amount: u64 },
    Burn { from: String, amount: u64 },
    Transfer { from: String, to: String, amount: u64 },
    AddExtension { account: String, extension: String },
    RemoveExtension { account: String, extension: String },
    RemoveAllExtensions { account: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error("extension `{0}` is declared twice")]
    DuplicateExtension(String),
    #[error("wasm extension `{0}` needs a path")]
    MissingPath(String),
    #[error("step {step}: unknown extension `{name}`")]
    UnknownExtension { step: usize, name: String },
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub extensions: BTreeMap<String, ExtensionId>,
    pub steps: Vec<StepReport>,
    pub accounts: Vec<AccountReport>,
    pub total_supply: u64,
}

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountReport {
    pub account: String,
    pub balance: u64,
    pub extensions: Vec<ExtensionId>,
}

impl Scenario {
    pub fn from_toml(text: &str, origin: &str) -> Result<Self, ScenarioError> {
        toml::from_str(text).map_err(|source| ScenarioError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text, &path.display().to_string())
    }

    /// Deploy the declared extensions on a fresh ledger and play every step.
    /// Ledger errors are recorded per step; only setup problems abort the run.
    pub fn run(&self, config: LedgerConfig, base_dir: &Path) -> Result<Report, ScenarioError> {
        let ledger = Ledger::new(config);
        let names = self.deploy_extensions(&ledger, base_dir)?;

        let mut steps = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let result = execute_step(&ledger, &names, index, step)?;
            match &result {
                Ok(receipt) => info!(
                    step = index,
                    units = receipt.units_used,
                    invocations = receipt.invocations,
                    "{:?}",
                    step.action
                ),
                Err(e) => warn!(step = index, "{:?} failed: {}", step.action, e),
            }
            let (receipt, error) = match result {
                Ok(receipt) => (Some(receipt), None),
                Err(e) => (None, Some(e.to_string())),
            };
            steps.push(StepReport {
                index,
                action: step.action.clone(),
                receipt,
                error,
            });
        }

        let accounts = ledger
            .accounts()
            .into_iter()
            .map(|account| AccountReport {
                balance: ledger.balance_of(&account),
                extensions: ledger.extensions(&account),
                account,
            })
            .collect();

        Ok(Report {
            extensions: names.into_iter().collect(),
            steps,
            accounts,
            total_supply: ledger.total_supply(),
        })
    }

    fn deploy_extensions(&self, ledger: &Ledger, base_dir: &Path) -> Result<HashMap<String, ExtensionId>, ScenarioError> {
        let mut names = HashMap::new();
        let vm = ExtensionVm::new()?;

        for spec in &self.extensions {
            if names.contains_key(&spec.name) {
                return Err(ScenarioError::DuplicateExtension(spec.name.clone()));
            }
            let id = match spec.kind {
                ExtensionKind::Mirror => ledger.deploy(Arc::new(MirrorExtension::new(spec.name.clone()))),
                ExtensionKind::Wasm => {
                    let path = spec
                        .path
                        .as_ref()
                        .ok_or_else(|| ScenarioError::MissingPath(spec.name.clone()))?;
                    let bytes = std::fs::read(base_dir.join(path)).map_err(|source| ScenarioError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
                    ledger.deploy(Arc::new(vm.load(&spec.name, &bytes)?))
                }
            };
            info!(name = %spec.name, extension = %id, "deployed");
            names.insert(spec.name.clone(), id);
        }
        Ok(names)
    }
}

fn resolve_extension(
    names: &HashMap<String, ExtensionId>,
    step: usize,
    name: &str,
) -> Result<ExtensionId, ScenarioError> {
    if let Some(id) = names.get(name) {
        return Ok(*id);
    }
    name.parse().map_err(|_| ScenarioError::UnknownExtension {
        step,
        name: name.to_string(),
    })
}

fn execute_step(
    ledger: &Ledger,
    names: &HashMap<String, ExtensionId>,
    index: usize,
    step: &Step,
) -> Result<Result<Receipt, LedgerError>, ScenarioError> {
    let budgeted = step.budget.map(|units| ledger.with_budget(units));

    macro_rules! exec {
        ($method:ident ( $($arg:expr),* )) => {
            match &budgeted {
                Some(b) => b.$method($($arg),*),
                None => ledger.$method($($arg),*),
            }
        };
    }

    let result = match &step.action {
        Action::Mint { to, amount } => exec!(mint(to, *amount)),
        Action::Burn { from, amount } => exec!(burn(from, *amount)),
        Action::Transfer { from, to, amount } => exec!(transfer(from, to, *amount)),
        Action::AddExtension { account, extension } => {
            let ext = resolve_extension(names, index, extension)?;
            exec!(add_extension(account, ext))
        }
        Action::RemoveExtension { account, extension } => {
            let ext = resolve_extension(names, index, extension)?;
            exec!(remove_extension(account, ext))
        }
        Action::RemoveAllExtensions { account } => exec!(remove_all_extensions(account)),
    };
    Ok(result)
}
