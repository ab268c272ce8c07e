use std::error::Error;
use std::path::Path;
use tracing::info;

use crate::config::LedgerConfig;
use crate::scenario::Scenario;
use crate::vm::ExtensionVm;

pub fn handle_run(config: LedgerConfig, scenario_path: &Path, pretty: bool) -> Result<(), Box<dyn Error>> {
    let scenario = Scenario::load(scenario_path)?;
    let base_dir = scenario_path.parent().unwrap_or_else(|| Path::new("."));
    info!(
        steps = scenario.steps.len(),
        extensions = scenario.extensions.len(),
        "Running scenario {}",
        scenario_path.display()
    );

    let report = scenario.run(config, base_dir)?;
    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);
    Ok(())
}

pub fn handle_check(module_path: &Path) -> Result<(), Box<dyn Error>> {
    let vm = ExtensionVm::new()?;
    vm.load_file(module_path)?;
    println!("{}: ok", module_path.display());
    Ok(())
}
