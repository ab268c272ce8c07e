use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hook_ledger::cli::{run, Cli, Commands};
use hook_ledger::config::{ConfigSource, HookLedgerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let loaded = HookLedgerConfig::load_or_init(&cli.config);
    let config = match &loaded {
        Ok((config, _)) => config.clone(),
        Err(_) => HookLedgerConfig::default(),
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match loaded {
        Ok((_, ConfigSource::File)) => info!("Config loaded from {}", cli.config.display()),
        Ok((_, ConfigSource::CreatedDefault)) => {
            info!("Config file not found at '{}'. Created default.", cli.config.display())
        }
        Err(e) => warn!("{}. Using defaults.", e),
    }
    info!(
        max_extensions = config.ledger.max_extensions_per_account,
        call_budget = config.ledger.extension_call_budget,
        "hook-ledger starting"
    );

    match cli.command {
        Commands::Run { scenario, pretty } => run::handle_run(config.ledger, &scenario, pretty),
        Commands::Check { module } => run::handle_check(&module),
    }
}
