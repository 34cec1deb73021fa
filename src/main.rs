//! Mailforge CLI entrypoint.

use std::io::Write;
use std::process::ExitCode;

use mailforge::cli::{self, Cli};
use mailforge::config::{load_dotenv, AzureCredentials, SettingsValidator};
use mailforge::error::Result;
use mailforge::provision::Provisioner;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", cli::format_failure(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    if let Some(path) = load_dotenv() {
        debug!("Loaded environment from {}", path.display());
    }

    let (settings, auto_approve) = cli.command.into_settings();

    // Everything is validated before the first cloud call.
    let result = SettingsValidator::new().validate(&settings)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    let credentials = AzureCredentials::from_env()?;

    eprintln!("{}", cli::format_preview(&settings));
    if !auto_approve && !confirm()? {
        eprintln!("Provisioning cancelled.");
        return Ok(());
    }

    info!("Provisioning mail server {}", settings.fqdn());
    let providers = mailforge::azure::build_providers(credentials)?;
    let provisioner = Provisioner::new(providers, settings.clone());
    let outcome = provisioner.run().await?;

    eprintln!("{}", cli::format_success(&outcome, &settings));
    Ok(())
}

/// Asks for interactive confirmation.
fn confirm() -> Result<bool> {
    eprint!("Do you want to create these resources? [y/N]: ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
