pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cmdb_sync_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing::Level;

use commands::inventory::InventoryArgs;
use commands::resolve::ResolveArgs;
use commands::validate::ValidateArgs;
use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "cmdb-sync",
    about = "Validate CMDB records for provisioned VMs",
    long_about = "Compare a VM's CMDB record with its provisioned values, open an incident \
                  when they drift, and manage those incidents.",
    after_help = "Examples:\n  cmdb-sync validate -n dev-web-01 -e dev --expected-cpu 2\n  \
                  cmdb-sync validate -n dev-web-01 -e dev --demo --json\n  \
                  cmdb-sync resolve --ticket INC0010001\n  cmdb-sync config"
)]
pub struct Cli {
    #[arg(long, short = 'v', global = true, help = "Enable debug logging")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate one VM's CMDB record and open an incident on failure")]
    Validate(ValidateArgs),
    #[command(about = "Mark an incident opened for a CMDB sync failure as resolved")]
    Resolve(ResolveArgs),
    #[command(about = "List CMDB records of one environment")]
    Inventory(InventoryArgs),
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

fn init_logging(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.logging.level.parse::<Level>().unwrap_or(Level::INFO)
    };
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(LoadOptions::default()),
        Command::Validate(args) => {
            let loaded = AppConfig::load(LoadOptions::default());
            match &loaded {
                Ok(config) => init_logging(config, cli.verbose),
                Err(_) => init_logging(&AppConfig::default(), cli.verbose),
            }
            commands::validate::run_loaded(loaded, &args)
        }
        command => match AppConfig::load(LoadOptions::default()) {
            Ok(config) => {
                init_logging(&config, cli.verbose);
                dispatch(command, &config)
            }
            Err(error) => {
                CommandResult::failure("cmdb-sync", "config_validation", error.to_string(), 2)
            }
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn dispatch(command: Command, config: &AppConfig) -> CommandResult {
    match command {
        Command::Validate(args) => commands::validate::run(config, &args),
        Command::Resolve(args) => commands::resolve::run(config, &args),
        Command::Inventory(args) => commands::inventory::run(config, &args),
        Command::Config => commands::config::run(LoadOptions::default()),
    }
}
