use std::sync::Arc;

use clap::Args;
use cmdb_sync_core::config::AppConfig;
use cmdb_sync_core::domain::ticket::TicketNumber;
use cmdb_sync_core::source::RecordSource;
use cmdb_sync_core::{TicketError, TicketManager};

use crate::commands::{block_on, connect, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct ResolveArgs {
    #[arg(long, help = "Incident number, e.g. INC0010001")]
    pub ticket: String,
    #[arg(long, default_value = "CMDB record corrected", help = "Resolution notes")]
    pub notes: String,
}

pub fn run(config: &AppConfig, args: &ResolveArgs) -> CommandResult {
    if let Err(error) = config.backend.connection_check() {
        return CommandResult::failure("resolve", "config_validation", error.to_string(), 2);
    }
    match connect(config) {
        Ok(source) => run_with(source, config, args),
        Err(error) => CommandResult::failure("resolve", "config_validation", error.to_string(), 2),
    }
}

pub fn run_with(
    source: Arc<dyn RecordSource>,
    config: &AppConfig,
    args: &ResolveArgs,
) -> CommandResult {
    let tickets =
        TicketManager::new(source, config.backend.incident_table.clone(), config.ticket.clone());
    let number = TicketNumber(args.ticket.trim().to_string());

    match block_on("resolve", tickets.resolve_ticket(&number, &args.notes)) {
        Ok(Ok(())) => CommandResult::success("resolve", format!("resolved {number}")),
        Ok(Err(error @ TicketError::NotFound(_))) => {
            CommandResult::failure("resolve", "ticket_not_found", error.to_string(), 1)
        }
        Ok(Err(error)) => CommandResult::failure("resolve", "backend", error.to_string(), 1),
        Err(failure) => failure,
    }
}
