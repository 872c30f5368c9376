use std::sync::Arc;

use clap::Args;
use cmdb_sync_core::cmdb::list_environment_records;
use cmdb_sync_core::config::AppConfig;
use cmdb_sync_core::domain::record::{display_value, Record};
use cmdb_sync_core::source::RecordSource;
use serde::Serialize;

use crate::commands::validate::ENVIRONMENTS;
use crate::commands::{block_on, connect, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct InventoryArgs {
    #[arg(long, short = 'e', value_parser = ENVIRONMENTS, help = "Environment to list")]
    pub environment: String,
    #[arg(long, help = "Emit machine-readable JSON output")]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct InventoryOutput<'a> {
    environment: &'a str,
    count: usize,
    records: &'a [Record],
}

pub fn run(config: &AppConfig, args: &InventoryArgs) -> CommandResult {
    if let Err(error) = config.backend.connection_check() {
        return CommandResult::failure("inventory", "config_validation", error.to_string(), 2);
    }
    match connect(config) {
        Ok(source) => run_with(source, config, args),
        Err(error) => {
            CommandResult::failure("inventory", "config_validation", error.to_string(), 2)
        }
    }
}

pub fn run_with(
    source: Arc<dyn RecordSource>,
    config: &AppConfig,
    args: &InventoryArgs,
) -> CommandResult {
    let lookup =
        list_environment_records(source.as_ref(), &config.backend.cmdb_table, &args.environment);
    let records = match block_on("inventory", lookup) {
        Ok(records) => records,
        Err(failure) => return failure,
    };

    let output = if args.json {
        let payload = InventoryOutput {
            environment: &args.environment,
            count: records.len(),
            records: &records,
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(encoded) => encoded,
            Err(error) => {
                return CommandResult::failure("inventory", "serialization", error.to_string(), 1)
            }
        }
    } else {
        render_inventory(&args.environment, &records)
    };

    CommandResult { exit_code: 0, output }
}

fn render_inventory(environment: &str, records: &[Record]) -> String {
    let mut lines = vec![format!("CMDB inventory for {environment}: {} record(s)", records.len())];
    lines.extend(records.iter().map(|record| {
        format!(
            "- {} ip={} state={} sys_id={}",
            display_value(record.get("name")),
            display_value(record.get("ip_address")),
            display_value(record.get("state")),
            display_value(record.get("sys_id")),
        )
    }));
    lines.join("\n")
}
