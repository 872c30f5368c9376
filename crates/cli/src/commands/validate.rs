use clap::Args;
use cmdb_sync_core::config::{AppConfig, ConfigError};
use cmdb_sync_core::workflow::{ValidationReport, ValidationRequest, ValidationWorkflow};
use tracing::{debug, warn};

use crate::commands::{block_on, connect, CommandResult};

pub const ENVIRONMENTS: [&str; 4] = ["dev", "staging", "prod", "production"];

const RULE: &str = "============================================================";

#[derive(Debug, Clone, Default, Args)]
pub struct ValidateArgs {
    #[arg(long, short = 'n', help = "VM name to look up in the CMDB")]
    pub vm_name: String,
    #[arg(long, short = 'e', value_parser = ENVIRONMENTS, help = "Target environment")]
    pub environment: String,
    #[arg(long, help = "Expected CPU count")]
    pub expected_cpu: Option<u32>,
    #[arg(long, help = "Expected memory in MB")]
    pub expected_memory: Option<u32>,
    #[arg(long, help = "Expected IP address")]
    pub expected_ip: Option<String>,
    #[arg(
        long = "filter",
        value_name = "FIELD=VALUE",
        value_parser = parse_filter,
        help = "Additional exact-match lookup filter (repeatable)"
    )]
    pub filters: Vec<(String, String)>,
    #[arg(long, help = "Do not open an incident on failure")]
    pub no_incident: bool,
    #[arg(long, help = "Validate against a simulated record without backend calls")]
    pub demo: bool,
    #[arg(long, help = "Emit the full result bundle as JSON")]
    pub json: bool,
}

pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected FIELD=VALUE, got `{raw}`")),
    }
}

/// Name and environment are always expected; the optional values only
/// when given and non-zero.
pub fn build_request(args: &ValidateArgs) -> ValidationRequest {
    let mut request = ValidationRequest::new(&args.vm_name, &args.environment);
    if let Some(cpu) = args.expected_cpu.filter(|cpu| *cpu > 0) {
        request = request.with_expected("cpu_count", cpu);
    }
    if let Some(memory) = args.expected_memory.filter(|memory| *memory > 0) {
        request = request.with_expected("ram", memory);
    }
    if let Some(ip) = args.expected_ip.as_deref().filter(|ip| !ip.is_empty()) {
        request = request.with_expected("ip_address", ip);
    }
    request.create_ticket = !args.no_incident;
    request.demo = args.demo;
    request.lookup_filters = args.filters.clone();
    request
}

pub fn run(config: &AppConfig, args: &ValidateArgs) -> CommandResult {
    let workflow = if args.demo {
        ValidationWorkflow::unconfigured("demo mode")
    } else {
        ValidationWorkflow::from_config(config, connect)
    };
    execute(&workflow, args)
}

/// Runs validation from a config load attempt. Demo runs fall back to
/// defaults; other runs report the load error in the result bundle.
pub fn run_loaded(loaded: Result<AppConfig, ConfigError>, args: &ValidateArgs) -> CommandResult {
    match loaded {
        Ok(config) => run(&config, args),
        Err(error) if args.demo => {
            warn!(
                event_name = "config.load_failed",
                error = %error,
                "ignoring configuration error in demo mode"
            );
            run(&AppConfig::default(), args)
        }
        Err(error) => execute(&ValidationWorkflow::unconfigured(error.to_string()), args),
    }
}

pub fn execute(workflow: &ValidationWorkflow, args: &ValidateArgs) -> CommandResult {
    let request = build_request(args);
    debug!(expected = ?request.expected, "built expected values");

    let (passed, report) = match block_on("validate", workflow.run(&request)) {
        Ok(outcome) => outcome,
        Err(failure) => return failure,
    };

    let output = if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(encoded) => encoded,
            Err(error) => {
                return CommandResult::failure("validate", "serialization", error.to_string(), 1)
            }
        }
    } else {
        render_report(&report)
    };

    CommandResult { exit_code: if passed { 0 } else { 1 }, output }
}

pub fn render_report(report: &ValidationReport) -> String {
    let mut lines = vec![
        RULE.to_string(),
        "  VALIDATION RESULTS".to_string(),
        RULE.to_string(),
        format!("  Status: {}", if report.passed { "PASSED" } else { "FAILED" }),
        format!("  VM: {}", report.vm_name),
        format!("  Environment: {}", report.environment),
    ];
    if report.demo_mode {
        lines.push("  Mode: demo (simulated record)".to_string());
    }

    if !report.discrepancies.is_empty() {
        lines.push(format!("  Discrepancies: {}", report.discrepancies.len()));
        for discrepancy in &report.discrepancies {
            lines.push(format!("    - [{}] {}", discrepancy.severity, discrepancy.field));
        }
    }
    if let Some(number) = &report.ticket_number {
        lines.push(format!("  Incident: {number}"));
    }
    if let Some(error) = &report.error {
        lines.push(format!("  Error: {error}"));
    }

    lines.push(RULE.to_string());
    lines.join("\n")
}
