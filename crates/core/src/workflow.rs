//! Validation workflow: config check, record lookup, comparison and,
//! on failure, ticket creation. A demo path skips the backend entirely.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cmdb::fetch_vm_record;
use crate::config::AppConfig;
use crate::domain::discrepancy::{Discrepancy, ValidationResult};
use crate::domain::record::{ExpectedValues, Record};
use crate::domain::ticket::TicketNumber;
use crate::source::RecordSource;
use crate::tickets::TicketManager;
use crate::validation::comparator::{simulated_record, Comparator};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Simulate,
    ConfigCheck,
    FetchRecord,
    Compare,
    Ticket,
    Done,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulate => "simulate",
            Self::ConfigCheck => "config_check",
            Self::FetchRecord => "fetch_record",
            Self::Compare => "compare",
            Self::Ticket => "ticket",
            Self::Done => "done",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidationRequest {
    pub vm_name: String,
    pub environment: String,
    pub expected: ExpectedValues,
    pub create_ticket: bool,
    pub demo: bool,
    pub lookup_filters: Vec<(String, String)>,
}

impl ValidationRequest {
    /// Expected values start out as the VM name and environment.
    pub fn new(vm_name: impl Into<String>, environment: impl Into<String>) -> Self {
        let vm_name = vm_name.into();
        let environment = environment.into();
        let expected = ExpectedValues::new()
            .with("name", vm_name.clone())
            .with("environment", environment.clone());
        Self {
            vm_name,
            environment,
            expected,
            create_ticket: true,
            demo: false,
            lookup_filters: Vec::new(),
        }
    }

    pub fn with_expected(
        mut self,
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.expected.insert(field, value);
        self
    }

    pub fn without_ticket(mut self) -> Self {
        self.create_ticket = false;
        self
    }

    pub fn demo(mut self) -> Self {
        self.demo = true;
        self
    }
}

/// Everything a run produced; serialized as the `--json` output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub vm_name: String,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
    pub passed: bool,
    pub demo_mode: bool,
    pub cmdb_record: Option<Record>,
    pub discrepancies: Vec<Discrepancy>,
    pub ticket_number: Option<TicketNumber>,
    pub error: Option<String>,
    pub stages: Vec<WorkflowStage>,
}

impl ValidationReport {
    fn start(request: &ValidationRequest) -> Self {
        Self {
            vm_name: request.vm_name.clone(),
            environment: request.environment.clone(),
            timestamp: Utc::now(),
            passed: false,
            demo_mode: request.demo,
            cmdb_record: None,
            discrepancies: Vec::new(),
            ticket_number: None,
            error: None,
            stages: Vec::new(),
        }
    }

    fn apply(&mut self, result: ValidationResult) {
        self.passed = result.passed;
        self.discrepancies = result.discrepancies;
    }

    fn enter(&mut self, stage: WorkflowStage) {
        debug!(event_name = "workflow.stage", stage = stage.as_str(), "entering stage");
        self.stages.push(stage);
    }

    fn finish(mut self) -> (bool, Self) {
        self.enter(WorkflowStage::Done);
        (self.passed, self)
    }
}

struct ConnectedBackend {
    source: Arc<dyn RecordSource>,
    cmdb_table: String,
    tickets: TicketManager,
}

/// Backend availability decided once, when the workflow is built.
enum Backend {
    Connected(ConnectedBackend),
    Unconfigured { reason: String },
}

pub struct ValidationWorkflow {
    comparator: Comparator,
    backend: Backend,
}

impl ValidationWorkflow {
    fn new(comparator: Comparator, backend: Backend) -> Self {
        Self { comparator, backend }
    }

    pub fn connected(source: Arc<dyn RecordSource>, config: &AppConfig) -> Self {
        let tickets = TicketManager::new(
            source.clone(),
            config.backend.incident_table.clone(),
            config.ticket.clone(),
        );
        Self::new(
            Comparator::default(),
            Backend::Connected(ConnectedBackend {
                source,
                cmdb_table: config.backend.cmdb_table.clone(),
                tickets,
            }),
        )
    }

    pub fn unconfigured(reason: impl Into<String>) -> Self {
        Self::new(Comparator::default(), Backend::Unconfigured { reason: reason.into() })
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Only calls `connect` when the connection settings are complete. A
    /// failed connect leaves the workflow unconfigured.
    pub fn from_config<F, E>(config: &AppConfig, connect: F) -> Self
    where
        F: FnOnce(&AppConfig) -> Result<Arc<dyn RecordSource>, E>,
        E: fmt::Display,
    {
        if let Err(error) = config.backend.connection_check() {
            warn!(
                event_name = "workflow.backend.unconfigured",
                error = %error,
                "backend credentials missing; only demo runs are possible"
            );
            return Self::unconfigured(error.to_string());
        }

        match connect(config) {
            Ok(source) => Self::connected(source, config),
            Err(error) => {
                warn!(
                    event_name = "workflow.backend.connect_failed",
                    error = %error,
                    "could not set up backend client"
                );
                Self::unconfigured(error.to_string())
            }
        }
    }

    pub fn ticket_manager(&self) -> Option<&TicketManager> {
        match &self.backend {
            Backend::Connected(backend) => Some(&backend.tickets),
            Backend::Unconfigured { .. } => None,
        }
    }

    pub async fn run(&self, request: &ValidationRequest) -> (bool, ValidationReport) {
        info!(
            event_name = "workflow.started",
            vm_name = %request.vm_name,
            environment = %request.environment,
            demo_mode = request.demo,
            "CMDB validation workflow started"
        );

        let mut report = ValidationReport::start(request);

        if request.demo {
            report.enter(WorkflowStage::Simulate);
            info!(event_name = "workflow.simulate", "running in demo mode, backend is bypassed");
            let record =
                simulated_record(&request.vm_name, &request.environment, &request.expected);
            report.apply(self.comparator.compare(&request.expected, Some(&record)));
            report.cmdb_record = Some(record);
            log_verdict(&report);
            return report.finish();
        }

        report.enter(WorkflowStage::ConfigCheck);
        let backend = match &self.backend {
            Backend::Connected(backend) => backend,
            Backend::Unconfigured { reason } => {
                error!(
                    event_name = "workflow.config_check.failed",
                    reason = %reason,
                    "configuration incomplete; set SNOW_INSTANCE, SNOW_USERNAME, SNOW_PASSWORD"
                );
                report.error = Some(format!("configuration incomplete: {reason}"));
                return report.finish();
            }
        };

        report.enter(WorkflowStage::FetchRecord);
        let record = fetch_vm_record(
            backend.source.as_ref(),
            &backend.cmdb_table,
            &request.vm_name,
            &request.lookup_filters,
        )
        .await;

        report.enter(WorkflowStage::Compare);
        report.apply(self.comparator.compare(&request.expected, record.as_ref()));
        report.cmdb_record = record;
        log_verdict(&report);

        if !report.passed && request.create_ticket {
            report.enter(WorkflowStage::Ticket);
            report.ticket_number = backend
                .tickets
                .open_ticket(&request.vm_name, &request.environment, &report.discrepancies, None)
                .await
                .ok();
        }

        report.finish()
    }
}

fn log_verdict(report: &ValidationReport) {
    if report.passed {
        info!(
            event_name = "workflow.validation.passed",
            minor_discrepancies = report.discrepancies.len(),
            "CMDB validation passed"
        );
        return;
    }

    error!(event_name = "workflow.validation.failed", "CMDB validation failed");
    for discrepancy in &report.discrepancies {
        error!(field = %discrepancy.field, "{}", discrepancy.summary_line());
    }
}
