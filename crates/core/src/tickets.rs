//! Incident lifecycle for failed validations: open on failure, resolve later.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info};

use crate::config::TicketConfig;
use crate::domain::discrepancy::Discrepancy;
use crate::domain::record::{value_text, Record};
use crate::domain::ticket::{correlation_id, Ticket, TicketNumber};
use crate::errors::TicketError;
use crate::escalation::escalate;
use crate::source::{RecordQuery, RecordSource};

/// Backend state code for a resolved incident.
pub const RESOLVED_STATE: &str = "6";
pub const RESOLVED_CLOSE_CODE: &str = "Solved (Permanently)";

#[derive(Clone)]
pub struct TicketManager {
    source: Arc<dyn RecordSource>,
    table: String,
    defaults: TicketConfig,
}

impl TicketManager {
    pub fn new(
        source: Arc<dyn RecordSource>,
        table: impl Into<String>,
        defaults: TicketConfig,
    ) -> Self {
        Self { source, table: table.into(), defaults }
    }

    pub fn build_ticket(
        &self,
        vm_name: &str,
        environment: &str,
        discrepancies: &[Discrepancy],
        extra_notes: Option<&str>,
        opened_at: DateTime<Utc>,
    ) -> Ticket {
        Ticket {
            short_description: format!("CMDB Sync Failure: {vm_name} ({environment})"),
            description: render_description(
                vm_name,
                environment,
                discrepancies,
                extra_notes,
                opened_at,
            ),
            category: self.defaults.category.clone(),
            subcategory: self.defaults.subcategory.clone(),
            priority: escalate(discrepancies),
            assignment_group: self.defaults.assignment_group.clone(),
            caller_id: self.defaults.caller_id.clone(),
            configuration_item: vm_name.to_string(),
            environment: environment.to_string(),
            correlation_id: correlation_id(vm_name, opened_at),
            opened_at,
        }
    }

    pub async fn open_ticket(
        &self,
        vm_name: &str,
        environment: &str,
        discrepancies: &[Discrepancy],
        extra_notes: Option<&str>,
    ) -> Result<TicketNumber, TicketError> {
        let ticket =
            self.build_ticket(vm_name, environment, discrepancies, extra_notes, Utc::now());
        self.submit(&ticket).await
    }

    pub async fn submit(&self, ticket: &Ticket) -> Result<TicketNumber, TicketError> {
        info!(
            event_name = "ticket.create.started",
            vm_name = %ticket.configuration_item,
            correlation_id = %ticket.correlation_id,
            impact = ticket.priority.impact.code(),
            "creating incident for CMDB sync failure"
        );

        let created =
            self.source.create(&self.table, &ticket.to_payload()).await.map_err(|error| {
                error!(
                    event_name = "ticket.create.failed",
                    error = %error,
                    "failed to create incident"
                );
                TicketError::from(error)
            })?;

        match value_text(created.get("number")).filter(|number| !number.is_empty()) {
            Some(number) => {
                info!(
                    event_name = "ticket.create.completed",
                    ticket_number = %number,
                    "created incident"
                );
                Ok(TicketNumber(number))
            }
            None => {
                error!(
                    event_name = "ticket.create.failed",
                    "incident created but no number returned"
                );
                Err(TicketError::MissingNumber)
            }
        }
    }

    /// Looks the ticket up by number, then marks it resolved. Nothing is
    /// written when the lookup fails or finds no match.
    pub async fn resolve_ticket(
        &self,
        number: &TicketNumber,
        resolution_notes: &str,
    ) -> Result<(), TicketError> {
        info!(
            event_name = "ticket.resolve.started",
            ticket_number = %number,
            "resolving incident"
        );

        let query =
            RecordQuery::new().filter("number", number.0.clone()).fields(["sys_id"]).limit(1);
        let matches = match self.source.query(&self.table, &query).await {
            Ok(matches) => matches,
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => {
                error!(
                    event_name = "ticket.resolve.failed",
                    ticket_number = %number,
                    error = %error,
                    "failed to find incident"
                );
                return Err(error.into());
            }
        };

        let Some(found) = matches.into_iter().next() else {
            error!(
                event_name = "ticket.resolve.failed",
                ticket_number = %number,
                "incident not found"
            );
            return Err(TicketError::NotFound(number.0.clone()));
        };
        let sys_id = value_text(found.get("sys_id"))
            .filter(|sys_id| !sys_id.is_empty())
            .ok_or_else(|| TicketError::MissingSysId(number.0.clone()))?;

        let payload = resolution_payload(resolution_notes);
        self.source.update(&self.table, &sys_id, &payload).await.map_err(|error| {
            error!(
                event_name = "ticket.resolve.failed",
                ticket_number = %number,
                error = %error,
                "failed to resolve incident"
            );
            TicketError::from(error)
        })?;

        info!(
            event_name = "ticket.resolve.completed",
            ticket_number = %number,
            "incident resolved"
        );
        Ok(())
    }
}

fn resolution_payload(resolution_notes: &str) -> Record {
    let mut payload = Record::new();
    payload.insert("state".into(), Value::from(RESOLVED_STATE));
    payload.insert("close_code".into(), Value::from(RESOLVED_CLOSE_CODE));
    payload.insert("close_notes".into(), Value::from(resolution_notes));
    payload
}

fn render_description(
    vm_name: &str,
    environment: &str,
    discrepancies: &[Discrepancy],
    extra_notes: Option<&str>,
    opened_at: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        "CMDB Sync Validation Failed".to_string(),
        String::new(),
        format!("VM Name: {vm_name}"),
        format!("Environment: {environment}"),
        format!("Timestamp: {}", opened_at.to_rfc3339()),
        String::new(),
        "Discrepancies Found:".to_string(),
        "-".repeat(40),
    ];
    lines.extend(discrepancies.iter().map(Discrepancy::summary_line));

    if let Some(notes) = extra_notes {
        lines.push(String::new());
        lines.push("Additional Details:".to_string());
        lines.push(notes.to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use super::TicketManager;
    use crate::config::AppConfig;
    use crate::domain::discrepancy::{Discrepancy, Severity};
    use crate::domain::record::Record;
    use crate::domain::ticket::{PriorityLevel, TicketNumber};
    use crate::errors::{BackendError, TicketError};
    use crate::source::{InMemoryRecordSource, RecordQuery, RecordSource, SourceOperation};

    fn manager(source: Arc<InMemoryRecordSource>) -> TicketManager {
        TicketManager::new(source, "incident", AppConfig::default().ticket)
    }

    fn discrepancies() -> Vec<Discrepancy> {
        vec![
            Discrepancy::new("environment", "prod", Some(json!("staging")), Severity::High),
            Discrepancy::new("ip_address", "10.0.0.5", None, Severity::Warning),
        ]
    }

    #[test]
    fn ticket_body_lists_every_discrepancy() {
        let source = Arc::new(InMemoryRecordSource::new());
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("valid time");

        let ticket = manager(source).build_ticket(
            "app-07",
            "prod",
            &discrepancies(),
            Some("opened by nightly audit"),
            at,
        );

        assert_eq!(ticket.short_description, "CMDB Sync Failure: app-07 (prod)");
        assert_eq!(ticket.priority.impact, PriorityLevel::Medium);
        assert_eq!(ticket.correlation_id, "cmdb-sync-app-07-20260102030405");
        assert_eq!(ticket.category, "Software");
        assert_eq!(
            ticket.description,
            [
                "CMDB Sync Validation Failed",
                "",
                "VM Name: app-07",
                "Environment: prod",
                "Timestamp: 2026-01-02T03:04:05+00:00",
                "",
                "Discrepancies Found:",
                "----------------------------------------",
                "[HIGH] environment: expected 'prod', actual 'staging'",
                "[WARNING] ip_address: expected '10.0.0.5', actual '<missing>'",
                "",
                "Additional Details:",
                "opened by nightly audit",
            ]
            .join("\n")
        );

        let payload = ticket.to_payload();
        assert_eq!(payload.get("impact"), Some(&json!("2")));
        assert_eq!(payload.get("urgency"), Some(&json!("2")));
        assert_eq!(payload.get("configuration_item"), Some(&json!("app-07")));
        assert_eq!(payload.get("u_environment"), Some(&json!("prod")));
    }

    #[tokio::test]
    async fn open_ticket_returns_backend_number() {
        let source = Arc::new(InMemoryRecordSource::new());
        let number = manager(source.clone())
            .open_ticket("dev-web-01", "dev", &[Discrepancy::record_missing()], None)
            .await
            .expect("ticket opened");

        assert_eq!(number, TicketNumber("INC0010001".to_string()));
        let stored = source.records("incident").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get("impact"), Some(&json!("1")));
        assert_eq!(stored[0].get("urgency"), Some(&json!("1")));
    }

    #[tokio::test]
    async fn open_ticket_fails_when_backend_rejects() {
        let source = Arc::new(
            InMemoryRecordSource::new()
                .failing(SourceOperation::Create, BackendError::Authentication),
        );
        let result =
            manager(source).open_ticket("dev-web-01", "dev", &discrepancies(), None).await;
        assert_eq!(result, Err(TicketError::Backend(BackendError::Authentication)));
    }

    struct NumberlessSource;

    #[async_trait]
    impl RecordSource for NumberlessSource {
        async fn query(&self, _: &str, _: &RecordQuery) -> Result<Vec<Record>, BackendError> {
            Ok(Vec::new())
        }

        async fn create(&self, _: &str, payload: &Record) -> Result<Record, BackendError> {
            let mut created = payload.clone();
            created.insert("sys_id".into(), Value::from("s-1"));
            Ok(created)
        }

        async fn update(&self, _: &str, _: &str, _: &Record) -> Result<Record, BackendError> {
            Err(BackendError::NotFound)
        }
    }

    #[tokio::test]
    async fn open_ticket_fails_without_assigned_number() {
        let manager = TicketManager::new(
            Arc::new(NumberlessSource),
            "incident",
            AppConfig::default().ticket,
        );
        let result = manager.open_ticket("dev-web-01", "dev", &discrepancies(), None).await;
        assert_eq!(result, Err(TicketError::MissingNumber));
    }

    #[tokio::test]
    async fn resolve_marks_ticket_resolved() {
        let source = Arc::new(InMemoryRecordSource::new());
        let manager = manager(source.clone());
        let number = manager
            .open_ticket("dev-web-01", "dev", &discrepancies(), None)
            .await
            .expect("ticket opened");

        manager.resolve_ticket(&number, "record corrected by discovery").await.expect("resolved");

        let stored = source.records("incident").await;
        assert_eq!(stored[0].get("state"), Some(&json!("6")));
        assert_eq!(stored[0].get("close_code"), Some(&json!("Solved (Permanently)")));
        assert_eq!(stored[0].get("close_notes"), Some(&json!("record corrected by discovery")));
    }

    #[tokio::test]
    async fn resolving_unknown_ticket_fails_without_writes() {
        let existing: Record =
            serde_json::from_value(json!({"sys_id": "s1", "number": "INC0000001", "state": "1"}))
                .expect("record literal");
        let source =
            Arc::new(InMemoryRecordSource::new().with_records("incident", [existing.clone()]));

        let result = manager(source.clone())
            .resolve_ticket(&TicketNumber("INC9999999".to_string()), "n/a")
            .await;

        assert_eq!(result, Err(TicketError::NotFound("INC9999999".to_string())));
        assert_eq!(source.records("incident").await, vec![existing]);
        assert!(source.calls().await.iter().all(|call| call.operation == SourceOperation::Query));
    }

    #[tokio::test]
    async fn resolve_surfaces_update_failure_and_keeps_record() {
        let existing: Record =
            serde_json::from_value(json!({"sys_id": "s1", "number": "INC0010001", "state": "1"}))
                .expect("record literal");
        let source = Arc::new(
            InMemoryRecordSource::new()
                .with_records("incident", [existing.clone()])
                .failing(SourceOperation::Update, BackendError::Authentication),
        );

        let result = manager(source.clone())
            .resolve_ticket(&TicketNumber("INC0010001".to_string()), "record corrected")
            .await;

        assert_eq!(result, Err(TicketError::Backend(BackendError::Authentication)));
        assert_eq!(source.records("incident").await, vec![existing]);
    }

    #[tokio::test]
    async fn resolve_surfaces_lookup_failure() {
        let source = Arc::new(
            InMemoryRecordSource::new()
                .failing(SourceOperation::Query, BackendError::MaxRetriesExceeded { attempts: 3 }),
        );
        let result =
            manager(source).resolve_ticket(&TicketNumber("INC0010001".to_string()), "n/a").await;
        assert_eq!(
            result,
            Err(TicketError::Backend(BackendError::MaxRetriesExceeded { attempts: 3 }))
        );
    }
}
