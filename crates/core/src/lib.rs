pub mod cmdb;
pub mod config;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod source;
pub mod tickets;
pub mod validation;
pub mod workflow;

pub use cmdb::{fetch_vm_record, list_environment_records, INVENTORY_FIELDS, VM_RECORD_FIELDS};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::discrepancy::{Discrepancy, Severity, ValidationResult};
pub use domain::record::{ExpectedValues, Record};
pub use domain::ticket::{PriorityLevel, Ticket, TicketNumber, TicketPriority};
pub use errors::{BackendError, TicketError};
pub use escalation::escalate;
pub use source::{InMemoryRecordSource, RecordQuery, RecordSource, RetryPolicy};
pub use tickets::TicketManager;
pub use validation::{compare_record, Comparator, FieldRule, RuleTable, ValueTransform};
pub use workflow::{ValidationReport, ValidationRequest, ValidationWorkflow, WorkflowStage};
