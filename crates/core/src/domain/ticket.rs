use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::record::Record;

/// Human-facing ticket number assigned by the backend, e.g. `INC0010042`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(pub String);

impl std::fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Impact/urgency level. The backend encodes these as `1` (high) to `3` (low).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
}

impl PriorityLevel {
    pub fn code(&self) -> &'static str {
        match self {
            Self::High => "1",
            Self::Medium => "2",
            Self::Low => "3",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPriority {
    pub impact: PriorityLevel,
    pub urgency: PriorityLevel,
}

/// Incident payload opened for a failed validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub short_description: String,
    pub description: String,
    pub category: String,
    pub subcategory: String,
    pub priority: TicketPriority,
    pub assignment_group: String,
    pub caller_id: String,
    pub configuration_item: String,
    pub environment: String,
    pub correlation_id: String,
    pub opened_at: DateTime<Utc>,
}

impl Ticket {
    pub fn to_payload(&self) -> Record {
        let mut payload = Record::new();
        payload.insert("short_description".into(), Value::from(self.short_description.clone()));
        payload.insert("description".into(), Value::from(self.description.clone()));
        payload.insert("category".into(), Value::from(self.category.clone()));
        payload.insert("subcategory".into(), Value::from(self.subcategory.clone()));
        payload.insert("impact".into(), Value::from(self.priority.impact.code()));
        payload.insert("urgency".into(), Value::from(self.priority.urgency.code()));
        payload.insert("assignment_group".into(), Value::from(self.assignment_group.clone()));
        payload.insert("caller_id".into(), Value::from(self.caller_id.clone()));
        payload.insert("configuration_item".into(), Value::from(self.configuration_item.clone()));
        payload.insert("u_environment".into(), Value::from(self.environment.clone()));
        payload.insert("correlation_id".into(), Value::from(self.correlation_id.clone()));
        payload
    }
}

/// Correlation id that lets downstream systems deduplicate repeated tickets.
pub fn correlation_id(vm_name: &str, at: DateTime<Utc>) -> String {
    format!("cmdb-sync-{vm_name}-{}", at.format("%Y%m%d%H%M%S"))
}
