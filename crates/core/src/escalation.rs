use crate::domain::discrepancy::{Discrepancy, Severity};
use crate::domain::ticket::{PriorityLevel, TicketPriority};

/// Maps the worst discrepancy severity onto ticket impact and urgency.
pub fn escalate(discrepancies: &[Discrepancy]) -> TicketPriority {
    let level = match discrepancies.iter().map(|d| d.severity).max() {
        Some(Severity::Critical) => PriorityLevel::High,
        Some(Severity::High) => PriorityLevel::Medium,
        Some(Severity::Warning) | None => PriorityLevel::Low,
    };
    TicketPriority { impact: level, urgency: level }
}
