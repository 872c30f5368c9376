use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::record::display_value;

/// Ordered so that `Warning < High < Critical`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Warnings are reported but never fail a validation run.
    pub fn fails_validation(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub field: String,
    pub expected: Value,
    pub actual: Option<Value>,
    pub severity: Severity,
}

impl Discrepancy {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<Value>,
        actual: Option<Value>,
        severity: Severity,
    ) -> Self {
        Self { field: field.into(), expected: expected.into(), actual, severity }
    }

    /// The synthetic entry emitted when the lookup found no record at all.
    pub fn record_missing() -> Self {
        Self::new("record", "exists", Some(Value::from("not found")), Severity::Critical)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "[{}] {}: expected '{}', actual '{}'",
            self.severity.as_str().to_ascii_uppercase(),
            self.field,
            display_value(Some(&self.expected)),
            display_value(self.actual.as_ref()),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub discrepancies: Vec<Discrepancy>,
}

impl ValidationResult {
    pub fn from_discrepancies(discrepancies: Vec<Discrepancy>) -> Self {
        let passed = !discrepancies.iter().any(|d| d.severity.fails_validation());
        Self { passed, discrepancies }
    }
}
