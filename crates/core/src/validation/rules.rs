use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::discrepancy::Severity;
use crate::domain::record::{is_truthy, value_text};

/// Normalization applied to the expected side before comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTransform {
    /// Numbers and booleans become their text form; the backend reports
    /// display values as strings.
    ToText,
}

impl ValueTransform {
    pub fn apply(&self, value: &Value) -> Value {
        match self {
            Self::ToText => {
                if is_truthy(Some(value)) {
                    value_text(Some(value)).map(Value::String).unwrap_or(Value::Null)
                } else {
                    Value::Null
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    pub required: bool,
    pub severity: Severity,
    /// When set, the actual value must be one of these and the expected
    /// value is not compared at all.
    pub allowed_values: Option<Vec<String>>,
    pub transform: Option<ValueTransform>,
}

impl FieldRule {
    pub fn optional(field: impl Into<String>, severity: Severity) -> Self {
        Self {
            field: field.into(),
            required: false,
            severity,
            allowed_values: None,
            transform: None,
        }
    }

    pub fn required(field: impl Into<String>, severity: Severity) -> Self {
        Self { required: true, ..Self::optional(field, severity) }
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn allows(&self, actual: Option<&Value>) -> bool {
        let Some(allowed) = &self.allowed_values else {
            return true;
        };
        match actual {
            Some(Value::String(text)) => allowed.iter().any(|candidate| candidate == text),
            _ => false,
        }
    }

    /// Rendered as `one of ['On', 'Running']` in discrepancies.
    pub fn allowed_values_label(&self) -> Option<String> {
        self.allowed_values.as_ref().map(|values| {
            let quoted: Vec<String> = values.iter().map(|value| format!("'{value}'")).collect();
            format!("one of [{}]", quoted.join(", "))
        })
    }
}

/// Ordered, immutable set of field rules. Iteration order is the order
/// discrepancies are reported in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuleTable {
    rules: Vec<FieldRule>,
}

impl RuleTable {
    /// Builds a table from rules; a later rule for the same field replaces
    /// the earlier one in place.
    pub fn new(rules: impl IntoIterator<Item = FieldRule>) -> Self {
        let mut ordered: Vec<FieldRule> = Vec::new();
        for rule in rules {
            match ordered.iter_mut().find(|existing| existing.field == rule.field) {
                Some(existing) => *existing = rule,
                None => ordered.push(rule),
            }
        }
        Self { rules: ordered }
    }

    /// Rules for VM instance records.
    pub fn vm_instance() -> Self {
        Self::new([
            FieldRule::required("name", Severity::Critical),
            FieldRule::optional("ip_address", Severity::Warning),
            FieldRule::optional("cpu_count", Severity::Warning)
                .with_transform(ValueTransform::ToText),
            FieldRule::required("environment", Severity::High),
            FieldRule::optional("state", Severity::Warning)
                .with_allowed_values(["On", "Running", "Powered On"]),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldRule> {
        self.rules.iter()
    }

    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|rule| rule.field == field)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::vm_instance()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FieldRule, RuleTable, ValueTransform};
    use crate::domain::discrepancy::Severity;

    #[test]
    fn vm_instance_table_keeps_declaration_order() {
        let table = RuleTable::vm_instance();
        let fields: Vec<&str> = table.iter().map(|rule| rule.field.as_str()).collect();
        assert_eq!(fields, ["name", "ip_address", "cpu_count", "environment", "state"]);

        let environment = table.get("environment").expect("environment rule");
        assert!(environment.required);
        assert_eq!(environment.severity, Severity::High);
    }

    #[test]
    fn duplicate_field_replaces_rule_in_place() {
        let table = RuleTable::new([
            FieldRule::required("name", Severity::Critical),
            FieldRule::optional("ram", Severity::Warning),
            FieldRule::optional("name", Severity::High),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.iter().next().map(|rule| rule.severity), Some(Severity::High));
    }

    #[test]
    fn to_text_transform_normalizes_numbers_and_drops_falsy_values() {
        assert_eq!(ValueTransform::ToText.apply(&json!(2)), json!("2"));
        assert_eq!(ValueTransform::ToText.apply(&json!("4")), json!("4"));
        assert_eq!(ValueTransform::ToText.apply(&json!(0)), json!(null));
    }

    #[test]
    fn allow_list_accepts_only_listed_strings() {
        let rule = FieldRule::optional("state", Severity::Warning)
            .with_allowed_values(["On", "Running"]);
        assert!(rule.allows(Some(&json!("Running"))));
        assert!(!rule.allows(Some(&json!("Stopped"))));
        assert!(!rule.allows(None));
        assert_eq!(rule.allowed_values_label().as_deref(), Some("one of ['On', 'Running']"));
    }
}
