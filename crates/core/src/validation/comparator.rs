use serde_json::Value;

use crate::domain::discrepancy::{Discrepancy, ValidationResult};
use crate::domain::record::{is_truthy, value_text, ExpectedValues, Record};
use crate::validation::rules::{FieldRule, RuleTable};

/// Compares records against a fixed rule table.
#[derive(Clone, Debug, Default)]
pub struct Comparator {
    rules: RuleTable,
}

impl Comparator {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    pub fn compare(&self, expected: &ExpectedValues, actual: Option<&Record>) -> ValidationResult {
        compare_record(&self.rules, expected, actual)
    }
}

pub fn compare_record(
    rules: &RuleTable,
    expected: &ExpectedValues,
    actual: Option<&Record>,
) -> ValidationResult {
    let Some(actual) = actual else {
        return ValidationResult::from_discrepancies(vec![Discrepancy::record_missing()]);
    };

    let discrepancies =
        rules.iter().filter_map(|rule| check_field(rule, expected, actual)).collect();
    ValidationResult::from_discrepancies(discrepancies)
}

fn check_field(
    rule: &FieldRule,
    expected: &ExpectedValues,
    actual: &Record,
) -> Option<Discrepancy> {
    let mut expected_value = expected.get(&rule.field).cloned();
    let actual_value = actual.get(&rule.field).filter(|value| !value.is_null());

    if let (Some(transform), true) = (rule.transform, is_truthy(expected_value.as_ref())) {
        expected_value = expected_value.as_ref().map(|value| transform.apply(value));
    }

    // A required rule with an empty expected value still falls through here,
    // but only the allow-list check below can flag it.
    if !is_truthy(expected_value.as_ref()) && !rule.required {
        return None;
    }

    if let Some(label) = rule.allowed_values_label() {
        if rule.allows(actual_value) {
            return None;
        }
        return Some(Discrepancy::new(&rule.field, label, actual_value.cloned(), rule.severity));
    }

    let expected_value = expected_value.filter(|value| is_truthy(Some(value)))?;
    if value_text(Some(&expected_value)) == value_text(actual_value) {
        return None;
    }

    Some(Discrepancy::new(&rule.field, expected_value, actual_value.cloned(), rule.severity))
}

/// Record fabricated for dry runs: plausible values derived from the
/// expected side, so the comparator exercises every rule.
pub fn simulated_record(vm_name: &str, environment: &str, expected: &ExpectedValues) -> Record {
    let mut record = Record::new();
    record.insert("sys_id".into(), Value::from("demo-sys-id-12345"));
    record.insert("name".into(), Value::from(vm_name));
    record.insert("ip_address".into(), Value::from("192.168.1.100"));
    record.insert(
        "cpu_count".into(),
        expected.get("cpu_count").cloned().unwrap_or_else(|| Value::from("2")),
    );
    record.insert("environment".into(), Value::from(environment));
    record.insert("state".into(), Value::from("On"));
    record.insert("managed_by".into(), Value::from("cmdb-sync"));
    record
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{compare_record, simulated_record, Comparator};
    use crate::domain::discrepancy::Severity;
    use crate::domain::record::{ExpectedValues, Record};
    use crate::validation::rules::{FieldRule, RuleTable};

    fn record(value: Value) -> Record {
        serde_json::from_value(value).expect("record literal")
    }

    #[test]
    fn missing_record_yields_single_critical_discrepancy() {
        let tables = [
            RuleTable::vm_instance(),
            RuleTable::new([]),
            RuleTable::new([FieldRule::optional("ram", Severity::Warning)]),
        ];
        let expected = ExpectedValues::new().with("name", "dev-web-01").with("environment", "dev");

        for table in &tables {
            let result = compare_record(table, &expected, None);
            assert!(!result.passed);
            assert_eq!(result.discrepancies.len(), 1);
            let only = &result.discrepancies[0];
            assert_eq!(only.field, "record");
            assert_eq!(only.expected, json!("exists"));
            assert_eq!(only.actual, Some(json!("not found")));
            assert_eq!(only.severity, Severity::Critical);
        }
    }

    #[test]
    fn cpu_count_transform_matches_string_actual() {
        let comparator = Comparator::default();
        let expected = ExpectedValues::new()
            .with("name", "dev-web-01")
            .with("environment", "dev")
            .with("cpu_count", 2);
        let actual = record(json!({
            "name": "dev-web-01",
            "environment": "dev",
            "cpu_count": "2",
            "state": "On"
        }));

        let result = comparator.compare(&expected, Some(&actual));
        assert!(result.passed);
        assert!(result.discrepancies.is_empty());
    }

    #[test]
    fn environment_mismatch_fails_with_high_severity() {
        let expected = ExpectedValues::new().with("name", "x").with("environment", "prod");
        let actual = record(json!({"name": "x", "environment": "staging"}));

        let result = Comparator::default().compare(&expected, Some(&actual));
        assert!(!result.passed);
        assert_eq!(result.discrepancies.len(), 1);
        let only = &result.discrepancies[0];
        assert_eq!(only.field, "environment");
        assert_eq!(only.expected, json!("prod"));
        assert_eq!(only.actual, Some(json!("staging")));
        assert_eq!(only.severity, Severity::High);
    }

    #[test]
    fn stopped_state_is_a_warning_only() {
        let expected = ExpectedValues::new()
            .with("name", "dev-web-01")
            .with("environment", "dev")
            .with("state", "On");
        let actual = record(json!({
            "name": "dev-web-01",
            "environment": "dev",
            "state": "Stopped"
        }));

        let result = Comparator::default().compare(&expected, Some(&actual));
        assert!(result.passed);
        assert_eq!(result.discrepancies.len(), 1);
        let only = &result.discrepancies[0];
        assert_eq!(only.field, "state");
        assert_eq!(only.severity, Severity::Warning);
        assert_eq!(only.expected, json!("one of ['On', 'Running', 'Powered On']"));
        assert_eq!(only.actual, Some(json!("Stopped")));
    }

    #[test]
    fn allow_list_ignores_expected_side_content() {
        let table = RuleTable::new([FieldRule::optional("state", Severity::Warning)
            .with_allowed_values(["On", "Running"])]);
        let actual = record(json!({"state": "Running"}));

        for expected_state in ["Off", "On", "anything"] {
            let expected = ExpectedValues::new().with("state", expected_state);
            let result = compare_record(&table, &expected, Some(&actual));
            assert!(
                result.discrepancies.is_empty(),
                "expected `{expected_state}` should not matter"
            );
        }
    }

    #[test]
    fn unsupplied_optional_fields_are_skipped_even_when_actual_differs() {
        let expected = ExpectedValues::new().with("name", "db-01").with("environment", "prod");
        let actual = record(json!({
            "name": "db-01",
            "environment": "prod",
            "ip_address": "10.1.1.1",
            "cpu_count": "64",
            "state": "Stopped"
        }));

        let result = Comparator::default().compare(&expected, Some(&actual));
        assert!(result.passed);
        assert!(result.discrepancies.is_empty());
    }

    #[test]
    fn empty_required_value_is_not_compared() {
        let expected = ExpectedValues::new().with("name", "").with("environment", "prod");
        let actual = record(json!({"name": "something-else", "environment": "prod"}));

        let result = Comparator::default().compare(&expected, Some(&actual));
        assert!(result.passed);
        assert!(result.discrepancies.is_empty());
    }

    #[test]
    fn required_allow_list_rule_checks_even_without_expected_value() {
        let table = RuleTable::new([FieldRule::required("state", Severity::High)
            .with_allowed_values(["On"])]);
        let actual = record(json!({"state": "Off"}));

        let result = compare_record(&table, &ExpectedValues::new(), Some(&actual));
        assert!(!result.passed);
        assert_eq!(result.discrepancies[0].field, "state");
    }

    #[test]
    fn missing_actual_field_is_reported_against_supplied_expectation() {
        let expected = ExpectedValues::new()
            .with("name", "web-02")
            .with("environment", "dev")
            .with("ip_address", "10.0.0.9");
        let actual = record(json!({"name": "web-02", "environment": "dev", "ip_address": null}));

        let result = Comparator::default().compare(&expected, Some(&actual));
        assert!(result.passed);
        assert_eq!(result.discrepancies.len(), 1);
        assert_eq!(result.discrepancies[0].field, "ip_address");
        assert_eq!(result.discrepancies[0].actual, None);
    }

    #[test]
    fn discrepancies_follow_rule_table_order() {
        let expected = ExpectedValues::new()
            .with("environment", "prod")
            .with("ip_address", "10.0.0.1")
            .with("name", "app-01");
        let actual =
            record(json!({"name": "app-02", "environment": "dev", "ip_address": "10.0.0.2"}));

        let result = Comparator::default().compare(&expected, Some(&actual));
        let fields: Vec<&str> = result.discrepancies.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, ["name", "ip_address", "environment"]);
        assert!(!result.passed);
    }

    #[test]
    fn compare_is_idempotent() {
        let comparator = Comparator::default();
        let expected = ExpectedValues::new().with("name", "x").with("environment", "prod");
        let actual = record(json!({"name": "y", "environment": "staging", "state": "Off"}));

        let first = comparator.compare(&expected, Some(&actual));
        let second = comparator.compare(&expected, Some(&actual));
        assert_eq!(first, second);
    }

    #[test]
    fn simulated_record_passes_for_plain_expectations() {
        let expected = ExpectedValues::new()
            .with("name", "dev-web-01")
            .with("environment", "dev")
            .with("cpu_count", 4);
        let simulated = simulated_record("dev-web-01", "dev", &expected);
        assert_eq!(simulated.get("cpu_count"), Some(&json!(4)));

        let result = Comparator::default().compare(&expected, Some(&simulated));
        assert!(result.passed);
        assert!(result.discrepancies.is_empty());
    }
}
