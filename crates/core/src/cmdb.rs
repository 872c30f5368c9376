//! CMDB lookups on top of a [`RecordSource`].
//!
//! Lookup failures are logged and reported as "no record": the comparator
//! turns a missing record into a critical discrepancy, so the workflow keeps
//! going instead of aborting.

use tracing::{debug, error, info, warn};

use crate::domain::record::{value_text, Record};
use crate::source::{RecordQuery, RecordSource};

/// Projection requested for single-VM lookups.
pub const VM_RECORD_FIELDS: &[&str] = &[
    "sys_id",
    "name",
    "ip_address",
    "cpu_count",
    "ram",
    "disk_space",
    "state",
    "os",
    "os_version",
    "environment",
    "managed_by",
    "sys_created_on",
    "sys_updated_on",
    "correlation_id",
    "discovery_source",
];

/// Projection requested for environment inventories.
pub const INVENTORY_FIELDS: &[&str] = &["sys_id", "name", "ip_address", "state", "environment"];

/// Looks up a VM by name, optionally narrowed by extra exact-match filters.
pub async fn fetch_vm_record(
    source: &dyn RecordSource,
    table: &str,
    vm_name: &str,
    additional_filters: &[(String, String)],
) -> Option<Record> {
    info!(event_name = "cmdb.lookup.started", vm_name, table, "looking up CMDB record");

    let mut query = RecordQuery::new().filter("name", vm_name);
    for (field, value) in additional_filters {
        query = query.filter(field.clone(), value.clone());
    }
    let query = query.fields(VM_RECORD_FIELDS.iter().copied()).limit(1).display_values();
    debug!(sysparm_query = %query.encoded_filter(), "cmdb lookup query");

    let records = match source.query(table, &query).await {
        Ok(records) => records,
        Err(error) if error.is_not_found() => Vec::new(),
        Err(error) => {
            error!(
                event_name = "cmdb.lookup.failed",
                vm_name,
                error = %error,
                "failed to query CMDB"
            );
            return None;
        }
    };

    match records.into_iter().next() {
        Some(record) => {
            info!(
                event_name = "cmdb.lookup.found",
                vm_name,
                sys_id = %value_text(record.get("sys_id")).unwrap_or_default(),
                "found CMDB record"
            );
            Some(record)
        }
        None => {
            warn!(event_name = "cmdb.lookup.missing", vm_name, "no CMDB record found");
            None
        }
    }
}

/// Lists every VM record of an environment. A failed query yields an empty
/// inventory.
pub async fn list_environment_records(
    source: &dyn RecordSource,
    table: &str,
    environment: &str,
) -> Vec<Record> {
    info!(event_name = "cmdb.inventory.started", environment, table, "querying CMDB inventory");

    let query = RecordQuery::new()
        .filter("environment", environment)
        .fields(INVENTORY_FIELDS.iter().copied())
        .display_values();

    match source.query(table, &query).await {
        Ok(records) => {
            info!(
                event_name = "cmdb.inventory.completed",
                environment,
                record_count = records.len(),
                "CMDB inventory loaded"
            );
            records
        }
        Err(error) => {
            error!(
                event_name = "cmdb.inventory.failed",
                environment,
                error = %error,
                "failed to query CMDB inventory"
            );
            Vec::new()
        }
    }
}
