//! Rule-driven comparison of a CMDB record against provisioning intent.

pub mod comparator;
pub mod rules;

pub use comparator::{compare_record, Comparator};
pub use rules::{FieldRule, RuleTable, ValueTransform};
