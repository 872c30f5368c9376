//! ServiceNow Table API backend for cmdb-sync.

pub mod client;
pub mod response;

pub use client::{query_params, ServiceNowClient};
