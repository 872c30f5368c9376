//! Status classification and `{"result": ...}` envelope decoding.

use cmdb_sync_core::{BackendError, Record};
use serde_json::Value;

const ERROR_BODY_LIMIT: usize = 200;

/// Maps an HTTP status onto the error taxonomy. 200 and 201 are success;
/// 401 and 404 are terminal; everything else may be retried.
pub fn check_status(status: u16, body: &str) -> Result<(), BackendError> {
    match status {
        200 | 201 => Ok(()),
        401 => Err(BackendError::Authentication),
        404 => Err(BackendError::NotFound),
        status => Err(BackendError::UnexpectedStatus {
            status,
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        }),
    }
}

pub fn transport_error(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout(error.to_string())
    } else if error.is_connect() {
        BackendError::Connection(error.to_string())
    } else if error.is_decode() {
        BackendError::Decode(error.to_string())
    } else {
        BackendError::Request(error.to_string())
    }
}

fn result_field(body: &str) -> Result<Value, BackendError> {
    let mut envelope: Value =
        serde_json::from_str(body).map_err(|error| BackendError::Decode(error.to_string()))?;
    envelope
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| BackendError::Decode("response has no `result` field".to_string()))
}

pub fn parse_records(body: &str) -> Result<Vec<Record>, BackendError> {
    match result_field(body)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.into_iter().map(decode_record).collect(),
        other => Err(BackendError::Decode(format!("expected a list of records, got {other}"))),
    }
}

pub fn parse_record(body: &str) -> Result<Record, BackendError> {
    decode_record(result_field(body)?)
}

fn decode_record(value: Value) -> Result<Record, BackendError> {
    serde_json::from_value(value).map_err(|error| BackendError::Decode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use cmdb_sync_core::BackendError;
    use serde_json::json;

    use super::{check_status, parse_record, parse_records};

    #[test]
    fn success_statuses_pass() {
        assert_eq!(check_status(200, ""), Ok(()));
        assert_eq!(check_status(201, ""), Ok(()));
    }

    #[test]
    fn terminal_statuses_are_not_retryable() {
        let unauthorized = check_status(401, "denied").expect_err("401");
        assert_eq!(unauthorized, BackendError::Authentication);
        assert!(!unauthorized.is_retryable());

        let missing = check_status(404, "").expect_err("404");
        assert!(missing.is_not_found());
        assert!(!missing.is_retryable());
    }

    #[test]
    fn other_statuses_are_retryable_with_truncated_body() {
        let body = "x".repeat(500);
        let error = check_status(503, &body).expect_err("503");
        assert!(error.is_retryable());
        match error {
            BackendError::UnexpectedStatus { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(check_status(204, "").expect_err("204").is_retryable());
    }

    #[test]
    fn result_envelope_is_unwrapped() {
        let records = parse_records(r#"{"result": [{"sys_id": "a1", "cpu_count": "4"}]}"#)
            .expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("cpu_count"), Some(&json!("4")));

        assert!(parse_records(r#"{"result": []}"#).expect("empty").is_empty());

        let record = parse_record(r#"{"result": {"number": "INC0010001"}}"#).expect("record");
        assert_eq!(record.get("number"), Some(&json!("INC0010001")));
    }

    #[test]
    fn malformed_envelopes_are_decode_errors() {
        for body in ["not json", r#"{"error": {}}"#, r#"{"result": "text"}"#] {
            let error = parse_records(body).expect_err(body);
            assert!(matches!(error, BackendError::Decode(_)), "{body}: {error:?}");
            assert!(!error.is_retryable());
        }
    }
}
