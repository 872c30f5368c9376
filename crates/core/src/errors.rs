use thiserror::Error;

/// Failure of a single logical backend call.
///
/// Only transport failures and unexpected statuses are retried; everything
/// else is terminal for that call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("authentication failed - check credentials")]
    Authentication,
    #[error("resource not found")]
    NotFound,
    #[error("request failed with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("could not decode backend response: {0}")]
    Decode(String),
    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { .. } | Self::Timeout(_) | Self::Connection(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("ticket was created but the backend returned no ticket number")]
    MissingNumber,
    #[error("ticket `{0}` not found")]
    NotFound(String),
    #[error("ticket `{0}` has no sys_id")]
    MissingSysId(String),
}
