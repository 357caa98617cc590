use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// A single failed remote call, as reported by the transport or the Sheets API.
///
/// `status` is the HTTP status when the server answered; transport failures
/// (DNS, TLS, connection reset) carry `None`. `message` keeps the raw response
/// body so rate-limit markers such as `rateLimitExceeded` stay visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("remote store still rate limited after {attempts} attempt(s): {source}")]
    TransientRemote {
        attempts: u32,
        #[source]
        source: ApiError,
    },
    #[error("remote store request failed: {0}")]
    PermanentRemote(#[source] ApiError),
    #[error("table `{table}` is missing required column(s): {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },
}

impl DataError {
    /// The underlying remote failure, if this error came from the store.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            DataError::TransientRemote { source, .. } => Some(source),
            DataError::PermanentRemote(source) => Some(source),
            DataError::Configuration(_) | DataError::MissingColumns { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status_when_present() {
        assert_eq!(
            ApiError::http(429, "Quota exceeded").to_string(),
            "HTTP 429: Quota exceeded"
        );
        assert_eq!(ApiError::transport("connection reset").to_string(), "connection reset");
    }

    #[test]
    fn missing_columns_lists_every_column() {
        let err = DataError::MissingColumns {
            table: "Articles".to_string(),
            columns: vec!["URL".to_string(), "Title".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "table `Articles` is missing required column(s): URL, Title"
        );
        assert!(err.api_error().is_none());
    }
}
