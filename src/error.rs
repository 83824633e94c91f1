// Error handling module
// Closed failure taxonomy and classification of transport faults

use thiserror::Error;

/// Fixed result codes carried by failed envelopes.
///
/// These live outside the range used by server business codes so call sites
/// can tell transport failures from business failures by code alone.
pub mod codes {
    pub const UNKNOWN: i32 = 900;
    pub const TIMEOUT: i32 = 901;
    pub const CONNECTION: i32 = 902;
    pub const SERIALIZATION: i32 = 903;
    pub const SERVER: i32 = 904;
    pub const AUTH: i32 = 905;
}

/// Errors that can occur while talking to the API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request or connect timeout
    #[error("Request timed out")]
    Timeout,

    /// Name resolution failed or connection refused
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    /// Response body could not be decoded into the expected shape
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Non-success HTTP status not handled elsewhere
    #[error("Server error: {status} - {description}")]
    ServerError { status: u16, description: String },

    /// Credentials rejected after the refresh-and-retry protocol ran out
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Anything else
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Taxonomy entry without its payload, recoverable from a result code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    ConnectionError,
    SerializationError,
    ServerError,
    AuthFailure,
    Unknown,
}

impl FailureKind {
    /// Map a result code back to its taxonomy entry.
    ///
    /// Returns `None` for codes produced by the server itself.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            codes::TIMEOUT => Some(Self::Timeout),
            codes::CONNECTION => Some(Self::ConnectionError),
            codes::SERIALIZATION => Some(Self::SerializationError),
            codes::SERVER => Some(Self::ServerError),
            codes::AUTH => Some(Self::AuthFailure),
            codes::UNKNOWN => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl ApiError {
    /// Fixed numeric code for this taxonomy entry
    pub fn code(&self) -> i32 {
        match self {
            ApiError::Timeout => codes::TIMEOUT,
            ApiError::ConnectionError(_) => codes::CONNECTION,
            ApiError::SerializationError(_) => codes::SERIALIZATION,
            ApiError::ServerError { .. } => codes::SERVER,
            ApiError::AuthFailure(_) => codes::AUTH,
            ApiError::Unknown(_) => codes::UNKNOWN,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::Timeout => FailureKind::Timeout,
            ApiError::ConnectionError(_) => FailureKind::ConnectionError,
            ApiError::SerializationError(_) => FailureKind::SerializationError,
            ApiError::ServerError { .. } => FailureKind::ServerError,
            ApiError::AuthFailure(_) => FailureKind::AuthFailure,
            ApiError::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// Human-readable message placed into failed envelopes
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Timeout => "Network request timed out".to_string(),
            ApiError::ConnectionError(_) => "Network connection failed".to_string(),
            ApiError::SerializationError(_) => "Failed to parse response data".to_string(),
            ApiError::ServerError {
                status,
                description,
            } => format!("Server error ({} {})", status, description),
            ApiError::AuthFailure(msg) => msg.clone(),
            ApiError::Unknown(msg) => msg.clone(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        // Order matters: a connect timeout is both a timeout and a connect error
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_connect() {
            ApiError::ConnectionError(e.to_string())
        } else if e.is_decode() {
            ApiError::SerializationError(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::ServerError {
                status: status.as_u16(),
                description: status.canonical_reason().unwrap_or("Unknown").to_string(),
            }
        } else {
            ApiError::Unknown(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::SerializationError(e.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Unknown(e.to_string())
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ApiError::AuthFailure("Invalid token".to_string());
        assert_eq!(err.to_string(), "Authentication failed: Invalid token");

        let err = ApiError::ServerError {
            status: 502,
            description: "Bad Gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Server error: 502 - Bad Gateway");

        assert_eq!(ApiError::Timeout.to_string(), "Request timed out");
    }

    #[test]
    fn test_codes_are_fixed_per_variant() {
        assert_eq!(ApiError::Timeout.code(), 901);
        assert_eq!(ApiError::ConnectionError("x".into()).code(), 902);
        assert_eq!(ApiError::SerializationError("x".into()).code(), 903);
        assert_eq!(
            ApiError::ServerError {
                status: 500,
                description: "x".into()
            }
            .code(),
            904
        );
        assert_eq!(ApiError::AuthFailure("x".into()).code(), 905);
        assert_eq!(ApiError::Unknown("x".into()).code(), 900);
    }

    #[test]
    fn test_failure_kind_round_trips_through_code() {
        let errors = [
            ApiError::Timeout,
            ApiError::ConnectionError("refused".into()),
            ApiError::SerializationError("eof".into()),
            ApiError::ServerError {
                status: 503,
                description: "Service Unavailable".into(),
            },
            ApiError::AuthFailure("expired".into()),
            ApiError::Unknown("boom".into()),
        ];
        for err in errors {
            assert_eq!(FailureKind::from_code(err.code()), Some(err.kind()));
        }
    }

    #[test]
    fn test_business_codes_are_not_failure_kinds() {
        assert_eq!(FailureKind::from_code(200), None);
        assert_eq!(FailureKind::from_code(401), None);
        assert_eq!(FailureKind::from_code(501), None);
    }

    #[test]
    fn test_serde_error_is_serialization() {
        let err: ApiError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, ApiError::SerializationError(_)));
        assert_eq!(err.user_message(), "Failed to parse response data");
    }

    #[test]
    fn test_io_error_is_unknown() {
        let err: ApiError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs").into();
        assert!(matches!(err, ApiError::Unknown(ref m) if m.contains("read-only fs")));
    }

    #[test]
    fn test_server_error_user_message() {
        let err = ApiError::ServerError {
            status: 404,
            description: "Not Found".to_string(),
        };
        assert_eq!(err.user_message(), "Server error (404 Not Found)");
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{}/", port))
            .send()
            .await
            .unwrap_err();
        assert!(matches!(ApiError::from(err), ApiError::ConnectionError(_)));
    }
}
