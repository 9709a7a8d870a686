//! Error types for gateway and store operations

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors raised by the entity and query gateways.
///
/// Validation variants (`BadRequest`, `SchemaViolation`, `InvalidQuery`) are
/// produced before any store transaction is opened.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed JSON, missing or illegal id field
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A JSON field does not match the declared property kind
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Submitted query is not a parseable SPARQL SELECT
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Create on an id that already has statements
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Read or patch on an id with no statements
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport or transaction failure talking to the store
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] GraphError),
}

impl GatewayError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "BAD_REQUEST",
            GatewayError::SchemaViolation(_) => "SCHEMA_VIOLATION",
            GatewayError::InvalidQuery(_) => "INVALID_QUERY",
            GatewayError::Conflict(_) => "CONFLICT",
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

/// Errors raised by graph clients
#[derive(Error, Debug)]
pub enum GraphError {
    /// The store could not be reached or the request failed in transit
    #[error("HTTP error: {0}")]
    Http(String),

    /// The store answered with a non-success status
    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The store answered with something that is not a SPARQL result
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The embedded store reported an error
    #[error("Store error: {0}")]
    Store(String),

    /// A bounded wait expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A write was issued inside a read transaction
    #[error("Write attempted in a read transaction")]
    ReadOnly,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for GraphError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GraphError::Timeout(err.to_string())
        } else {
            GraphError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::Conflict("user u1 already exists".to_string());
        assert_eq!(err.to_string(), "Conflict: user u1 already exists");
    }

    #[test]
    fn test_graph_error_converts_to_store_unavailable() {
        let err: GatewayError = GraphError::Timeout("write gate".to_string()).into();
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
        assert!(err.to_string().contains("write gate"));
    }

    #[test]
    fn test_status_error_display() {
        let err = GraphError::Status {
            operation: "Update",
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Update failed with status 500: boom");
    }
}
