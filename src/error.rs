//! Error types for the streaming gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error types that can occur while serving a stream
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Access credential expired for chunk {chunk_index}")]
    CredentialExpired { chunk_index: u64 },

    #[error("Remote rejected chunk index {chunk_index} as out of bounds")]
    InvalidChunkOffset { chunk_index: u64 },

    #[error("Transient remote failure: {0}")]
    TransientRemote(String),

    #[error("Stream failed after retries: {0}")]
    FatalStream(String),

    #[error("Resolver error: {0}")]
    ResolverError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl GatewayError {
    /// Determine if this error may succeed on a retry.
    ///
    /// Transient remote failures, expired credentials and out-of-bounds chunk
    /// indexes are recoverable inside the stream executor; everything else
    /// either maps to a final HTTP status or has already exhausted its retry
    /// budget.
    pub fn should_retry(&self) -> bool {
        match self {
            GatewayError::TransientRemote(_) => true,
            GatewayError::CredentialExpired { .. } => true,
            GatewayError::InvalidChunkOffset { .. } => true,

            GatewayError::ConfigError(_) => false,
            GatewayError::NotFound(_) => false,
            GatewayError::Forbidden(_) => false,
            GatewayError::InvalidIdentifier(_) => false,
            GatewayError::RangeNotSatisfiable(_) => false,
            GatewayError::ServiceUnavailable(_) => false,
            GatewayError::FatalStream(_) => false,
            GatewayError::ResolverError(_) => false,
            GatewayError::ParseError(_) => false,
        }
    }

    /// Convert error to the HTTP status code the adapter should send.
    ///
    /// Recoverable variants never reach the adapter; if one does leak it is
    /// treated as a fatal stream failure.
    pub fn to_http_status(&self) -> u16 {
        match self {
            GatewayError::NotFound(_) => 404,
            GatewayError::Forbidden(_) => 403,
            GatewayError::InvalidIdentifier(_) => 400,
            GatewayError::ParseError(_) => 400,
            GatewayError::RangeNotSatisfiable(_) => 416,
            GatewayError::ServiceUnavailable(_) => 503,
            GatewayError::ResolverError(_) => 503,

            GatewayError::ConfigError(_) => 500,
            GatewayError::CredentialExpired { .. } => 500,
            GatewayError::InvalidChunkOffset { .. } => 500,
            GatewayError::TransientRemote(_) => 500,
            GatewayError::FatalStream(_) => 500,
        }
    }
}
