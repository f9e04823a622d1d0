//! Error types for the procurement service.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mailbox (IMAP/SMTP) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Login failed for {user}")]
    Login { user: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Failed to send mail to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Invalid mail address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Extraction backend errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Extraction request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Extraction backend rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Invalid extraction response: {reason}")]
    InvalidResponse { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExtractError {
    /// Whether this error is the backend's rate-limit signal.
    ///
    /// Only these errors are eligible for retry — everything else
    /// propagates immediately.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Ingestion/evaluation pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("RFP {0} not found")]
    RfpNotFound(Uuid),

    #[error("Vendor {0} not found")]
    VendorNotFound(Uuid),

    #[error("Proposal {0} not found")]
    ProposalNotFound(Uuid),

    #[error("No proposals found for RFP {0}")]
    NoProposals(Uuid),

    #[error("Vendor {vendor} already has a proposal for this RFP")]
    DuplicateProposal { vendor: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
