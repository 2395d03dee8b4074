//! Error types for support-triage.

use std::time::Duration;

use uuid::Uuid;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Malformed row: {0}")]
    Serialization(String),
}

/// Transport errors for mail, chat and pub/sub adapters.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to fetch: {reason}")]
    FetchFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },
}

/// Text generation errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to store ticket: {0}")]
    Store(#[from] DatabaseError),

    #[error("Draft for ticket {id} failed: {reason}")]
    Draft { id: Uuid, reason: String },
}

/// Errors raised while approving a ticket reply.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Ticket {0} not found")]
    NotFound(Uuid),

    #[error("Ticket {0} has no recipient email")]
    MissingRecipient(Uuid),

    #[error("Ticket {0} has no reply to send")]
    MissingReply(Uuid),

    #[error("Reply delivery failed: {0}")]
    Delivery(#[from] ChannelError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
