//! Outbox error types.

use template_payload_assembler::AssemblyError;
use thiserror::Error;

/// Whole-broadcast setup errors, surfaced before any message is built.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Nothing left to send after upstream filtering.
    #[error("Broadcast has no recipients")]
    NoRecipients,

    /// The template cannot be assembled for this request.
    #[error("Template misconfigured: {0}")]
    Template(#[from] AssemblyError),
}

/// Result type alias using BuildError.
pub type BuildResult<T> = Result<T, BuildError>;

/// A dispatch chunk that did not reach the channel or was refused by it.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the channel
    #[error("Channel rejected chunk: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ChannelError.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Contact attribute storage could not answer.
#[derive(Error, Debug)]
#[error("Attribute lookup failed: {0}")]
pub struct LookupError(pub String);
