//! Assembly error types.

use thiserror::Error;

/// Why a template could not be turned into a message.
///
/// Every variant is a configuration problem of the template or the request:
/// it is fatal to the message being built and never to its siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Card or button limits of a carousel violated.
    #[error("Carousel configuration error: {0}")]
    CarouselConfiguration(String),

    /// A component appears where the channel does not allow it.
    #[error("Invalid component type {component}: {reason}")]
    InvalidComponentType {
        component: &'static str,
        reason: String,
    },

    /// A header format that cannot be used in its position.
    #[error("Invalid media type {format}: {reason}")]
    InvalidMediaType { format: String, reason: String },

    /// The request lacks a value the template requires.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

impl AssemblyError {
    /// All assembly errors are configuration errors.
    pub fn is_configuration_error(&self) -> bool {
        true
    }
}

/// Result type alias using AssemblyError.
pub type AssemblyResult<T> = Result<T, AssemblyError>;
