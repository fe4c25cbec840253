//! Errors raised while selecting or driving a serialization writer.

use thiserror::Error;

/// Errors arising from content-type lookup or value serialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    /// The caller supplied an empty content type.
    #[error("content type must not be empty")]
    EmptyContentType,

    /// No factory is registered for the content type.
    #[error("content type '{content_type}' does not have a registered writer factory")]
    UnsupportedContentType {
        /// The normalised content type that was looked up.
        content_type: String,
    },

    /// A factory was asked for a writer of a content type it does not produce.
    #[error("expected a {expected} content type, got '{actual}'")]
    ContentTypeMismatch {
        /// The content type the factory produces.
        expected: String,
        /// The content type that was requested.
        actual: String,
    },

    /// The writer cannot represent the value it was given.
    #[error("{content_type} writer cannot serialise {message}")]
    UnsupportedValue {
        /// The writer's content type.
        content_type: String,
        /// Description of the rejected value.
        message: String,
    },
}
