//! Error types for the windlass provisioning core

use thiserror::Error;

/// Main error type for windlass operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A resource address is missing from local state, or a recorded
    /// remote identifier no longer resolves to a remote object
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource is recorded in state without a primary identifier
    #[error("no primary id set for {0}")]
    MissingId(String),

    /// The orchestration API rejected or failed a call
    #[error("remote api error: {0}")]
    Remote(String),

    /// A remote object survived teardown
    #[error("{0} still exists remotely")]
    StillExists(String),

    /// An asserted attribute did not carry the expected value
    #[error("attribute mismatch on {address}: {attribute} expected {expected:?}, got {actual:?}")]
    AttributeMismatch {
        /// Address of the offending resource
        address: String,
        /// Name of the attribute that was asserted
        attribute: String,
        /// Expected value
        expected: String,
        /// Observed value
        actual: String,
    },

    /// A resource specification failed validation before any API call
    #[error("validation error: {0}")]
    Validation(String),

    /// A cross-resource reference could not be resolved
    #[error("unresolvable reference: {0}")]
    Reference(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a missing-id error naming the offending address
    pub fn missing_id(address: impl Into<String>) -> Self {
        Self::MissingId(address.into())
    }

    /// Create a remote API error with the given message
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a still-exists error naming the surviving object
    pub fn still_exists(what: impl Into<String>) -> Self {
        Self::StillExists(what.into())
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a reference error with the given message
    pub fn reference(msg: impl Into<String>) -> Self {
        Self::Reference(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an attribute-mismatch error for an asserted attribute
    pub fn attribute_mismatch(
        address: impl Into<String>,
        attribute: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::AttributeMismatch {
            address: address.into(),
            attribute: attribute.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
