//! Error types for the Spool core library.

use thiserror::Error;

/// Main error type for Spool core operations.
///
/// Variants fall into three groups: construction-time configuration errors raised
/// while building identities, resolution-time errors raised by the discovery service,
/// and environment errors raised while setting the service up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required constructor argument was not supplied
    #[error("Required argument missing: {argument}")]
    NullArgument {
        /// Name of the missing argument
        argument: &'static str,
    },

    /// A composite identity was built over an empty source list
    #[error("At least one source stream id is required for {operation}")]
    EmptySources {
        /// Operation that rejected the list
        operation: &'static str,
    },

    /// No factory in the chain recognised the identity
    #[error("No factory could resolve stream id {id}")]
    UnresolvedIdentity {
        /// Debug rendering of the identity
        id: String,
    },

    /// The identity is already backed by a stream
    #[error("Stream id {id} is already registered")]
    DuplicateRegistration {
        /// Debug rendering of the identity
        id: String,
    },

    /// The discovery service was used outside a Tokio runtime
    #[error("No Tokio runtime available: {message}")]
    NoRuntime {
        /// Reason reported by the runtime handle lookup
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for Spool operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true for errors raised while constructing identities or configuration.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NullArgument { .. } | Self::EmptySources { .. } | Self::Configuration(_)
        )
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

/// Failure observed while a stream is running.
///
/// Delivered on the error channel of a [`DataErrorPair`](crate::stream::DataErrorPair),
/// never on the data channel. Cloneable so one failure can fan out to every subscriber
/// of the error channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A predicate could not be evaluated
    #[error("Predicate failed: {0}")]
    Predicate(String),

    /// A conversion function could not produce a value
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// An element did not carry the payload type its identity declares
    #[error("Payload type mismatch: expected {expected}")]
    TypeMismatch {
        /// Name of the expected payload type
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(Error::NullArgument { argument: "start" }.is_configuration());
        assert!(Error::EmptySources { operation: "merge" }.is_configuration());
        assert!(Error::Configuration("bad".to_string()).is_configuration());
        assert!(!Error::UnresolvedIdentity { id: "x".to_string() }.is_configuration());
        assert!(!Error::DuplicateRegistration { id: "x".to_string() }.is_configuration());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::NullArgument { argument: "timeout" };
        assert_eq!(err.to_string(), "Required argument missing: timeout");

        let err = StreamError::TypeMismatch { expected: "i32" };
        assert_eq!(err.to_string(), "Payload type mismatch: expected i32");
    }
}
