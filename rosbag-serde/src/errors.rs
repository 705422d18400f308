/// Error types for message serialization
use rosbag_types::TypesysError;
use thiserror::Error;

/// Serialization and conversion error
#[derive(Error, Debug)]
pub enum SerdeError {
    /// Value shape does not match the descriptor
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected shape derived from the descriptor
        expected: String,
        /// Actual value variant
        found: String,
    },

    /// Fixed-size array value with the wrong element count
    #[error("Unexpected array length")]
    UnexpectedArrayLength,

    /// Input buffer ended before the descriptor was exhausted
    #[error("Buffer too short: need {need} more bytes at offset {offset}")]
    ShortBuffer {
        /// Missing byte count
        need: usize,
        /// Read position where the underrun occurred
        offset: usize,
    },

    /// Invalid or unsupported CDR encapsulation
    #[error("Invalid CDR encapsulation: {reason}")]
    Encapsulation {
        /// Description of the problem
        reason: String,
    },

    /// Unknown or conflicting type in the registry
    #[error(transparent)]
    Typesys(#[from] TypesysError),
}

/// Result type for serialization operations
pub type SerdeResult<T> = Result<T, SerdeError>;

impl SerdeError {
    /// Create a type mismatch error
    #[must_use]
    pub fn mismatch(expected: &str, found: &str) -> Self {
        SerdeError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Create an encapsulation error
    #[must_use]
    pub fn encapsulation(reason: &str) -> Self {
        SerdeError::Encapsulation {
            reason: reason.to_string(),
        }
    }
}
