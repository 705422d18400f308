/// Error types for the type system
use thiserror::Error;

/// Main error type for type registration and hashing
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum TypesysError {
    #[error("Type {name:?} is already present with a different definition")]
    Conflict { name: String },

    #[error("Type {name:?} is unknown")]
    UnknownType { name: String },
}

/// Result type for type system operations
pub type TypesysResult<T> = Result<T, TypesysError>;

impl TypesysError {
    /// Create a conflict error for a type name
    #[must_use]
    pub fn conflict(name: &str) -> Self {
        TypesysError::Conflict {
            name: name.to_string(),
        }
    }

    /// Create an unknown-type error for a type name
    #[must_use]
    pub fn unknown(name: &str) -> Self {
        TypesysError::UnknownType {
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesysError::conflict("test_msgs/msg/Foo");
        assert!(err.to_string().contains("test_msgs/msg/Foo"));
        assert!(err.to_string().contains("different definition"));

        let err = TypesysError::unknown("test_msgs/msg/Bar");
        assert!(err.to_string().contains("unknown"));
    }
}
