/// Error types for bag containers
use rosbag_types::TypesysError;
use thiserror::Error;

/// Container-level reader error
#[derive(Error, Debug)]
pub enum ReaderError {
    /// metadata.yaml unreadable or structurally invalid
    #[error("Could not read metadata at {path}: {reason}")]
    Metadata {
        /// Path of the metadata file
        path: String,
        /// Description of the problem
        reason: String,
    },

    /// Bag version above the supported ceiling
    #[error("Rosbag2 version {version} is not supported; please report issue")]
    UnsupportedVersion {
        /// Declared version
        version: i64,
    },

    /// Unknown or unavailable storage plugin
    #[error("Storage plugin {name:?} is not supported; please report issue")]
    UnsupportedStorage {
        /// Declared storage identifier
        name: String,
    },

    /// Message serialization format other than CDR
    #[error("Serialization format {format:?} is not supported")]
    UnsupportedSerialization {
        /// Declared serialization format
        format: String,
    },

    /// Compression format other than zstd, or an unknown chunk compression
    #[error("Compression format {format:?} is not supported")]
    UnsupportedCompression {
        /// Declared compression format
        format: String,
    },

    /// Storage files referenced by the metadata are absent
    #[error("Some storage files are missing: {paths:?}")]
    MissingFiles {
        /// Missing paths
        paths: Vec<String>,
    },

    /// Operation requires an opened bag
    #[error("Rosbag is not open")]
    NotOpen,

    /// Malformed storage file
    #[error("Invalid storage file {path:?}: {reason}")]
    Storage {
        /// Path of the storage file
        path: String,
        /// Description of the problem
        reason: String,
    },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for reader operations
pub type ReaderResult<T> = Result<T, ReaderError>;

impl ReaderError {
    /// Create a metadata error
    #[must_use]
    pub fn metadata(path: &std::path::Path, reason: &str) -> Self {
        ReaderError::Metadata {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a storage-file error
    #[must_use]
    pub fn storage(path: &std::path::Path, reason: &str) -> Self {
        ReaderError::Storage {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Container-level writer error
#[derive(Error, Debug)]
pub enum WriterError {
    /// Output path occupied
    #[error("{path} exists already, not overwriting")]
    PathExists {
        /// Occupied path
        path: String,
    },

    /// Operation requires an opened bag
    #[error("Bag was not opened")]
    NotOpen,

    /// Operation only valid before opening
    #[error("Cannot reconfigure, bag {path} already open")]
    AlreadyOpen {
        /// Path of the open bag
        path: String,
    },

    /// Connection for the same topic, type, and extension already added
    #[error("Connection can only be added once: {topic} ({msgtype})")]
    DuplicateConnection {
        /// Topic name
        topic: String,
        /// Message type name
        msgtype: String,
    },

    /// Write to a connection this writer does not know
    #[error("Tried to write to unknown connection {id}")]
    UnknownConnection {
        /// Connection id
        id: u32,
    },

    /// Message definition generation failed
    #[error(transparent)]
    Typesys(#[from] TypesysError),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for writer operations
pub type WriterResult<T> = Result<T, WriterError>;
