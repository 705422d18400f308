#![deny(
    unsafe_code,
    unused_must_use,
    unreachable_pub,
    rust_2018_idioms,
    missing_docs,
    clippy::pedantic
)]

//! # Rosbag2 Containers
//!
//! Reader and writer for the directory-based rosbag2 container layout:
//! a `metadata.yaml` file describing the bag next to one or more storage
//! files. The MCAP storage backend is built in; storage backends plug in
//! through the [`StorageReader`] contract.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rosbag2::Reader;
//!
//! let mut reader = Reader::new("/path/to/bag")?;
//! reader.open()?;
//! for message in reader.messages(&[], None, None)? {
//!     let (connection, timestamp, raw) = message?;
//!     println!("{} @ {timestamp}: {} bytes", connection.topic, raw.len());
//! }
//! reader.close()?;
//! # Ok::<(), rosbag2::ReaderError>(())
//! ```

/// Error handling for bag containers
pub mod errors;
/// metadata.yaml model
pub mod metadata;
/// Rosbag2 reader
pub mod reader;
/// Storage backend contract
pub mod storage;
/// MCAP storage backend
pub mod storage_mcap;
/// Rosbag2 writer
pub mod writer;

pub use errors::{ReaderError, ReaderResult, WriterError, WriterResult};
pub use metadata::{FileInformation, Metadata, TopicMetadata, TopicWithCount};
pub use reader::Reader;
pub use storage::{BagMessage, MessageStream, StorageReader};
pub use storage_mcap::{McapFile, ReaderMcap};
pub use writer::{CompressionFormat, CompressionMode, Writer};
