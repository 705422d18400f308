//! Storage backend contract.
//!
//! A storage backend owns the on-disk representation of message streams; the
//! container reader drives it through this interface. Buffers handed out by
//! `messages` belong to the caller; the backend keeps nothing alive beyond
//! the scope of one iteration.

use std::collections::HashMap;
use std::sync::Arc;

use rosbag_types::Connection;

use crate::errors::ReaderResult;

/// One decoded message: connection, log timestamp in nanoseconds, raw
/// serialized payload.
pub type BagMessage = (Arc<Connection>, u64, Vec<u8>);

/// Lazy message sequence handed out by a storage backend.
pub type MessageStream = Box<dyn Iterator<Item = ReaderResult<BagMessage>>>;

/// Contract implemented by storage backends.
pub trait StorageReader {
    /// Open the storage files.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError`](crate::ReaderError) when a file is unreadable
    /// or malformed.
    fn open(&mut self) -> ReaderResult<()>;

    /// Close the storage files, releasing all handles.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError`](crate::ReaderError) when the storage was not
    /// open.
    fn close(&mut self) -> ReaderResult<()>;

    /// Message definitions carried inside the storage, keyed by type name,
    /// as (encoding, raw definition text) pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError`](crate::ReaderError) on storage-level problems.
    fn get_definitions(&mut self) -> ReaderResult<HashMap<String, (String, String)>>;

    /// Messages matching the connection filter within the half-open time
    /// range `[start, stop)`. An empty filter passes all connections; `None`
    /// bounds default to 0 and 2^63 - 1.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError`](crate::ReaderError) when the storage is not
    /// open or malformed.
    fn messages(
        &mut self,
        connections: &[Arc<Connection>],
        start: Option<u64>,
        stop: Option<u64>,
    ) -> ReaderResult<MessageStream>;
}
