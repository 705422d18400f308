//! Rosbag2 reader.
//!
//! Validates the bag metadata, dispatches to the storage backend named by
//! the `storage_identifier`, and hands out lazy message iterators. Whole-file
//! zstd compression is unpacked into a scratch directory that lives exactly
//! as long as the open bag session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rosbag_types::{Connection, ConnectionExtRosbag2};
use tempfile::TempDir;
use tracing::debug;

use crate::errors::{ReaderError, ReaderResult};
use crate::metadata::{Metadata, parse_metadata_file};
use crate::storage::{MessageStream, StorageReader};
use crate::storage_mcap::ReaderMcap;

/// Reader for rosbag2 directories.
///
/// Construction loads and validates `metadata.yaml`; [`open`](Reader::open)
/// acquires the storage files and [`close`](Reader::close) releases them
/// again. Message iteration is lazy and may be abandoned at any point.
pub struct Reader {
    path: PathBuf,
    metadata: Metadata,
    paths: Vec<PathBuf>,
    connections: Vec<Arc<Connection>>,
    definitions: HashMap<String, (String, String)>,
    storage: Option<Box<dyn StorageReader>>,
    tmpdir: Option<TempDir>,
}

impl Reader {
    /// Open a bag directory and check its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError`] when the metadata is unreadable, names an
    /// unsupported version, storage, serialization, or compression, or when
    /// storage files are missing.
    pub fn new<P: AsRef<Path>>(path: P) -> ReaderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = parse_metadata_file(&path.join("metadata.yaml"))?;

        let paths: Vec<PathBuf> = metadata
            .relative_file_paths
            .iter()
            .filter_map(|relative| Path::new(relative).file_name())
            .map(|name| path.join(name))
            .collect();
        let missing: Vec<String> = paths
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ReaderError::MissingFiles { paths: missing });
        }

        let connections: Vec<Arc<Connection>> = metadata
            .topics_with_message_count
            .iter()
            .enumerate()
            .map(|(idx, topic)| {
                Arc::new(Connection {
                    id: u32::try_from(idx).unwrap_or(u32::MAX) + 1,
                    topic: topic.topic_metadata.name.clone(),
                    msgtype: topic.topic_metadata.msgtype.clone(),
                    msgdef: String::new(),
                    digest: topic.topic_metadata.type_description_hash.clone(),
                    msgcount: topic.message_count,
                    ext: ConnectionExtRosbag2 {
                        serialization_format: topic.topic_metadata.serialization_format.clone(),
                        offered_qos_profiles: topic.topic_metadata.offered_qos_profiles.clone(),
                    },
                })
            })
            .collect();

        if let Some(conn) = connections
            .iter()
            .find(|conn| conn.ext.serialization_format != "cdr")
        {
            return Err(ReaderError::UnsupportedSerialization {
                format: conn.ext.serialization_format.clone(),
            });
        }

        let reader = Self {
            path,
            metadata,
            paths,
            connections,
            definitions: HashMap::new(),
            storage: None,
            tmpdir: None,
        };
        if reader.compression_mode().is_some() {
            let format = reader.compression_format().unwrap_or_default().to_string();
            if format != "zstd" {
                return Err(ReaderError::UnsupportedCompression { format });
            }
        }
        Ok(reader)
    }

    /// Duration in nanoseconds between earliest and latest messages.
    #[must_use]
    pub fn duration(&self) -> u64 {
        if self.metadata.message_count == 0 {
            0
        } else {
            self.metadata.duration_ns + 1
        }
    }

    /// Timestamp in nanoseconds of the earliest message.
    #[must_use]
    pub fn start_time(&self) -> u64 {
        if self.metadata.message_count == 0 {
            (1 << 63) - 1
        } else {
            self.metadata.starting_time_ns
        }
    }

    /// Timestamp in nanoseconds after the latest message.
    #[must_use]
    pub fn end_time(&self) -> u64 {
        if self.metadata.message_count == 0 {
            0
        } else {
            self.start_time() + self.duration()
        }
    }

    /// Total message count.
    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.metadata.message_count
    }

    /// Compression format, when compression is enabled.
    #[must_use]
    pub fn compression_format(&self) -> Option<&str> {
        if self.metadata.compression_format.is_empty() {
            None
        } else {
            Some(&self.metadata.compression_format)
        }
    }

    /// Compression mode (`file` or `message`), when compression is enabled.
    #[must_use]
    pub fn compression_mode(&self) -> Option<String> {
        let mode = self.metadata.compression_mode.to_lowercase();
        if mode.is_empty() || mode == "none" {
            None
        } else {
            Some(mode)
        }
    }

    /// Custom key/value metadata, version 6 and above.
    #[must_use]
    pub fn custom_data(&self) -> &HashMap<String, String> {
        &self.metadata.custom_data
    }

    /// Raw bag metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Connections of the bag, in metadata order.
    ///
    /// Message definitions and digests carried by the storage are filled in
    /// by [`open`](Reader::open).
    #[must_use]
    pub fn connections(&self) -> &[Arc<Connection>] {
        &self.connections
    }

    /// Message definitions carried by the storage, keyed by type name, as
    /// (encoding, raw definition text) pairs. Populated by
    /// [`open`](Reader::open).
    #[must_use]
    pub fn definitions(&self) -> &HashMap<String, (String, String)> {
        &self.definitions
    }

    /// Topic names with their connections, in metadata order.
    #[must_use]
    pub fn topics(&self) -> Vec<(&str, &Arc<Connection>)> {
        self.connections
            .iter()
            .map(|conn| (conn.topic.as_str(), conn))
            .collect()
    }

    /// Open the storage files.
    ///
    /// With `file` compression every storage file is unpacked into a scratch
    /// directory first; the scratch space is released on
    /// [`close`](Reader::close) and on drop.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError`] when a storage file is unreadable or
    /// malformed, or the storage plugin is not available.
    pub fn open(&mut self) -> ReaderResult<()> {
        let storage_paths = if self.compression_mode().as_deref() == Some("file") {
            let tmpdir = TempDir::new()?;
            let mut storage_paths = Vec::new();
            for path in &self.paths {
                let stem = path
                    .file_stem()
                    .ok_or_else(|| ReaderError::storage(path, "invalid file name"))?;
                let target = tmpdir.path().join(stem);
                let mut infile = std::fs::File::open(path)?;
                let mut outfile = std::fs::File::create(&target)?;
                zstd::stream::copy_decode(&mut infile, &mut outfile)?;
                storage_paths.push(target);
            }
            self.tmpdir = Some(tmpdir);
            storage_paths
        } else {
            self.paths.clone()
        };

        let mut storage: Box<dyn StorageReader> = match self.metadata.storage_identifier.as_str() {
            "mcap" => Box::new(ReaderMcap::new(storage_paths, self.connections.clone())),
            other => {
                return Err(ReaderError::UnsupportedStorage {
                    name: other.to_string(),
                });
            }
        };
        storage.open()?;
        self.definitions = storage.get_definitions()?;

        for conn in &mut self.connections {
            if let Some((_, msgdef)) = self.definitions.get(&conn.msgtype) {
                let mut updated = (**conn).clone();
                updated.msgdef.clone_from(msgdef);
                *conn = Arc::new(updated);
            }
        }

        self.storage = Some(storage);
        debug!(path = %self.path.display(), connections = self.connections.len(), "opened rosbag2");
        Ok(())
    }

    /// Close the storage files and release scratch space.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::NotOpen`] when the bag was not open.
    pub fn close(&mut self) -> ReaderResult<()> {
        let mut storage = self.storage.take().ok_or(ReaderError::NotOpen)?;
        storage.close()?;
        self.tmpdir = None;
        Ok(())
    }

    /// Read messages from the bag.
    ///
    /// `connections` filters the streams to read, an empty slice reads all.
    /// The time range is half-open: `start <= t < stop`, with `None` bounds
    /// defaulting to 0 and 2^63 - 1. With `message` compression each payload
    /// is unpacked transparently.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::NotOpen`] when the bag was not open; iteration
    /// errors surface through the stream.
    pub fn messages(
        &mut self,
        connections: &[Arc<Connection>],
        start: Option<u64>,
        stop: Option<u64>,
    ) -> ReaderResult<MessageStream> {
        let message_compression = self.compression_mode().as_deref() == Some("message");
        let storage = self.storage.as_mut().ok_or(ReaderError::NotOpen)?;
        let stream = storage.messages(connections, start, stop)?;
        if message_compression {
            Ok(Box::new(stream.map(|item| {
                item.and_then(|(conn, timestamp, data)| {
                    let data = zstd::stream::decode_all(&data[..]).map_err(|err| {
                        ReaderError::UnsupportedCompression {
                            format: format!("zstd: {err}"),
                        }
                    })?;
                    Ok((conn, timestamp, data))
                })
            })))
        } else {
            Ok(stream)
        }
    }
}
