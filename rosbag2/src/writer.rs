//! Rosbag2 writer.
//!
//! Writes version 8 bags with MCAP storage: one storage file next to a
//! `metadata.yaml` emitted on close. Message definitions and RIHS01 digests
//! for added connections come from a type registry unless supplied by the
//! caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rosbag_types::{Connection, ConnectionExtRosbag2, TypeRegistry, generate_msgdef, hash_rihs01};
use yaml_rust2::YamlEmitter;
use yaml_rust2::yaml::{Hash as YamlHash, Yaml};

use crate::errors::{WriterError, WriterResult};
use crate::storage_mcap::McapWriter;

/// Compression modes supported on write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMode {
    /// No compression
    #[default]
    None,
    /// Compress the whole storage file on close
    File,
    /// Compress each message payload
    Message,
}

/// Compression formats supported on write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionFormat {
    /// Zstandard
    #[default]
    Zstd,
}

/// Writer for rosbag2 directories.
pub struct Writer {
    path: PathBuf,
    storage_path: PathBuf,
    compression_mode: CompressionMode,
    connections: Vec<Arc<Connection>>,
    counts: Vec<u64>,
    schema_ids: Vec<(String, u16)>,
    custom_data: BTreeMap<String, String>,
    storage: Option<McapWriter>,
    message_count: u64,
    start_time: u64,
    end_time: u64,
}

impl Writer {
    /// Set up a writer for a new bag directory.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::PathExists`] when the target already exists;
    /// this writer only creates new bags.
    pub fn new<P: AsRef<Path>>(path: P) -> WriterResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(WriterError::PathExists {
                path: path.display().to_string(),
            });
        }
        let name = path
            .file_name()
            .map_or_else(|| "bag".to_string(), |n| n.to_string_lossy().into_owned());
        let storage_path = path.join(format!("{name}.mcap"));
        Ok(Self {
            path,
            storage_path,
            compression_mode: CompressionMode::None,
            connections: Vec::new(),
            counts: Vec::new(),
            schema_ids: Vec::new(),
            custom_data: BTreeMap::new(),
            storage: None,
            message_count: 0,
            start_time: u64::MAX,
            end_time: 0,
        })
    }

    /// Enable compression, before opening the bag.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::AlreadyOpen`] when the bag is already open.
    pub fn set_compression(
        &mut self,
        mode: CompressionMode,
        _format: CompressionFormat,
    ) -> WriterResult<()> {
        if self.storage.is_some() {
            return Err(WriterError::AlreadyOpen {
                path: self.path.display().to_string(),
            });
        }
        self.compression_mode = mode;
        Ok(())
    }

    /// Set a key/value pair in the custom metadata map.
    pub fn set_custom_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_data.insert(key.into(), value.into());
    }

    /// Create the bag directory and the storage file.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError`] when the directory exists or cannot be
    /// created.
    pub fn open(&mut self) -> WriterResult<()> {
        if self.path.exists() {
            return Err(WriterError::PathExists {
                path: self.path.display().to_string(),
            });
        }
        std::fs::create_dir_all(&self.path)?;
        self.storage = Some(McapWriter::create(&self.storage_path)?);
        Ok(())
    }

    /// Connections added so far.
    #[must_use]
    pub fn connections(&self) -> &[Arc<Connection>] {
        &self.connections
    }

    /// Add a connection, deriving the message definition and RIHS01 digest
    /// from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError`] when the bag is not open, the type is not
    /// registered, or the connection was already added.
    pub fn add_connection(
        &mut self,
        topic: &str,
        msgtype: &str,
        registry: &TypeRegistry,
    ) -> WriterResult<Arc<Connection>> {
        let (msgdef, _) = generate_msgdef(msgtype, registry, 2)?;
        let digest = hash_rihs01(msgtype, registry)?;
        self.add_connection_raw(topic, msgtype, &msgdef, &digest, "cdr", "")
    }

    /// Add a connection with an explicit definition and digest.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::NotOpen`] when the bag is not open and
    /// [`WriterError::DuplicateConnection`] when the same topic, type, and
    /// extension were added before.
    pub fn add_connection_raw(
        &mut self,
        topic: &str,
        msgtype: &str,
        msgdef: &str,
        digest: &str,
        serialization_format: &str,
        offered_qos_profiles: &str,
    ) -> WriterResult<Arc<Connection>> {
        let storage = self.storage.as_mut().ok_or(WriterError::NotOpen)?;

        let ext = ConnectionExtRosbag2 {
            serialization_format: serialization_format.to_string(),
            offered_qos_profiles: offered_qos_profiles.to_string(),
        };
        if self
            .connections
            .iter()
            .any(|conn| conn.topic == topic && conn.msgtype == msgtype && conn.ext == ext)
        {
            return Err(WriterError::DuplicateConnection {
                topic: topic.to_string(),
                msgtype: msgtype.to_string(),
            });
        }

        let schema_id = match self
            .schema_ids
            .iter()
            .find(|(name, _)| name == msgtype)
        {
            Some(&(_, id)) => id,
            None => {
                let id = u16::try_from(self.schema_ids.len()).unwrap_or(u16::MAX) + 1;
                storage.add_schema(id, msgtype, "ros2msg", msgdef)?;
                self.schema_ids.push((msgtype.to_string(), id));
                id
            }
        };

        let id = u32::try_from(self.connections.len()).unwrap_or(u32::MAX) + 1;
        storage.add_channel(
            u16::try_from(id).unwrap_or(u16::MAX),
            schema_id,
            topic,
            serialization_format,
        )?;

        let connection = Arc::new(Connection {
            id,
            topic: topic.to_string(),
            msgtype: msgtype.to_string(),
            msgdef: msgdef.to_string(),
            digest: digest.to_string(),
            msgcount: 0,
            ext,
        });
        self.connections.push(Arc::clone(&connection));
        self.counts.push(0);
        Ok(connection)
    }

    /// Write a message to the bag.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::NotOpen`] when the bag is not open and
    /// [`WriterError::UnknownConnection`] for connections this writer did
    /// not hand out.
    pub fn write(
        &mut self,
        connection: &Connection,
        timestamp: u64,
        data: &[u8],
    ) -> WriterResult<()> {
        let storage = self.storage.as_mut().ok_or(WriterError::NotOpen)?;
        let index = self
            .connections
            .iter()
            .position(|conn| conn.id == connection.id && conn.topic == connection.topic)
            .ok_or(WriterError::UnknownConnection { id: connection.id })?;

        let compressed;
        let payload = if self.compression_mode == CompressionMode::Message {
            compressed = zstd::stream::encode_all(data, 0)?;
            &compressed[..]
        } else {
            data
        };

        self.counts[index] += 1;
        let sequence = u32::try_from(self.counts[index]).unwrap_or(u32::MAX);
        storage.write_message(
            u16::try_from(connection.id).unwrap_or(u16::MAX),
            sequence,
            timestamp,
            payload,
        )?;
        self.message_count += 1;
        self.start_time = self.start_time.min(timestamp);
        self.end_time = self.end_time.max(timestamp);
        Ok(())
    }

    /// Finalize the storage file and write metadata.yaml.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError::NotOpen`] when the bag is not open, and I/O
    /// errors from finalizing the files.
    pub fn close(&mut self) -> WriterResult<()> {
        let storage = self.storage.take().ok_or(WriterError::NotOpen)?;
        storage.finish()?;

        let mut storage_name = self
            .storage_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.compression_mode == CompressionMode::File {
            let compressed_path = self.storage_path.with_extension("mcap.zstd");
            let mut infile = std::fs::File::open(&self.storage_path)?;
            let mut outfile = std::fs::File::create(&compressed_path)?;
            zstd::stream::copy_encode(&mut infile, &mut outfile, 0)?;
            std::fs::remove_file(&self.storage_path)?;
            storage_name = compressed_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        let text = self.render_metadata(&storage_name);
        std::fs::write(self.path.join("metadata.yaml"), text)?;
        Ok(())
    }

    fn render_metadata(&self, storage_name: &str) -> String {
        let start = if self.message_count == 0 {
            0
        } else {
            self.start_time
        };
        let duration = if self.message_count == 0 {
            0
        } else {
            self.end_time - self.start_time
        };
        let (compression_format, compression_mode) = match self.compression_mode {
            CompressionMode::None => (String::new(), String::new()),
            CompressionMode::File => ("zstd".to_string(), "file".to_string()),
            CompressionMode::Message => ("zstd".to_string(), "message".to_string()),
        };

        let time_hash = |value: u64, key: &str| {
            let mut hash = YamlHash::new();
            hash.insert(
                Yaml::String(key.to_string()),
                Yaml::Integer(i64::try_from(value).unwrap_or(i64::MAX)),
            );
            Yaml::Hash(hash)
        };

        let mut info = YamlHash::new();
        info.insert(Yaml::String("version".into()), Yaml::Integer(8));
        info.insert(
            Yaml::String("storage_identifier".into()),
            Yaml::String("mcap".into()),
        );
        info.insert(
            Yaml::String("relative_file_paths".into()),
            Yaml::Array(vec![Yaml::String(storage_name.to_string())]),
        );
        info.insert(
            Yaml::String("duration".into()),
            time_hash(duration, "nanoseconds"),
        );
        info.insert(
            Yaml::String("starting_time".into()),
            time_hash(start, "nanoseconds_since_epoch"),
        );
        info.insert(
            Yaml::String("message_count".into()),
            Yaml::Integer(i64::try_from(self.message_count).unwrap_or(i64::MAX)),
        );

        let topics: Vec<Yaml> = self
            .connections
            .iter()
            .zip(&self.counts)
            .map(|(conn, count)| {
                let mut topic_metadata = YamlHash::new();
                topic_metadata.insert(
                    Yaml::String("name".into()),
                    Yaml::String(conn.topic.clone()),
                );
                topic_metadata.insert(
                    Yaml::String("type".into()),
                    Yaml::String(conn.msgtype.clone()),
                );
                topic_metadata.insert(
                    Yaml::String("serialization_format".into()),
                    Yaml::String(conn.ext.serialization_format.clone()),
                );
                topic_metadata.insert(
                    Yaml::String("offered_qos_profiles".into()),
                    Yaml::String(conn.ext.offered_qos_profiles.clone()),
                );
                topic_metadata.insert(
                    Yaml::String("type_description_hash".into()),
                    Yaml::String(conn.digest.clone()),
                );
                let mut entry = YamlHash::new();
                entry.insert(Yaml::String("topic_metadata".into()), Yaml::Hash(topic_metadata));
                entry.insert(
                    Yaml::String("message_count".into()),
                    Yaml::Integer(i64::try_from(*count).unwrap_or(i64::MAX)),
                );
                Yaml::Hash(entry)
            })
            .collect();
        info.insert(
            Yaml::String("topics_with_message_count".into()),
            Yaml::Array(topics),
        );
        info.insert(
            Yaml::String("compression_format".into()),
            Yaml::String(compression_format),
        );
        info.insert(
            Yaml::String("compression_mode".into()),
            Yaml::String(compression_mode),
        );

        let mut file_entry = YamlHash::new();
        file_entry.insert(
            Yaml::String("path".into()),
            Yaml::String(storage_name.to_string()),
        );
        file_entry.insert(
            Yaml::String("starting_time".into()),
            time_hash(start, "nanoseconds_since_epoch"),
        );
        file_entry.insert(
            Yaml::String("duration".into()),
            time_hash(duration, "nanoseconds"),
        );
        file_entry.insert(
            Yaml::String("message_count".into()),
            Yaml::Integer(i64::try_from(self.message_count).unwrap_or(i64::MAX)),
        );
        info.insert(
            Yaml::String("files".into()),
            Yaml::Array(vec![Yaml::Hash(file_entry)]),
        );

        let mut custom = YamlHash::new();
        for (key, value) in &self.custom_data {
            custom.insert(Yaml::String(key.clone()), Yaml::String(value.clone()));
        }
        info.insert(Yaml::String("custom_data".into()), Yaml::Hash(custom));
        info.insert(
            Yaml::String("ros_distro".into()),
            Yaml::String("rosbags".into()),
        );

        let mut root = YamlHash::new();
        root.insert(
            Yaml::String("rosbag2_bagfile_information".into()),
            Yaml::Hash(info),
        );

        let mut out = String::new();
        let mut emitter = YamlEmitter::new(&mut out);
        // emission into a string cannot fail
        let _ = emitter.dump(&Yaml::Hash(root));
        out.push('\n');
        out
    }
}
