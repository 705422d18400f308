//! metadata.yaml model.
//!
//! Top-level key `rosbag2_bagfile_information`, versions 1 through 8.
//! Version 4 added QoS metadata to topics, version 6 the per-file list and
//! the custom data map; fields gated on those versions are left at their
//! defaults for older bags.

use std::collections::HashMap;
use std::path::Path;

use yaml_rust2::{Yaml, YamlLoader};

use crate::errors::{ReaderError, ReaderResult};

/// Highest supported metadata version
pub const SUPPORTED_VERSION: i64 = 8;

/// Topic description within the metadata file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicMetadata {
    /// Topic name
    pub name: String,
    /// Message type name
    pub msgtype: String,
    /// Message serialization format
    pub serialization_format: String,
    /// Opaque QoS profile string, version 4 and above
    pub offered_qos_profiles: String,
    /// RIHS01 digest, present in newer bags
    pub type_description_hash: String,
}

/// Topic with its recorded message count
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicWithCount {
    /// Topic description
    pub topic_metadata: TopicMetadata,
    /// Recorded message count
    pub message_count: u64,
}

/// Per storage file information, version 5 and above
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileInformation {
    /// Relative file path
    pub path: String,
    /// Timestamp of the earliest message in the file
    pub starting_time_ns: u64,
    /// Duration between earliest and latest message
    pub duration_ns: u64,
    /// Message count in the file
    pub message_count: u64,
}

/// Contents of a rosbag2 metadata.yaml file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    /// Metadata format version
    pub version: i64,
    /// Storage plugin identifier
    pub storage_identifier: String,
    /// Relative paths of the storage files
    pub relative_file_paths: Vec<String>,
    /// Timestamp of the earliest message
    pub starting_time_ns: u64,
    /// Duration between earliest and latest message
    pub duration_ns: u64,
    /// Total message count
    pub message_count: u64,
    /// Topics with counts
    pub topics_with_message_count: Vec<TopicWithCount>,
    /// Compression format, empty when uncompressed
    pub compression_format: String,
    /// Compression mode, empty or `none` when uncompressed
    pub compression_mode: String,
    /// Per file information, version 5 and above
    pub files: Vec<FileInformation>,
    /// Free-form string map, version 6 and above
    pub custom_data: HashMap<String, String>,
}

/// Load and validate a metadata.yaml file.
///
/// # Errors
///
/// Returns [`ReaderError::Metadata`] when the file is unreadable, not valid
/// YAML, or missing required keys, and the dedicated variants for
/// unsupported versions and storage identifiers.
pub fn parse_metadata_file(path: &Path) -> ReaderResult<Metadata> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| ReaderError::metadata(path, &err.to_string()))?;
    parse_metadata(&text).map_err(|err| match err {
        ReaderError::Metadata { reason, .. } => ReaderError::Metadata {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

/// Parse metadata.yaml content.
///
/// # Errors
///
/// See [`parse_metadata_file`].
pub fn parse_metadata(text: &str) -> ReaderResult<Metadata> {
    let docs = YamlLoader::load_from_str(text)
        .map_err(|err| invalid(&format!("could not load YAML: {err}")))?;
    let doc = docs.first().ok_or_else(|| invalid("empty document"))?;
    let info = &doc["rosbag2_bagfile_information"];
    if info.is_badvalue() {
        return Err(invalid("key 'rosbag2_bagfile_information' is missing"));
    }

    let version = required(info, "version")?
        .as_i64()
        .ok_or_else(|| invalid("'version' is not an integer"))?;
    if version > SUPPORTED_VERSION {
        return Err(ReaderError::UnsupportedVersion { version });
    }

    let storage_identifier = required_str(info, "storage_identifier")?;
    if storage_identifier != "sqlite3" && storage_identifier != "mcap" {
        return Err(ReaderError::UnsupportedStorage {
            name: storage_identifier,
        });
    }

    let relative_file_paths = required(info, "relative_file_paths")?
        .as_vec()
        .ok_or_else(|| invalid("'relative_file_paths' is not a list"))?
        .iter()
        .filter_map(|item| item.as_str().map(ToString::to_string))
        .collect();

    let starting_time_ns =
        required_u64(&required(info, "starting_time")?["nanoseconds_since_epoch"])?;
    let duration_ns = required_u64(&required(info, "duration")?["nanoseconds"])?;
    let message_count = required_u64(required(info, "message_count")?)?;

    let mut topics = Vec::new();
    for entry in required(info, "topics_with_message_count")?
        .as_vec()
        .ok_or_else(|| invalid("'topics_with_message_count' is not a list"))?
    {
        let meta = &entry["topic_metadata"];
        if meta.is_badvalue() {
            return Err(invalid("key 'topic_metadata' is missing"));
        }
        topics.push(TopicWithCount {
            topic_metadata: TopicMetadata {
                name: required_str(meta, "name")?,
                msgtype: required_str(meta, "type")?,
                serialization_format: required_str(meta, "serialization_format")?,
                offered_qos_profiles: if version >= 4 {
                    optional_str(meta, "offered_qos_profiles")
                } else {
                    String::new()
                },
                type_description_hash: optional_str(meta, "type_description_hash"),
            },
            message_count: required_u64(&entry["message_count"])?,
        });
    }

    let compression_format = optional_str(info, "compression_format");
    let compression_mode = optional_str(info, "compression_mode");

    let mut files = Vec::new();
    let mut custom_data = HashMap::new();
    if version >= 6 {
        if let Some(entries) = info["files"].as_vec() {
            for entry in entries {
                files.push(FileInformation {
                    path: optional_str(entry, "path"),
                    starting_time_ns: entry["starting_time"]["nanoseconds_since_epoch"]
                        .as_i64()
                        .and_then(|v| u64::try_from(v).ok())
                        .unwrap_or(0),
                    duration_ns: entry["duration"]["nanoseconds"]
                        .as_i64()
                        .and_then(|v| u64::try_from(v).ok())
                        .unwrap_or(0),
                    message_count: entry["message_count"]
                        .as_i64()
                        .and_then(|v| u64::try_from(v).ok())
                        .unwrap_or(0),
                });
            }
        }
        if let Some(map) = info["custom_data"].as_hash() {
            for (key, value) in map {
                if let (Some(key), Some(value)) = (key.as_str(), value.as_str()) {
                    custom_data.insert(key.to_string(), value.to_string());
                }
            }
        }
    }

    Ok(Metadata {
        version,
        storage_identifier,
        relative_file_paths,
        starting_time_ns,
        duration_ns,
        message_count,
        topics_with_message_count: topics,
        compression_format,
        compression_mode,
        files,
        custom_data,
    })
}

fn invalid(reason: &str) -> ReaderError {
    ReaderError::Metadata {
        path: "metadata.yaml".to_string(),
        reason: reason.to_string(),
    }
}

fn required<'a>(node: &'a Yaml, key: &str) -> ReaderResult<&'a Yaml> {
    let value = &node[key];
    if value.is_badvalue() {
        return Err(invalid(&format!("key {key:?} is missing")));
    }
    Ok(value)
}

fn required_str(node: &Yaml, key: &str) -> ReaderResult<String> {
    required(node, key)?
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| invalid(&format!("key {key:?} is not a string")))
}

fn optional_str(node: &Yaml, key: &str) -> String {
    node[key].as_str().unwrap_or("").to_string()
}

fn required_u64(node: &Yaml) -> ReaderResult<u64> {
    node.as_i64()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| invalid("expected a non-negative integer"))
}
