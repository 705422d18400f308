//! Container tests over hand-built MCAP files and writer round-trips.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rosbag2::{CompressionFormat, CompressionMode, Reader, ReaderError, Writer};
use rosbag_types::{Connection, TypeRegistry};

const MSG_POLY: &[u8] = &[
    0x00, 0x01, 0x00, 0x00, //
    0x02, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x80, 0x3f, //
    0x00, 0x00, 0x00, 0x40, //
    0x00, 0x00, 0x40, 0x40, //
    0x00, 0x00, 0xa0, 0x3f, //
    0x00, 0x00, 0x10, 0x40, //
    0x00, 0x00, 0x50, 0x40,
];

const MSG_MAGN: &[u8] = &[
    0x00, 0x01, 0x00, 0x00, //
    0xc4, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, //
    0x06, 0x00, 0x00, 0x00, b'f', b'o', b'o', b'4', b'2', 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x60, 0x40, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x60, 0x40, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x60, 0x40, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x3f, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x3f, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x3f,
];

const MSG_MAGN_BIG: &[u8] = &[
    0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x02, 0xc4, 0x00, 0x00, 0x01, 0x00, //
    0x00, 0x00, 0x00, 0x06, b'f', b'o', b'o', b'4', b'2', 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x40, 0x60, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x40, 0x60, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x40, 0x60, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x3f, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x3f, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x3f, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00,
];

const MSG_JOINT: &[u8] = &[
    0x00, 0x01, 0x00, 0x00, //
    0xc4, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, //
    0x04, 0x00, 0x00, 0x00, b'b', b'a', b'r', 0x00, //
    0x02, 0x00, 0x00, 0x00, //
    0x02, 0x00, 0x00, 0x00, b'a', 0x00, //
    0x00, 0x00, //
    0x02, 0x00, 0x00, 0x00, b'b', 0x00, //
    0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00,
];

const MCAP_MAGIC: &[u8] = b"\x89MCAP0\r\n";

const METADATA: &str = r#"rosbag2_bagfile_information:
  version: 4
  storage_identifier: mcap
  relative_file_paths:
    - db.mcap
  duration:
    nanoseconds: 42
  starting_time:
    nanoseconds_since_epoch: 666
  message_count: 4
  topics_with_message_count:
    - topic_metadata:
        name: /poly
        type: geometry_msgs/msg/Polygon
        serialization_format: cdr
        offered_qos_profiles: ""
      message_count: 1
    - topic_metadata:
        name: /magn
        type: sensor_msgs/msg/MagneticField
        serialization_format: cdr
        offered_qos_profiles: ""
      message_count: 2
    - topic_metadata:
        name: /joint
        type: trajectory_msgs/msg/JointTrajectory
        serialization_format: cdr
        offered_qos_profiles: ""
      message_count: 1
  compression_format: ""
  compression_mode: ""
"#;

fn make_string(text: &str) -> Vec<u8> {
    let mut out = (u32::try_from(text.len()).unwrap()).to_le_bytes().to_vec();
    out.extend_from_slice(text.as_bytes());
    out
}

fn write_record(out: &mut Vec<u8>, op: u8, parts: &[&[u8]]) {
    let data: Vec<u8> = parts.concat();
    out.push(op);
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    out.extend_from_slice(&data);
}

fn schema_record(out: &mut Vec<u8>, id: u16, name: &str) {
    write_record(
        out,
        0x03,
        &[
            &id.to_le_bytes(),
            &make_string(name),
            &make_string("ros2msg"),
            &make_string("string foo"),
        ],
    );
}

fn channel_record(out: &mut Vec<u8>, id: u16, schema_id: u16, topic: &str) {
    write_record(
        out,
        0x04,
        &[
            &id.to_le_bytes(),
            &schema_id.to_le_bytes(),
            &make_string(topic),
            &make_string("cdr"),
            &make_string(""),
        ],
    );
}

fn message_record(out: &mut Vec<u8>, channel_id: u16, sequence: u32, timestamp: u64, data: &[u8]) {
    write_record(
        out,
        0x05,
        &[
            &channel_id.to_le_bytes(),
            &sequence.to_le_bytes(),
            &timestamp.to_le_bytes(),
            &timestamp.to_le_bytes(),
            data,
        ],
    );
}

const SCHEMAS: [(u16, &str); 3] = [
    (1, "geometry_msgs/msg/Polygon"),
    (2, "sensor_msgs/msg/MagneticField"),
    (3, "trajectory_msgs/msg/JointTrajectory"),
];

const CHANNELS: [(u16, u16, &str); 3] = [(1, 1, "/poly"), (2, 2, "/magn"), (3, 3, "/joint")];

#[derive(Clone, Copy, PartialEq)]
enum Variant {
    Unindexed,
    PartiallyIndexed,
    Indexed,
    ChunkedUnindexed,
    ChunkedIndexed,
}

const VARIANTS: [Variant; 5] = [
    Variant::Unindexed,
    Variant::PartiallyIndexed,
    Variant::Indexed,
    Variant::ChunkedUnindexed,
    Variant::ChunkedIndexed,
];

/// Wrap accumulated records into a chunk record, returning the chunk-index
/// payload describing it.
fn flush_chunk(
    out: &mut Vec<u8>,
    records: &[u8],
    messages: &[(u16, u64, usize)],
    start: u64,
    end: u64,
) -> Vec<u8> {
    let chunk_start = out.len() as u64;
    write_record(
        out,
        0x06,
        &[
            &start.to_le_bytes(),
            &end.to_le_bytes(),
            &(records.len() as u64).to_le_bytes(),
            &0u32.to_le_bytes(),
            &make_string(""),
            &(records.len() as u64).to_le_bytes(),
            records,
        ],
    );
    let message_index_start = out.len() as u64;
    let mut index_offsets: Vec<(u16, u64)> = Vec::new();
    let mut idx = 0;
    while idx < messages.len() {
        let channel_id = messages[idx].0;
        index_offsets.push((channel_id, out.len() as u64));
        let mut entries = Vec::new();
        while idx < messages.len() && messages[idx].0 == channel_id {
            entries.extend_from_slice(&messages[idx].1.to_le_bytes());
            entries.extend_from_slice(&(messages[idx].2 as u64).to_le_bytes());
            idx += 1;
        }
        write_record(
            out,
            0x07,
            &[
                &channel_id.to_le_bytes(),
                &(entries.len() as u32).to_le_bytes(),
                &entries,
            ],
        );
    }
    let message_index_length = out.len() as u64 - message_index_start;

    let mut chunk_index = Vec::new();
    chunk_index.extend_from_slice(&start.to_le_bytes());
    chunk_index.extend_from_slice(&end.to_le_bytes());
    chunk_index.extend_from_slice(&chunk_start.to_le_bytes());
    chunk_index.extend_from_slice(&(message_index_start - chunk_start).to_le_bytes());
    chunk_index.extend_from_slice(&(10 * index_offsets.len() as u32).to_le_bytes());
    for (channel_id, offset) in index_offsets {
        chunk_index.extend_from_slice(&channel_id.to_le_bytes());
        chunk_index.extend_from_slice(&offset.to_le_bytes());
    }
    chunk_index.extend_from_slice(&message_index_length.to_le_bytes());
    chunk_index.extend_from_slice(&make_string(""));
    chunk_index.extend_from_slice(&(records.len() as u64).to_le_bytes());
    chunk_index.extend_from_slice(&(records.len() as u64).to_le_bytes());
    chunk_index
}

/// Manually construct an mcap bag in the requested index variant.
fn build_bag(dir: &Path, variant: Variant) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("metadata.yaml"), METADATA).unwrap();

    let chunked = matches!(variant, Variant::ChunkedUnindexed | Variant::ChunkedIndexed);
    let mut out = Vec::new();
    out.extend_from_slice(MCAP_MAGIC);
    write_record(
        &mut out,
        0x01,
        &[&make_string("ros2"), &make_string("test_mcap")],
    );

    let mut chunk_indexes = Vec::new();

    // first batch: polygon on channel 1 at ts 666
    let mut batch = Vec::new();
    let mut batch_msgs = Vec::new();
    schema_record(&mut batch, SCHEMAS[0].0, SCHEMAS[0].1);
    channel_record(&mut batch, CHANNELS[0].0, CHANNELS[0].1, CHANNELS[0].2);
    batch_msgs.push((1u16, 666u64, batch.len()));
    message_record(&mut batch, 1, 1, 666, MSG_POLY);
    if chunked {
        chunk_indexes.push(flush_chunk(&mut out, &batch, &batch_msgs, 666, 666));
    } else {
        out.extend_from_slice(&batch);
    }

    // second batch: both magn messages and the joint message at ts 708
    let mut batch = Vec::new();
    let mut batch_msgs = Vec::new();
    schema_record(&mut batch, SCHEMAS[1].0, SCHEMAS[1].1);
    channel_record(&mut batch, CHANNELS[1].0, CHANNELS[1].1, CHANNELS[1].2);
    batch_msgs.push((2, 708, batch.len()));
    message_record(&mut batch, 2, 1, 708, MSG_MAGN);
    batch_msgs.push((2, 708, batch.len()));
    message_record(&mut batch, 2, 2, 708, MSG_MAGN_BIG);
    schema_record(&mut batch, SCHEMAS[2].0, SCHEMAS[2].1);
    channel_record(&mut batch, CHANNELS[2].0, CHANNELS[2].1, CHANNELS[2].2);
    batch_msgs.push((3, 708, batch.len()));
    message_record(&mut batch, 3, 1, 708, MSG_JOINT);
    if chunked {
        chunk_indexes.push(flush_chunk(&mut out, &batch, &batch_msgs, 708, 708));
    } else {
        out.extend_from_slice(&batch);
    }

    let summary_start = if matches!(
        variant,
        Variant::Indexed | Variant::PartiallyIndexed | Variant::ChunkedIndexed
    ) {
        let summary_start = out.len() as u64;
        for (id, name) in SCHEMAS {
            schema_record(&mut out, id, name);
        }
        if variant != Variant::PartiallyIndexed {
            for (id, schema_id, topic) in CHANNELS {
                channel_record(&mut out, id, schema_id, topic);
            }
        }
        if variant == Variant::ChunkedIndexed {
            for chunk_index in &chunk_indexes {
                write_record(&mut out, 0x08, &[chunk_index]);
            }
        }
        write_record(&mut out, 0x0a, &[b"ignored"]);
        write_record(
            &mut out,
            0x0b,
            &[
                &4u64.to_le_bytes(),
                &3u16.to_le_bytes(),
                &3u32.to_le_bytes(),
                &0u32.to_le_bytes(),
                &0u32.to_le_bytes(),
                &u32::from(chunked).to_le_bytes(),
                &666u64.to_le_bytes(),
                &708u64.to_le_bytes(),
                &0u32.to_le_bytes(),
            ],
        );
        write_record(&mut out, 0x0d, &[b"ignored"]);
        write_record(&mut out, 0xff, &[b"ignored"]);
        summary_start
    } else {
        0
    };

    write_record(
        &mut out,
        0x02,
        &[
            &summary_start.to_le_bytes(),
            &0u64.to_le_bytes(),
            &0u32.to_le_bytes(),
        ],
    );
    out.extend_from_slice(MCAP_MAGIC);

    let path = dir.join("db.mcap");
    std::fs::write(&path, out).unwrap();
    path
}

fn collect(
    reader: &mut Reader,
    filter: &[Arc<Connection>],
    start: Option<u64>,
    stop: Option<u64>,
) -> Vec<(String, u64, Vec<u8>)> {
    reader
        .messages(filter, start, stop)
        .unwrap()
        .map(|item| {
            let (conn, ts, data) = item.unwrap();
            (conn.topic.clone(), ts, data)
        })
        .collect()
}

#[test]
fn test_reader_mcap_variants() {
    for variant in VARIANTS {
        let dir = tempfile::tempdir().unwrap();
        build_bag(dir.path(), variant);

        let mut reader = Reader::new(dir.path()).unwrap();
        assert_eq!(reader.duration(), 43);
        assert_eq!(reader.start_time(), 666);
        assert_eq!(reader.end_time(), 709);
        assert_eq!(reader.message_count(), 4);
        assert_eq!(
            reader.connections().iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            reader.topics().iter().map(|(topic, _)| *topic).collect::<Vec<_>>(),
            vec!["/poly", "/magn", "/joint"]
        );

        reader.open().unwrap();
        let messages = collect(&mut reader, &[], None, None);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ("/poly".to_string(), 666, MSG_POLY.to_vec()));
        assert_eq!(messages[1], ("/magn".to_string(), 708, MSG_MAGN.to_vec()));
        assert_eq!(messages[2], ("/magn".to_string(), 708, MSG_MAGN_BIG.to_vec()));
        assert_eq!(messages[3].0, "/joint");
        assert_eq!(messages[3].2, MSG_JOINT.to_vec());

        // timestamps are non-decreasing in every variant
        let timestamps: Vec<u64> = messages.iter().map(|m| m.1).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));

        reader.close().unwrap();
    }
}

#[test]
fn test_reader_definitions() {
    let dir = tempfile::tempdir().unwrap();
    build_bag(dir.path(), Variant::Unindexed);
    let mut reader = Reader::new(dir.path()).unwrap();
    reader.open().unwrap();
    let definitions = reader.definitions();
    assert_eq!(definitions.len(), 3);
    assert_eq!(
        definitions["geometry_msgs/msg/Polygon"],
        ("msg".to_string(), "string foo".to_string())
    );
    let poly = reader
        .connections()
        .iter()
        .find(|c| c.topic == "/poly")
        .unwrap()
        .clone();
    assert_eq!(poly.msgdef, "string foo");
    reader.close().unwrap();
}

#[test]
fn test_message_filters_mcap() {
    for variant in VARIANTS {
        let dir = tempfile::tempdir().unwrap();
        build_bag(dir.path(), variant);

        let mut reader = Reader::new(dir.path()).unwrap();
        reader.open().unwrap();

        let magn: Vec<Arc<Connection>> = reader
            .connections()
            .iter()
            .filter(|conn| conn.topic == "/magn")
            .cloned()
            .collect();

        let messages = collect(&mut reader, &magn, None, None);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.0 == "/magn"));
        assert_eq!((messages[0].1, messages[1].1), (708, 708));

        let messages = collect(&mut reader, &[], Some(667), None);
        assert_eq!(
            messages.iter().map(|m| m.0.as_str()).collect::<Vec<_>>(),
            vec!["/magn", "/magn", "/joint"]
        );

        let messages = collect(&mut reader, &[], None, Some(667));
        assert_eq!(
            messages.iter().map(|m| m.0.as_str()).collect::<Vec<_>>(),
            vec!["/poly"]
        );

        assert!(collect(&mut reader, &magn, None, Some(667)).is_empty());
        assert!(collect(&mut reader, &[], Some(666), Some(666)).is_empty());

        reader.close().unwrap();
    }
}

#[test]
fn test_reader_not_open() {
    let dir = tempfile::tempdir().unwrap();
    build_bag(dir.path(), Variant::Unindexed);
    let mut reader = Reader::new(dir.path()).unwrap();
    assert!(matches!(
        reader.messages(&[], None, None),
        Err(ReaderError::NotOpen)
    ));
}

#[test]
fn test_bad_mcap_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(dir.path().join("metadata.yaml"), METADATA).unwrap();
    let path = dir.path().join("db.mcap");

    std::fs::write(&path, b"").unwrap();
    let err = Reader::new(dir.path()).unwrap().open().unwrap_err();
    assert!(err.to_string().contains("seems to be empty"), "{err}");

    std::fs::write(&path, b"xxxxxxxx").unwrap();
    let err = Reader::new(dir.path()).unwrap().open().unwrap_err();
    assert!(err.to_string().contains("magic is invalid"), "{err}");

    let mut data = MCAP_MAGIC.to_vec();
    data.push(0xff);
    std::fs::write(&path, data).unwrap();
    let err = Reader::new(dir.path()).unwrap().open().unwrap_err();
    assert!(err.to_string().contains("unexpected record"), "{err}");

    let mut data = MCAP_MAGIC.to_vec();
    write_record(
        &mut data,
        0x01,
        &[&make_string("ros1"), &make_string("test_mcap")],
    );
    std::fs::write(&path, data).unwrap();
    let err = Reader::new(dir.path()).unwrap().open().unwrap_err();
    assert!(err.to_string().contains("profile is not ros2"), "{err}");

    let mut data = MCAP_MAGIC.to_vec();
    write_record(
        &mut data,
        0x01,
        &[&make_string("ros2"), &make_string("test_mcap")],
    );
    std::fs::write(&path, data).unwrap();
    let err = Reader::new(dir.path()).unwrap().open().unwrap_err();
    assert!(err.to_string().contains("end magic is invalid"), "{err}");
}

#[test]
fn test_metadata_validation() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();

    let meta = dir.path().join("metadata.yaml");

    std::fs::write(&meta, METADATA.replace("version: 4", "version: 999")).unwrap();
    assert!(matches!(
        Reader::new(dir.path()),
        Err(ReaderError::UnsupportedVersion { version: 999 })
    ));

    std::fs::write(&meta, METADATA.replace("mcap", "hdf5")).unwrap();
    assert!(matches!(
        Reader::new(dir.path()),
        Err(ReaderError::UnsupportedStorage { .. })
    ));

    std::fs::write(&meta, METADATA).unwrap();
    assert!(matches!(
        Reader::new(dir.path()),
        Err(ReaderError::MissingFiles { .. })
    ));

    std::fs::write(dir.path().join("db.mcap"), b"").unwrap();

    std::fs::write(&meta, METADATA.replace("cdr", "bson")).unwrap();
    assert!(matches!(
        Reader::new(dir.path()),
        Err(ReaderError::UnsupportedSerialization { .. })
    ));

    std::fs::write(
        &meta,
        METADATA
            .replace("compression_format: \"\"", "compression_format: \"gz\"")
            .replace("compression_mode: \"\"", "compression_mode: \"file\""),
    )
    .unwrap();
    assert!(matches!(
        Reader::new(dir.path()),
        Err(ReaderError::UnsupportedCompression { .. })
    ));
}

#[test]
fn test_sqlite_storage_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(
        dir.path().join("metadata.yaml"),
        METADATA
            .replace("storage_identifier: mcap", "storage_identifier: sqlite3")
            .replace("db.mcap", "db.db3"),
    )
    .unwrap();
    std::fs::write(dir.path().join("db.db3"), b"").unwrap();

    let mut reader = Reader::new(dir.path()).unwrap();
    assert!(matches!(
        reader.open(),
        Err(ReaderError::UnsupportedStorage { .. })
    ));
}

fn write_test_bag(target: &Path, mode: CompressionMode) {
    let registry = TypeRegistry::new();
    let mut writer = Writer::new(target).unwrap();
    if mode != CompressionMode::None {
        writer
            .set_compression(mode, CompressionFormat::Zstd)
            .unwrap();
    }
    writer.set_custom_data("key1", "value1");
    writer.open().unwrap();

    let poly = writer
        .add_connection("/poly", "geometry_msgs/msg/Polygon", &registry)
        .unwrap();
    let magn = writer
        .add_connection("/magn", "sensor_msgs/msg/MagneticField", &registry)
        .unwrap();
    let joint = writer
        .add_connection("/joint", "trajectory_msgs/msg/JointTrajectory", &registry)
        .unwrap();

    writer.write(&poly, 666, MSG_POLY).unwrap();
    writer.write(&magn, 708, MSG_MAGN).unwrap();
    writer.write(&magn, 708, MSG_MAGN_BIG).unwrap();
    writer.write(&joint, 708, MSG_JOINT).unwrap();
    writer.close().unwrap();
}

#[test]
fn test_write_then_read_roundtrip() {
    for mode in [
        CompressionMode::None,
        CompressionMode::File,
        CompressionMode::Message,
    ] {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bag");
        write_test_bag(&target, mode);

        let mut reader = Reader::new(&target).unwrap();
        assert_eq!(reader.message_count(), 4);
        assert_eq!(reader.start_time(), 666);
        assert_eq!(reader.end_time(), 709);
        assert_eq!(reader.custom_data()["key1"], "value1");
        if mode != CompressionMode::None {
            assert_eq!(reader.compression_format(), Some("zstd"));
        }

        reader.open().unwrap();
        let messages = collect(&mut reader, &[], None, None);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ("/poly".to_string(), 666, MSG_POLY.to_vec()));
        assert_eq!(messages[1], ("/magn".to_string(), 708, MSG_MAGN.to_vec()));
        assert_eq!(messages[2], ("/magn".to_string(), 708, MSG_MAGN_BIG.to_vec()));
        assert_eq!(messages[3], ("/joint".to_string(), 708, MSG_JOINT.to_vec()));

        let magn: Vec<Arc<Connection>> = reader
            .connections()
            .iter()
            .filter(|conn| conn.topic == "/magn")
            .cloned()
            .collect();
        let messages = collect(&mut reader, &magn, None, None);
        assert_eq!(messages.len(), 2);
        assert_eq!((messages[0].1, messages[1].1), (708, 708));

        let messages = collect(&mut reader, &[], Some(667), None);
        assert!(messages.iter().all(|m| m.0 != "/poly"));
        assert_eq!(messages.len(), 3);

        let messages = collect(&mut reader, &[], None, Some(667));
        assert_eq!(
            messages.iter().map(|m| m.0.as_str()).collect::<Vec<_>>(),
            vec!["/poly"]
        );

        reader.close().unwrap();
    }
}

#[test]
fn test_written_bag_carries_definitions_and_digests() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("bag");
    write_test_bag(&target, CompressionMode::None);

    let mut reader = Reader::new(&target).unwrap();
    let poly = reader
        .connections()
        .iter()
        .find(|conn| conn.topic == "/poly")
        .unwrap();
    assert!(poly.digest.starts_with("RIHS01_"));

    reader.open().unwrap();
    let definitions = reader.definitions();
    let (encoding, text) = &definitions["geometry_msgs/msg/Polygon"];
    assert_eq!(encoding, "msg");
    assert!(text.contains("Point32[] points"));
    reader.close().unwrap();
}

#[test]
fn test_early_termination() {
    let dir = tempfile::tempdir().unwrap();
    build_bag(dir.path(), Variant::ChunkedIndexed);
    let mut reader = Reader::new(dir.path()).unwrap();
    reader.open().unwrap();
    {
        let mut stream = reader.messages(&[], None, None).unwrap();
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.0.topic, "/poly");
        // iterator dropped mid-stream
    }
    let messages = collect(&mut reader, &[], None, None);
    assert_eq!(messages.len(), 4);
    reader.close().unwrap();
}

#[test]
fn test_full_data_flow() {
    // write a bag, read it back, feed the carried definitions through the
    // parser into a fresh registry, and decode the payloads
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("bag");
    write_test_bag(&target, CompressionMode::None);

    let mut reader = Reader::new(&target).unwrap();
    reader.open().unwrap();

    let registry = TypeRegistry::new();
    for (typename, (encoding, text)) in reader.definitions() {
        assert_eq!(encoding, "msg");
        let types = rosbag_msg::get_types_from_msg(text, typename).unwrap();
        registry.register(types).unwrap();
    }

    for message in reader.messages(&[], None, None).unwrap() {
        let (conn, _, data) = message.unwrap();
        let value = rosbag_serde::deserialize_cdr(&data, &conn.msgtype, &registry).unwrap();
        assert!(value.as_message().is_some());
        if conn.topic == "/poly" {
            let points = value.as_message().unwrap()[0].as_array().unwrap();
            assert_eq!(points.len(), 2);
        }
    }
    reader.close().unwrap();
}

#[test]
fn test_mcap_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_bag(dir.path(), Variant::Indexed);
    let mut file = rosbag2::McapFile::new(path);
    file.open().unwrap();
    let stats = *file.statistics().unwrap();
    assert_eq!(stats.message_count, 4);
    assert_eq!(stats.schema_count, 3);
    assert_eq!(stats.channel_count, 3);
    assert_eq!(stats.message_start_time, 666);
    assert_eq!(stats.message_end_time, 708);
    file.close();
}
