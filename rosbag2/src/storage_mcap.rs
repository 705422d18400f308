//! MCAP storage backend.
//!
//! Record-level reader for the chunked, optionally compressed MCAP container
//! (profile `ros2`), with an indexed path over the summary section and a
//! linear scan fallback, plus the minimal writer used by the rosbag2
//! [`Writer`](crate::Writer): schema and channel records in the data section
//! and all messages in a single uncompressed chunk.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rosbag_types::Connection;
use tracing::debug;

use crate::errors::{ReaderError, ReaderResult, WriterResult};
use crate::storage::{BagMessage, MessageStream, StorageReader};

const MAGIC: &[u8; 8] = b"\x89MCAP0\r\n";

const OP_HEADER: u8 = 0x01;
const OP_FOOTER: u8 = 0x02;
const OP_SCHEMA: u8 = 0x03;
const OP_CHANNEL: u8 = 0x04;
const OP_MESSAGE: u8 = 0x05;
const OP_CHUNK: u8 = 0x06;
const OP_CHUNK_INDEX: u8 = 0x08;
const OP_STATISTICS: u8 = 0x0b;
const OP_SUMMARY_OFFSET: u8 = 0x0e;

/// Default stop timestamp for open-ended iteration
const STOP_MAX: u64 = (1 << 63) - 1;

/// Schema record contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Schema id, referenced by channels
    pub id: u16,
    /// Message type name
    pub name: String,
    /// Definition encoding, `ros2msg` or `ros2idl`
    pub encoding: String,
    /// Raw definition text
    pub data: String,
}

/// Channel record contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel id, referenced by messages
    pub id: u16,
    /// Name of the referenced schema
    pub schema: String,
    /// Topic name
    pub topic: String,
    /// Message encoding, `cdr` for ros2 bags
    pub message_encoding: String,
    /// Opaque channel metadata
    pub metadata: Vec<u8>,
}

/// Chunk description from the summary section
#[derive(Debug, Clone)]
struct ChunkInfo {
    message_start_time: u64,
    message_end_time: u64,
    chunk_start_offset: u64,
    compression: String,
    compressed_size: u64,
    uncompressed_size: u64,
    /// Message count per channel, derived from the message index offsets
    channel_count: HashMap<u16, u64>,
}

/// Statistics record contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Total message count
    pub message_count: u64,
    /// Schema count
    pub schema_count: u16,
    /// Channel count
    pub channel_count: u32,
    /// Attachment count
    pub attachment_count: u32,
    /// Metadata record count
    pub metadata_count: u32,
    /// Chunk count
    pub chunk_count: u32,
    /// Timestamp of the earliest message
    pub message_start_time: u64,
    /// Timestamp of the latest message
    pub message_end_time: u64,
}

fn decompress(compression: &str, data: &[u8], uncompressed_size: usize) -> ReaderResult<Vec<u8>> {
    match compression {
        "" => Ok(data.to_vec()),
        "lz4" => {
            let mut out = Vec::with_capacity(uncompressed_size);
            lz4_flex::frame::FrameDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|err| ReaderError::UnsupportedCompression {
                    format: format!("lz4: {err}"),
                })?;
            Ok(out)
        }
        "zstd" => {
            zstd::stream::decode_all(data).map_err(|err| ReaderError::UnsupportedCompression {
                format: format!("zstd: {err}"),
            })
        }
        other => Err(ReaderError::UnsupportedCompression {
            format: other.to_string(),
        }),
    }
}

/// Record payload parser over an in-memory buffer.
struct Buf<'a> {
    data: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Buf<'a> {
    fn new(data: &'a [u8], path: &'a Path) -> Self {
        Self { data, pos: 0, path }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn truncated(&self) -> ReaderError {
        ReaderError::storage(self.path, "truncated record")
    }

    fn take(&mut self, count: usize) -> ReaderResult<&'a [u8]> {
        let end = self.pos.checked_add(count).ok_or_else(|| self.truncated())?;
        if end > self.data.len() {
            return Err(self.truncated());
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_sized(&mut self, count: u64) -> ReaderResult<&'a [u8]> {
        self.take(usize::try_from(count).map_err(|_| self.truncated())?)
    }

    fn skip(&mut self, count: u64) -> ReaderResult<()> {
        self.take_sized(count).map(|_| ())
    }

    fn u8(&mut self) -> ReaderResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> ReaderResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> ReaderResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> ReaderResult<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn sized(&mut self) -> ReaderResult<&'a [u8]> {
        let len = self.u32()?;
        self.take_sized(u64::from(len))
    }

    fn string(&mut self) -> ReaderResult<String> {
        Ok(String::from_utf8_lossy(self.sized()?).into_owned())
    }
}

fn parse_schema(payload: &[u8], path: &Path) -> ReaderResult<Schema> {
    let mut buf = Buf::new(payload, path);
    Ok(Schema {
        id: buf.u16()?,
        name: buf.string()?,
        encoding: buf.string()?,
        data: buf.string()?,
    })
}

fn parse_channel(
    payload: &[u8],
    schemas: &HashMap<u16, Schema>,
    path: &Path,
) -> ReaderResult<Channel> {
    let mut buf = Buf::new(payload, path);
    let id = buf.u16()?;
    let schema_id = buf.u16()?;
    let schema = schemas
        .get(&schema_id)
        .ok_or_else(|| ReaderError::storage(path, "channel references unknown schema"))?
        .name
        .clone();
    Ok(Channel {
        id,
        schema,
        topic: buf.string()?,
        message_encoding: buf.string()?,
        metadata: buf.sized()?.to_vec(),
    })
}

/// Split a message record payload into channel id, log time, and data.
fn parse_message(payload: &[u8], path: &Path) -> ReaderResult<(u16, u64, Vec<u8>)> {
    if payload.len() < 22 {
        return Err(ReaderError::storage(path, "truncated message record"));
    }
    let mut buf = Buf::new(payload, path);
    let channel_id = buf.u16()?;
    buf.skip(4)?; // sequence
    let log_time = buf.u64()?;
    buf.skip(8)?; // publish time
    Ok((channel_id, log_time, payload[22..].to_vec()))
}

/// Chunk record payload: `(message_start_time, message_end_time,
/// decompressed records)`.
fn parse_chunk(payload: &[u8], path: &Path) -> ReaderResult<(u64, u64, Vec<u8>)> {
    let mut buf = Buf::new(payload, path);
    let message_start_time = buf.u64()?;
    let message_end_time = buf.u64()?;
    let uncompressed_size = buf.u64()?;
    buf.skip(4)?; // crc
    let compression = buf.string()?;
    let records_length = buf.u64()?;
    let compressed = buf.take_sized(records_length)?;
    let records = decompress(
        &compression,
        compressed,
        usize::try_from(uncompressed_size).unwrap_or(0),
    )?;
    Ok((message_start_time, message_end_time, records))
}

fn parse_chunk_index(payload: &[u8], path: &Path) -> ReaderResult<ChunkInfo> {
    let mut buf = Buf::new(payload, path);
    let message_start_time = buf.u64()?;
    let message_end_time = buf.u64()?;
    let chunk_start_offset = buf.u64()?;
    let chunk_length = buf.u64()?;
    let offsets_length = buf.u32()?;
    let mut message_index_offsets = Vec::new();
    let mut remaining = u64::from(offsets_length);
    while remaining >= 10 {
        let channel_id = buf.u16()?;
        let offset = buf.u64()?;
        message_index_offsets.push((offset, channel_id));
        remaining -= 10;
    }
    let message_index_length = buf.u64()?;
    let compression = buf.string()?;
    let compressed_size = buf.u64()?;
    let uncompressed_size = buf.u64()?;

    // Derive per-channel counts from the gaps between message index
    // records: 15 bytes of framing plus 16 bytes per entry.
    message_index_offsets.sort_unstable();
    let end = chunk_start_offset + chunk_length + message_index_length;
    let mut channel_count = HashMap::new();
    for (idx, &(offset, channel)) in message_index_offsets.iter().enumerate() {
        let next = message_index_offsets
            .get(idx + 1)
            .map_or(end, |&(next_offset, _)| next_offset);
        let count = next.saturating_sub(offset).saturating_sub(15);
        if count > 0 {
            channel_count.insert(channel, count / 16);
        }
    }

    Ok(ChunkInfo {
        message_start_time,
        message_end_time,
        chunk_start_offset,
        compression,
        compressed_size,
        uncompressed_size,
        channel_count,
    })
}

fn read_exact_vec(file: &mut File, count: u64, path: &Path) -> ReaderResult<Vec<u8>> {
    let count =
        usize::try_from(count).map_err(|_| ReaderError::storage(path, "record too large"))?;
    let mut buf = vec![0u8; count];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn seek_over(file: &mut File, length: u64, path: &Path) -> ReaderResult<()> {
    file.seek(SeekFrom::Current(
        i64::try_from(length).map_err(|_| ReaderError::storage(path, "record too large"))?,
    ))?;
    Ok(())
}

/// MCAP format reader for one storage file.
pub struct McapFile {
    path: PathBuf,
    file: Option<File>,
    data_start: u64,
    data_end: u64,
    schemas: HashMap<u16, Schema>,
    channels: HashMap<u16, Channel>,
    chunks: Vec<ChunkInfo>,
    statistics: Option<Statistics>,
}

impl McapFile {
    /// Create a reader for a file, without touching the filesystem yet
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            data_start: 0,
            data_end: 0,
            schemas: HashMap::new(),
            channels: HashMap::new(),
            chunks: Vec::new(),
            statistics: None,
        }
    }

    /// Statistics from the summary section, when present
    #[must_use]
    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }

    /// Open the file: validate both magics and the header record, then read
    /// the summary section when the footer points at one.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Storage`] on invalid magic, a profile other
    /// than `ros2`, or malformed records.
    pub fn open(&mut self) -> ReaderResult<()> {
        let mut file = File::open(&self.path)
            .map_err(|err| ReaderError::storage(&self.path, &format!("could not open: {err}")))?;

        let mut magic = [0u8; 8];
        let got = file.read(&mut magic)?;
        if got == 0 {
            return Err(ReaderError::storage(&self.path, "file seems to be empty"));
        }
        if got < magic.len() || magic != *MAGIC {
            return Err(ReaderError::storage(&self.path, "file magic is invalid"));
        }

        let op = file.read_u8()?;
        if op != OP_HEADER {
            return Err(ReaderError::storage(&self.path, "unexpected record"));
        }
        let length = file.read_u64::<LittleEndian>()?;
        let payload = read_exact_vec(&mut file, length, &self.path)?;
        let profile = Buf::new(&payload, &self.path).string()?;
        if profile != "ros2" {
            return Err(ReaderError::storage(&self.path, "profile is not ros2"));
        }
        self.data_start = file.stream_position()?;

        file.seek(SeekFrom::End(-37))
            .map_err(|_| ReaderError::storage(&self.path, "file end magic is invalid"))?;
        let footer_start = file.stream_position()?;
        let mut tail = [0u8; 37];
        file.read_exact(&mut tail)?;
        if tail[29..] != *MAGIC {
            return Err(ReaderError::storage(&self.path, "file end magic is invalid"));
        }
        if tail[0] != OP_FOOTER || tail[1..9] != [0x14, 0, 0, 0, 0, 0, 0, 0] {
            return Err(ReaderError::storage(&self.path, "invalid footer record"));
        }
        let mut summary = [0u8; 8];
        summary.copy_from_slice(&tail[9..17]);
        let summary_start = u64::from_le_bytes(summary);

        self.file = Some(file);
        if summary_start == 0 {
            self.data_end = footer_start;
        } else {
            self.data_end = summary_start;
            self.read_index()?;
        }
        debug!(
            path = %self.path.display(),
            chunks = self.chunks.len(),
            channels = self.channels.len(),
            "opened mcap file"
        );
        Ok(())
    }

    /// Close the file, releasing the handle.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Walk the summary section, populating the schema, channel,
    /// chunk-index, and statistics tables.
    fn read_index(&mut self) -> ReaderResult<()> {
        let file = self.file.as_mut().ok_or(ReaderError::NotOpen)?;
        file.seek(SeekFrom::Start(self.data_end))?;
        loop {
            let op = file.read_u8()?;
            if op == OP_FOOTER || op == OP_SUMMARY_OFFSET {
                break;
            }
            let length = file.read_u64::<LittleEndian>()?;
            match op {
                OP_SCHEMA => {
                    let payload = read_exact_vec(file, length, &self.path)?;
                    let schema = parse_schema(&payload, &self.path)?;
                    self.schemas.insert(schema.id, schema);
                }
                OP_CHANNEL => {
                    let payload = read_exact_vec(file, length, &self.path)?;
                    let channel = parse_channel(&payload, &self.schemas, &self.path)?;
                    self.channels.insert(channel.id, channel);
                }
                OP_CHUNK_INDEX => {
                    let payload = read_exact_vec(file, length, &self.path)?;
                    self.chunks.push(parse_chunk_index(&payload, &self.path)?);
                }
                OP_STATISTICS => {
                    let payload = read_exact_vec(file, length, &self.path)?;
                    let mut buf = Buf::new(&payload, &self.path);
                    self.statistics = Some(Statistics {
                        message_count: buf.u64()?,
                        schema_count: buf.u16()?,
                        channel_count: buf.u32()?,
                        attachment_count: buf.u32()?,
                        metadata_count: buf.u32()?,
                        chunk_count: buf.u32()?,
                        message_start_time: buf.u64()?,
                        message_end_time: buf.u64()?,
                    });
                }
                _ => seek_over(file, length, &self.path)?,
            }
        }
        Ok(())
    }

    /// Collect schemas and channels by scanning the data section,
    /// descending into chunks.
    fn meta_scan(&mut self) -> ReaderResult<()> {
        debug!(path = %self.path.display(), "scanning mcap file for metadata");
        let file = self.file.as_mut().ok_or(ReaderError::NotOpen)?;
        file.seek(SeekFrom::Start(self.data_start))?;
        while file.stream_position()? < self.data_end {
            let op = file.read_u8()?;
            let length = file.read_u64::<LittleEndian>()?;
            match op {
                OP_SCHEMA => {
                    let payload = read_exact_vec(file, length, &self.path)?;
                    let schema = parse_schema(&payload, &self.path)?;
                    self.schemas.insert(schema.id, schema);
                }
                OP_CHANNEL => {
                    let payload = read_exact_vec(file, length, &self.path)?;
                    let channel = parse_channel(&payload, &self.schemas, &self.path)?;
                    self.channels.insert(channel.id, channel);
                }
                OP_CHUNK => {
                    let payload = read_exact_vec(file, length, &self.path)?;
                    let (_, _, records) = parse_chunk(&payload, &self.path)?;
                    let mut buf = Buf::new(&records, &self.path);
                    while !buf.at_end() {
                        let op = buf.u8()?;
                        let length = buf.u64()?;
                        match op {
                            OP_SCHEMA => {
                                let schema =
                                    parse_schema(buf.take_sized(length)?, &self.path)?;
                                self.schemas.insert(schema.id, schema);
                            }
                            OP_CHANNEL => {
                                let channel = parse_channel(
                                    buf.take_sized(length)?,
                                    &self.schemas,
                                    &self.path,
                                )?;
                                self.channels.insert(channel.id, channel);
                            }
                            _ => buf.skip(length)?,
                        }
                    }
                }
                _ => seek_over(file, length, &self.path)?,
            }
        }
        Ok(())
    }

    /// Message definitions keyed by type name, as (encoding, text) pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError`] when the file is not open or malformed.
    pub fn get_schema_definitions(&mut self) -> ReaderResult<HashMap<String, (String, String)>> {
        if self.schemas.is_empty() {
            self.meta_scan()?;
        }
        Ok(self
            .schemas
            .values()
            .map(|schema| {
                let encoding = schema
                    .encoding
                    .strip_prefix("ros2")
                    .unwrap_or(&schema.encoding)
                    .to_string();
                (schema.name.clone(), (encoding, schema.data.clone()))
            })
            .collect())
    }

    /// Channels mapped to the matching filter connections by topic and
    /// schema name.
    fn channel_map(
        channels: &HashMap<u16, Channel>,
        connections: &[Arc<Connection>],
    ) -> HashMap<u16, Arc<Connection>> {
        let mut map = HashMap::new();
        for (cid, channel) in channels {
            if let Some(conn) = connections
                .iter()
                .find(|conn| conn.topic == channel.topic && conn.msgtype == channel.schema)
            {
                map.insert(*cid, Arc::clone(conn));
            }
        }
        map
    }

    /// Read messages from the file.
    ///
    /// With a chunk index, chunks are merged by timestamp and messages come
    /// out in non-decreasing order; without one, the data section is scanned
    /// in file order.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::NotOpen`] when the file is not open; iteration
    /// errors surface through the returned stream.
    pub fn messages(
        &self,
        connections: &[Arc<Connection>],
        start: Option<u64>,
        stop: Option<u64>,
    ) -> ReaderResult<McapMessageIter> {
        if self.file.is_none() {
            return Err(ReaderError::NotOpen);
        }
        // Iterators keep their own handle so the shared cursor of the
        // metadata handle stays untouched.
        let file = File::open(&self.path)?;

        if self.chunks.is_empty() {
            return Ok(McapMessageIter::scan(
                file,
                self.path.clone(),
                self.data_start,
                self.data_end,
                self.schemas.clone(),
                self.channels.clone(),
                connections.to_vec(),
                start.unwrap_or(0),
                stop.unwrap_or(STOP_MAX),
            ));
        }

        let channel_map = Self::channel_map(&self.channels, connections);
        let mut heap = BinaryHeap::new();
        for chunk in &self.chunks {
            if chunk.message_start_time == 0 {
                continue;
            }
            if let Some(start) = start
                && start >= chunk.message_end_time
            {
                continue;
            }
            if let Some(stop) = stop
                && chunk.message_start_time >= stop
            {
                continue;
            }
            if !channel_map
                .keys()
                .any(|cid| chunk.channel_count.get(cid).copied().unwrap_or(0) > 0)
            {
                continue;
            }
            heap.push(HeapEntry {
                timestamp: chunk.message_start_time,
                chunk_offset: chunk.chunk_start_offset,
                seq: 0,
                state: EntryState::Pending {
                    start: start.unwrap_or(chunk.message_start_time),
                    stop: stop.unwrap_or(chunk.message_end_time + 1),
                    chunk: chunk.clone(),
                },
            });
        }
        Ok(McapMessageIter::indexed(
            file,
            self.path.clone(),
            channel_map,
            heap,
        ))
    }
}

enum EntryState {
    /// Chunk not yet decompressed; keyed by its start time so later chunks
    /// stay untouched until the merge reaches them.
    Pending { start: u64, stop: u64, chunk: ChunkInfo },
    /// In-range matching messages, sorted by timestamp.
    Loaded(VecDeque<(u64, u16, Vec<u8>)>),
}

struct HeapEntry {
    timestamp: u64,
    chunk_offset: u64,
    seq: u64,
    state: EntryState,
}

impl HeapEntry {
    fn key(&self) -> (u64, u64, u64) {
        (self.timestamp, self.chunk_offset, self.seq)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    /// Inverted so the `BinaryHeap` pops the smallest key first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.key().cmp(&self.key())
    }
}

/// Lazy message iterator over one MCAP file.
pub struct McapMessageIter {
    file: File,
    path: PathBuf,
    kind: IterKind,
    done: bool,
}

enum IterKind {
    Indexed {
        channel_map: HashMap<u16, Arc<Connection>>,
        heap: BinaryHeap<HeapEntry>,
    },
    Scan {
        data_start: u64,
        data_end: u64,
        schemas: HashMap<u16, Schema>,
        channels: HashMap<u16, Channel>,
        channel_map: HashMap<u16, Arc<Connection>>,
        connections: Vec<Arc<Connection>>,
        read_meta: bool,
        start: u64,
        stop: u64,
        /// Decompressed chunk records currently being walked
        inner: Option<(Vec<u8>, usize)>,
        started: bool,
    },
}

impl McapMessageIter {
    fn indexed(
        file: File,
        path: PathBuf,
        channel_map: HashMap<u16, Arc<Connection>>,
        heap: BinaryHeap<HeapEntry>,
    ) -> Self {
        Self {
            file,
            path,
            kind: IterKind::Indexed { channel_map, heap },
            done: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn scan(
        file: File,
        path: PathBuf,
        data_start: u64,
        data_end: u64,
        schemas: HashMap<u16, Schema>,
        channels: HashMap<u16, Channel>,
        connections: Vec<Arc<Connection>>,
        start: u64,
        stop: u64,
    ) -> Self {
        let read_meta = channels.is_empty();
        let channel_map = McapFile::channel_map(&channels, &connections);
        Self {
            file,
            path,
            kind: IterKind::Scan {
                data_start,
                data_end,
                schemas,
                channels,
                channel_map,
                connections,
                read_meta,
                start,
                stop,
                inner: None,
                started: false,
            },
            done: false,
        }
    }

    fn next_indexed(&mut self) -> Option<ReaderResult<BagMessage>> {
        loop {
            let IterKind::Indexed { channel_map, heap } = &mut self.kind else {
                return None;
            };
            let entry = heap.pop()?;
            match entry.state {
                EntryState::Pending { start, stop, chunk } => {
                    let msgs = match load_chunk(
                        &mut self.file,
                        &self.path,
                        &chunk,
                        channel_map,
                        start,
                        stop,
                    ) {
                        Ok(msgs) => msgs,
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    };
                    let deque: VecDeque<_> = msgs.into();
                    if let Some(&(timestamp, _, _)) = deque.front() {
                        heap.push(HeapEntry {
                            timestamp,
                            chunk_offset: entry.chunk_offset,
                            seq: 1,
                            state: EntryState::Loaded(deque),
                        });
                    }
                }
                EntryState::Loaded(mut deque) => {
                    let Some((timestamp, channel_id, data)) = deque.pop_front() else {
                        continue;
                    };
                    if let Some(&(next_ts, _, _)) = deque.front() {
                        heap.push(HeapEntry {
                            timestamp: next_ts,
                            chunk_offset: entry.chunk_offset,
                            seq: entry.seq + 1,
                            state: EntryState::Loaded(deque),
                        });
                    }
                    let Some(conn) = channel_map.get(&channel_id) else {
                        continue;
                    };
                    return Some(Ok((Arc::clone(conn), timestamp, data)));
                }
            }
        }
    }

    fn next_scan(&mut self) -> ReaderResult<Option<BagMessage>> {
        let IterKind::Scan {
            data_start,
            data_end,
            schemas,
            channels,
            channel_map,
            connections,
            read_meta,
            start,
            stop,
            inner,
            started,
        } = &mut self.kind
        else {
            return Ok(None);
        };

        if !*started {
            self.file.seek(SeekFrom::Start(*data_start))?;
            *started = true;
        }

        loop {
            // Drain the in-memory records of the current chunk first.
            if let Some((records, pos)) = inner {
                if *pos >= records.len() {
                    *inner = None;
                    continue;
                }
                let mut buf = Buf::new(records, &self.path);
                buf.pos = *pos;
                let op = buf.u8()?;
                let length = buf.u64()?;
                let payload = buf.take_sized(length)?;
                *pos = buf.pos;
                if let Some(message) = handle_scan_record(
                    op,
                    payload,
                    &self.path,
                    schemas,
                    channels,
                    channel_map,
                    connections,
                    *read_meta,
                    *start,
                    *stop,
                )? {
                    return Ok(Some(message));
                }
                continue;
            }

            if self.file.stream_position()? >= *data_end {
                return Ok(None);
            }
            let op = self.file.read_u8()?;
            let length = self.file.read_u64::<LittleEndian>()?;
            match op {
                OP_SCHEMA | OP_CHANNEL | OP_MESSAGE => {
                    let payload = read_exact_vec(&mut self.file, length, &self.path)?;
                    if let Some(message) = handle_scan_record(
                        op,
                        &payload,
                        &self.path,
                        schemas,
                        channels,
                        channel_map,
                        connections,
                        *read_meta,
                        *start,
                        *stop,
                    )? {
                        return Ok(Some(message));
                    }
                }
                OP_CHUNK => {
                    // Peek the time bounds before paying for decompression.
                    let payload = read_exact_vec(&mut self.file, length, &self.path)?;
                    let mut head = Buf::new(&payload, &self.path);
                    let chunk_start = head.u64()?;
                    let chunk_end = head.u64()?;
                    if *read_meta || (*start < chunk_end && chunk_start < *stop) {
                        let (_, _, records) = parse_chunk(&payload, &self.path)?;
                        *inner = Some((records, 0));
                    }
                }
                _ => seek_over(&mut self.file, length, &self.path)?,
            }
        }
    }
}

/// Process one record during a linear scan, returning a message when it
/// matches the filter and time range.
#[allow(clippy::too_many_arguments)]
fn handle_scan_record(
    op: u8,
    payload: &[u8],
    path: &Path,
    schemas: &mut HashMap<u16, Schema>,
    channels: &mut HashMap<u16, Channel>,
    channel_map: &mut HashMap<u16, Arc<Connection>>,
    connections: &[Arc<Connection>],
    read_meta: bool,
    start: u64,
    stop: u64,
) -> ReaderResult<Option<BagMessage>> {
    match op {
        OP_SCHEMA if read_meta => {
            let schema = parse_schema(payload, path)?;
            schemas.insert(schema.id, schema);
        }
        OP_CHANNEL if read_meta => {
            let channel = parse_channel(payload, schemas, path)?;
            if let Some(conn) = connections
                .iter()
                .find(|conn| conn.topic == channel.topic && conn.msgtype == channel.schema)
            {
                channel_map.insert(channel.id, Arc::clone(conn));
            }
            channels.insert(channel.id, channel);
        }
        OP_MESSAGE => {
            let (channel_id, log_time, data) = parse_message(payload, path)?;
            if start <= log_time
                && log_time < stop
                && let Some(conn) = channel_map.get(&channel_id)
            {
                return Ok(Some((Arc::clone(conn), log_time, data)));
            }
        }
        _ => {}
    }
    Ok(None)
}

/// Decompress a chunk and collect its in-range matching messages in
/// timestamp order.
fn load_chunk(
    file: &mut File,
    path: &Path,
    chunk: &ChunkInfo,
    channel_map: &HashMap<u16, Arc<Connection>>,
    start: u64,
    stop: u64,
) -> ReaderResult<Vec<(u64, u16, Vec<u8>)>> {
    // 9 bytes of record framing plus 40 bytes of fixed chunk fields put the
    // cursor on the compressed records.
    let records_start = chunk.chunk_start_offset + 9 + 40 + chunk.compression.len() as u64;
    file.seek(SeekFrom::Start(records_start))?;
    let compressed = read_exact_vec(file, chunk.compressed_size, path)?;
    let records = decompress(
        &chunk.compression,
        &compressed,
        usize::try_from(chunk.uncompressed_size).unwrap_or(0),
    )?;

    let mut messages = Vec::new();
    let mut buf = Buf::new(&records, path);
    while !buf.at_end() {
        let op = buf.u8()?;
        let length = buf.u64()?;
        if op == OP_MESSAGE {
            let (channel_id, log_time, data) = parse_message(buf.take_sized(length)?, path)?;
            if start <= log_time && log_time < stop && channel_map.contains_key(&channel_id) {
                messages.push((log_time, channel_id, data));
            }
        } else {
            buf.skip(length)?;
        }
    }
    messages.sort_by_key(|message| message.0);
    Ok(messages)
}

impl Iterator for McapMessageIter {
    type Item = ReaderResult<BagMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if matches!(self.kind, IterKind::Indexed { .. }) {
            self.next_indexed()
        } else {
            match self.next_scan() {
                Ok(None) => {
                    self.done = true;
                    None
                }
                Ok(Some(message)) => Some(Ok(message)),
                Err(err) => {
                    self.done = true;
                    Some(Err(err))
                }
            }
        }
    }
}

/// MCAP storage reader over one or more files.
pub struct ReaderMcap {
    paths: Vec<PathBuf>,
    connections: Vec<Arc<Connection>>,
    files: Vec<McapFile>,
}

impl ReaderMcap {
    /// Set up a storage reader over the given paths with the connections
    /// declared by the bag metadata.
    #[must_use]
    pub fn new(paths: Vec<PathBuf>, connections: Vec<Arc<Connection>>) -> Self {
        Self {
            paths,
            connections,
            files: Vec::new(),
        }
    }
}

impl StorageReader for ReaderMcap {
    fn open(&mut self) -> ReaderResult<()> {
        let mut files = Vec::new();
        for path in &self.paths {
            let mut file = McapFile::new(path.clone());
            file.open()?;
            files.push(file);
        }
        self.files = files;
        Ok(())
    }

    fn close(&mut self) -> ReaderResult<()> {
        if self.files.is_empty() {
            return Err(ReaderError::NotOpen);
        }
        for file in &mut self.files {
            file.close();
        }
        self.files.clear();
        Ok(())
    }

    fn get_definitions(&mut self) -> ReaderResult<HashMap<String, (String, String)>> {
        let mut definitions = HashMap::new();
        for file in &mut self.files {
            definitions.extend(file.get_schema_definitions()?);
        }
        Ok(definitions)
    }

    fn messages(
        &mut self,
        connections: &[Arc<Connection>],
        start: Option<u64>,
        stop: Option<u64>,
    ) -> ReaderResult<MessageStream> {
        let filter = if connections.is_empty() {
            self.connections.clone()
        } else {
            connections.to_vec()
        };
        let mut streams = Vec::new();
        for file in &self.files {
            streams.push(file.messages(&filter, start, stop)?);
        }
        Ok(Box::new(streams.into_iter().flatten()))
    }
}

/// Minimal MCAP writer: schemas and channels in the data section, all
/// messages in one trailing uncompressed chunk, no summary section.
pub(crate) struct McapWriter {
    file: BufWriter<File>,
    chunk: Vec<u8>,
    message_start_time: u64,
    message_end_time: u64,
}

impl McapWriter {
    pub(crate) fn create(path: &Path) -> WriterResult<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(MAGIC)?;
        let mut payload = Vec::new();
        put_string(&mut payload, "ros2");
        put_string(&mut payload, "rosbags");
        write_record(&mut file, OP_HEADER, &payload)?;
        Ok(Self {
            file,
            chunk: Vec::new(),
            message_start_time: u64::MAX,
            message_end_time: 0,
        })
    }

    pub(crate) fn add_schema(
        &mut self,
        id: u16,
        name: &str,
        encoding: &str,
        data: &str,
    ) -> WriterResult<()> {
        let mut payload = Vec::new();
        payload.write_u16::<LittleEndian>(id)?;
        put_string(&mut payload, name);
        put_string(&mut payload, encoding);
        put_string(&mut payload, data);
        write_record(&mut self.file, OP_SCHEMA, &payload)
    }

    pub(crate) fn add_channel(
        &mut self,
        id: u16,
        schema_id: u16,
        topic: &str,
        message_encoding: &str,
    ) -> WriterResult<()> {
        let mut payload = Vec::new();
        payload.write_u16::<LittleEndian>(id)?;
        payload.write_u16::<LittleEndian>(schema_id)?;
        put_string(&mut payload, topic);
        put_string(&mut payload, message_encoding);
        payload.write_u32::<LittleEndian>(0)?; // empty metadata
        write_record(&mut self.file, OP_CHANNEL, &payload)
    }

    pub(crate) fn write_message(
        &mut self,
        channel_id: u16,
        sequence: u32,
        timestamp: u64,
        data: &[u8],
    ) -> WriterResult<()> {
        let mut payload = Vec::new();
        payload.write_u16::<LittleEndian>(channel_id)?;
        payload.write_u32::<LittleEndian>(sequence)?;
        payload.write_u64::<LittleEndian>(timestamp)?;
        payload.write_u64::<LittleEndian>(timestamp)?;
        payload.extend_from_slice(data);
        self.chunk.push(OP_MESSAGE);
        self.chunk.write_u64::<LittleEndian>(payload.len() as u64)?;
        self.chunk.extend_from_slice(&payload);
        self.message_start_time = self.message_start_time.min(timestamp);
        self.message_end_time = self.message_end_time.max(timestamp);
        Ok(())
    }

    pub(crate) fn finish(mut self) -> WriterResult<()> {
        if !self.chunk.is_empty() {
            let mut payload = Vec::new();
            payload.write_u64::<LittleEndian>(self.message_start_time)?;
            payload.write_u64::<LittleEndian>(self.message_end_time)?;
            payload.write_u64::<LittleEndian>(self.chunk.len() as u64)?;
            payload.write_u32::<LittleEndian>(0)?; // crc not computed
            put_string(&mut payload, "");
            payload.write_u64::<LittleEndian>(self.chunk.len() as u64)?;
            payload.extend_from_slice(&self.chunk);
            write_record(&mut self.file, OP_CHUNK, &payload)?;
        }
        let mut footer = Vec::new();
        footer.write_u64::<LittleEndian>(0)?;
        footer.write_u64::<LittleEndian>(0)?;
        footer.write_u32::<LittleEndian>(0)?;
        write_record(&mut self.file, OP_FOOTER, &footer)?;
        self.file.write_all(MAGIC)?;
        self.file.flush()?;
        Ok(())
    }
}

fn put_string(out: &mut Vec<u8>, text: &str) {
    let _ = out.write_u32::<LittleEndian>(text.len() as u32);
    out.extend_from_slice(text.as_bytes());
}

fn write_record<W: Write>(out: &mut W, op: u8, payload: &[u8]) -> WriterResult<()> {
    out.write_u8(op)?;
    out.write_u64::<LittleEndian>(payload.len() as u64)?;
    out.write_all(payload)?;
    Ok(())
}
