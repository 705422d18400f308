//! ROS1 packed codec and the byte-level ROS1/CDR converters.
//!
//! The ROS1 wire format has no encapsulation header and no inter-field
//! alignment. Integers are little-endian, strings carry a 32-bit length
//! prefix without a trailing NUL, and `std_msgs/msg/Header` gains a hidden
//! `uint32 seq` prefix on the wire.
//!
//! The converters walk the descriptor against both byte streams in parallel
//! and never build values. Each runs a sizing pass first, so the copy pass
//! writes into an exactly-sized buffer.

use rosbag_types::{
    BaseType, ElementType, EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME, FieldType, PrimitiveKind,
    TypeDescriptor, TypeRegistry,
};

use crate::cdr::{CdrHeader, Endianness};
use crate::cursor::{BitSink, CountingSink, ReadCursor, WriteCursor};
use crate::errors::{SerdeError, SerdeResult};
use crate::lookup::Lookup;
use crate::value::Value;

const HEADER_TYPE: &str = "std_msgs/msg/Header";

/// Serialize a value to the ROS1 packed format.
///
/// # Errors
///
/// Returns [`SerdeError`] when the value does not match the descriptor, a
/// fixed array has the wrong length, or the type is unknown.
pub fn serialize_ros1(
    value: &Value,
    typename: &str,
    registry: &TypeRegistry,
) -> SerdeResult<Vec<u8>> {
    let lookup = Lookup::new(registry);
    let desc = lookup.descriptor(typename)?;
    let mut out = WriteCursor::new(Vec::new(), Endianness::Little);
    write_message(value, &desc, &lookup, &mut out)?;
    Ok(out.into_inner())
}

/// Deserialize a ROS1 packed payload.
///
/// # Errors
///
/// Returns [`SerdeError`] on a buffer underrun or an unknown type.
pub fn deserialize_ros1(
    data: &[u8],
    typename: &str,
    registry: &TypeRegistry,
) -> SerdeResult<Value> {
    let lookup = Lookup::new(registry);
    let desc = lookup.descriptor(typename)?;
    let mut cursor = ReadCursor::new(data, Endianness::Little);
    read_message(&desc, &lookup, &mut cursor)
}

/// Convert a ROS1 packed payload to little-endian CDR, header included.
///
/// # Errors
///
/// Returns [`SerdeError`] on a buffer underrun or an unknown type.
pub fn ros1_to_cdr(data: &[u8], typename: &str, registry: &TypeRegistry) -> SerdeResult<Vec<u8>> {
    let lookup = Lookup::new(registry);
    let desc = lookup.descriptor(typename)?;

    let mut counter = CountingSink::new();
    upgrade(&desc, &lookup, &mut ReadCursor::new(data, Endianness::Little), &mut counter)?;

    let mut out = Vec::with_capacity(CdrHeader::SIZE + counter.pos());
    out.extend_from_slice(&CdrHeader::new(Endianness::Little).to_bytes());
    let mut sink = WriteCursor::new(out, Endianness::Little);
    upgrade(&desc, &lookup, &mut ReadCursor::new(data, Endianness::Little), &mut sink)?;
    Ok(sink.into_inner())
}

/// Convert a little-endian CDR payload to the ROS1 packed format.
///
/// # Errors
///
/// Returns [`SerdeError`] on a bad encapsulation header, a big-endian
/// payload, a buffer underrun, or an unknown type.
pub fn cdr_to_ros1(data: &[u8], typename: &str, registry: &TypeRegistry) -> SerdeResult<Vec<u8>> {
    let header = CdrHeader::from_bytes(data)?;
    if header.endianness != Endianness::Little {
        return Err(SerdeError::encapsulation(
            "big-endian payloads cannot be bit-converted",
        ));
    }
    let lookup = Lookup::new(registry);
    let desc = lookup.descriptor(typename)?;
    let payload = &data[CdrHeader::SIZE..];

    let mut counter = CountingSink::new();
    downgrade(
        &desc,
        &lookup,
        &mut ReadCursor::new(payload, Endianness::Little),
        &mut counter,
    )?;

    let mut sink = WriteCursor::new(Vec::with_capacity(counter.pos()), Endianness::Little);
    downgrade(
        &desc,
        &lookup,
        &mut ReadCursor::new(payload, Endianness::Little),
        &mut sink,
    )?;
    Ok(sink.into_inner())
}

/// ROS1 to CDR bit conversion for one message.
fn upgrade<S: BitSink>(
    desc: &TypeDescriptor,
    lookup: &Lookup<'_>,
    input: &mut ReadCursor<'_>,
    sink: &mut S,
) -> SerdeResult<()> {
    if desc.name == HEADER_TYPE {
        input.skip(4)?;
    }
    for field in &desc.fields {
        if field.name == EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME {
            sink.pad(1);
            continue;
        }
        match &field.ty {
            FieldType::Base(base) => upgrade_base(*base, input, sink)?,
            FieldType::Name(name) => {
                let sub = lookup.descriptor(name)?;
                upgrade(&sub, lookup, input, sink)?;
            }
            FieldType::Array(elem, len) => upgrade_elements(elem, *len, lookup, input, sink)?,
            FieldType::Sequence(elem, _) => {
                sink.align(4);
                let len = input.u32()?;
                sink.u32le(len);
                upgrade_elements(elem, u64::from(len), lookup, input, sink)?;
            }
        }
    }
    Ok(())
}

fn upgrade_base<S: BitSink>(
    base: BaseType,
    input: &mut ReadCursor<'_>,
    sink: &mut S,
) -> SerdeResult<()> {
    if let Some(size) = base.kind.fixed_size() {
        sink.align(size);
        sink.bytes(input.take(size)?);
    } else {
        sink.align(4);
        let len = input.u32()?;
        sink.u32le(len + 1);
        sink.bytes(input.take(len as usize)?);
        sink.pad(1);
    }
    Ok(())
}

fn upgrade_elements<S: BitSink>(
    elem: &ElementType,
    len: u64,
    lookup: &Lookup<'_>,
    input: &mut ReadCursor<'_>,
    sink: &mut S,
) -> SerdeResult<()> {
    let count = usize::try_from(len).map_err(|_| SerdeError::ShortBuffer {
        need: usize::MAX,
        offset: input.pos(),
    })?;
    match elem {
        ElementType::Base(base) => {
            if let Some(size) = base.kind.fixed_size() {
                if count > 0 {
                    sink.align(size);
                    sink.bytes(input.take(count * size)?);
                }
            } else {
                for _ in 0..count {
                    upgrade_base(*base, input, sink)?;
                }
            }
        }
        ElementType::Name(name) => {
            let sub = lookup.descriptor(name)?;
            for _ in 0..count {
                upgrade(&sub, lookup, input, sink)?;
            }
        }
    }
    Ok(())
}

/// CDR to ROS1 bit conversion for one message.
fn downgrade<S: BitSink>(
    desc: &TypeDescriptor,
    lookup: &Lookup<'_>,
    input: &mut ReadCursor<'_>,
    out: &mut S,
) -> SerdeResult<()> {
    if desc.name == HEADER_TYPE {
        out.pad(4);
    }
    for field in &desc.fields {
        if field.name == EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME {
            input.skip(1)?;
            continue;
        }
        match &field.ty {
            FieldType::Base(base) => downgrade_base(*base, input, out)?,
            FieldType::Name(name) => {
                let sub = lookup.descriptor(name)?;
                downgrade(&sub, lookup, input, out)?;
            }
            FieldType::Array(elem, len) => downgrade_elements(elem, *len, lookup, input, out)?,
            FieldType::Sequence(elem, _) => {
                input.align(4);
                let len = input.u32()?;
                out.u32le(len);
                downgrade_elements(elem, u64::from(len), lookup, input, out)?;
            }
        }
    }
    Ok(())
}

fn downgrade_base<S: BitSink>(
    base: BaseType,
    input: &mut ReadCursor<'_>,
    out: &mut S,
) -> SerdeResult<()> {
    if let Some(size) = base.kind.fixed_size() {
        input.align(size);
        out.bytes(input.take(size)?);
    } else {
        input.align(4);
        let len = input.u32()?;
        let payload = len.saturating_sub(1);
        out.u32le(payload);
        out.bytes(input.take(payload as usize)?);
        if len > 0 {
            input.skip(1)?;
        }
    }
    Ok(())
}

fn downgrade_elements<S: BitSink>(
    elem: &ElementType,
    len: u64,
    lookup: &Lookup<'_>,
    input: &mut ReadCursor<'_>,
    out: &mut S,
) -> SerdeResult<()> {
    let count = usize::try_from(len).map_err(|_| SerdeError::ShortBuffer {
        need: usize::MAX,
        offset: input.pos(),
    })?;
    match elem {
        ElementType::Base(base) => {
            if let Some(size) = base.kind.fixed_size() {
                if count > 0 {
                    input.align(size);
                    out.bytes(input.take(count * size)?);
                }
            } else {
                for _ in 0..count {
                    downgrade_base(*base, input, out)?;
                }
            }
        }
        ElementType::Name(name) => {
            let sub = lookup.descriptor(name)?;
            for _ in 0..count {
                downgrade(&sub, lookup, input, out)?;
            }
        }
    }
    Ok(())
}

fn write_message(
    value: &Value,
    desc: &TypeDescriptor,
    lookup: &Lookup<'_>,
    out: &mut WriteCursor,
) -> SerdeResult<()> {
    if desc.name == HEADER_TYPE {
        out.pad(4);
    }
    let fields = value
        .as_message()
        .ok_or_else(|| SerdeError::mismatch(&desc.name, value.kind()))?;
    let mut values = fields.iter();
    for field in &desc.fields {
        if field.name == EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME {
            continue;
        }
        let value = values
            .next()
            .ok_or_else(|| SerdeError::mismatch(&format!("field {}", field.name), "missing"))?;
        write_field(value, &field.ty, lookup, out)?;
    }
    Ok(())
}

fn write_field(
    value: &Value,
    ty: &FieldType,
    lookup: &Lookup<'_>,
    out: &mut WriteCursor,
) -> SerdeResult<()> {
    match ty {
        FieldType::Base(base) => write_base(value, *base, out),
        FieldType::Name(name) => {
            let desc = lookup.descriptor(name)?;
            write_message(value, &desc, lookup, out)
        }
        FieldType::Array(elem, len) => {
            let items = value
                .as_array()
                .ok_or_else(|| SerdeError::mismatch("array", value.kind()))?;
            if items.len() as u64 != *len {
                return Err(SerdeError::UnexpectedArrayLength);
            }
            write_elements(items, elem, lookup, out)
        }
        FieldType::Sequence(elem, _) => {
            let items = value
                .as_array()
                .ok_or_else(|| SerdeError::mismatch("sequence", value.kind()))?;
            out.u32(u32::try_from(items.len()).unwrap_or(u32::MAX));
            write_elements(items, elem, lookup, out)
        }
    }
}

fn write_elements(
    items: &[Value],
    elem: &ElementType,
    lookup: &Lookup<'_>,
    out: &mut WriteCursor,
) -> SerdeResult<()> {
    match elem {
        ElementType::Base(base) => {
            for item in items {
                write_base(item, *base, out)?;
            }
        }
        ElementType::Name(name) => {
            let desc = lookup.descriptor(name)?;
            for item in items {
                write_message(item, &desc, lookup, out)?;
            }
        }
    }
    Ok(())
}

fn write_base(value: &Value, base: BaseType, out: &mut WriteCursor) -> SerdeResult<()> {
    match (base.kind, value) {
        (PrimitiveKind::Bool, Value::Bool(v)) => out.u8(u8::from(*v)),
        (PrimitiveKind::Octet | PrimitiveKind::UInt8, Value::UInt8(v)) => out.u8(*v),
        (PrimitiveKind::Int8, Value::Int8(v)) => out.u8(*v as u8),
        (PrimitiveKind::UInt16, Value::UInt16(v)) => out.u16(*v),
        (PrimitiveKind::Int16, Value::Int16(v)) => out.u16(*v as u16),
        (PrimitiveKind::UInt32, Value::UInt32(v)) => out.u32(*v),
        (PrimitiveKind::Int32, Value::Int32(v)) => out.u32(*v as u32),
        (PrimitiveKind::UInt64, Value::UInt64(v)) => out.u64(*v),
        (PrimitiveKind::Int64, Value::Int64(v)) => out.u64(*v as u64),
        (PrimitiveKind::Float32, Value::Float32(v)) => out.f32(*v),
        (PrimitiveKind::Float64, Value::Float64(v)) => out.f64(*v),
        (PrimitiveKind::String, Value::String(v)) => {
            out.u32(u32::try_from(v.len()).unwrap_or(u32::MAX));
            out.bytes(v.as_bytes());
        }
        (kind, value) => return Err(SerdeError::mismatch(kind.as_str(), value.kind())),
    }
    Ok(())
}

fn read_message(
    desc: &TypeDescriptor,
    lookup: &Lookup<'_>,
    cursor: &mut ReadCursor<'_>,
) -> SerdeResult<Value> {
    if desc.name == HEADER_TYPE {
        cursor.skip(4)?;
    }
    let mut fields = Vec::with_capacity(desc.fields.len());
    for field in &desc.fields {
        if field.name == EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME {
            continue;
        }
        fields.push(read_field(&field.ty, lookup, cursor)?);
    }
    Ok(Value::Message(fields))
}

fn read_field(
    ty: &FieldType,
    lookup: &Lookup<'_>,
    cursor: &mut ReadCursor<'_>,
) -> SerdeResult<Value> {
    match ty {
        FieldType::Base(base) => read_base(*base, cursor),
        FieldType::Name(name) => {
            let desc = lookup.descriptor(name)?;
            read_message(&desc, lookup, cursor)
        }
        FieldType::Array(elem, len) => read_elements(elem, *len, lookup, cursor),
        FieldType::Sequence(elem, _) => {
            let len = u64::from(cursor.u32()?);
            read_elements(elem, len, lookup, cursor)
        }
    }
}

fn read_elements(
    elem: &ElementType,
    len: u64,
    lookup: &Lookup<'_>,
    cursor: &mut ReadCursor<'_>,
) -> SerdeResult<Value> {
    let count = usize::try_from(len).map_err(|_| SerdeError::ShortBuffer {
        need: usize::MAX,
        offset: cursor.pos(),
    })?;
    let mut items = Vec::with_capacity(count.min(4096));
    match elem {
        ElementType::Base(base) => {
            for _ in 0..count {
                items.push(read_base(*base, cursor)?);
            }
        }
        ElementType::Name(name) => {
            let desc = lookup.descriptor(name)?;
            for _ in 0..count {
                items.push(read_message(&desc, lookup, cursor)?);
            }
        }
    }
    Ok(Value::Array(items))
}

fn read_base(base: BaseType, cursor: &mut ReadCursor<'_>) -> SerdeResult<Value> {
    Ok(match base.kind {
        PrimitiveKind::Bool => Value::Bool(cursor.u8()? != 0),
        PrimitiveKind::Octet | PrimitiveKind::UInt8 => Value::UInt8(cursor.u8()?),
        PrimitiveKind::Int8 => Value::Int8(cursor.u8()? as i8),
        PrimitiveKind::UInt16 => Value::UInt16(cursor.u16()?),
        PrimitiveKind::Int16 => Value::Int16(cursor.u16()? as i16),
        PrimitiveKind::UInt32 => Value::UInt32(cursor.u32()?),
        PrimitiveKind::Int32 => Value::Int32(cursor.u32()? as i32),
        PrimitiveKind::UInt64 => Value::UInt64(cursor.u64()?),
        PrimitiveKind::Int64 => Value::Int64(cursor.u64()? as i64),
        PrimitiveKind::Float32 => Value::Float32(cursor.f32()?),
        PrimitiveKind::Float64 => Value::Float64(cursor.f64()?),
        PrimitiveKind::String => {
            let len = cursor.u32()? as usize;
            let bytes = cursor.take(len)?;
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    })
}
