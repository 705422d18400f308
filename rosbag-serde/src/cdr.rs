//! CDR (Common Data Representation) codec.
//!
//! All CDR-encoded payloads are prefixed with a 4-byte encapsulation header:
//!
//! ```text
//! +--------+--------+--------+--------+
//! | Rep ID (2 bytes)| Options (2 bytes)|
//! +--------+--------+--------+--------+
//! ```
//!
//! The low byte of the representation identifier selects the byte order:
//! 0 = big endian, 1 = little endian. Only plain CDR v1 is supported;
//! parameter-list and XCDR2 encapsulations are rejected. Alignment is
//! computed from the first payload byte after the header.

use rosbag_types::{
    BaseType, ElementType, EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME, FieldType, PrimitiveKind,
    TypeDescriptor, TypeRegistry,
};

use crate::cursor::{ReadCursor, WriteCursor};
use crate::errors::{SerdeError, SerdeResult};
use crate::lookup::Lookup;
use crate::value::Value;

/// Payload byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Little endian, the x86/ARM default
    #[default]
    Little,
    /// Big endian
    Big,
}

/// CDR encapsulation header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdrHeader {
    /// Payload byte order
    pub endianness: Endianness,
    /// Options field, reserved
    pub options: u16,
}

impl CdrHeader {
    /// Size of the encapsulation header in bytes
    pub const SIZE: usize = 4;

    /// Create a header for the given byte order
    #[must_use]
    pub fn new(endianness: Endianness) -> Self {
        Self {
            endianness,
            options: 0,
        }
    }

    /// Serialize to 4 bytes
    #[must_use]
    pub fn to_bytes(self) -> [u8; 4] {
        let low = match self.endianness {
            Endianness::Big => 0,
            Endianness::Little => 1,
        };
        [0, low, (self.options >> 8) as u8, (self.options & 0xff) as u8]
    }

    /// Parse from the first bytes of a CDR payload
    ///
    /// # Errors
    ///
    /// Returns [`SerdeError::Encapsulation`] when the input is shorter than
    /// 4 bytes or uses an encapsulation other than plain CDR v1.
    pub fn from_bytes(bytes: &[u8]) -> SerdeResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(SerdeError::encapsulation("header requires 4 bytes"));
        }
        let identifier = u16::from(bytes[0]) << 8 | u16::from(bytes[1]);
        let endianness = match identifier {
            0x0000 => Endianness::Big,
            0x0001 => Endianness::Little,
            other => {
                return Err(SerdeError::encapsulation(&format!(
                    "unsupported representation identifier 0x{other:04x}"
                )));
            }
        };
        Ok(Self {
            endianness,
            options: u16::from(bytes[2]) << 8 | u16::from(bytes[3]),
        })
    }
}

/// Serialize a value to CDR, encapsulation header included.
///
/// # Errors
///
/// Returns [`SerdeError`] when the value does not match the descriptor, a
/// fixed array has the wrong length, or the type is unknown.
pub fn serialize_cdr(
    value: &Value,
    typename: &str,
    endianness: Endianness,
    registry: &TypeRegistry,
) -> SerdeResult<Vec<u8>> {
    let lookup = Lookup::new(registry);
    let mut out = WriteCursor::new(CdrHeader::new(endianness).to_bytes().to_vec(), endianness);
    let desc = lookup.descriptor(typename)?;
    write_message(value, &desc, &lookup, &mut out)?;
    Ok(out.into_inner())
}

/// Deserialize a CDR payload, reading the byte order from the header.
///
/// Up to three trailing padding or garbage bytes after the last field are
/// tolerated.
///
/// # Errors
///
/// Returns [`SerdeError`] on a bad encapsulation header, a buffer underrun,
/// or an unknown type.
pub fn deserialize_cdr(
    data: &[u8],
    typename: &str,
    registry: &TypeRegistry,
) -> SerdeResult<Value> {
    let header = CdrHeader::from_bytes(data)?;
    let lookup = Lookup::new(registry);
    let mut cursor = ReadCursor::new(&data[CdrHeader::SIZE..], header.endianness);
    let desc = lookup.descriptor(typename)?;
    read_message(&desc, &lookup, &mut cursor)
}

fn write_message(
    value: &Value,
    desc: &TypeDescriptor,
    lookup: &Lookup<'_>,
    out: &mut WriteCursor,
) -> SerdeResult<()> {
    let fields = value
        .as_message()
        .ok_or_else(|| SerdeError::mismatch(&desc.name, value.kind()))?;
    let mut values = fields.iter();
    for field in &desc.fields {
        if field.name == EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME {
            out.u8(0);
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
            out.align(4);
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
        (PrimitiveKind::UInt16, Value::UInt16(v)) => {
            out.align(2);
            out.u16(*v);
        }
        (PrimitiveKind::Int16, Value::Int16(v)) => {
            out.align(2);
            out.u16(*v as u16);
        }
        (PrimitiveKind::UInt32, Value::UInt32(v)) => {
            out.align(4);
            out.u32(*v);
        }
        (PrimitiveKind::Int32, Value::Int32(v)) => {
            out.align(4);
            out.u32(*v as u32);
        }
        (PrimitiveKind::UInt64, Value::UInt64(v)) => {
            out.align(8);
            out.u64(*v);
        }
        (PrimitiveKind::Int64, Value::Int64(v)) => {
            out.align(8);
            out.u64(*v as u64);
        }
        (PrimitiveKind::Float32, Value::Float32(v)) => {
            out.align(4);
            out.f32(*v);
        }
        (PrimitiveKind::Float64, Value::Float64(v)) => {
            out.align(8);
            out.f64(*v);
        }
        (PrimitiveKind::String, Value::String(v)) => {
            out.align(4);
            out.u32(u32::try_from(v.len() + 1).unwrap_or(u32::MAX));
            out.bytes(v.as_bytes());
            out.u8(0);
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
    let mut fields = Vec::with_capacity(desc.fields.len());
    for field in &desc.fields {
        if field.name == EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME {
            cursor.skip(1)?;
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
            cursor.align(4);
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
        PrimitiveKind::UInt16 => {
            cursor.align(2);
            Value::UInt16(cursor.u16()?)
        }
        PrimitiveKind::Int16 => {
            cursor.align(2);
            Value::Int16(cursor.u16()? as i16)
        }
        PrimitiveKind::UInt32 => {
            cursor.align(4);
            Value::UInt32(cursor.u32()?)
        }
        PrimitiveKind::Int32 => {
            cursor.align(4);
            Value::Int32(cursor.u32()? as i32)
        }
        PrimitiveKind::UInt64 => {
            cursor.align(8);
            Value::UInt64(cursor.u64()?)
        }
        PrimitiveKind::Int64 => {
            cursor.align(8);
            Value::Int64(cursor.u64()? as i64)
        }
        PrimitiveKind::Float32 => {
            cursor.align(4);
            Value::Float32(cursor.f32()?)
        }
        PrimitiveKind::Float64 => {
            cursor.align(8);
            Value::Float64(cursor.f64()?)
        }
        PrimitiveKind::String => {
            cursor.align(4);
            let len = cursor.u32()? as usize;
            let bytes = cursor.take(len)?;
            let text = bytes
                .split_last()
                .map_or(&[] as &[u8], |(_, payload)| payload);
            Value::String(String::from_utf8_lossy(text).into_owned())
        }
    })
}
