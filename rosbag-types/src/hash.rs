//! RIHS01 type hashing.
//!
//! Implements the ROS Interface Hashing Standard version 1: a SHA-256 digest
//! over a canonical JSON description of the type and every type it
//! references.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::descriptor::{
    BaseType, ElementType, FieldType, PrimitiveKind, TypeDescriptor,
    EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME,
};
use crate::errors::TypesysResult;
use crate::registry::TypeRegistry;

/// RIHS01 version prefix
const RIHS01_PREFIX: &str = "RIHS01_";

/// Type id offsets for aggregated kinds
const OFFSET_ARRAY: u32 = 48;
const OFFSET_BOUNDED_SEQUENCE: u32 = 96;
const OFFSET_UNBOUNDED_SEQUENCE: u32 = 144;

/// Nested type id (before offset)
const TID_NESTED: u32 = 1;
/// String type id (before offset)
const TID_STRING: u32 = 17;
/// Bounded string type id (before offset)
const TID_BOUNDED_STRING: u32 = 21;

/// Stable type id of a fixed-size primitive, per the FieldType interface
fn primitive_tid(kind: PrimitiveKind) -> u32 {
    match kind {
        PrimitiveKind::Int8 => 2,
        PrimitiveKind::UInt8 => 3,
        PrimitiveKind::Int16 => 4,
        PrimitiveKind::UInt16 => 5,
        PrimitiveKind::Int32 => 6,
        PrimitiveKind::UInt32 => 7,
        PrimitiveKind::Int64 => 8,
        PrimitiveKind::UInt64 => 9,
        PrimitiveKind::Float32 => 10,
        PrimitiveKind::Float64 => 11,
        PrimitiveKind::Bool => 15,
        PrimitiveKind::Octet => 16,
        PrimitiveKind::String => TID_STRING,
    }
}

struct FieldDesc {
    name: String,
    type_id: u32,
    capacity: u64,
    string_capacity: u64,
    nested_type_name: String,
}

struct StructDesc {
    type_name: String,
    fields: Vec<FieldDesc>,
}

fn base_field(name: &str, base: BaseType, increment: u32, capacity: u64) -> FieldDesc {
    let (type_id, string_capacity) = if base.kind == PrimitiveKind::String && base.limit > 0 {
        (increment + TID_BOUNDED_STRING, base.limit)
    } else {
        (increment + primitive_tid(base.kind), 0)
    };
    FieldDesc {
        name: name.to_string(),
        type_id,
        capacity,
        string_capacity,
        nested_type_name: String::new(),
    }
}

fn collect_struct(
    typename: &str,
    registry: &TypeRegistry,
    cache: &mut BTreeMap<String, StructDesc>,
) -> TypesysResult<()> {
    if cache.contains_key(typename) {
        return Ok(());
    }
    let desc: TypeDescriptor = registry.descriptor(typename)?;

    let mut fields = Vec::new();
    if desc.fields.is_empty() {
        fields.push(base_field(
            EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME,
            BaseType::new(PrimitiveKind::UInt8),
            0,
            0,
        ));
    }
    // Reserve the slot before recursing so shared references resolve once.
    cache.insert(
        typename.to_string(),
        StructDesc {
            type_name: typename.to_string(),
            fields: Vec::new(),
        },
    );

    for field in &desc.fields {
        let (increment, capacity, elem) = match &field.ty {
            FieldType::Base(base) => (0, 0, ElementType::Base(*base)),
            FieldType::Name(sub) => (0, 0, ElementType::Name(sub.clone())),
            FieldType::Array(elem, len) => (OFFSET_ARRAY, *len, elem.clone()),
            FieldType::Sequence(elem, 0) => (OFFSET_UNBOUNDED_SEQUENCE, 0, elem.clone()),
            FieldType::Sequence(elem, bound) => (OFFSET_BOUNDED_SEQUENCE, *bound, elem.clone()),
        };
        let fdesc = match elem {
            ElementType::Base(base) => base_field(&field.name, base, increment, capacity),
            ElementType::Name(sub) => {
                collect_struct(&sub, registry, cache)?;
                FieldDesc {
                    name: field.name.clone(),
                    type_id: increment + TID_NESTED,
                    capacity,
                    string_capacity: 0,
                    nested_type_name: sub,
                }
            }
        };
        fields.push(fdesc);
    }

    if let Some(slot) = cache.get_mut(typename) {
        slot.fields = fields;
    }
    Ok(())
}

fn escape_json_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn field_to_json(field: &FieldDesc) -> String {
    format!(
        r#"{{"name": "{}", "type": {{"type_id": {}, "capacity": {}, "string_capacity": {}, "nested_type_name": "{}"}}}}"#,
        escape_json_string(&field.name),
        field.type_id,
        field.capacity,
        field.string_capacity,
        escape_json_string(&field.nested_type_name)
    )
}

fn struct_to_json(desc: &StructDesc) -> String {
    let fields: Vec<String> = desc.fields.iter().map(field_to_json).collect();
    format!(
        r#"{{"type_name": "{}", "fields": [{}]}}"#,
        escape_json_string(&desc.type_name),
        fields.join(", ")
    )
}

/// Canonical JSON representation hashed by RIHS01.
///
/// Keeps the canonical key ordering (`type_description` first), uses
/// `", "`/`": "` separators, and lists referenced type descriptions sorted by
/// name with the root excluded. Field-less structures carry a synthetic
/// `structure_needs_at_least_one_member` `uint8` field. Useful for debugging
/// digest mismatches against other implementations.
///
/// # Errors
///
/// Returns [`TypesysError::UnknownType`](crate::TypesysError::UnknownType) if
/// the type or any referenced type is not registered.
pub fn rihs01_representation(typename: &str, registry: &TypeRegistry) -> TypesysResult<String> {
    let mut cache = BTreeMap::new();
    collect_struct(typename, registry, &mut cache)?;

    let root = struct_to_json(&cache[typename]);
    let referenced: Vec<String> = cache
        .iter()
        .filter(|(name, _)| name.as_str() != typename)
        .map(|(_, desc)| struct_to_json(desc))
        .collect();

    Ok(format!(
        r#"{{"type_description": {}, "referenced_type_descriptions": [{}]}}"#,
        root,
        referenced.join(", ")
    ))
}

/// Calculate the RIHS01 type hash for a registered type.
///
/// # Errors
///
/// Returns [`TypesysError::UnknownType`](crate::TypesysError::UnknownType) if
/// the type or any referenced type is not registered.
pub fn hash_rihs01(typename: &str, registry: &TypeRegistry) -> TypesysResult<String> {
    let hashable = rihs01_representation(typename, registry)?;
    let digest = Sha256::digest(hashable.as_bytes());
    Ok(format!("{RIHS01_PREFIX}{digest:x}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rihs01_byte() {
        let registry = TypeRegistry::new();
        assert_eq!(
            hash_rihs01("std_msgs/msg/Byte", &registry).unwrap(),
            "RIHS01_41e1a3345f73fe93ede006da826a6ee274af23dd4653976ff249b0f44e3e798f"
        );
    }

    #[test]
    fn test_rihs01_bytemultiarray() {
        let registry = TypeRegistry::new();
        assert_eq!(
            hash_rihs01("std_msgs/msg/ByteMultiArray", &registry).unwrap(),
            "RIHS01_972fec7f50ab3c1d06783c228e79e8a9a509021708c511c059926261ada901d4"
        );
    }

    #[test]
    fn test_rihs01_accel() {
        let registry = TypeRegistry::new();
        assert_eq!(
            hash_rihs01("geometry_msgs/msg/Accel", &registry).unwrap(),
            "RIHS01_dc448243ded9b1fcbcca24aba0c22f013dae06c354ba2d849571c0a2a3f57ca0"
        );
    }

    #[test]
    fn test_rihs01_unknown_type() {
        let registry = TypeRegistry::new();
        assert!(hash_rihs01("test_msgs/msg/Nope", &registry).is_err());
    }

    #[test]
    fn test_representation_is_canonical_json() {
        let registry = TypeRegistry::new();
        let text = rihs01_representation("sensor_msgs/msg/MagneticField", &registry).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            doc["type_description"]["type_name"],
            "sensor_msgs/msg/MagneticField"
        );
        let referenced: Vec<&str> = doc["referenced_type_descriptions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["type_name"].as_str().unwrap())
            .collect();
        assert_eq!(
            referenced,
            vec![
                "builtin_interfaces/msg/Time",
                "geometry_msgs/msg/Vector3",
                "std_msgs/msg/Header",
            ],
        );
    }

    #[test]
    fn test_rihs01_format() {
        let registry = TypeRegistry::new();
        let hash = hash_rihs01("std_msgs/msg/Header", &registry).unwrap();
        assert!(hash.starts_with(RIHS01_PREFIX));
        assert_eq!(hash.len(), RIHS01_PREFIX.len() + 64);
    }
}
