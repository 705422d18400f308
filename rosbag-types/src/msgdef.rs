//! ROS1 message definition text generation and MD5 hashing.
//!
//! Derives the canonical concatenated definition text used by rosbag1
//! connection records, together with the MD5 digest computed over the hash
//! text (sub-definitions replaced by their digests).

use md5::{Digest, Md5};

use crate::descriptor::{
    BaseType, EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME, ElementType, FieldType, PrimitiveKind,
    denormalize_typename,
};
use crate::errors::TypesysResult;
use crate::registry::TypeRegistry;

/// Textual spelling of a base type in ROS1 definition text.
///
/// `octet` reverses to the legacy `byte` spelling, bounded strings carry
/// their bound.
fn base_spelling(base: &BaseType) -> String {
    match base.kind {
        PrimitiveKind::Octet => "byte".to_string(),
        PrimitiveKind::String if base.limit > 0 => format!("string<={}", base.limit),
        kind => kind.as_str().to_string(),
    }
}

/// Alias spelling for time/duration references, ROS1 only.
fn typemap(typename: &str, ros_version: u8) -> Option<&'static str> {
    if ros_version != 1 {
        return None;
    }
    match typename {
        "builtin_interfaces/msg/Time" => Some("time"),
        "builtin_interfaces/msg/Duration" => Some("duration"),
        _ => None,
    }
}

/// Generate definition text and hash for one type, recursing into
/// referenced types through `subdefs` (insertion ordered).
fn gendefhash(
    typename: &str,
    subdefs: &mut Vec<(String, (String, String))>,
    registry: &TypeRegistry,
    ros_version: u8,
) -> TypesysResult<(String, String)> {
    let desc = registry.descriptor(typename)?;

    let mut deftext: Vec<String> = Vec::new();
    let mut hashtext: Vec<String> = Vec::new();

    for constant in &desc.constants {
        let name = constant.name.trim_end_matches('_');
        let line = format!("{} {}={}", constant.kind.as_str(), name, constant.value);
        deftext.push(line.clone());
        hashtext.push(line);
    }

    for field in &desc.fields {
        if field.name == EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME {
            continue;
        }
        let name = field.name.trim_end_matches('_');
        match &field.ty {
            FieldType::Base(base) => {
                let line = format!("{} {}", base_spelling(base), name);
                deftext.push(line.clone());
                hashtext.push(line);
            }
            FieldType::Name(subname) => {
                if let Some(alias) = typemap(subname, ros_version) {
                    deftext.push(format!("{alias} {name}"));
                    hashtext.push(format!("{alias} {name}"));
                } else {
                    let digest = subdef_digest(subname, subdefs, registry, ros_version)?;
                    deftext.push(format!("{} {}", denormalize_typename(subname), name));
                    hashtext.push(format!("{digest} {name}"));
                }
            }
            FieldType::Array(elem, len) => {
                emit_sequence_like(
                    elem,
                    &format!("{len}"),
                    name,
                    &mut deftext,
                    &mut hashtext,
                    subdefs,
                    registry,
                    ros_version,
                )?;
            }
            FieldType::Sequence(elem, bound) => {
                let count = if *bound == 0 {
                    String::new()
                } else {
                    format!("<={bound}")
                };
                emit_sequence_like(
                    elem,
                    &count,
                    name,
                    &mut deftext,
                    &mut hashtext,
                    subdefs,
                    registry,
                    ros_version,
                )?;
            }
        }
    }

    if ros_version == 1 && typename == "std_msgs/msg/Header" {
        deftext.insert(0, "uint32 seq".to_string());
        hashtext.insert(0, "uint32 seq".to_string());
    }

    let digest = format!("{:x}", Md5::digest(hashtext.join("\n").as_bytes()));
    deftext.push(String::new());
    Ok((deftext.join("\n"), digest))
}

#[allow(clippy::too_many_arguments)]
fn emit_sequence_like(
    elem: &ElementType,
    count: &str,
    name: &str,
    deftext: &mut Vec<String>,
    hashtext: &mut Vec<String>,
    subdefs: &mut Vec<(String, (String, String))>,
    registry: &TypeRegistry,
    ros_version: u8,
) -> TypesysResult<()> {
    match elem {
        ElementType::Base(base) => {
            let line = format!("{}[{}] {}", base_spelling(base), count, name);
            deftext.push(line.clone());
            hashtext.push(line);
        }
        ElementType::Name(subname) => {
            if let Some(alias) = typemap(subname, ros_version) {
                deftext.push(format!("{alias}[{count}] {name}"));
                hashtext.push(format!("{alias}[{count}] {name}"));
            } else {
                let digest = subdef_digest(subname, subdefs, registry, ros_version)?;
                deftext.push(format!("{}[{}] {}", denormalize_typename(subname), count, name));
                hashtext.push(format!("{digest} {name}"));
            }
        }
    }
    Ok(())
}

/// Digest of a referenced type, generating its entry on first use.
///
/// The slot is reserved before recursing so sub-definitions land in
/// first-encounter order.
fn subdef_digest(
    subname: &str,
    subdefs: &mut Vec<(String, (String, String))>,
    registry: &TypeRegistry,
    ros_version: u8,
) -> TypesysResult<String> {
    if let Some((_, (_, digest))) = subdefs.iter().find(|(name, _)| name == subname) {
        return Ok(digest.clone());
    }
    subdefs.push((subname.to_string(), (String::new(), String::new())));
    let entry = gendefhash(subname, subdefs, registry, ros_version)?;
    let digest = entry.1.clone();
    if let Some(slot) = subdefs.iter_mut().find(|(name, _)| name == subname) {
        slot.1 = entry;
    }
    Ok(digest)
}

/// Generate the concatenated message definition and MD5 digest for a type.
///
/// The definition of the requested type comes first, each referenced type
/// follows behind a separator line of 80 `=` characters and an `MSG:` header.
/// `ros_version` 1 substitutes `time`/`duration` aliases and prepends the
/// hidden `uint32 seq` field to `std_msgs/msg/Header`; version 2 keeps the
/// ROS2 spellings.
///
/// # Errors
///
/// Returns [`TypesysError::UnknownType`](crate::TypesysError::UnknownType) if
/// the type or any referenced type is not registered.
pub fn generate_msgdef(
    typename: &str,
    registry: &TypeRegistry,
    ros_version: u8,
) -> TypesysResult<(String, String)> {
    let mut subdefs = Vec::new();
    let (mut msgdef, md5sum) = gendefhash(typename, &mut subdefs, registry, ros_version)?;

    for (subname, (subtext, _)) in &subdefs {
        msgdef.push_str(&"=".repeat(80));
        msgdef.push_str(&format!(
            "\nMSG: {}\n{}",
            denormalize_typename(subname),
            subtext
        ));
    }

    Ok((msgdef, md5sum))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_msgdef() {
        let registry = TypeRegistry::new();
        let res = generate_msgdef("std_msgs/msg/Empty", &registry, 1).unwrap();
        assert_eq!(res, (String::new(), "d41d8cd98f00b204e9800998ecf8427e".to_string()));
    }

    #[test]
    fn test_header_msgdef() {
        let registry = TypeRegistry::new();
        let res = generate_msgdef("std_msgs/msg/Header", &registry, 1).unwrap();
        assert_eq!(res.0, "uint32 seq\ntime stamp\nstring frame_id\n");
        assert_eq!(res.1, "2176decaecbce78abc3b96ef049fabed");
    }

    #[test]
    fn test_byte_msgdef() {
        let registry = TypeRegistry::new();
        let (text, digest) = generate_msgdef("std_msgs/msg/Byte", &registry, 1).unwrap();
        assert_eq!(text, "byte data\n");
        assert_eq!(digest, "ad736a2e8818154c487bb80fe42ce43b");
    }

    #[test]
    fn test_bytemultiarray_md5() {
        let registry = TypeRegistry::new();
        let (_, digest) = generate_msgdef("std_msgs/msg/ByteMultiArray", &registry, 1).unwrap();
        assert_eq!(digest, "70ea476cbcfd65ac2f68f3cda1e891fe");
    }

    #[test]
    fn test_pointstamped_concatenation() {
        let registry = TypeRegistry::new();
        let (text, _) = generate_msgdef("geometry_msgs/msg/PointStamped", &registry, 1).unwrap();
        let blocks: Vec<&str> = text.split(&format!("{}\n", "=".repeat(80))).collect();
        assert_eq!(
            blocks,
            vec![
                "std_msgs/Header header\ngeometry_msgs/Point point\n",
                "MSG: std_msgs/Header\nuint32 seq\ntime stamp\nstring frame_id\n",
                "MSG: geometry_msgs/Point\nfloat64 x\nfloat64 y\nfloat64 z\n",
            ],
        );
    }

    #[test]
    fn test_twist_shares_subdef() {
        let registry = TypeRegistry::new();
        let (text, _) = generate_msgdef("geometry_msgs/msg/Twist", &registry, 1).unwrap();
        let blocks: Vec<&str> = text.split(&format!("{}\n", "=".repeat(80))).collect();
        assert_eq!(
            blocks,
            vec![
                "geometry_msgs/Vector3 linear\ngeometry_msgs/Vector3 angular\n",
                "MSG: geometry_msgs/Vector3\nfloat64 x\nfloat64 y\nfloat64 z\n",
            ],
        );
    }

    #[test]
    fn test_mesh_sequences() {
        let registry = TypeRegistry::new();
        let (text, _) = generate_msgdef("shape_msgs/msg/Mesh", &registry, 1).unwrap();
        let blocks: Vec<&str> = text.split(&format!("{}\n", "=".repeat(80))).collect();
        assert_eq!(
            blocks,
            vec![
                "shape_msgs/MeshTriangle[] triangles\ngeometry_msgs/Point[] vertices\n",
                "MSG: shape_msgs/MeshTriangle\nuint32[3] vertex_indices\n",
                "MSG: geometry_msgs/Point\nfloat64 x\nfloat64 y\nfloat64 z\n",
            ],
        );
    }

    #[test]
    fn test_plane_fixed_array() {
        let registry = TypeRegistry::new();
        let (text, _) = generate_msgdef("shape_msgs/msg/Plane", &registry, 1).unwrap();
        assert_eq!(text, "float64[4] coef\n");
    }

    #[test]
    fn test_ros2_version_keeps_builtin_names() {
        let registry = TypeRegistry::new();
        let (text, _) = generate_msgdef("std_msgs/msg/Header", &registry, 2).unwrap();
        assert!(text.contains("builtin_interfaces/Time stamp"));
        assert!(!text.contains("uint32 seq"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = TypeRegistry::new();
        assert!(generate_msgdef("foo_msgs/msg/Badname", &registry, 1).is_err());
    }
}
