//! Builtin message descriptors seeded into every registry.
//!
//! Covers `builtin_interfaces`, the `std_msgs` primitive wrappers, and the
//! common geometry, sensor, trajectory, and shape types.

use crate::descriptor::{
    BaseType, ElementType, EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME, FieldDef, FieldType,
    PrimitiveKind, TypeDescriptor,
};

fn base(kind: PrimitiveKind) -> FieldType {
    FieldType::Base(BaseType::new(kind))
}

fn name(typename: &str) -> FieldType {
    FieldType::Name(typename.to_string())
}

fn array(kind: PrimitiveKind, len: u64) -> FieldType {
    FieldType::Array(ElementType::Base(BaseType::new(kind)), len)
}

fn seq(kind: PrimitiveKind) -> FieldType {
    FieldType::Sequence(ElementType::Base(BaseType::new(kind)), 0)
}

fn seq_name(typename: &str) -> FieldType {
    FieldType::Sequence(ElementType::Name(typename.to_string()), 0)
}

fn msgtype(typename: &str, fields: &[(&str, FieldType)]) -> TypeDescriptor {
    TypeDescriptor::new(
        typename,
        vec![],
        fields
            .iter()
            .map(|(fname, ty)| FieldDef::new(fname, ty.clone()))
            .collect(),
    )
}

fn wrapper(typename: &str, kind: PrimitiveKind) -> TypeDescriptor {
    msgtype(typename, &[("data", base(kind))])
}

/// All builtin descriptors, in registration order.
pub(crate) fn builtin_types() -> Vec<TypeDescriptor> {
    use PrimitiveKind::{
        Bool, Float32, Float64, Int8, Int16, Int32, Int64, Octet, String, UInt8, UInt16, UInt32,
        UInt64,
    };

    let mut types = vec![
        msgtype(
            "builtin_interfaces/msg/Time",
            &[("sec", base(Int32)), ("nanosec", base(UInt32))],
        ),
        msgtype(
            "builtin_interfaces/msg/Duration",
            &[("sec", base(Int32)), ("nanosec", base(UInt32))],
        ),
        msgtype(
            "std_msgs/msg/Header",
            &[
                ("stamp", name("builtin_interfaces/msg/Time")),
                ("frame_id", base(String)),
            ],
        ),
        msgtype(
            "std_msgs/msg/Empty",
            &[(EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME, base(UInt8))],
        ),
        msgtype(
            "std_msgs/msg/ColorRGBA",
            &[
                ("r", base(Float32)),
                ("g", base(Float32)),
                ("b", base(Float32)),
                ("a", base(Float32)),
            ],
        ),
        msgtype(
            "std_msgs/msg/MultiArrayDimension",
            &[
                ("label", base(String)),
                ("size", base(UInt32)),
                ("stride", base(UInt32)),
            ],
        ),
        msgtype(
            "std_msgs/msg/MultiArrayLayout",
            &[
                ("dim", seq_name("std_msgs/msg/MultiArrayDimension")),
                ("data_offset", base(UInt32)),
            ],
        ),
        msgtype(
            "std_msgs/msg/ByteMultiArray",
            &[
                ("layout", name("std_msgs/msg/MultiArrayLayout")),
                ("data", seq(Octet)),
            ],
        ),
        msgtype(
            "geometry_msgs/msg/Point",
            &[("x", base(Float64)), ("y", base(Float64)), ("z", base(Float64))],
        ),
        msgtype(
            "geometry_msgs/msg/Point32",
            &[("x", base(Float32)), ("y", base(Float32)), ("z", base(Float32))],
        ),
        msgtype(
            "geometry_msgs/msg/Vector3",
            &[("x", base(Float64)), ("y", base(Float64)), ("z", base(Float64))],
        ),
        msgtype(
            "geometry_msgs/msg/Quaternion",
            &[
                ("x", base(Float64)),
                ("y", base(Float64)),
                ("z", base(Float64)),
                ("w", base(Float64)),
            ],
        ),
        msgtype(
            "geometry_msgs/msg/Pose",
            &[
                ("position", name("geometry_msgs/msg/Point")),
                ("orientation", name("geometry_msgs/msg/Quaternion")),
            ],
        ),
        msgtype(
            "geometry_msgs/msg/Polygon",
            &[("points", seq_name("geometry_msgs/msg/Point32"))],
        ),
        msgtype(
            "geometry_msgs/msg/PointStamped",
            &[
                ("header", name("std_msgs/msg/Header")),
                ("point", name("geometry_msgs/msg/Point")),
            ],
        ),
        msgtype(
            "geometry_msgs/msg/Twist",
            &[
                ("linear", name("geometry_msgs/msg/Vector3")),
                ("angular", name("geometry_msgs/msg/Vector3")),
            ],
        ),
        msgtype(
            "geometry_msgs/msg/Accel",
            &[
                ("linear", name("geometry_msgs/msg/Vector3")),
                ("angular", name("geometry_msgs/msg/Vector3")),
            ],
        ),
        msgtype(
            "sensor_msgs/msg/MagneticField",
            &[
                ("header", name("std_msgs/msg/Header")),
                ("magnetic_field", name("geometry_msgs/msg/Vector3")),
                ("magnetic_field_covariance", array(Float64, 9)),
            ],
        ),
        msgtype(
            "trajectory_msgs/msg/JointTrajectory",
            &[
                ("header", name("std_msgs/msg/Header")),
                ("joint_names", seq(String)),
                ("points", seq_name("trajectory_msgs/msg/JointTrajectoryPoint")),
            ],
        ),
        msgtype(
            "trajectory_msgs/msg/JointTrajectoryPoint",
            &[
                ("positions", seq(Float64)),
                ("velocities", seq(Float64)),
                ("accelerations", seq(Float64)),
                ("effort", seq(Float64)),
                ("time_from_start", name("builtin_interfaces/msg/Duration")),
            ],
        ),
        msgtype("shape_msgs/msg/Plane", &[("coef", array(Float64, 4))]),
        msgtype(
            "shape_msgs/msg/MeshTriangle",
            &[("vertex_indices", array(UInt32, 3))],
        ),
        msgtype(
            "shape_msgs/msg/Mesh",
            &[
                ("triangles", seq_name("shape_msgs/msg/MeshTriangle")),
                ("vertices", seq_name("geometry_msgs/msg/Point")),
            ],
        ),
    ];

    for (typename, kind) in [
        ("std_msgs/msg/Bool", Bool),
        ("std_msgs/msg/Byte", Octet),
        ("std_msgs/msg/Char", UInt8),
        ("std_msgs/msg/Int8", Int8),
        ("std_msgs/msg/UInt8", UInt8),
        ("std_msgs/msg/Int16", Int16),
        ("std_msgs/msg/UInt16", UInt16),
        ("std_msgs/msg/Int32", Int32),
        ("std_msgs/msg/UInt32", UInt32),
        ("std_msgs/msg/Int64", Int64),
        ("std_msgs/msg/UInt64", UInt64),
        ("std_msgs/msg/Float32", Float32),
        ("std_msgs/msg/Float64", Float64),
        ("std_msgs/msg/String", String),
    ] {
        types.push(wrapper(typename, kind));
    }

    types
}
