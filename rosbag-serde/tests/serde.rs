//! Round-trip and byte-layout tests against known wire fixtures.

use std::collections::HashMap;

use rosbag_msg::get_types_from_msg;
use rosbag_serde::{
    Endianness, Value, cdr_to_ros1, deserialize_cdr, deserialize_ros1, ros1_to_cdr, serialize_cdr,
    serialize_ros1,
};
use rosbag_types::{TypeDescriptor, TypeRegistry};

const MSG_POLY: (&[u8], &str) = (
    &[
        0x00, 0x01, 0x00, 0x00, // header
        0x02, 0x00, 0x00, 0x00, // number of points = 2
        0x00, 0x00, 0x80, 0x3f, // x = 1
        0x00, 0x00, 0x00, 0x40, // y = 2
        0x00, 0x00, 0x40, 0x40, // z = 3
        0x00, 0x00, 0xa0, 0x3f, // x = 1.25
        0x00, 0x00, 0x10, 0x40, // y = 2.25
        0x00, 0x00, 0x50, 0x40, // z = 3.25
    ],
    "geometry_msgs/msg/Polygon",
);

const MSG_MAGN: (&[u8], &str) = (
    &[
        0x00, 0x01, 0x00, 0x00, // header
        0xc4, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, // timestamp = 708s 256ns
        0x06, 0x00, 0x00, 0x00, b'f', b'o', b'o', b'4', b'2', 0x00, // frame 'foo42'
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // padding
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x60, 0x40, // x = 128
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x60, 0x40, // y = 128
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x60, 0x40, // z = 128
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x3f, // covariance = 3x3 diag
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x3f, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x3f, //
    ],
    "sensor_msgs/msg/MagneticField",
);

const MSG_MAGN_BIG: (&[u8], &str) = (
    &[
        0x00, 0x00, 0x00, 0x00, // header
        0x00, 0x00, 0x02, 0xc4, 0x00, 0x00, 0x01, 0x00, // timestamp = 708s 256ns
        0x00, 0x00, 0x00, 0x06, b'f', b'o', b'o', b'4', b'2', 0x00, // frame 'foo42'
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // padding
        0x40, 0x60, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // x = 128
        0x40, 0x60, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // y = 128
        0x40, 0x60, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // z = 128
        0x3f, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // covariance = 3x3 diag
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x3f, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x3f, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, // garbage
    ],
    "sensor_msgs/msg/MagneticField",
);

const MSG_JOINT: (&[u8], &str) = (
    &[
        0x00, 0x01, 0x00, 0x00, // header
        0xc4, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, // timestamp = 708s 256ns
        0x04, 0x00, 0x00, 0x00, b'b', b'a', b'r', 0x00, // frame 'bar'
        0x02, 0x00, 0x00, 0x00, // number of strings
        0x02, 0x00, 0x00, 0x00, b'a', 0x00, // string 'a'
        0x00, 0x00, // padding
        0x02, 0x00, 0x00, 0x00, b'b', 0x00, // string 'b'
        0x00, 0x00, // padding
        0x00, 0x00, 0x00, 0x00, // number of points
        0x00, 0x00, 0x00, // garbage
    ],
    "trajectory_msgs/msg/JointTrajectory",
);

fn register(registry: &TypeRegistry, text: &str, name: &str) {
    let types: HashMap<String, TypeDescriptor> = get_types_from_msg(text, name).unwrap();
    registry.register(types).unwrap();
}

fn input_endianness(raw: &[u8]) -> Endianness {
    if raw[1] == 1 {
        Endianness::Little
    } else {
        Endianness::Big
    }
}

#[test]
fn test_serde_roundtrips() {
    let registry = TypeRegistry::new();
    for (raw, typename) in [MSG_POLY, MSG_MAGN, MSG_MAGN_BIG, MSG_JOINT] {
        let value = deserialize_cdr(raw, typename, &registry).unwrap();
        let serdeser = serialize_cdr(&value, typename, input_endianness(raw), &registry).unwrap();
        assert_eq!(serdeser, raw[..serdeser.len()], "{typename}");
        assert!(raw.len() - serdeser.len() < 4);
        assert!(raw[serdeser.len()..].iter().all(|&b| b == 0));

        if raw[1] == 1 {
            let ros1 = cdr_to_ros1(raw, typename, &registry).unwrap();
            let value = deserialize_ros1(&ros1, typename, &registry).unwrap();
            assert_eq!(serialize_ros1(&value, typename, &registry).unwrap(), ros1);
        }
    }
}

#[test]
fn test_deserialize_polygon() {
    let registry = TypeRegistry::new();
    let msg = deserialize_cdr(MSG_POLY.0, MSG_POLY.1, &registry).unwrap();
    let points = msg.as_message().unwrap()[0].as_array().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(
        points[0],
        Value::Message(vec![
            Value::Float32(1.0),
            Value::Float32(2.0),
            Value::Float32(3.0),
        ])
    );
    assert_eq!(
        points[1],
        Value::Message(vec![
            Value::Float32(1.25),
            Value::Float32(2.25),
            Value::Float32(3.25),
        ])
    );

    let ros1 = cdr_to_ros1(MSG_POLY.0, MSG_POLY.1, &registry).unwrap();
    assert_eq!(deserialize_ros1(&ros1, MSG_POLY.1, &registry).unwrap(), msg);
}

#[test]
fn test_deserialize_magnetic_field_both_endiannesses() {
    let registry = TypeRegistry::new();
    let msg = deserialize_cdr(MSG_MAGN.0, MSG_MAGN.1, &registry).unwrap();
    let fields = msg.as_message().unwrap();
    let header = fields[0].as_message().unwrap();
    assert_eq!(
        header[0],
        Value::Message(vec![Value::Int32(708), Value::UInt32(256)])
    );
    assert_eq!(header[1], Value::string("foo42"));
    assert_eq!(
        fields[1],
        Value::Message(vec![
            Value::Float64(128.0),
            Value::Float64(128.0),
            Value::Float64(128.0),
        ])
    );
    let covariance = fields[2].as_array().unwrap();
    for (idx, item) in covariance.iter().enumerate() {
        let expected = if idx % 4 == 0 { 1.0 } else { 0.0 };
        assert_eq!(*item, Value::Float64(expected));
    }

    let big = deserialize_cdr(MSG_MAGN_BIG.0, MSG_MAGN_BIG.1, &registry).unwrap();
    assert_eq!(big, msg);
}

#[test]
fn test_deserialize_joint_trajectory_tolerates_garbage() {
    let registry = TypeRegistry::new();
    let msg = deserialize_cdr(MSG_JOINT.0, MSG_JOINT.1, &registry).unwrap();
    let fields = msg.as_message().unwrap();
    assert_eq!(
        fields[1],
        Value::Array(vec![Value::string("a"), Value::string("b")])
    );
    assert_eq!(fields[2], Value::Array(vec![]));
}

const STATIC_16_64: &str = "uint16 u16\nuint64 u64\n";
const DYNAMIC_S_64: &str = "string s\nuint64 u64\n";

#[test]
fn test_ros1_to_cdr_bounded() {
    let registry = TypeRegistry::new();
    register(&registry, STATIC_16_64, "test_msgs/msg/static_16_64");

    let msg_ros: &[u8] = &[
        0x01, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
    ];
    let msg_cdr: &[u8] = &[
        0x00, 0x01, 0x00, 0x00, //
        0x01, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
    ];
    assert_eq!(
        ros1_to_cdr(msg_ros, "test_msgs/msg/static_16_64", &registry).unwrap(),
        msg_cdr
    );
    let value = deserialize_ros1(msg_ros, "test_msgs/msg/static_16_64", &registry).unwrap();
    assert_eq!(
        serialize_cdr(&value, "test_msgs/msg/static_16_64", Endianness::Little, &registry)
            .unwrap(),
        msg_cdr
    );
    assert_eq!(
        cdr_to_ros1(msg_cdr, "test_msgs/msg/static_16_64", &registry).unwrap(),
        msg_ros
    );
}

#[test]
fn test_converters_dynamic_string() {
    let registry = TypeRegistry::new();
    register(&registry, DYNAMIC_S_64, "test_msgs/msg/dynamic_s_64");

    let msg_ros: &[u8] = &[
        0x01, 0x00, 0x00, 0x00, b'X', //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
    ];
    let msg_cdr: &[u8] = &[
        0x00, 0x01, 0x00, 0x00, //
        0x02, 0x00, 0x00, 0x00, b'X', 0x00, //
        0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
    ];
    assert_eq!(
        ros1_to_cdr(msg_ros, "test_msgs/msg/dynamic_s_64", &registry).unwrap(),
        msg_cdr
    );
    assert_eq!(
        cdr_to_ros1(msg_cdr, "test_msgs/msg/dynamic_s_64", &registry).unwrap(),
        msg_ros
    );
    let value = deserialize_cdr(msg_cdr, "test_msgs/msg/dynamic_s_64", &registry).unwrap();
    assert_eq!(
        serialize_ros1(&value, "test_msgs/msg/dynamic_s_64", &registry).unwrap(),
        msg_ros
    );
}

#[test]
fn test_padding_empty_sequence() {
    let registry = TypeRegistry::new();
    register(&registry, "uint64[] su64\nbool b\n", "test_msgs/msg/su64_b");

    let msg = Value::Message(vec![Value::Array(vec![]), Value::Bool(true)]);
    let cdr = serialize_cdr(&msg, "test_msgs/msg/su64_b", Endianness::Little, &registry).unwrap();
    assert_eq!(&cdr[4..], b"\x00\x00\x00\x00\x01");

    let ros1 = cdr_to_ros1(&cdr, "test_msgs/msg/su64_b", &registry).unwrap();
    assert_eq!(ros1, &cdr[4..]);
    assert_eq!(ros1_to_cdr(&ros1, "test_msgs/msg/su64_b", &registry).unwrap(), cdr);
    assert_eq!(deserialize_cdr(&cdr, "test_msgs/msg/su64_b", &registry).unwrap(), msg);
}

#[test]
fn test_align_after_empty_sequence() {
    let registry = TypeRegistry::new();
    register(&registry, "uint64[] su64\nuint64 u64\n", "test_msgs/msg/su64_u64");
    register(&registry, "su64_u64[] seq\nuint64 u64\n", "test_msgs/msg/smsg_u64");

    let msg1 = Value::Message(vec![Value::Array(vec![]), Value::UInt64(42)]);
    let msg2 = Value::Message(vec![Value::Array(vec![]), Value::UInt64(42)]);

    let cdr = serialize_cdr(&msg1, "test_msgs/msg/su64_u64", Endianness::Little, &registry)
        .unwrap();
    assert_eq!(
        &cdr[4..],
        b"\x00\x00\x00\x00\x00\x00\x00\x00\x2a\x00\x00\x00\x00\x00\x00\x00"
    );
    assert_eq!(
        serialize_cdr(&msg2, "test_msgs/msg/smsg_u64", Endianness::Little, &registry).unwrap(),
        cdr
    );

    let ros1 = cdr_to_ros1(&cdr, "test_msgs/msg/su64_u64", &registry).unwrap();
    assert_eq!(ros1, b"\x00\x00\x00\x00\x2a\x00\x00\x00\x00\x00\x00\x00");
    assert_eq!(cdr_to_ros1(&cdr, "test_msgs/msg/smsg_u64", &registry).unwrap(), ros1);
    assert_eq!(ros1_to_cdr(&ros1, "test_msgs/msg/su64_u64", &registry).unwrap(), cdr);

    assert_eq!(deserialize_cdr(&cdr, "test_msgs/msg/su64_u64", &registry).unwrap(), msg1);
    assert_eq!(deserialize_cdr(&cdr, "test_msgs/msg/smsg_u64", &registry).unwrap(), msg2);
}

#[test]
fn test_empty_message_handling() {
    let registry = TypeRegistry::new();
    register(&registry, "uint8 JUST_SOME_CONSTANT = 1\n", "test_msgs/msg/Nothing");
    register(
        &registry,
        "int32 pre\ntest_msgs/msg/Nothing empty\nint64 post\n",
        "test_msgs/msg/UnalignedHolder",
    );
    register(
        &registry,
        "int64 pre\ntest_msgs/msg/Nothing empty\nint64 post\n",
        "test_msgs/msg/AlignedHolder",
    );

    let unaligned = Value::Message(vec![
        Value::Int32(-1),
        Value::Message(vec![]),
        Value::Int64(-1),
    ]);
    let aligned = Value::Message(vec![
        Value::Int64(-1),
        Value::Message(vec![]),
        Value::Int64(-1),
    ]);

    let unaligned_cdr: &[u8] = &[
        0x00, 0x01, 0x00, 0x00, //
        0xff, 0xff, 0xff, 0xff, //
        0x00, 0x00, 0x00, 0x00, //
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    ];
    let aligned_cdr: &[u8] = &[
        0x00, 0x01, 0x00, 0x00, //
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    ];
    let unaligned_ros1: &[u8] = &[
        0xff, 0xff, 0xff, 0xff, //
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    ];
    let aligned_ros1: &[u8] = &[
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    ];

    let holder = "test_msgs/msg/UnalignedHolder";
    let aligned_holder = "test_msgs/msg/AlignedHolder";

    assert_eq!(
        serialize_cdr(&unaligned, holder, Endianness::Little, &registry).unwrap(),
        unaligned_cdr
    );
    assert_eq!(
        serialize_cdr(&aligned, aligned_holder, Endianness::Little, &registry).unwrap(),
        aligned_cdr
    );
    assert_eq!(serialize_ros1(&unaligned, holder, &registry).unwrap(), unaligned_ros1);
    assert_eq!(
        serialize_ros1(&aligned, aligned_holder, &registry).unwrap(),
        aligned_ros1
    );

    assert_eq!(deserialize_cdr(unaligned_cdr, holder, &registry).unwrap(), unaligned);
    assert_eq!(deserialize_cdr(aligned_cdr, aligned_holder, &registry).unwrap(), aligned);
    assert_eq!(deserialize_ros1(unaligned_ros1, holder, &registry).unwrap(), unaligned);
    assert_eq!(
        deserialize_ros1(aligned_ros1, aligned_holder, &registry).unwrap(),
        aligned
    );

    assert_eq!(cdr_to_ros1(unaligned_cdr, holder, &registry).unwrap(), unaligned_ros1);
    assert_eq!(
        cdr_to_ros1(aligned_cdr, aligned_holder, &registry).unwrap(),
        aligned_ros1
    );
    assert_eq!(ros1_to_cdr(unaligned_ros1, holder, &registry).unwrap(), unaligned_cdr);
    assert_eq!(
        ros1_to_cdr(aligned_ros1, aligned_holder, &registry).unwrap(),
        aligned_cdr
    );
}

const CUSTOM: &str = "
string base_str
float32 base_f32
test_msgs/msg/static_16_64 msg_s16
test_msgs/msg/dynamic_s_64 msg_ds6

string[2] arr_base_str
test_msgs/msg/static_16_64[2] arr_msg_s16
test_msgs/msg/dynamic_s_64[2] arr_msg_ds6

string[] seq_base_str
float32[] seq_base_f32
test_msgs/msg/static_16_64[] seq_msg_s16
test_msgs/msg/dynamic_s_64[] seq_msg_ds6
";

#[test]
fn test_custom_type_roundtrip() {
    let registry = TypeRegistry::new();
    register(&registry, STATIC_16_64, "test_msgs/msg/static_16_64");
    register(&registry, DYNAMIC_S_64, "test_msgs/msg/dynamic_s_64");
    register(&registry, CUSTOM, "test_msgs/msg/custom");

    let s16 = || Value::Message(vec![Value::UInt16(16), Value::UInt64(64)]);
    let ds6 = || Value::Message(vec![Value::string("s"), Value::UInt64(64)]);

    let msg = Value::Message(vec![
        Value::string("str"),
        Value::Float32(1.5),
        s16(),
        ds6(),
        Value::Array(vec![Value::string("str_1"), Value::string("")]),
        Value::Array(vec![s16(), s16()]),
        Value::Array(vec![ds6(), ds6()]),
        Value::Array(vec![Value::string("str_1"), Value::string("")]),
        Value::Array(vec![Value::Float32(1.5), Value::Float32(0.75)]),
        Value::Array(vec![s16(), s16()]),
        Value::Array(vec![ds6(), ds6()]),
    ]);

    let cname = "test_msgs/msg/custom";
    let cdr = serialize_cdr(&msg, cname, Endianness::Little, &registry).unwrap();
    assert_eq!(deserialize_cdr(&cdr, cname, &registry).unwrap(), msg);

    let ros1 = serialize_ros1(&msg, cname, &registry).unwrap();
    assert_eq!(deserialize_ros1(&ros1, cname, &registry).unwrap(), msg);

    assert_eq!(ros1_to_cdr(&ros1, cname, &registry).unwrap(), cdr);
    assert_eq!(cdr_to_ros1(&cdr, cname, &registry).unwrap(), ros1);
}

#[test]
fn test_big_endian_serialize_roundtrip() {
    let registry = TypeRegistry::new();
    let value = deserialize_cdr(MSG_MAGN.0, MSG_MAGN.1, &registry).unwrap();
    let big = serialize_cdr(&value, MSG_MAGN.1, Endianness::Big, &registry).unwrap();
    assert_eq!(big, MSG_MAGN_BIG.0[..big.len()]);
    assert_eq!(deserialize_cdr(&big, MSG_MAGN.1, &registry).unwrap(), value);
}
