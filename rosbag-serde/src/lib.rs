#![deny(
    unsafe_code,
    unused_must_use,
    unreachable_pub,
    rust_2018_idioms,
    missing_docs,
    clippy::pedantic
)]

//! # ROS Message Serialization
//!
//! Serializers and deserializers convert between dynamic [`Value`]s and the
//! common rosbag serialization formats, driven by the descriptors of a
//! [`TypeRegistry`](rosbag_types::TypeRegistry). Computationally cheap
//! byte-level converters translate directly between the ROS1 packed format
//! and CDR without building values.
//!
//! ## Quick Start
//!
//! ```rust
//! use rosbag_serde::{Endianness, Value, deserialize_cdr, serialize_cdr};
//! use rosbag_types::TypeRegistry;
//!
//! let registry = TypeRegistry::new();
//! let value = Value::Message(vec![Value::Int8(7)]);
//! let bytes = serialize_cdr(&value, "std_msgs/msg/Int8", Endianness::Little, &registry)?;
//! assert_eq!(bytes, b"\x00\x01\x00\x00\x07");
//! assert_eq!(deserialize_cdr(&bytes, "std_msgs/msg/Int8", &registry)?, value);
//! # Ok::<(), rosbag_serde::SerdeError>(())
//! ```

/// CDR codec and encapsulation header handling
pub mod cdr;
/// Byte cursors shared by the codecs
mod cursor;
/// Error handling for serialization
pub mod errors;
/// Descriptor lookup cache
mod lookup;
/// ROS1 codec and the byte-level ROS1/CDR converters
pub mod ros1;
/// Dynamic message value model
pub mod value;

pub use cdr::{CdrHeader, Endianness, deserialize_cdr, serialize_cdr};
pub use errors::{SerdeError, SerdeResult};
pub use ros1::{cdr_to_ros1, deserialize_ros1, ros1_to_cdr, serialize_ros1};
pub use value::Value;
