#![deny(
    unsafe_code,
    unused_must_use,
    unreachable_pub,
    rust_2018_idioms,
    missing_docs,
    clippy::pedantic
)]

//! # ROS Message Type System
//!
//! An extensible store of ROS message type descriptors, shared by the message
//! definition parsers, the serializers, and the bag containers.
//!
//! The crate provides:
//!
//! - **Descriptors**: a compact structural model of message types
//!   ([`TypeDescriptor`], [`FieldType`], [`PrimitiveKind`])
//! - **Registry**: a process-addressable descriptor store with idempotent,
//!   atomic registration ([`TypeRegistry`])
//! - **Hashes**: ROS1 MD5 digests over canonical definition text
//!   ([`generate_msgdef`]) and ROS2 RIHS01 SHA-256 digests ([`hash_rihs01`])
//! - **Connections**: the topic/type binding carried by bag containers
//!   ([`Connection`])
//!
//! ## Quick Start
//!
//! ```rust
//! use rosbag_types::{TypeRegistry, generate_msgdef, hash_rihs01};
//!
//! let registry = TypeRegistry::new();
//! let (_msgdef, md5) = generate_msgdef("std_msgs/msg/Header", &registry, 1)?;
//! assert_eq!(md5, "2176decaecbce78abc3b96ef049fabed");
//!
//! let rihs = hash_rihs01("std_msgs/msg/Header", &registry)?;
//! assert!(rihs.starts_with("RIHS01_"));
//! # Ok::<(), rosbag_types::TypesysError>(())
//! ```

/// Builtin descriptors seeded into every registry.
mod builtin;
/// Connection metadata shared by bag readers and writers.
pub mod connection;
/// Structural message type descriptors.
pub mod descriptor;
/// Error handling for the type system.
pub mod errors;
/// RIHS01 type hashing.
pub mod hash;
/// ROS1 message definition text generation and MD5 hashing.
pub mod msgdef;
/// Descriptor registry.
pub mod registry;

pub use connection::{Connection, ConnectionExtRosbag2};
pub use descriptor::{
    BaseType, ConstDef, ConstValue, EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME, ElementType, FieldDef,
    FieldType, PrimitiveKind, TypeDescriptor, denormalize_typename, normalize_fieldname,
    normalize_typename,
};
pub use errors::{TypesysError, TypesysResult};
pub use hash::{hash_rihs01, rihs01_representation};
pub use msgdef::generate_msgdef;
pub use registry::TypeRegistry;
