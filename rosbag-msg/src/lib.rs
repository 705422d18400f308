#![deny(
    unsafe_code,
    unused_must_use,
    unreachable_pub,
    rust_2018_idioms,
    missing_docs,
    clippy::pedantic
)]

//! # ROS Message Definition Parsers
//!
//! Parsers for the two textual interface definition grammars used by the ROS
//! ecosystems, both expressed as pest grammars:
//!
//! - [`msg`]: the `MSG` format, including concatenated multi-type blobs as
//!   found in rosbag1 connection records
//! - [`idl`]: the OMG IDL subset emitted by `rosidl_adapter`
//!
//! Both parsers emit [`TypeDescriptor`](rosbag_types::TypeDescriptor) maps
//! ready for [`TypeRegistry::register`](rosbag_types::TypeRegistry::register).
//!
//! ## Quick Start
//!
//! ```rust
//! use rosbag_msg::{get_types_from_idl, get_types_from_msg};
//!
//! let types = get_types_from_msg("float64 x\nfloat64 y\n", "test_msgs/msg/Point2")?;
//! assert!(types.contains_key("test_msgs/msg/Point2"));
//!
//! let idl = "module test_msgs { module msg { struct Flag { boolean value; }; }; };";
//! let types = get_types_from_idl(idl)?;
//! assert!(types.contains_key("test_msgs/msg/Flag"));
//! # Ok::<(), rosbag_msg::ParseError>(())
//! ```

/// Error handling for definition parsing
pub mod errors;
/// OMG IDL parser
pub mod idl;
/// MSG parser
pub mod msg;

pub use errors::{ParseError, ParseResult};
pub use idl::get_types_from_idl;
pub use msg::get_types_from_msg;
