/// Connection metadata binding a topic to a message type within a bag
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rosbag2 specific connection information
///
/// The QoS profile is carried as an opaque string and passed through
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionExtRosbag2 {
    /// Message serialization format, `cdr` for all supported bags
    pub serialization_format: String,
    /// Opaque QoS profile string
    pub offered_qos_profiles: String,
}

/// Connection of a single published stream within a bag
///
/// Connections are owned by their reader or writer for the lifetime of the
/// bag session and handed out by reference.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Connection {
    /// Connection id, unique within the owning bag
    pub id: u32,
    /// Topic name
    pub topic: String,
    /// Normalized message type name
    pub msgtype: String,
    /// Raw message definition text, empty when the bag carries none
    pub msgdef: String,
    /// Type digest: RIHS01 (or empty) for rosbag2 connections
    pub digest: String,
    /// Number of messages recorded on this connection
    pub msgcount: u64,
    /// Transport specific extension
    pub ext: ConnectionExtRosbag2,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection {} {} ({})", self.id, self.topic, self.msgtype)
    }
}
