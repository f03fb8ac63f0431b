//! Stored types for schema persistence.
//!
//! Node records are serialized to redb via bincode. A node has exactly
//! one kind, so the record is an enum rather than a set of flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use tsmeta_common::{MeasurementSchema, StringMap};

/// Payload of a node in the namespace tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeRecord {
    /// Plain intermediate node
    Internal,
    /// Storage group boundary
    StorageGroup { ttl: Option<u64> },
    /// Parent of at least one measurement
    Device { aligned: bool },
    /// Leaf timeseries
    Measurement(MeasurementRecord),
}

/// Stored state of a leaf timeseries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub schema: MeasurementSchema,
    pub alias: Option<String>,
    pub tags: Option<StringMap>,
}

/// Discriminant of [`NodeRecord`], used in messages and dumps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Internal,
    StorageGroup,
    Device,
    Measurement,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Internal => "internal",
            Self::StorageGroup => "storage group",
            Self::Device => "device",
            Self::Measurement => "measurement",
        };
        f.write_str(name)
    }
}

impl NodeRecord {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Internal => NodeKind::Internal,
            Self::StorageGroup { .. } => NodeKind::StorageGroup,
            Self::Device { .. } => NodeKind::Device,
            Self::Measurement(_) => NodeKind::Measurement,
        }
    }

    #[must_use]
    pub const fn is_measurement(&self) -> bool {
        matches!(self, Self::Measurement(_))
    }

    #[must_use]
    pub const fn is_storage_group(&self) -> bool {
        matches!(self, Self::StorageGroup { .. })
    }

    #[must_use]
    pub const fn is_device(&self) -> bool {
        matches!(self, Self::Device { .. })
    }
}
