//! Core schema type definitions for tsmeta
//!
//! This module defines the value-level vocabulary shared by the metadata
//! store and the schema cache: data types, encodings, compressors,
//! measurement schemas and last-value pairs.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Value type of a timeseries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum DataType {
    #[display("BOOLEAN")]
    Boolean,
    #[display("INT32")]
    Int32,
    #[display("INT64")]
    Int64,
    #[display("FLOAT")]
    Float,
    #[display("DOUBLE")]
    Double,
    #[display("TEXT")]
    Text,
}

impl DataType {
    /// Encodings the storage engine can apply to this type
    #[must_use]
    pub const fn supported_encodings(self) -> &'static [Encoding] {
        match self {
            Self::Boolean => &[Encoding::Plain, Encoding::Rle],
            Self::Int32 | Self::Int64 => &[
                Encoding::Plain,
                Encoding::Rle,
                Encoding::Ts2Diff,
                Encoding::Gorilla,
                Encoding::Zigzag,
                Encoding::Regular,
            ],
            Self::Float | Self::Double => &[
                Encoding::Plain,
                Encoding::Rle,
                Encoding::Ts2Diff,
                Encoding::Gorilla,
                Encoding::GorillaV1,
            ],
            Self::Text => &[Encoding::Plain, Encoding::Dictionary],
        }
    }

    #[must_use]
    pub fn supports(self, encoding: Encoding) -> bool {
        self.supported_encodings().contains(&encoding)
    }
}

/// Column encoding of a timeseries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Encoding {
    #[display("PLAIN")]
    Plain,
    #[display("DICTIONARY")]
    Dictionary,
    #[display("RLE")]
    Rle,
    #[display("DIFF")]
    Diff,
    #[display("TS_2DIFF")]
    Ts2Diff,
    #[display("BITMAP")]
    Bitmap,
    #[display("GORILLA_V1")]
    GorillaV1,
    #[display("REGULAR")]
    Regular,
    #[display("GORILLA")]
    Gorilla,
    #[display("ZIGZAG")]
    Zigzag,
}

/// Page compressor of a timeseries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Compression {
    #[display("UNCOMPRESSED")]
    Uncompressed,
    #[display("SNAPPY")]
    Snappy,
    #[display("GZIP")]
    Gzip,
    #[display("LZO")]
    Lzo,
    #[display("SDT")]
    Sdt,
    #[display("PAA")]
    Paa,
    #[display("PLA")]
    Pla,
    #[display("LZ4")]
    Lz4,
    #[display("ZSTD")]
    Zstd,
}

/// Error for an unrecognised data type, encoding or compressor name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! impl_from_str {
    ($ty:ty, $kind:literal, [$($variant:ident),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let upper = s.to_ascii_uppercase();
                $(
                    if upper == <$ty>::$variant.to_string() {
                        return Ok(<$ty>::$variant);
                    }
                )+
                Err(UnknownVariant {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

impl_from_str!(DataType, "data type", [Boolean, Int32, Int64, Float, Double, Text]);
impl_from_str!(
    Encoding,
    "encoding",
    [Plain, Dictionary, Rle, Diff, Ts2Diff, Bitmap, GorillaV1, Regular, Gorilla, Zigzag]
);
impl_from_str!(
    Compression,
    "compression",
    [Uncompressed, Snappy, Gzip, Lzo, Sdt, Paa, Pla, Lz4, Zstd]
);

/// Free-form key/value map used for tags and properties
pub type StringMap = BTreeMap<String, String>;

/// Schema of a single measurement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSchema {
    /// Measurement name (the leaf segment)
    pub name: String,
    pub data_type: DataType,
    pub encoding: Encoding,
    pub compression: Compression,
    /// Optional encoder properties
    pub props: Option<StringMap>,
}

impl MeasurementSchema {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        encoding: Encoding,
        compression: Compression,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            encoding,
            compression,
            props: None,
        }
    }

    #[must_use]
    pub fn with_props(mut self, props: Option<StringMap>) -> Self {
        self.props = props;
        self
    }

    /// Rough in-memory footprint in bytes
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        32 + self.name.len() + self.props.as_ref().map_or(0, estimate_map_size)
    }
}

/// Rough in-memory footprint of a string map
#[must_use]
pub fn estimate_map_size(map: &StringMap) -> usize {
    map.iter().map(|(k, v)| 48 + k.len() + v.len()).sum()
}

/// A single observed value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TsValue {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl TsValue {
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Text(_) => DataType::Text,
        }
    }
}

/// Timestamped value, used as the "last value" of a timeseries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeValuePair {
    pub timestamp: i64,
    pub value: TsValue,
}

impl TimeValuePair {
    #[must_use]
    pub const fn new(timestamp: i64, value: TsValue) -> Self {
        Self { timestamp, value }
    }
}
