//! Tagged measurements as they travel from runners to the server
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Informational classification forwarded to the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    /// A sample in a time series
    #[default]
    Point,
    /// A snapshot of host state
    Info,
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementKind::Point => f.write_str("point"),
            MeasurementKind::Info => f.write_str("info"),
        }
    }
}

/// One immutable, timestamped, serialized data point.
///
/// The payload is encoded to JSON text when the measurement is captured, so
/// the queue only ever holds self-contained records. On the wire the fields
/// are named `name`, `stamp`, `point` and `type`. Stamps carry microsecond
/// precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    name: String,
    #[serde(rename = "stamp", with = "stamp")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "point")]
    payload: String,
    #[serde(rename = "type")]
    kind: MeasurementKind,
}

impl Measurement {
    /// Capture `value` produced by collector `name` right now
    pub fn capture<T: Serialize + ?Sized>(
        name: &str,
        kind: MeasurementKind,
        value: &T,
    ) -> Result<Self> {
        Self::capture_at(name, kind, Utc::now(), value)
    }

    /// Capture `value` with an explicit timestamp
    pub fn capture_at<T: Serialize + ?Sized>(
        name: &str,
        kind: MeasurementKind,
        timestamp: DateTime<Utc>,
        value: &T,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            timestamp: timestamp.trunc_subsecs(6),
            payload: serde_json::to_string(value)?,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The JSON-encoded payload
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Decode the payload back into a structured value
    pub fn decode_payload(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// RFC 3339 in UTC with exactly six fractional digits
mod stamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(stamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&stamp.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|stamp| stamp.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}

/// Encode a drained batch as the JSON array the server expects
pub fn encode_batch(batch: &[Measurement]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(batch)?)
}
