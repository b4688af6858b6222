use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::device::constants::DEFAULT_SPEED;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
}

/// A point-in-time telemetry reading as returned by `get_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(rename = "dist")]
    pub distance: f64,
    #[serde(rename = "time", deserialize_with = "deserialize_count")]
    pub elapsed_time: u32,
    pub speed: f64,
    #[serde(rename = "state")]
    pub state_code: i64,
    #[serde(deserialize_with = "deserialize_count")]
    pub steps: u32,
}

// the bridge may send whole numbers as floats, e.g. `120.0`
fn deserialize_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;

    if value.fract() == 0.0 && value >= 0.0 && value <= f64::from(u32::MAX) {
        Ok(value as u32)
    } else {
        Err(D::Error::custom(format!("expected a non-negative whole number, got {}", value)))
    }
}

impl StatsSnapshot {
    // every field is required, a partial reading is rejected instead of merged
    pub fn from_result(result: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(result).map_err(|source| ProtocolError::InvalidStats { source })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub running: bool,
    pub link_established: bool,
    pub current_speed: u8, // [0, 60]
    pub stats: Option<StatsSnapshot>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            running: false,
            link_established: false,
            current_speed: DEFAULT_SPEED,
            stats: None,
            started_at: None,
        }
    }
}
