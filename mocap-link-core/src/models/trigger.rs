use serde::{Deserialize, Serialize};

use super::config::StartingAngle;

/// Code pushed on every heartbeat tick after the start code.
pub const HEARTBEAT_CODE: i64 = 1;

/// Angle crossings are reported in steps of this many degrees.
pub const ANGLE_STEP_DEGREES: i64 = 10;

/// Event markers multiplexed onto the outlet next to frame samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCode {
    SessionStart(StartingAngle),
    Heartbeat,
    /// Normalized yaw (signed multiple of 10 degrees).
    AngleCrossed(i64),
    SessionEnd(StartingAngle),
}

impl TriggerCode {
    pub fn value(&self) -> i64 {
        match self {
            Self::SessionStart(angle) => angle.start_code(),
            Self::Heartbeat => HEARTBEAT_CODE,
            Self::AngleCrossed(yaw) => *yaw,
            Self::SessionEnd(angle) => angle.end_code(),
        }
    }
}

/// Payload of one outlet sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum OutletPayload {
    Frame(Vec<f64>),
    Trigger(i64),
}

/// One time-stamped outlet sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletSample {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub payload: OutletPayload,
}

impl OutletSample {
    pub fn now(payload: OutletPayload) -> Self {
        let now = chrono::Utc::now();
        Self {
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
            payload,
        }
    }

    pub fn trigger_value(&self) -> Option<i64> {
        match self.payload {
            OutletPayload::Trigger(code) => Some(code),
            OutletPayload::Frame(_) => None,
        }
    }
}

/// Identity of an outlet, announced to downstream consumers on open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletDescriptor {
    pub name: String,
    pub source_id: String,
    pub session_id: String,
    pub channel_labels: Vec<String>,
    pub nominal_rate: Option<f64>,
}
