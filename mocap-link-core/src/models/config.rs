use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SessionError;

/// Default capture server RT port.
pub const DEFAULT_PORT: u16 = 22223;

/// Default RT protocol version requested on connect.
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.19";

/// Default number of samples the outlet keeps before dropping the oldest.
pub const DEFAULT_OUTLET_CAPACITY: usize = 180;

/// Initial orientation of the tracked body, in degrees.
///
/// Only these five orientations exist; each selects a distinct start code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum StartingAngle {
    Minus90,
    Minus45,
    Zero,
    Plus45,
    Plus90,
}

impl StartingAngle {
    pub const ALL: [StartingAngle; 5] = [
        Self::Minus90,
        Self::Minus45,
        Self::Zero,
        Self::Plus45,
        Self::Plus90,
    ];

    pub fn degrees(&self) -> i32 {
        match self {
            Self::Minus90 => -90,
            Self::Minus45 => -45,
            Self::Zero => 0,
            Self::Plus45 => 45,
            Self::Plus90 => 90,
        }
    }

    /// Trigger code pushed once when streaming begins.
    pub fn start_code(&self) -> i64 {
        match self {
            Self::Minus90 => 100,
            Self::Minus45 => 200,
            Self::Zero => 300,
            Self::Plus45 => 400,
            Self::Plus90 => 500,
        }
    }

    /// Trigger code pushed when the session ends while streaming.
    pub fn end_code(&self) -> i64 {
        self.start_code() + 1
    }
}

impl Default for StartingAngle {
    fn default() -> Self {
        Self::Zero
    }
}

impl TryFrom<i32> for StartingAngle {
    type Error = SessionError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|angle| angle.degrees() == degrees)
            .ok_or_else(|| {
                SessionError::InvalidConfiguration(format!(
                    "unsupported starting angle: {} (expected one of -90, -45, 0, 45, 90)",
                    degrees
                ))
            })
    }
}

impl From<StartingAngle> for i32 {
    fn from(angle: StartingAngle) -> Self {
        angle.degrees()
    }
}

impl FromStr for StartingAngle {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let degrees: i32 = s.trim().parse().map_err(|_| {
            SessionError::InvalidConfiguration(format!("'{}' is not an angle in degrees", s))
        })?;
        Self::try_from(degrees)
    }
}

impl std::fmt::Display for StartingAngle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

/// Configuration for a recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfiguration {
    /// Capture server host name or address.
    pub host: String,

    /// Capture server RT port (default: 22223).
    pub port: u16,

    /// RT protocol version requested on connect (default: "1.19").
    pub protocol_version: String,

    /// Initial orientation of the tracked body.
    pub starting_angle: StartingAngle,

    /// Bodies whose name contains this pattern drive angle-crossing triggers.
    pub tracked_body: String,

    /// Name advertised in the outlet descriptor.
    pub stream_name: String,

    /// Outlet buffer capacity in samples (default: 180).
    pub outlet_capacity: usize,

    /// Interval between heartbeat triggers in milliseconds (default: 1000).
    pub heartbeat_interval_ms: u64,

    /// Push every accepted frame to the outlet alongside trigger codes.
    pub republish_frames: bool,
}

impl SessionConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".into());
        }
        if self.port == 0 {
            return Err("port must be in 1..=65535".into());
        }
        if self.outlet_capacity == 0 {
            return Err("outlet capacity must be positive".into());
        }
        if self.heartbeat_interval_ms == 0 {
            return Err("heartbeat interval must be positive".into());
        }
        if self.tracked_body.is_empty() {
            return Err("tracked body pattern must not be empty".into());
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Outlet source identifier, unique per capture server.
    pub fn source_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            protocol_version: DEFAULT_PROTOCOL_VERSION.into(),
            starting_angle: StartingAngle::Zero,
            tracked_body: "skate".into(),
            stream_name: "Mocap".into(),
            outlet_capacity: DEFAULT_OUTLET_CAPACITY,
            heartbeat_interval_ms: 1000,
            republish_frames: true,
        }
    }
}
