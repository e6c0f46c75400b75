use thiserror::Error;

/// Errors raised inside a recording session.
///
/// None of these escape the session boundary as raw failures: the session
/// converts each one into a state transition plus a single error notification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The capture server has no markers or rigid bodies configured.
    #[error("missing capture data: {markers} marker(s), {bodies} rigid bod(y/ies)")]
    Configuration { markers: usize, bodies: usize },

    #[error("{0}")]
    Connection(String),

    #[error("capture server rejected command: {0}")]
    TransportCommand(String),

    #[error("disconnected from capture server")]
    Disconnected,

    #[error("sample length {sample_len} != channel count {channel_count}")]
    Integrity {
        sample_len: usize,
        channel_count: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Message suitable for showing to the operator.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration { .. } => {
                "No 3D or 6DOF data available from the capture server".to_string()
            }
            Self::Connection(msg) => msg.clone(),
            Self::TransportCommand(msg) => format!("Capture server error: {}", msg),
            Self::Disconnected => "Disconnected from the capture server".to_string(),
            Self::Integrity { .. } => {
                "Stream canceled: capture stream data inconsistent with outlet metadata".to_string()
            }
            Self::InvalidConfiguration(msg) => format!("Invalid configuration: {}", msg),
            Self::InvalidState(msg) => format!("Invalid request: {}", msg),
            Self::Storage(msg) => format!("Failed to save the recording: {}", msg),
            Self::Internal(_) => {
                "An internal error occurred. See log messages for details.".to_string()
            }
        }
    }
}
