/// Event notifications sent by the capture server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Connected,
    ConnectionClosed,
    CaptureStarted,
    CaptureStopped,
    CaptureSaved,
    CalibrationStarted,
    CalibrationStopped,
    RtFromFileStarted,
    RtFromFileStopped,
    WaitingForTrigger,
    CameraSettingsChanged,
    ShuttingDown,
}

/// Coarse classification of server events that drives the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    StreamBegan,
    StreamEnded,
    Other,
}

impl ServerEvent {
    pub fn class(&self) -> EventClass {
        match self {
            Self::Connected
            | Self::CaptureStarted
            | Self::CalibrationStarted
            | Self::RtFromFileStarted => EventClass::StreamBegan,
            Self::ConnectionClosed
            | Self::CaptureStopped
            | Self::CalibrationStopped
            | Self::RtFromFileStopped => EventClass::StreamEnded,
            Self::CaptureSaved
            | Self::WaitingForTrigger
            | Self::CameraSettingsChanged
            | Self::ShuttingDown => EventClass::Other,
        }
    }
}

/// Everything the transport reports back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Server(ServerEvent),
    Disconnected { reason: Option<String> },
}
