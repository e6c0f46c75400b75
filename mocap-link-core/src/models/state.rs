use serde::Serialize;

/// Recording session state machine.
///
/// State transitions:
/// ```text
/// initial → waiting ⇄ streaming
///    ↓         ↓          ↓
///    └──────→ stopped ←───┘
/// ```
///
/// `Initial` and `Stopped` both count as inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Initial,
    Waiting,
    Streaming,
    Stopped,
}

impl SessionState {
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Whether the session is idle (never connected, or shut down).
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Initial | Self::Stopped)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Waiting => "waiting",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
