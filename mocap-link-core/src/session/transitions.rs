use crate::models::events::EventClass;
use crate::models::state::SessionState;

/// Work the session must do in response to a server event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Resolve the layout, open the outlet, start the consumer and emitters.
    BeginStream,
    /// Drain the pipeline, stop the emitters and persist.
    EndStream,
}

impl Transition {
    pub fn target(&self) -> SessionState {
        match self {
            Self::BeginStream => SessionState::Streaming,
            Self::EndStream => SessionState::Waiting,
        }
    }
}

/// Decide what a server event means in the current state.
///
/// Only `waiting → streaming` and `streaming → waiting` are event driven;
/// everything else is ignored. Shutdown and errors are handled outside this table.
pub fn next_transition(state: SessionState, class: EventClass) -> Option<Transition> {
    match (state, class) {
        (SessionState::Waiting, EventClass::StreamBegan) => Some(Transition::BeginStream),
        (SessionState::Streaming, EventClass::StreamEnded) => Some(Transition::EndStream),
        _ => None,
    }
}
