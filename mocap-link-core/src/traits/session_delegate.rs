use crate::models::error::SessionError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;

/// Observer for everything a session makes visible to its owner.
///
/// Called from the task driving the session, never from the periodic
/// emitter thread. Implementations should marshal to a UI thread if needed.
pub trait SessionDelegate: Send + Sync {
    /// Called on every state transition.
    fn on_state_changed(&self, state: SessionState);

    /// Called once per failure episode. Use `SessionError::user_message` for display.
    fn on_error(&self, error: &SessionError);

    /// Advisory messages that never block completion (e.g. excessive data loss).
    fn on_warning(&self, message: &str);

    /// Called after buffered samples were written to durable records.
    fn on_recording_finished(&self, result: &RecordingResult);
}
