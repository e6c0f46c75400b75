use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use mocap_link_core::{RecordingResult, SessionDelegate, SessionError, SessionHandle, SessionState};

/// SessionDelegate that reports to the terminal.
///
/// Asks the session to shut down once the first stream has ended, since
/// the command records a single trial.
pub struct ConsoleDelegate {
    handle: SessionHandle,
    streamed: AtomicBool,
    errors: AtomicUsize,
}

impl ConsoleDelegate {
    pub fn new(handle: SessionHandle) -> Arc<Self> {
        Arc::new(Self {
            handle,
            streamed: AtomicBool::new(false),
            errors: AtomicUsize::new(0),
        })
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

impl SessionDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: SessionState) {
        println!("state: {}", state);
        match state {
            SessionState::Streaming => self.streamed.store(true, Ordering::Relaxed),
            SessionState::Waiting if self.streamed.load(Ordering::Relaxed) => {
                self.handle.request_shutdown(None);
            }
            _ => {}
        }
    }

    fn on_error(&self, error: &SessionError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        eprintln!("error: {}", error.user_message());
    }

    fn on_warning(&self, message: &str) {
        eprintln!("warning: {}", message);
    }

    fn on_recording_finished(&self, result: &RecordingResult) {
        match serde_json::to_string_pretty(&result.metadata) {
            Ok(json) => println!("{}", json),
            Err(e) => log::warn!("Failed to render recording summary: {}", e),
        }
        println!("metadata: {}", result.metadata_path.display());
    }
}
