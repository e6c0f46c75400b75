use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::models::config::StartingAngle;
use crate::models::error::SessionError;
use crate::models::layout::RIGID_BODY_WIDTH;
use crate::models::trigger::{TriggerCode, ANGLE_STEP_DEGREES};
use crate::processing::publisher::BroadcastPublisher;

/// Emits a trigger each time the tracked body's yaw crosses a new 10 degree step.
///
/// Runs inline on the pipeline consumer. Samples that are short or carry a
/// non-finite yaw are ignored.
#[derive(Debug, Clone)]
pub struct AngleTrigger {
    starting_angle: i64,
    last_emitted: Option<i64>,
}

impl AngleTrigger {
    pub fn new(starting_angle: StartingAngle) -> Self {
        Self {
            starting_angle: i64::from(starting_angle.degrees()),
            last_emitted: None,
        }
    }

    /// Returns the normalized yaw to emit, if this sample crosses a new step.
    pub fn check(&mut self, sample: &[f64]) -> Option<i64> {
        if sample.len() != RIGID_BODY_WIDTH {
            return None;
        }
        let yaw = sample[RIGID_BODY_WIDTH - 1];
        if !yaw.is_finite() {
            return None;
        }
        let normalized = (yaw.round_ties_even() as i64).checked_sub(self.starting_angle)?;
        if normalized % ANGLE_STEP_DEGREES != 0 || self.last_emitted == Some(normalized) {
            return None;
        }
        self.last_emitted = Some(normalized);
        Some(normalized)
    }

    pub fn last_emitted(&self) -> Option<i64> {
        self.last_emitted
    }
}

/// Pushes the start code once, then a heartbeat from a background thread every interval.
///
/// The start code goes out before `start` returns, so it always precedes any
/// angle trigger or heartbeat. The thread stops when asked to, when the link
/// token is cancelled, or when the publisher closes. Dropping the emitter
/// signals the thread but does not join it.
pub struct PeriodicEmitter {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PeriodicEmitter {
    pub fn start(
        publisher: Arc<BroadcastPublisher>,
        link: CancellationToken,
        starting_angle: StartingAngle,
        interval: Duration,
    ) -> Result<Self, SessionError> {
        let start = TriggerCode::SessionStart(starting_angle);
        if publisher.push_trigger(start) {
            log::debug!("Pushed start code {}", start.value());
        } else {
            log::warn!("Outlet not open, start code {} not delivered", start.value());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("periodic-triggers".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                if link.is_cancelled() || !publisher.push_trigger(TriggerCode::Heartbeat) {
                    log::debug!("Periodic emitter: outlet or link unavailable");
                    break;
                }
            })
            .map_err(|e| {
                SessionError::Internal(format!("failed to spawn periodic emitter: {}", e))
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Wake the thread and tell it to exit. Returns the handle to join.
    pub fn stop(&mut self) -> Option<thread::JoinHandle<()>> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.handle.take()
    }
}

impl Drop for PeriodicEmitter {
    fn drop(&mut self) {
        self.stop_tx.take();
    }
}
