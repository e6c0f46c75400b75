//! Simulated capture server
//!
//! Stands in for a real-time capture server so the whole recording chain can
//! run without hardware. Frames are generated on a tokio interval:
//!
//! ```text
//! [interval tick] → build frame n → FrameSender → session pipeline
//!                        │
//!                        ├── stop_after_frames       → CaptureStopped event
//!                        ├── disconnect_after_frames → link loss
//!                        └── corrupt_after_frames    → frames with an extra marker
//! ```
//!
//! Markers circle the origin; every rigid body sweeps its yaw at a constant
//! rate so the angle trigger fires every few frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use mocap_link_core::models::layout::{ParameterCategory, ServerParameters, StreamComponent};
use mocap_link_core::{
    CaptureTransport, EventSender, FrameSender, RawFrame, RigidBodyPose, ServerEvent, SessionError,
};

/// Behaviour of the simulated server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Marker labels reported in the 3D parameters.
    pub markers: Vec<String>,

    /// Rigid body names reported in the 6DOF parameters.
    pub rigid_bodies: Vec<String>,

    /// Frames per second (default: 100).
    pub frame_rate_hz: f64,

    /// Yaw of every rigid body at frame 0, in degrees.
    pub yaw_start_deg: f64,

    /// Yaw sweep rate in degrees per second (default: 45).
    pub yaw_rate_deg_per_sec: f64,

    /// Every n-th frame reports the rigid bodies as lost (NaN).
    pub dropout_every: Option<u64>,

    /// Report a running capture when asked for the server state.
    pub capture_running: bool,

    /// Refuse the connection.
    pub refuse_connection: bool,

    /// Refuse the frame stream request.
    pub fail_stream_request: bool,

    /// Send `CaptureStopped` after this many frames.
    pub stop_after_frames: Option<u64>,

    /// Add an unannounced marker to every frame after this many frames.
    pub corrupt_after_frames: Option<u64>,

    /// Drop the link after this many frames.
    pub disconnect_after_frames: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            markers: vec!["toe".into(), "heel".into()],
            rigid_bodies: vec!["skate".into()],
            frame_rate_hz: 100.0,
            yaw_start_deg: 0.0,
            yaw_rate_deg_per_sec: 45.0,
            dropout_every: None,
            capture_running: true,
            refuse_connection: false,
            fail_stream_request: false,
            stop_after_frames: None,
            corrupt_after_frames: None,
            disconnect_after_frames: None,
        }
    }
}

impl SimulationConfig {
    fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(1.0))
    }

    /// Build frame `n` as the server would deliver it.
    pub fn frame(&self, n: u64) -> RawFrame {
        let t = n as f64 / self.frame_rate_hz.max(1.0);

        let mut markers: Vec<[f64; 3]> = (0..self.markers.len())
            .map(|i| {
                let phase = t + i as f64;
                [100.0 * phase.cos(), 100.0 * phase.sin(), 10.0 * (i + 1) as f64]
            })
            .collect();
        if self.corrupt_after_frames.is_some_and(|after| n >= after) {
            markers.push([0.0; 3]);
        }

        let lost = self
            .dropout_every
            .is_some_and(|every| every > 0 && n % every == every - 1);
        let yaw = wrap_degrees(self.yaw_start_deg + self.yaw_rate_deg_per_sec * t);
        let rigid_bodies = (0..self.rigid_bodies.len())
            .map(|i| {
                if lost {
                    RigidBodyPose::lost()
                } else {
                    RigidBodyPose {
                        position: [500.0 * i as f64, 0.0, 50.0],
                        rotation: [0.0, 0.0, yaw],
                    }
                }
            })
            .collect();

        RawFrame {
            frame_number: n,
            markers,
            rigid_bodies,
        }
    }
}

/// Wrap an angle into `[-180, 180)`.
fn wrap_degrees(degrees: f64) -> f64 {
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}

struct StreamTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// `CaptureTransport` backed by `SimulationConfig` instead of a network server.
pub struct SimulatedTransport {
    config: SimulationConfig,
    events: Option<EventSender>,
    stream: Option<StreamTask>,
    frames_sent: Arc<AtomicU64>,
}

impl SimulatedTransport {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            events: None,
            stream: None,
            frames_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frames delivered by the current (or last) stream.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    fn linked_events(&self) -> Result<&EventSender, SessionError> {
        self.events
            .as_ref()
            .filter(|events| events.is_linked())
            .ok_or_else(|| SessionError::TransportCommand("not connected".into()))
    }

    fn cancel_stream(&mut self) -> Option<JoinHandle<()>> {
        self.stream.take().map(|task| {
            task.cancel.cancel();
            task.handle
        })
    }
}

#[async_trait]
impl CaptureTransport for SimulatedTransport {
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        protocol_version: &str,
        events: EventSender,
    ) -> Result<(), SessionError> {
        if self.config.refuse_connection {
            return Err(SessionError::Connection(format!(
                "simulated server at {}:{} refused the connection",
                host, port
            )));
        }
        log::info!(
            "Simulated capture server at {}:{} (protocol {})",
            host,
            port,
            protocol_version
        );
        self.events = Some(events);
        Ok(())
    }

    async fn get_state(&mut self) -> Result<(), SessionError> {
        let events = self.linked_events()?;
        if self.config.capture_running {
            events.event(ServerEvent::CaptureStarted);
        }
        Ok(())
    }

    async fn get_parameters(
        &mut self,
        categories: &[ParameterCategory],
    ) -> Result<ServerParameters, SessionError> {
        self.linked_events()?;
        let mut params = ServerParameters::default();
        for category in categories {
            match category {
                ParameterCategory::General => params.frequency = Some(self.config.frame_rate_hz),
                ParameterCategory::ThreeD => params.markers = self.config.markers.clone(),
                ParameterCategory::SixD => params.rigid_bodies = self.config.rigid_bodies.clone(),
            }
        }
        Ok(params)
    }

    async fn request_stream(
        &mut self,
        components: &[StreamComponent],
        frames: FrameSender,
    ) -> Result<(), SessionError> {
        let events = self.linked_events()?.clone();
        if self.config.fail_stream_request {
            return Err(SessionError::TransportCommand(
                "stream request refused by simulated server".into(),
            ));
        }
        if let Some(previous) = self.cancel_stream() {
            let _ = previous.await;
        }
        log::debug!("Simulated stream of {:?} started", components);

        let config = self.config.clone();
        let frames_sent = Arc::clone(&self.frames_sent);
        frames_sent.store(0, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.frame_period());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut n: u64 = 0;

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if !frames.send(config.frame(n)) {
                    log::debug!("Simulated stream: consumer gone");
                    break;
                }
                n += 1;
                frames_sent.store(n, Ordering::Relaxed);

                if config.disconnect_after_frames == Some(n) {
                    events.disconnected(Some("simulated link loss".into()));
                    break;
                }
                if config.stop_after_frames == Some(n) {
                    events.event(ServerEvent::CaptureStopped);
                    break;
                }
            }
            log::debug!("Simulated stream ended after {} frame(s)", n);
        });

        self.stream = Some(StreamTask { cancel, handle });
        Ok(())
    }

    async fn stop_stream(&mut self) -> Result<(), SessionError> {
        if let Some(handle) = self.cancel_stream() {
            handle
                .await
                .map_err(|e| SessionError::Internal(format!("simulated stream task failed: {}", e)))?;
        }
        Ok(())
    }

    fn has_transport(&self) -> bool {
        self.events.as_ref().is_some_and(EventSender::is_linked)
    }

    fn disconnect(&mut self) {
        self.cancel_stream();
        self.events = None;
    }
}
