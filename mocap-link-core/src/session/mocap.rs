use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::config::SessionConfiguration;
use crate::models::error::SessionError;
use crate::models::events::TransportEvent;
use crate::models::layout::{ParameterCategory, StreamComponent};
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;
use crate::models::trigger::{OutletDescriptor, TriggerCode};
use crate::processing::layout_resolver::resolve_layout;
use crate::processing::pipeline::{PacketPipeline, PacketQueue, PipelineContext};
use crate::processing::publisher::BroadcastPublisher;
use crate::processing::triggers::{AngleTrigger, PeriodicEmitter};
use crate::session::transitions::{next_transition, Transition};
use crate::storage::record_writer::{self, RecordingInfo};
use crate::traits::capture_transport::{CaptureTransport, EventSender};
use crate::traits::outlet_sink::OutletSink;
use crate::traits::session_delegate::SessionDelegate;

/// Requests an owner can send to a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// End the current stream and go back to waiting.
    Stop { destination: Option<PathBuf> },
    /// End everything. The session cannot be reused afterwards.
    Shutdown { destination: Option<PathBuf> },
}

/// Cloneable handle for steering a session that is inside `run()`.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Returns `false` if the session is gone.
    pub fn request_stop(&self, destination: Option<PathBuf>) -> bool {
        self.tx.send(SessionCommand::Stop { destination }).is_ok()
    }

    pub fn request_shutdown(&self, destination: Option<PathBuf>) -> bool {
        self.tx.send(SessionCommand::Shutdown { destination }).is_ok()
    }
}

/// Everything that exists only while streaming.
struct ActiveStream {
    pipeline: PacketPipeline,
    emitter: PeriodicEmitter,
    sequence: u32,
}

enum Wakeup {
    Command(SessionCommand),
    Fault(SessionError),
    Event(TransportEvent),
}

/// Motion capture recording session.
///
/// Generic over the capture server client via `CaptureTransport`. Owns the
/// outlet publisher for its whole life and one pipeline plus one periodic
/// emitter per stream:
/// ```text
/// [CaptureTransport] → FrameSender → [PacketPipeline] ─┬→ SampleBuffer → record_writer
///        │                                              ├→ BroadcastPublisher → OutletSink
///        └→ EventSender → run() ⇄ next_transition       └→ AngleTrigger ─┘
///                                  [PeriodicEmitter] ─────────────────────┘
/// ```
///
/// Failures never escape as raw errors: each one becomes a single
/// `SessionDelegate::on_error` call followed by shutdown. Public methods only
/// return `Err` when called in a state where they make no sense.
pub struct MocapSession<T: CaptureTransport> {
    transport: T,
    config: SessionConfiguration,
    publisher: Arc<BroadcastPublisher>,
    delegate: Option<Arc<dyn SessionDelegate>>,
    state: SessionState,
    session_id: String,

    /// Default prefix for stops the owner did not ask for (server events, failures).
    destination: Option<PathBuf>,

    // Tripped by the transport on connection loss, and by shutdown.
    link: CancellationToken,
    packet_count: Arc<AtomicU64>,

    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    faults_tx: mpsc::UnboundedSender<SessionError>,
    faults_rx: mpsc::UnboundedReceiver<SessionError>,
    commands_tx: mpsc::UnboundedSender<SessionCommand>,
    commands_rx: mpsc::UnboundedReceiver<SessionCommand>,

    stream: Option<ActiveStream>,
    stream_count: u32,
    stream_started: Option<Instant>,
    stream_stopped: Option<Instant>,
}

impl<T: CaptureTransport> MocapSession<T> {
    pub fn new(transport: T, sink: Box<dyn OutletSink>, config: SessionConfiguration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            publisher: Arc::new(BroadcastPublisher::new(sink, config.outlet_capacity)),
            config,
            delegate: None,
            state: SessionState::Initial,
            session_id: uuid::Uuid::new_v4().to_string(),
            destination: None,
            link: CancellationToken::new(),
            packet_count: Arc::new(AtomicU64::new(0)),
            events_tx,
            events_rx,
            faults_tx,
            faults_rx,
            commands_tx,
            commands_rx,
            stream: None,
            stream_count: 0,
            stream_started: None,
            stream_stopped: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Where to persist when a stream ends without an explicit destination.
    pub fn set_destination(&mut self, destination: Option<PathBuf>) {
        self.destination = destination;
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.commands_tx.clone(),
        }
    }

    pub fn config(&self) -> &SessionConfiguration {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }

    pub fn is_waiting(&self) -> bool {
        self.state.is_waiting()
    }

    /// Idle: either never connected or already shut down.
    pub fn is_stopped(&self) -> bool {
        self.state.is_inactive()
    }

    /// Frames accepted since the current (or last) stream started.
    pub fn packet_count(&self) -> u64 {
        self.packet_count.load(Ordering::Relaxed)
    }

    /// Time since the current stream started, zero if none has.
    pub fn elapsed(&self) -> Duration {
        self.stream_started
            .map_or(Duration::ZERO, |started| started.elapsed())
    }

    /// Length of the last completed stream, zero if no stream has stopped.
    pub fn final_duration(&self) -> Duration {
        match (self.stream_started, self.stream_stopped) {
            (Some(started), Some(stopped)) if stopped >= started => stopped - started,
            _ => Duration::ZERO,
        }
    }

    /// Connect to the capture server. Transitions: initial → waiting.
    ///
    /// Asks the server for its state afterwards, so a capture that is already
    /// running produces a start event right away. A failed connection is
    /// reported to the delegate and ends in stopped.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Initial {
            return Err(SessionError::InvalidState(format!(
                "cannot connect from {} state",
                self.state
            )));
        }

        if let Err(msg) = self.config.validate() {
            self.fail(SessionError::InvalidConfiguration(msg)).await;
            return Ok(());
        }

        let events = EventSender::new(self.events_tx.clone(), self.link.clone());
        let result = self
            .transport
            .connect(
                &self.config.host,
                self.config.port,
                &self.config.protocol_version,
                events,
            )
            .await;

        if let Err(e) = result {
            log::error!("Connection failed: {}", e);
            let error = SessionError::Connection(format!(
                "Failed to connect to the capture server on '{}:{}' with protocol version '{}'. Please try again.",
                self.config.host, self.config.port, self.config.protocol_version
            ));
            self.fail(error).await;
            return Ok(());
        }

        log::info!(
            "Connected to capture server at {}:{}",
            self.config.host,
            self.config.port
        );
        self.set_state(SessionState::Waiting);

        if let Err(e) = self.transport.get_state().await {
            log::warn!("Could not query capture server state: {}", e);
        }
        Ok(())
    }

    /// React to one transport event.
    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Server(server_event) => {
                log::debug!("Capture server event: {:?}", server_event);
                match next_transition(self.state, server_event.class()) {
                    Some(Transition::BeginStream) => {
                        if let Err(e) = self.start_stream().await {
                            log::debug!("Stream start ignored: {}", e);
                        }
                    }
                    Some(Transition::EndStream) => {
                        let destination = self.destination.clone();
                        if let Err(e) = self.stop_stream(destination).await {
                            log::debug!("Stream stop ignored: {}", e);
                        }
                    }
                    None => {}
                }
            }
            TransportEvent::Disconnected { reason } => {
                if self.state.is_inactive() {
                    return;
                }
                log::warn!(
                    "Capture server connection lost: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.fail(SessionError::Disconnected).await;
            }
        }
    }

    /// Bring up a stream. Transitions: waiting → streaming.
    ///
    /// Resolves the layout, opens the outlet and asks the server for frames.
    /// Only once the server accepts does the periodic emitter start and the
    /// session enter streaming. Any failure here shuts the session down from
    /// waiting; bring-up is not retried.
    pub async fn start_stream(&mut self) -> Result<(), SessionError> {
        if !self.state.is_waiting() {
            return Err(SessionError::InvalidState(format!(
                "cannot start streaming from {} state",
                self.state
            )));
        }

        let params = match self.transport.get_parameters(&ParameterCategory::ALL).await {
            Ok(params) => params,
            Err(e) => {
                self.fail(e).await;
                return Ok(());
            }
        };

        let layout = match resolve_layout(&params) {
            Ok(layout) => Arc::new(layout),
            Err(e) => {
                self.fail(e).await;
                return Ok(());
            }
        };

        let descriptor = OutletDescriptor {
            name: self.config.stream_name.clone(),
            source_id: self.config.source_id(),
            session_id: self.session_id.clone(),
            channel_labels: layout.channel_labels(),
            nominal_rate: params.frequency,
        };
        if let Err(e) = self.publisher.open(&descriptor) {
            self.fail(e).await;
            return Ok(());
        }

        // Frames queue up until the start code is out and the consumer runs.
        let queue = PacketQueue::new();
        if let Err(e) = self
            .transport
            .request_stream(&StreamComponent::ALL, queue.frame_sender())
            .await
        {
            self.fail(e).await;
            return Ok(());
        }

        let emitter = match PeriodicEmitter::start(
            Arc::clone(&self.publisher),
            self.link.clone(),
            self.config.starting_angle,
            self.config.heartbeat_interval(),
        ) {
            Ok(emitter) => emitter,
            Err(e) => {
                if let Err(stop) = self.transport.stop_stream().await {
                    log::warn!("Failed to stop capture stream: {}", stop);
                }
                self.fail(e).await;
                return Ok(());
            }
        };

        self.packet_count.store(0, Ordering::Relaxed);
        let pipeline = queue.spawn(PipelineContext {
            layout: Arc::clone(&layout),
            publisher: Arc::clone(&self.publisher),
            angle_trigger: AngleTrigger::new(self.config.starting_angle),
            tracked_body: self.config.tracked_body.clone(),
            packet_count: Arc::clone(&self.packet_count),
            republish_frames: self.config.republish_frames,
            faults: self.faults_tx.clone(),
            link: self.link.clone(),
        });

        self.stream_count += 1;
        self.stream = Some(ActiveStream {
            pipeline,
            emitter,
            sequence: self.stream_count,
        });
        self.stream_started = Some(Instant::now());
        self.stream_stopped = None;
        self.set_state(Transition::BeginStream.target());

        log::info!(
            "Streaming {} channel(s) from {} bod(y/ies)",
            layout.channel_count(),
            layout.groups().len()
        );
        Ok(())
    }

    /// End the current stream. Transitions: streaming → waiting.
    ///
    /// With a destination, buffered samples are written under that prefix and
    /// the result is returned as well as passed to the delegate.
    pub async fn stop_stream(
        &mut self,
        destination: Option<PathBuf>,
    ) -> Result<Option<RecordingResult>, SessionError> {
        if !self.state.is_streaming() {
            return Err(SessionError::InvalidState(format!(
                "cannot stop streaming from {} state",
                self.state
            )));
        }

        let result = self.teardown(destination, false).await;
        self.set_state(Transition::EndStream.target());
        Ok(result)
    }

    /// Stop everything and release the transport. Transitions: any → stopped.
    ///
    /// `error`, if given, is reported to the delegate first. Calling this on a
    /// stopped session does nothing.
    pub async fn shutdown(&mut self, destination: Option<PathBuf>, error: Option<SessionError>) {
        if self.state == SessionState::Stopped {
            if let Some(e) = error {
                log::debug!("Ignoring error after shutdown: {}", e);
            }
            return;
        }

        if let Some(e) = &error {
            self.notify_error(e);
        }

        let ending = self.state.is_streaming();
        if self.stream.is_some() {
            self.teardown(destination, ending).await;
        } else {
            self.publisher.close();
        }

        self.transport.disconnect();
        self.link.cancel();
        self.set_state(SessionState::Stopped);
        log::info!("Session stopped");
    }

    /// Drive the session until it stops.
    ///
    /// Handles, in priority order: owner commands, pipeline faults, then
    /// transport events.
    pub async fn run(&mut self) {
        while self.state != SessionState::Stopped {
            let wakeup = tokio::select! {
                biased;

                Some(command) = self.commands_rx.recv() => Wakeup::Command(command),
                Some(fault) = self.faults_rx.recv() => Wakeup::Fault(fault),
                Some(event) = self.events_rx.recv() => Wakeup::Event(event),
                else => break,
            };

            match wakeup {
                Wakeup::Command(SessionCommand::Stop { destination }) => {
                    if let Err(e) = self.stop_stream(destination).await {
                        log::debug!("Stop request ignored: {}", e);
                    }
                }
                Wakeup::Command(SessionCommand::Shutdown { destination }) => {
                    self.shutdown(destination, None).await;
                }
                Wakeup::Fault(error) => {
                    let destination = self.destination.clone();
                    self.shutdown(destination, Some(error)).await;
                }
                Wakeup::Event(event) => self.handle_event(event).await,
            }
        }
    }

    // --- Internal helpers ---

    async fn fail(&mut self, error: SessionError) {
        let destination = self.destination.clone();
        self.shutdown(destination, Some(error)).await;
    }

    /// Tear the active stream down in order: server stream, consumer,
    /// periodic emitter, end code, outlet, then persistence.
    async fn teardown(
        &mut self,
        destination: Option<PathBuf>,
        ending: bool,
    ) -> Option<RecordingResult> {
        let stream = self.stream.take()?;
        let ActiveStream {
            pipeline,
            mut emitter,
            sequence,
        } = stream;

        if self.transport.has_transport() {
            let link = self.link.clone();
            tokio::select! {
                biased;

                _ = link.cancelled() => log::debug!("Skipping stream stop: link lost"),
                result = self.transport.stop_stream() => {
                    if let Err(e) = result {
                        log::warn!("Failed to stop capture stream: {}", e);
                    }
                }
            }
        }

        let buffer = match pipeline.finish().await {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                log::error!("Lost buffered samples: {}", e);
                None
            }
        };

        if let Some(handle) = emitter.stop() {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => log::error!("Periodic emitter panicked"),
                Err(e) => log::error!("Failed to join periodic emitter: {}", e),
            }
        }

        if ending {
            self.publisher
                .push_trigger(TriggerCode::SessionEnd(self.config.starting_angle));
        }
        self.publisher.close();
        self.stream_stopped = Some(Instant::now());

        let stats = self.publisher.stats();
        log::debug!(
            "Stream {} ended: {} packet(s), {} outlet sample(s) dropped",
            sequence,
            self.packet_count(),
            stats.dropped
        );

        match (destination, buffer) {
            (Some(destination), Some(buffer)) => {
                let prefix = stream_prefix(&destination, sequence);
                let info = RecordingInfo {
                    source_id: self.config.source_id(),
                    starting_angle: self.config.starting_angle,
                    packet_count: self.packet_count(),
                    duration_secs: self.final_duration().as_secs_f64(),
                };
                let written = tokio::task::spawn_blocking(move || {
                    record_writer::write_recording(&prefix, buffer, &info)
                })
                .await
                .unwrap_or_else(|e| Err(SessionError::Internal(format!("writer task failed: {}", e))));
                self.finish_recording(written)
            }
            _ => None,
        }
    }

    fn finish_recording(
        &self,
        written: Result<RecordingResult, SessionError>,
    ) -> Option<RecordingResult> {
        match written {
            Ok(result) => {
                if let Some(ref delegate) = self.delegate {
                    for warning in &result.warnings {
                        delegate.on_warning(warning);
                    }
                    delegate.on_recording_finished(&result);
                }
                Some(result)
            }
            Err(e) => {
                self.notify_error(&e);
                None
            }
        }
    }

    fn set_state(&mut self, new_state: SessionState) {
        if self.state == new_state {
            return;
        }
        log::debug!("Session state {} → {}", self.state, new_state);
        self.state = new_state;
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(new_state);
        }
    }

    fn notify_error(&self, error: &SessionError) {
        log::error!("{}", error);
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(error);
        }
    }
}

impl<T: CaptureTransport> Drop for MocapSession<T> {
    fn drop(&mut self) {
        self.link.cancel();
    }
}

/// Later streams in the same session get a `_<n>` suffix so they never
/// overwrite the first one's records.
fn stream_prefix(destination: &Path, sequence: u32) -> PathBuf {
    if sequence <= 1 {
        return destination.to_path_buf();
    }
    let mut prefix = OsString::from(destination.as_os_str());
    prefix.push(format!("_{}", sequence));
    PathBuf::from(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::models::config::StartingAngle;
    use crate::models::events::ServerEvent;
    use crate::models::frame::{RawFrame, RigidBodyPose};
    use crate::models::layout::ServerParameters;
    use crate::processing::memory_sink::MemorySink;
    use crate::storage::record_writer::{read_body_record, record_path};
    use crate::traits::capture_transport::FrameSender;

    #[derive(Default)]
    struct MockState {
        params: ServerParameters,
        fail_connect: bool,
        fail_stream: bool,
        connected: bool,
        events: Option<EventSender>,
        frames: Option<FrameSender>,
        stream_requests: usize,
        stop_requests: usize,
        disconnects: usize,
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        state: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        fn with_bodies(markers: &[&str], bodies: &[&str]) -> Self {
            let transport = Self::default();
            transport.state.lock().params = ServerParameters {
                markers: markers.iter().map(|s| s.to_string()).collect(),
                rigid_bodies: bodies.iter().map(|s| s.to_string()).collect(),
                frequency: Some(120.0),
            };
            transport
        }

        fn send_frame(&self, frame: RawFrame) -> bool {
            match &self.state.lock().frames {
                Some(frames) => frames.send(frame),
                None => false,
            }
        }

        fn events(&self) -> EventSender {
            self.state.lock().events.clone().unwrap()
        }
    }

    #[async_trait]
    impl CaptureTransport for MockTransport {
        async fn connect(
            &mut self,
            _host: &str,
            _port: u16,
            _protocol_version: &str,
            events: EventSender,
        ) -> Result<(), SessionError> {
            let mut state = self.state.lock();
            if state.fail_connect {
                return Err(SessionError::Connection("refused".into()));
            }
            state.connected = true;
            state.events = Some(events);
            Ok(())
        }

        async fn get_state(&mut self) -> Result<(), SessionError> {
            Ok(())
        }

        async fn get_parameters(
            &mut self,
            _categories: &[ParameterCategory],
        ) -> Result<ServerParameters, SessionError> {
            Ok(self.state.lock().params.clone())
        }

        async fn request_stream(
            &mut self,
            _components: &[StreamComponent],
            frames: FrameSender,
        ) -> Result<(), SessionError> {
            let mut state = self.state.lock();
            state.stream_requests += 1;
            if state.fail_stream {
                return Err(SessionError::TransportCommand("stream refused".into()));
            }
            state.frames = Some(frames);
            Ok(())
        }

        async fn stop_stream(&mut self) -> Result<(), SessionError> {
            let mut state = self.state.lock();
            state.stop_requests += 1;
            state.frames = None;
            Ok(())
        }

        fn has_transport(&self) -> bool {
            self.state.lock().connected
        }

        fn disconnect(&mut self) {
            let mut state = self.state.lock();
            state.disconnects += 1;
            state.connected = false;
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<SessionState>>,
        errors: Mutex<Vec<SessionError>>,
        warnings: Mutex<Vec<String>>,
        results: Mutex<Vec<RecordingResult>>,
    }

    impl SessionDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: SessionState) {
            self.states.lock().push(state);
        }

        fn on_error(&self, error: &SessionError) {
            self.errors.lock().push(error.clone());
        }

        fn on_warning(&self, message: &str) {
            self.warnings.lock().push(message.to_string());
        }

        fn on_recording_finished(&self, result: &RecordingResult) {
            self.results.lock().push(result.clone());
        }
    }

    struct Fixture {
        session: MocapSession<MockTransport>,
        transport: MockTransport,
        sink: MemorySink,
        delegate: Arc<RecordingDelegate>,
    }

    fn fixture(transport: MockTransport, angle: StartingAngle) -> Fixture {
        let sink = MemorySink::new();
        let config = SessionConfiguration {
            starting_angle: angle,
            heartbeat_interval_ms: 20,
            ..Default::default()
        };
        let mut session = MocapSession::new(transport.clone(), Box::new(sink.clone()), config);
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());
        Fixture {
            session,
            transport,
            sink,
            delegate,
        }
    }

    fn skate_frame(n: u64, yaw: f64) -> RawFrame {
        RawFrame {
            frame_number: n,
            markers: vec![[1.0, 2.0, 3.0]],
            rigid_bodies: vec![RigidBodyPose {
                position: [10.0, 20.0, 30.0],
                rotation: [0.0, 0.0, yaw],
            }],
        }
    }

    async fn streaming(f: &mut Fixture) {
        f.session.connect().await.unwrap();
        f.session
            .handle_event(TransportEvent::Server(ServerEvent::CaptureStarted))
            .await;
        assert!(f.session.is_streaming());
    }

    async fn run_until_stopped(session: &mut MocapSession<MockTransport>) {
        tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session did not stop");
    }

    #[tokio::test]
    async fn connect_then_stream_then_stop() {
        let mut f = fixture(MockTransport::with_bodies(&["toe"], &["skate"]), StartingAngle::Plus45);
        streaming(&mut f).await;

        for (n, yaw) in [45.0, 55.0, 56.0].iter().enumerate() {
            assert!(f.transport.send_frame(skate_frame(n as u64, *yaw)));
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let result = f.session.stop_stream(None).await.unwrap();
        assert!(result.is_none());
        assert!(f.session.is_waiting());
        assert_eq!(f.session.packet_count(), 3);
        assert!(f.session.final_duration() > Duration::ZERO);
        assert_eq!(f.transport.state.lock().stop_requests, 1);

        assert_eq!(
            *f.delegate.states.lock(),
            vec![SessionState::Waiting, SessionState::Streaming, SessionState::Waiting]
        );

        let codes = f.sink.trigger_codes();
        assert_eq!(codes[0], 400);
        assert!(codes.contains(&1));
        assert!(codes.contains(&0) && codes.contains(&10));
        // A plain stop does not end the session, so no end code.
        assert!(!codes.contains(&401));

        let descriptor = f.sink.descriptor().unwrap();
        assert_eq!(descriptor.channel_labels.len(), 9);
        assert_eq!(descriptor.nominal_rate, Some(120.0));
        assert!(f.delegate.errors.lock().is_empty());
    }

    #[tokio::test]
    async fn integrity_error_stops_with_one_error() {
        let mut f = fixture(MockTransport::with_bodies(&["toe"], &["skate"]), StartingAngle::Zero);
        streaming(&mut f).await;

        f.transport.send_frame(skate_frame(1, 0.0));
        let mut bad = skate_frame(2, 0.0);
        bad.markers.push([0.0; 3]);
        f.transport.send_frame(bad);
        f.transport.send_frame(skate_frame(3, 0.0));

        run_until_stopped(&mut f.session).await;

        assert!(f.session.is_stopped());
        assert_eq!(
            *f.delegate.errors.lock(),
            vec![SessionError::Integrity {
                sample_len: 12,
                channel_count: 9
            }]
        );
        assert_eq!(f.session.packet_count(), 1);
        assert_eq!(f.transport.state.lock().disconnects, 1);

        let codes = f.sink.trigger_codes();
        assert_eq!(codes.first(), Some(&300));
        assert_eq!(codes.last(), Some(&301));
        assert_eq!(f.sink.close_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_twice_is_one_transition() {
        let mut f = fixture(MockTransport::with_bodies(&[], &["skate"]), StartingAngle::Zero);
        streaming(&mut f).await;

        f.session.shutdown(None, None).await;
        f.session
            .shutdown(None, Some(SessionError::Disconnected))
            .await;

        let states = f.delegate.states.lock().clone();
        assert_eq!(
            states.iter().filter(|s| **s == SessionState::Stopped).count(),
            1
        );
        assert!(f.delegate.errors.lock().is_empty());
        assert_eq!(f.transport.state.lock().disconnects, 1);
        assert_eq!(f.sink.close_count(), 1);
    }

    #[tokio::test]
    async fn zero_channels_never_starts_stream() {
        let mut f = fixture(MockTransport::with_bodies(&[], &[]), StartingAngle::Zero);
        f.session.connect().await.unwrap();
        f.session
            .handle_event(TransportEvent::Server(ServerEvent::Connected))
            .await;

        assert!(f.session.is_stopped());
        assert_eq!(
            *f.delegate.states.lock(),
            vec![SessionState::Waiting, SessionState::Stopped]
        );
        let errors = f.delegate.errors.lock().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].user_message().contains("No 3D or 6DOF data"));
        assert_eq!(f.transport.state.lock().stream_requests, 0);
        assert!(f.sink.descriptor().is_none());
        assert!(f.sink.trigger_codes().is_empty());
    }

    #[tokio::test]
    async fn refused_stream_request_shuts_down() {
        let transport = MockTransport::with_bodies(&[], &["skate"]);
        transport.state.lock().fail_stream = true;
        let mut f = fixture(transport, StartingAngle::Zero);
        f.session.connect().await.unwrap();
        f.session
            .handle_event(TransportEvent::Server(ServerEvent::CaptureStarted))
            .await;

        assert!(f.session.is_stopped());
        assert_eq!(
            *f.delegate.states.lock(),
            vec![SessionState::Waiting, SessionState::Stopped]
        );
        assert_eq!(
            *f.delegate.errors.lock(),
            vec![SessionError::TransportCommand("stream refused".into())]
        );
        assert!(f.sink.descriptor().is_some());
        assert!(f.sink.trigger_codes().is_empty());
        assert_eq!(f.sink.close_count(), 1);
        assert_eq!(f.transport.state.lock().stop_requests, 0);
        assert_eq!(f.session.final_duration(), Duration::ZERO);
    }

    #[tokio::test]
    async fn fresh_session_is_idle() {
        let mut f = fixture(MockTransport::default(), StartingAngle::Zero);
        assert_eq!(f.session.state(), SessionState::Initial);
        assert!(f.session.is_stopped());
        assert!(!f.session.is_waiting());

        // Idle but not yet stopped: shutdown still moves it to stopped.
        f.session.shutdown(None, None).await;
        assert_eq!(f.session.state(), SessionState::Stopped);
        assert_eq!(*f.delegate.states.lock(), vec![SessionState::Stopped]);
        assert_eq!(f.transport.state.lock().disconnects, 1);
    }

    #[tokio::test]
    async fn connection_failure_reports_target() {
        let transport = MockTransport::default();
        transport.state.lock().fail_connect = true;
        let mut f = fixture(transport, StartingAngle::Zero);
        f.session.connect().await.unwrap();

        assert!(f.session.is_stopped());
        let errors = f.delegate.errors.lock().clone();
        assert_eq!(errors.len(), 1);
        let message = errors[0].user_message();
        assert!(message.contains("'127.0.0.1:22223'"), "{}", message);
        assert!(message.contains("'1.19'"));
        assert_eq!(*f.delegate.states.lock(), vec![SessionState::Stopped]);
    }

    #[tokio::test]
    async fn disconnect_while_streaming_shuts_down() {
        let mut f = fixture(MockTransport::with_bodies(&[], &["skate"]), StartingAngle::Zero);
        streaming(&mut f).await;

        f.transport.events().disconnected(Some("socket closed".into()));
        run_until_stopped(&mut f.session).await;

        assert_eq!(*f.delegate.errors.lock(), vec![SessionError::Disconnected]);
        // Stream stop is skipped once the link is gone.
        assert_eq!(f.transport.state.lock().stop_requests, 0);
    }

    #[tokio::test]
    async fn stop_with_destination_persists() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("trial");
        let mut f = fixture(MockTransport::with_bodies(&["toe"], &["skate"]), StartingAngle::Zero);
        streaming(&mut f).await;

        for n in 0..5 {
            f.transport.send_frame(skate_frame(n, n as f64));
        }
        let result = f
            .session
            .stop_stream(Some(prefix.clone()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.metadata.packet_count, 5);
        let rows = read_body_record(&record_path(&prefix, "skate")).unwrap();
        let yaws: Vec<f64> = rows.iter().map(|r| r.values[5]).collect();
        assert_eq!(yaws, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(f.delegate.results.lock().len(), 1);

        // A second stream in the same session gets its own prefix.
        f.session
            .handle_event(TransportEvent::Server(ServerEvent::CaptureStarted))
            .await;
        f.transport.send_frame(skate_frame(9, 0.0));
        f.session.stop_stream(Some(prefix.clone())).await.unwrap();
        let second = record_path(&stream_prefix(&prefix, 2), "skate");
        assert_eq!(read_body_record(&second).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn handle_requests_are_served_by_run() {
        let mut f = fixture(MockTransport::with_bodies(&[], &["skate"]), StartingAngle::Zero);
        f.session.connect().await.unwrap();
        let events = f.transport.events();
        let handle = f.session.handle();

        events.event(ServerEvent::CaptureStarted);
        handle.request_stop(None);
        handle.request_shutdown(None);

        // Commands win over events, so the stop arrives while still waiting.
        run_until_stopped(&mut f.session).await;
        assert_eq!(
            *f.delegate.states.lock(),
            vec![SessionState::Waiting, SessionState::Stopped]
        );
        assert!(f.delegate.errors.lock().is_empty());
    }

    #[tokio::test]
    async fn capture_stopped_event_returns_to_waiting() {
        let mut f = fixture(MockTransport::with_bodies(&[], &["skate"]), StartingAngle::Minus90);
        streaming(&mut f).await;
        f.session
            .handle_event(TransportEvent::Server(ServerEvent::CaptureStopped))
            .await;
        assert!(f.session.is_waiting());
        assert_eq!(f.sink.trigger_codes().first(), Some(&100));
        assert!(f.session.start_stream().await.is_ok());
        assert!(f.session.is_streaming());
    }

    #[test]
    fn stream_prefix_suffixes_later_streams() {
        assert_eq!(stream_prefix(Path::new("out/a"), 1), PathBuf::from("out/a"));
        assert_eq!(stream_prefix(Path::new("out/a"), 3), PathBuf::from("out/a_3"));
    }
}
