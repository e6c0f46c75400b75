//! End-to-end recording sessions against the simulated capture server.

use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mocap_link_core::storage::metadata::read_metadata;
use mocap_link_core::storage::record_writer::{read_body_record, record_path};
use mocap_link_core::{
    MemorySink, MocapSession, OutletPayload, RecordingResult, SessionConfiguration, SessionDelegate,
    SessionError, SessionHandle, SessionState, StartingAngle,
};
use mocap_link_io::{OutletDatagram, SimulatedTransport, SimulationConfig, UdpOutletSink};

/// Records every notification and shuts the session down once the first
/// stream has ended.
#[derive(Default)]
struct Observer {
    states: Mutex<Vec<SessionState>>,
    errors: Mutex<Vec<SessionError>>,
    warnings: Mutex<Vec<String>>,
    results: Mutex<Vec<RecordingResult>>,
    handle: Mutex<Option<SessionHandle>>,
}

impl SessionDelegate for Observer {
    fn on_state_changed(&self, state: SessionState) {
        let mut states = self.states.lock();
        let streamed = states.contains(&SessionState::Streaming);
        states.push(state);
        if state == SessionState::Waiting && streamed {
            if let Some(handle) = self.handle.lock().as_ref() {
                handle.request_shutdown(None);
            }
        }
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

fn config(angle: StartingAngle) -> SessionConfiguration {
    SessionConfiguration {
        starting_angle: angle,
        heartbeat_interval_ms: 25,
        ..Default::default()
    }
}

fn sim(overrides: SimulationConfig) -> SimulatedTransport {
    SimulatedTransport::new(SimulationConfig {
        frame_rate_hz: 200.0,
        yaw_rate_deg_per_sec: 400.0,
        ..overrides
    })
}

async fn run_session(
    transport: SimulatedTransport,
    sink: Box<dyn mocap_link_core::OutletSink>,
    config: SessionConfiguration,
    destination: Option<&Path>,
) -> (MocapSession<SimulatedTransport>, Arc<Observer>) {
    let mut session = MocapSession::new(transport, sink, config);
    let observer = Arc::new(Observer::default());
    *observer.handle.lock() = Some(session.handle());
    session.set_delegate(observer.clone());
    session.set_destination(destination.map(PathBuf::from));

    session.connect().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), session.run())
        .await
        .expect("session did not stop");
    (session, observer)
}

#[tokio::test]
async fn records_a_capture_from_start_to_stop() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("trial");
    let sink = MemorySink::new();
    let transport = sim(SimulationConfig {
        stop_after_frames: Some(40),
        ..Default::default()
    });

    let (session, observer) = run_session(
        transport,
        Box::new(sink.clone()),
        config(StartingAngle::Plus45),
        Some(&prefix),
    )
    .await;

    assert!(session.is_stopped());
    assert_eq!(
        *observer.states.lock(),
        vec![
            SessionState::Waiting,
            SessionState::Streaming,
            SessionState::Waiting,
            SessionState::Stopped
        ]
    );
    assert!(observer.errors.lock().is_empty());
    assert_eq!(session.packet_count(), 40);
    assert_eq!(session.transport().frames_sent(), 40);

    // Start code first; a stop from the server is not a session end.
    let codes = sink.trigger_codes();
    assert_eq!(codes[0], 400);
    assert!(!codes.contains(&401));
    assert_eq!(sink.frames().len(), 40);
    assert!(sink.frames().iter().all(|f| f.len() == 2 * 3 + 6));

    let results = observer.results.lock().clone();
    assert_eq!(results.len(), 1);
    let skate = read_body_record(&record_path(&prefix, "skate")).unwrap();
    assert_eq!(skate.len(), 40);
    assert!(skate.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(read_body_record(&record_path(&prefix, "toe")).unwrap().len(), 40);

    let metadata = read_metadata(&prefix).unwrap();
    assert_eq!(metadata.packet_count, 40);
    assert_eq!(metadata.starting_angle, 45);
    assert_eq!(metadata.records.len(), 3);
    assert!(!metadata.needs_recapture());
}

#[tokio::test]
async fn corrupted_stream_stops_with_one_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("corrupt");
    let sink = MemorySink::new();
    let transport = sim(SimulationConfig {
        corrupt_after_frames: Some(10),
        ..Default::default()
    });

    let (session, observer) = run_session(
        transport,
        Box::new(sink.clone()),
        config(StartingAngle::Zero),
        Some(&prefix),
    )
    .await;

    assert_eq!(session.state(), SessionState::Stopped);
    let errors = observer.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], SessionError::Integrity { .. }));
    assert_eq!(session.packet_count(), 10);

    // The session was streaming when it failed, so the end code goes out last.
    assert_eq!(sink.trigger_codes().last(), Some(&301));

    // Rows validated before the corruption are still persisted.
    let skate = read_body_record(&record_path(&prefix, "skate")).unwrap();
    assert_eq!(skate.len(), 10);
}

#[tokio::test]
async fn link_loss_shuts_down() {
    let transport = sim(SimulationConfig {
        disconnect_after_frames: Some(15),
        ..Default::default()
    });

    let (session, observer) = run_session(
        transport,
        Box::new(MemorySink::new()),
        config(StartingAngle::Zero),
        None,
    )
    .await;

    assert!(session.is_stopped());
    assert_eq!(*observer.errors.lock(), vec![SessionError::Disconnected]);
    assert!(observer.results.lock().is_empty());
}

#[tokio::test]
async fn heavy_dropout_warns() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("dropout");
    let transport = sim(SimulationConfig {
        dropout_every: Some(2),
        stop_after_frames: Some(30),
        ..Default::default()
    });

    let (_session, observer) = run_session(
        transport,
        Box::new(MemorySink::new()),
        config(StartingAngle::Zero),
        Some(&prefix),
    )
    .await;

    let warnings = observer.warnings.lock().clone();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("skate"));
    let metadata = read_metadata(&prefix).unwrap();
    let skate = metadata.records.iter().find(|r| r.body == "skate").unwrap();
    assert_eq!(skate.lost_rows, 15);
    assert!(skate.needs_recapture);
}

#[tokio::test]
async fn no_bodies_on_server_is_a_configuration_error() {
    let transport = sim(SimulationConfig {
        markers: vec![],
        rigid_bodies: vec![],
        ..Default::default()
    });

    let (session, observer) = run_session(
        transport,
        Box::new(MemorySink::new()),
        config(StartingAngle::Zero),
        None,
    )
    .await;

    assert_eq!(
        *observer.states.lock(),
        vec![SessionState::Waiting, SessionState::Stopped]
    );
    assert!(matches!(
        observer.errors.lock()[0],
        SessionError::Configuration { markers: 0, bodies: 0 }
    ));
    assert_eq!(session.transport().frames_sent(), 0);
}

#[tokio::test]
async fn publishes_over_udp() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let sink = UdpOutletSink::new(receiver.local_addr().unwrap());
    let transport = sim(SimulationConfig {
        stop_after_frames: Some(5),
        ..Default::default()
    });

    let (session, observer) = run_session(
        transport,
        Box::new(sink),
        config(StartingAngle::Minus45),
        None,
    )
    .await;
    assert!(session.is_stopped());
    assert!(observer.errors.lock().is_empty());

    let mut datagrams = Vec::new();
    let mut buf = [0u8; 65536];
    while let Ok(n) = receiver.recv(&mut buf) {
        let datagram = OutletDatagram::decode(&buf[..n]).unwrap();
        let closed = datagram == OutletDatagram::Closed;
        datagrams.push(datagram);
        if closed {
            break;
        }
    }

    match &datagrams[0] {
        OutletDatagram::Descriptor(descriptor) => {
            assert_eq!(descriptor.name, "Mocap");
            assert_eq!(descriptor.source_id, "127.0.0.1:22223");
            assert_eq!(descriptor.channel_labels.len(), 12);
        }
        other => panic!("expected descriptor, got {:?}", other),
    }
    match &datagrams[1] {
        OutletDatagram::Sample { sequence, sample } => {
            assert_eq!(*sequence, 0);
            assert_eq!(sample.payload, OutletPayload::Trigger(200));
        }
        other => panic!("expected start code, got {:?}", other),
    }
    let frames = datagrams
        .iter()
        .filter(|d| {
            matches!(
                d,
                OutletDatagram::Sample {
                    sample: mocap_link_core::OutletSample {
                        payload: OutletPayload::Frame(_),
                        ..
                    },
                    ..
                }
            )
        })
        .count();
    assert_eq!(frames, 5);
    assert_eq!(datagrams.last(), Some(&OutletDatagram::Closed));
}
