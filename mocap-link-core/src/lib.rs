//! # mocap-link-core
//!
//! Transport-agnostic motion capture streaming and recording engine.
//!
//! Provides the session state machine, the packet pipeline, trigger emitters,
//! the broadcast outlet buffer and integrity-checked CSV recording. Capture
//! server clients implement the `CaptureTransport` trait and outlet backends
//! implement `OutletSink`; both plug into the generic `MocapSession`.
//!
//! ## Architecture
//!
//! ```text
//! mocap-link-core (this crate)
//! ├── traits/       ← CaptureTransport, OutletSink, SessionDelegate
//! ├── models/       ← SessionError, SessionState, SessionConfiguration, ChannelLayout, etc.
//! ├── processing/   ← layout resolver, PacketPipeline, BroadcastPublisher, triggers, RingBuffer
//! ├── session/      ← MocapSession (generic orchestrator), transition table
//! └── storage/      ← per-body CSV records, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{SessionConfiguration, StartingAngle};
pub use models::error::SessionError;
pub use models::events::{EventClass, ServerEvent, TransportEvent};
pub use models::frame::{RawFrame, RigidBodyPose};
pub use models::layout::{ChannelLayout, ParameterCategory, ServerParameters, StreamComponent};
pub use models::recording_result::{BodyRecordSummary, RecordingMetadata, RecordingResult};
pub use models::state::SessionState;
pub use models::trigger::{OutletDescriptor, OutletPayload, OutletSample, TriggerCode};
pub use processing::memory_sink::MemorySink;
pub use processing::publisher::BroadcastPublisher;
pub use processing::ring_buffer::RingBuffer;
pub use session::mocap::{MocapSession, SessionCommand, SessionHandle};
pub use traits::capture_transport::{CaptureTransport, EventSender, FrameSender};
pub use traits::outlet_sink::{OutletSink, SinkError};
pub use traits::session_delegate::SessionDelegate;
