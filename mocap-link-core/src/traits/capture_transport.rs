use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::error::SessionError;
use crate::models::events::{ServerEvent, TransportEvent};
use crate::models::frame::{PipelineMessage, RawFrame};
use crate::models::layout::{ParameterCategory, ServerParameters, StreamComponent};

/// Producer end of the packet queue handed to the transport.
///
/// Enqueueing never blocks, so the transport can deliver frames as fast as
/// they arrive regardless of how far behind the consumer is.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<PipelineMessage>,
}

impl FrameSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<PipelineMessage>) -> Self {
        Self { tx }
    }

    /// Returns `false` once the consumer has exited.
    pub fn send(&self, frame: RawFrame) -> bool {
        self.tx.send(PipelineMessage::Frame(frame)).is_ok()
    }
}

/// Channel the transport uses to report server events and link loss.
///
/// `disconnected` also trips the session's link token, which unblocks any
/// await that is tied to connection-loss detection.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<TransportEvent>,
    link: CancellationToken,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<TransportEvent>, link: CancellationToken) -> Self {
        Self { tx, link }
    }

    pub fn event(&self, event: ServerEvent) -> bool {
        self.tx.send(TransportEvent::Server(event)).is_ok()
    }

    pub fn disconnected(&self, reason: Option<String>) {
        self.link.cancel();
        let _ = self.tx.send(TransportEvent::Disconnected { reason });
    }

    pub fn is_linked(&self) -> bool {
        !self.link.is_cancelled()
    }
}

/// Client for a real-time capture server.
///
/// Wire-level parsing lives entirely behind this trait; the session only sees
/// structured parameters, frames and events. Implemented by:
/// - `SimulatedTransport` in `mocap-link-io`
#[async_trait]
pub trait CaptureTransport: Send {
    /// Open the connection. Events and disconnects are reported through `events`.
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        protocol_version: &str,
        events: EventSender,
    ) -> Result<(), SessionError>;

    /// Ask the server to report its current state as an event.
    async fn get_state(&mut self) -> Result<(), SessionError>;

    async fn get_parameters(
        &mut self,
        categories: &[ParameterCategory],
    ) -> Result<ServerParameters, SessionError>;

    /// Start streaming frames into `frames`.
    async fn request_stream(
        &mut self,
        components: &[StreamComponent],
        frames: FrameSender,
    ) -> Result<(), SessionError>;

    async fn stop_stream(&mut self) -> Result<(), SessionError>;

    /// Whether the underlying connection is still usable.
    fn has_transport(&self) -> bool;

    /// Close the connection. Must be safe to call more than once.
    fn disconnect(&mut self);
}
