use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::error::SessionError;
use crate::models::frame::{PipelineMessage, RawFrame};
use crate::models::layout::{BodyKind, ChannelLayout, MARKER_WIDTH, RIGID_BODY_WIDTH};
use crate::models::trigger::{OutletPayload, TriggerCode};
use crate::processing::publisher::BroadcastPublisher;
use crate::processing::sample_buffer::SampleBuffer;
use crate::processing::triggers::AngleTrigger;
use crate::traits::capture_transport::FrameSender;

/// A frame split into per-body value lists, in layout order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// One entry per layout group the frame had data for.
    pub samples: Vec<Vec<f64>>,
    /// Total values the frame carried, including bodies the layout does not know.
    pub value_count: usize,
}

impl DecodedFrame {
    pub fn flatten(&self) -> Vec<f64> {
        self.samples.iter().flatten().copied().collect()
    }
}

/// Split a raw frame along the layout's groups.
///
/// Markers fill the marker groups and rigid bodies fill the body groups, each
/// in order. Decoding stops at the first group the frame has no data for, so
/// `samples` is shorter than the layout when bodies are missing. `value_count`
/// covers everything in the frame, including values the layout has no group for.
pub fn decode_frame(layout: &ChannelLayout, frame: &RawFrame) -> DecodedFrame {
    let mut markers = frame.markers.iter();
    let mut bodies = frame.rigid_bodies.iter();
    let mut samples = Vec::with_capacity(layout.groups().len());

    for group in layout.groups() {
        let values = match group.kind {
            BodyKind::Marker => markers.next().map(|m| m.to_vec()),
            BodyKind::RigidBody => bodies.next().map(|b| {
                let mut values = Vec::with_capacity(RIGID_BODY_WIDTH);
                values.extend_from_slice(&b.position);
                values.extend_from_slice(&b.rotation);
                values
            }),
        };
        match values {
            Some(values) => samples.push(values),
            None => break,
        }
    }

    DecodedFrame {
        samples,
        value_count: frame.markers.len() * MARKER_WIDTH
            + frame.rigid_bodies.len() * RIGID_BODY_WIDTH,
    }
}

/// Everything the consumer task needs, moved into it at spawn time.
pub struct PipelineContext {
    pub layout: Arc<ChannelLayout>,
    pub publisher: Arc<BroadcastPublisher>,
    pub angle_trigger: AngleTrigger,
    /// Bodies whose name contains this pattern feed the angle trigger.
    pub tracked_body: String,
    pub packet_count: Arc<AtomicU64>,
    pub republish_frames: bool,
    /// Fatal pipeline errors are reported here for the session to act on.
    pub faults: mpsc::UnboundedSender<SessionError>,
    /// Cancelled when the capture server connection is lost.
    pub link: CancellationToken,
}

impl PipelineContext {
    fn process(&mut self, frame: &RawFrame, buffer: &mut SampleBuffer) -> Result<(), SessionError> {
        let decoded = decode_frame(&self.layout, frame);
        let complete = decoded.samples.len() == self.layout.groups().len();
        if !complete || decoded.value_count != self.layout.channel_count() {
            // A frame missing whole groups reports what actually matched the layout.
            let sample_len = if complete {
                decoded.value_count
            } else {
                decoded.samples.iter().map(Vec::len).sum()
            };
            return Err(SessionError::Integrity {
                sample_len,
                channel_count: self.layout.channel_count(),
            });
        }

        self.packet_count.fetch_add(1, Ordering::Relaxed);
        let timestamp = Local::now();

        if self.republish_frames {
            self.publisher.push(OutletPayload::Frame(decoded.flatten()));
        }

        for (index, values) in decoded.samples.into_iter().enumerate() {
            let tracked = self.layout.groups()[index]
                .name
                .contains(self.tracked_body.as_str());
            if tracked {
                if let Some(angle) = self.angle_trigger.check(&values) {
                    log::debug!("Pushed angle {}", angle);
                    self.publisher.push_trigger(TriggerCode::AngleCrossed(angle));
                }
            }
            buffer.append(index, timestamp, values);
        }
        Ok(())
    }
}

/// Single-consumer packet queue plus the task that drains it.
///
/// ```text
/// [transport] → FrameSender → [unbounded queue] → consumer task
///                                                   ├→ SampleBuffer
///                                                   ├→ BroadcastPublisher
///                                                   └→ AngleTrigger
/// ```
///
/// The consumer owns the `SampleBuffer` and returns it when it exits, so the
/// buffer can only be read after the consumer is gone.
pub struct PacketPipeline {
    tx: mpsc::UnboundedSender<PipelineMessage>,
    handle: JoinHandle<SampleBuffer>,
}

/// Packet queue whose consumer has not started yet.
///
/// Frames sent before [`PacketQueue::spawn`] wait in the queue. Dropping it
/// unspawned discards them and closes every `FrameSender`.
pub struct PacketQueue {
    tx: mpsc::UnboundedSender<PipelineMessage>,
    rx: mpsc::UnboundedReceiver<PipelineMessage>,
}

impl PacketQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn frame_sender(&self) -> FrameSender {
        FrameSender::new(self.tx.clone())
    }

    /// Start the consumer on everything queued so far.
    pub fn spawn(self, context: PipelineContext) -> PacketPipeline {
        let handle = tokio::spawn(consume(context, self.rx));
        PacketPipeline {
            tx: self.tx,
            handle,
        }
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketPipeline {
    pub fn spawn(context: PipelineContext) -> Self {
        PacketQueue::new().spawn(context)
    }

    pub fn frame_sender(&self) -> FrameSender {
        FrameSender::new(self.tx.clone())
    }

    /// Enqueue the end-of-stream sentinel and wait for the consumer to exit.
    pub async fn finish(self) -> Result<SampleBuffer, SessionError> {
        // The consumer may already be gone after an integrity fault.
        let _ = self.tx.send(PipelineMessage::EndOfStream);
        self.handle.await.map_err(|e| {
            log::error!("Pipeline consumer did not exit cleanly: {}", e);
            SessionError::Internal(format!("pipeline consumer failed: {}", e))
        })
    }
}

async fn consume(
    mut context: PipelineContext,
    mut rx: mpsc::UnboundedReceiver<PipelineMessage>,
) -> SampleBuffer {
    log::debug!("Pipeline consumer enter");
    let mut buffer = SampleBuffer::for_layout(&context.layout);
    let link = context.link.clone();

    loop {
        let message = tokio::select! {
            biased;

            message = rx.recv() => message,
            _ = link.cancelled() => {
                log::debug!("Pipeline consumer: link lost");
                None
            }
        };

        match message {
            Some(PipelineMessage::Frame(frame)) => {
                if let Err(e) = context.process(&frame, &mut buffer) {
                    log::error!("Stream canceled: {}", e);
                    let _ = context.faults.send(e);
                    break;
                }
            }
            Some(PipelineMessage::EndOfStream) | None => break,
        }
    }

    log::debug!("Pipeline consumer exit");
    buffer
}
