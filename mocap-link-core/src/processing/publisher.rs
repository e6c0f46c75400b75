use parking_lot::Mutex;

use crate::models::error::SessionError;
use crate::models::trigger::{OutletDescriptor, OutletPayload, OutletSample, TriggerCode};
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::outlet_sink::{OutletSink, SinkError};

/// Counters for one outlet lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub pushed: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub pending: usize,
}

struct OutletState {
    sink: Box<dyn OutletSink>,
    buffer: RingBuffer<OutletSample>,
    open: bool,
    pushed: u64,
    delivered: u64,
    dropped: u64,
}

impl OutletState {
    /// Forward buffered samples until the sink refuses one.
    fn flush(&mut self) {
        while let Some(sample) = self.buffer.front() {
            match self.sink.try_send(sample) {
                Ok(()) => {
                    self.buffer.pop_front();
                    self.delivered += 1;
                }
                Err(SinkError::Full) => break,
                Err(SinkError::Closed(reason)) => {
                    log::warn!("Outlet sink closed: {}", reason);
                    self.open = false;
                    self.buffer.reset();
                    break;
                }
            }
        }
    }
}

/// Thread-safe broadcast outlet shared by the pipeline consumer and both
/// trigger emitters.
///
/// ```text
/// [pipeline] ─┐
/// [periodic] ─┼→ push → [RingBuffer (drop oldest)] → [OutletSink]
/// [angle]    ─┘
/// ```
///
/// Each push is one locked write, so samples from different sources never
/// interleave partially. Pushes never wait on the downstream consumer: when
/// the sink is full, samples queue in the ring buffer and the oldest ones are
/// dropped on overflow.
pub struct BroadcastPublisher {
    inner: Mutex<OutletState>,
}

impl BroadcastPublisher {
    pub fn new(sink: Box<dyn OutletSink>, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(OutletState {
                sink,
                buffer: RingBuffer::new(capacity.max(1)),
                open: false,
                pushed: 0,
                delivered: 0,
                dropped: 0,
            }),
        }
    }

    /// Open the outlet for a new stream. Counters restart from zero.
    pub fn open(&self, descriptor: &OutletDescriptor) -> Result<(), SessionError> {
        let mut state = self.inner.lock();
        if state.open {
            state.sink.close();
        }
        state.buffer.reset();
        state.pushed = 0;
        state.delivered = 0;
        state.dropped = 0;
        state.sink.open(descriptor)?;
        state.open = true;
        log::debug!(
            "Outlet '{}' opened with {} channel(s)",
            descriptor.name,
            descriptor.channel_labels.len()
        );
        Ok(())
    }

    /// Push one sample. Returns `false` if the outlet is not open.
    pub fn push(&self, payload: OutletPayload) -> bool {
        let mut state = self.inner.lock();
        if !state.open {
            return false;
        }
        state.pushed += 1;
        if state.buffer.push(OutletSample::now(payload)).is_some() {
            state.dropped += 1;
        }
        state.flush();
        state.open
    }

    pub fn push_trigger(&self, code: TriggerCode) -> bool {
        self.push(OutletPayload::Trigger(code.value()))
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Flush what the sink will take, then close it. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        if !state.open {
            return;
        }
        state.flush();
        let abandoned = state.buffer.count();
        if abandoned > 0 {
            log::debug!("Outlet closed with {} undelivered sample(s)", abandoned);
        }
        state.buffer.reset();
        state.sink.close();
        state.open = false;
    }

    pub fn stats(&self) -> PublisherStats {
        let state = self.inner.lock();
        PublisherStats {
            pushed: state.pushed,
            delivered: state.delivered,
            dropped: state.dropped,
            pending: state.buffer.count(),
        }
    }
}
