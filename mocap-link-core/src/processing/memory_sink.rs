use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::SessionError;
use crate::models::trigger::{OutletDescriptor, OutletPayload, OutletSample};
use crate::traits::outlet_sink::{OutletSink, SinkError};

#[derive(Debug, Default)]
struct MemorySinkState {
    descriptor: Option<OutletDescriptor>,
    samples: Vec<OutletSample>,
    accepting: bool,
    close_count: usize,
}

/// In-process outlet sink that keeps every delivered sample.
///
/// Clones share the same storage, so one clone can be handed to the
/// publisher while another is used to inspect what was delivered.
#[derive(Debug, Clone)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemorySinkState {
                accepting: true,
                ..Default::default()
            })),
        }
    }

    /// Simulate a stalled consumer: while `false`, every send reports `Full`.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.lock().accepting = accepting;
    }

    pub fn descriptor(&self) -> Option<OutletDescriptor> {
        self.state.lock().descriptor.clone()
    }

    pub fn samples(&self) -> Vec<OutletSample> {
        self.state.lock().samples.clone()
    }

    pub fn trigger_codes(&self) -> Vec<i64> {
        self.state
            .lock()
            .samples
            .iter()
            .filter_map(OutletSample::trigger_value)
            .collect()
    }

    pub fn frames(&self) -> Vec<Vec<f64>> {
        self.state
            .lock()
            .samples
            .iter()
            .filter_map(|s| match &s.payload {
                OutletPayload::Frame(values) => Some(values.clone()),
                OutletPayload::Trigger(_) => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutletSink for MemorySink {
    fn open(&mut self, descriptor: &OutletDescriptor) -> Result<(), SessionError> {
        self.state.lock().descriptor = Some(descriptor.clone());
        Ok(())
    }

    fn try_send(&mut self, sample: &OutletSample) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if !state.accepting {
            return Err(SinkError::Full);
        }
        state.samples.push(sample.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().close_count += 1;
    }
}
