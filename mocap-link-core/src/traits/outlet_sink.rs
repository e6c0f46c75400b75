use thiserror::Error;

use crate::models::error::SessionError;
use crate::models::trigger::{OutletDescriptor, OutletSample};

/// Why a sink did not take a sample.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Consumer is slow; the sample stays buffered in the publisher.
    #[error("sink is full")]
    Full,

    #[error("sink closed: {0}")]
    Closed(String),
}

/// Downstream end of the broadcast outlet.
///
/// Implemented by:
/// - `MemorySink` (in-process consumers, tests)
/// - `UdpOutletSink` in `mocap-link-io`
pub trait OutletSink: Send {
    /// Announce a new outlet to downstream consumers.
    fn open(&mut self, descriptor: &OutletDescriptor) -> Result<(), SessionError>;

    /// Hand one sample to the consumer without blocking.
    fn try_send(&mut self, sample: &OutletSample) -> Result<(), SinkError>;

    /// Release the outlet. Must be safe to call more than once.
    fn close(&mut self);
}
