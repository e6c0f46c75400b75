//! UDP outlet sink
//!
//! Publishes the outlet as JSON datagrams to a single unicast target. The
//! socket is non-blocking: a full send buffer reports `SinkError::Full` and
//! the publisher keeps the sample queued, so a slow or absent consumer never
//! stalls the session.
//!
//! # Wire format
//!
//! One JSON object per datagram, tagged by `type`:
//!
//! ```text
//! {"type":"descriptor","name":"Mocap","source_id":"127.0.0.1:22223",...}
//! {"type":"sample","sequence":0,"sample":{"timestamp":1712.5,"payload":{"kind":"trigger","data":300}}}
//! {"type":"closed"}
//! ```

use std::io;
use std::net::{SocketAddr, UdpSocket};

use serde::{Deserialize, Serialize};

use mocap_link_core::{OutletDescriptor, OutletSample, OutletSink, SessionError, SinkError};

/// One datagram on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutletDatagram {
    Descriptor(OutletDescriptor),
    Sample { sequence: u64, sample: OutletSample },
    Closed,
}

impl OutletDatagram {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// `OutletSink` that sends each sample as one UDP datagram.
pub struct UdpOutletSink {
    target: SocketAddr,
    socket: Option<UdpSocket>,
    sequence: u64,
}

impl UdpOutletSink {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            socket: None,
            sequence: 0,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    fn send(&self, datagram: &OutletDatagram) -> Result<(), SinkError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| SinkError::Closed("outlet not open".into()))?;
        let bytes = datagram
            .encode()
            .map_err(|e| SinkError::Closed(format!("failed to encode datagram: {}", e)))?;

        match socket.send(&bytes) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(SinkError::Full),
            // No listener on the target yet; delivery is best effort.
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                log::trace!("No outlet consumer at {}", self.target);
                Ok(())
            }
            Err(e) => Err(SinkError::Closed(format!("send to {} failed: {}", self.target, e))),
        }
    }
}

impl OutletSink for UdpOutletSink {
    fn open(&mut self, descriptor: &OutletDescriptor) -> Result<(), SessionError> {
        let bind_addr: SocketAddr = if self.target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)
            .and_then(|socket| {
                socket.connect(self.target)?;
                socket.set_nonblocking(true)?;
                Ok(socket)
            })
            .map_err(|e| {
                SessionError::Internal(format!("failed to open UDP outlet to {}: {}", self.target, e))
            })?;

        self.socket = Some(socket);
        self.sequence = 0;
        self.send(&OutletDatagram::Descriptor(descriptor.clone()))
            .map_err(|e| SessionError::Internal(format!("failed to announce outlet: {}", e)))?;
        log::info!("UDP outlet '{}' publishing to {}", descriptor.name, self.target);
        Ok(())
    }

    fn try_send(&mut self, sample: &OutletSample) -> Result<(), SinkError> {
        self.send(&OutletDatagram::Sample {
            sequence: self.sequence,
            sample: sample.clone(),
        })?;
        self.sequence += 1;
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.is_none() {
            return;
        }
        if let Err(e) = self.send(&OutletDatagram::Closed) {
            log::debug!("UDP outlet close notice not sent: {}", e);
        }
        self.socket = None;
    }
}
