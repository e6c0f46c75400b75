//! # mocap-link-io
//!
//! Concrete backends for mocap-link.
//!
//! Provides:
//! - `SimulatedTransport`: capture server stand-in implementing `CaptureTransport`
//! - `UdpOutletSink`: outlet published as JSON datagrams, implementing `OutletSink`
//!
//! ## Usage
//! ```ignore
//! use mocap_link_core::{MocapSession, SessionConfiguration};
//! use mocap_link_io::{SimulatedTransport, SimulationConfig, UdpOutletSink};
//!
//! let transport = SimulatedTransport::new(SimulationConfig::default());
//! let sink = UdpOutletSink::new("127.0.0.1:16571".parse().unwrap());
//! let mut session = MocapSession::new(transport, Box::new(sink), SessionConfiguration::default());
//! ```

pub mod sim_transport;
pub mod udp_outlet;

pub use sim_transport::{SimulatedTransport, SimulationConfig};
pub use udp_outlet::{OutletDatagram, UdpOutletSink};
