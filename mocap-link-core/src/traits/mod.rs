pub mod capture_transport;
pub mod outlet_sink;
pub mod session_delegate;
