pub mod layout_resolver;
pub mod memory_sink;
pub mod pipeline;
pub mod publisher;
pub mod ring_buffer;
pub mod sample_buffer;
pub mod triggers;
