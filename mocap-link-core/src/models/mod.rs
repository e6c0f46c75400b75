pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod layout;
pub mod recording_result;
pub mod state;
pub mod trigger;
