pub mod metadata;
pub mod record_writer;
