use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::layout::BodyKind;

/// Result returned when a stream's buffered samples have been persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub metadata_path: PathBuf,
    pub metadata: RecordingMetadata,
    /// Advisory data-loss warnings, one per affected body.
    pub warnings: Vec<String>,
}

/// Per-body summary of a persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyRecordSummary {
    pub body: String,
    pub kind: BodyKind,
    pub file_path: String,
    pub rows: usize,
    /// Rows whose first positional value is NaN.
    pub lost_rows: usize,
    pub loss_fraction: f64,
    pub needs_recapture: bool,
    pub checksum: String,
}

/// Metadata stored alongside a recording as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub source_id: String,
    pub starting_angle: i32,
    pub packet_count: u64,
    pub duration_secs: f64,
    pub records: Vec<BodyRecordSummary>,
}

impl RecordingMetadata {
    pub fn new(
        source_id: &str,
        starting_angle: i32,
        packet_count: u64,
        duration_secs: f64,
        records: Vec<BodyRecordSummary>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            source_id: source_id.to_string(),
            starting_angle,
            packet_count,
            duration_secs,
            records,
        }
    }

    pub fn needs_recapture(&self) -> bool {
        self.records.iter().any(|r| r.needs_recapture)
    }
}
