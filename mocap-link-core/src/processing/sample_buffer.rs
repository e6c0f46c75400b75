use chrono::{DateTime, Local};

use crate::models::layout::{BodyKind, ChannelLayout};

/// One accepted sample for one body.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRow {
    pub timestamp: DateTime<Local>,
    pub values: Vec<f64>,
}

/// Append-only rows for one body, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyRecord {
    pub name: String,
    pub kind: BodyKind,
    pub rows: Vec<RecordedRow>,
}

/// Per-body sample storage for one stream.
///
/// Every body in the layout is registered up front, in layout order, so
/// appends are plain index lookups. Owned by the pipeline consumer while the
/// stream runs and handed back when the consumer exits.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    records: Vec<BodyRecord>,
}

impl SampleBuffer {
    pub fn for_layout(layout: &ChannelLayout) -> Self {
        Self {
            records: layout
                .groups()
                .iter()
                .map(|group| BodyRecord {
                    name: group.name.clone(),
                    kind: group.kind,
                    rows: Vec::new(),
                })
                .collect(),
        }
    }

    /// Append a row to the body at `index` (its position in the layout).
    pub fn append(&mut self, index: usize, timestamp: DateTime<Local>, values: Vec<f64>) {
        if let Some(record) = self.records.get_mut(index) {
            record.rows.push(RecordedRow { timestamp, values });
        }
    }

    pub fn records(&self) -> &[BodyRecord] {
        &self.records
    }

    pub fn record(&self, name: &str) -> Option<&BodyRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn into_records(self) -> Vec<BodyRecord> {
        self.records
    }

    pub fn total_rows(&self) -> usize {
        self.records.iter().map(|r| r.rows.len()).sum()
    }
}
