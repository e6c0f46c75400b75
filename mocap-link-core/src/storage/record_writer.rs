use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use sha2::{Digest, Sha256};

use crate::models::config::StartingAngle;
use crate::models::error::SessionError;
use crate::models::recording_result::{BodyRecordSummary, RecordingMetadata, RecordingResult};
use crate::processing::sample_buffer::{BodyRecord, RecordedRow, SampleBuffer};
use crate::storage::metadata;

/// Local wall-clock time with microseconds, e.g. `2024-03-05T12:00:00.250000`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Session facts recorded alongside the per-body files.
#[derive(Debug, Clone)]
pub struct RecordingInfo {
    pub source_id: String,
    pub starting_angle: StartingAngle,
    pub packet_count: u64,
    pub duration_secs: f64,
}

/// Per-body record path: `<prefix>_<body>.csv`.
///
/// Characters outside `[A-Za-z0-9._-]` in the body name are replaced with `_`.
pub fn record_path(prefix: &Path, body: &str) -> PathBuf {
    let body: String = body
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut path = OsString::from(prefix.as_os_str());
    path.push(format!("_{}.csv", body));
    PathBuf::from(path)
}

/// Rows whose first value is NaN, and whether that exceeds a third of all rows.
///
/// The server reports an unresolved body as all-NaN, so the first column
/// alone identifies a lost row.
pub fn audit_loss(record: &BodyRecord) -> (usize, bool) {
    let lost = record
        .rows
        .iter()
        .filter(|row| row.values.first().is_some_and(|v| v.is_nan()))
        .count();
    (lost, lost * 3 > record.rows.len())
}

/// Write one body's rows to a CSV record, header first, in arrival order.
pub fn write_body_record(path: &Path, record: &BodyRecord) -> Result<(), SessionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| SessionError::Storage(format!("failed to create directory: {}", e)))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| SessionError::Storage(format!("failed to create {}: {}", path.display(), e)))?;

    let header = std::iter::once("timestamp").chain(record.kind.columns().iter().copied());
    writer.write_record(header).map_err(write_error)?;

    for row in &record.rows {
        let fields = std::iter::once(row.timestamp.format(TIMESTAMP_FORMAT).to_string())
            .chain(row.values.iter().map(|v| v.to_string()));
        writer.write_record(fields).map_err(write_error)?;
    }

    writer
        .flush()
        .map_err(|e| SessionError::Storage(format!("failed to flush {}: {}", path.display(), e)))?;
    Ok(())
}

/// Read a record written by `write_body_record` back into rows.
pub fn read_body_record(path: &Path) -> Result<Vec<RecordedRow>, SessionError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| SessionError::Storage(format!("failed to open {}: {}", path.display(), e)))?;

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.map_err(|e| SessionError::Storage(format!("bad record: {}", e)))?;
        let mut fields = record.iter();

        let raw = fields.next().unwrap_or_default();
        let timestamp = parse_timestamp(raw).ok_or_else(|| {
            SessionError::Storage(format!("row {}: bad timestamp '{}'", line + 1, raw))
        })?;
        let values = fields
            .map(|f| f.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SessionError::Storage(format!("row {}: {}", line + 1, e)))?;

        rows.push(RecordedRow { timestamp, values });
    }
    Ok(rows)
}

/// Persist every body in `buffer` under `prefix` and write the metadata sidecar.
///
/// Each body gets its own record, even when it has no rows. Loss warnings
/// are advisory and returned in the result; they never fail the write.
pub fn write_recording(
    prefix: &Path,
    buffer: SampleBuffer,
    info: &RecordingInfo,
) -> Result<RecordingResult, SessionError> {
    let mut summaries = Vec::with_capacity(buffer.records().len());
    let mut warnings = Vec::new();

    for record in buffer.into_records() {
        let path = record_path(prefix, &record.name);
        write_body_record(&path, &record)?;
        let checksum = sha256_file(&path)?;

        let rows = record.rows.len();
        let (lost_rows, needs_recapture) = audit_loss(&record);
        if needs_recapture {
            let warning = format!(
                "More than a third of the motion capture data for {} is lost. Consider recapturing this trial!",
                record.name
            );
            log::warn!("{}", warning);
            warnings.push(warning);
        }

        log::info!("Wrote {} row(s) for '{}' to {}", rows, record.name, path.display());
        summaries.push(BodyRecordSummary {
            body: record.name,
            kind: record.kind,
            file_path: path.to_string_lossy().into_owned(),
            rows,
            lost_rows,
            loss_fraction: if rows == 0 {
                0.0
            } else {
                lost_rows as f64 / rows as f64
            },
            needs_recapture,
            checksum,
        });
    }

    let metadata = RecordingMetadata::new(
        &info.source_id,
        info.starting_angle.degrees(),
        info.packet_count,
        info.duration_secs,
        summaries,
    );
    let metadata_path = metadata::write_metadata(&metadata, prefix)?;

    Ok(RecordingResult {
        metadata_path,
        metadata,
        warnings,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local.from_local_datetime(&naive).earliest()
}

fn write_error(e: csv::Error) -> SessionError {
    SessionError::Storage(format!("write failed: {}", e))
}

/// SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, SessionError> {
    let data = fs::read(path)
        .map_err(|e| SessionError::Storage(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&Sha256::digest(&data)))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
