//! Export writers for recorded detections.
//!
//! Three formats over any `io::Write` sink:
//! - CSV: one row per record, fixed column order
//! - JSON: a single document with per-class statistics, the record count, and
//!   the full record list
//! - Report: human-readable text with a summary block and per-record entries
//!
//! Records and totals are copied out of the log in one lock acquisition and
//! written entirely outside it, so a failed write never disturbs the log.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::record::{timestamp_now, Detection, RecordLog};

/// Column order for CSV exports.
pub const CSV_HEADER: &str = "timestamp,frame_id,class,confidence,x1,y1,x2,y2";

const RULE_HEAVY: &str = "==================================================";
const RULE_LIGHT: &str = "--------------------------------------------------";

// ----------------------------------------------------------------------------
// Format selection
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Report,
}

impl ExportFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "report" | "txt" => Ok(Self::Report),
            other => Err(anyhow!(
                "unknown export format '{other}' (expected csv, json, or report)"
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Report => "txt",
        }
    }

    /// Timestamped default file name, e.g. `detections_20250825_153012.csv`.
    pub fn default_filename(&self) -> String {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        match self {
            Self::Csv | Self::Json => format!("detections_{stamp}.{}", self.extension()),
            Self::Report => format!("report_{stamp}.{}", self.extension()),
        }
    }
}

// ----------------------------------------------------------------------------
// Writers
// ----------------------------------------------------------------------------

/// JSON export document. Round-trips through serde, which the tests rely on.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportDocument {
    pub statistics: BTreeMap<String, u64>,
    pub total_detections: usize,
    pub detections: Vec<Detection>,
}

/// Write the log's records to `sink` in `format`. Returns the record count.
pub fn export(log: &RecordLog, sink: &mut dyn Write, format: ExportFormat) -> Result<usize> {
    let (records, totals) = log.export_snapshot()?;
    let count = records.len();
    match format {
        ExportFormat::Csv => write_csv(sink, &records)?,
        ExportFormat::Json => write_json(sink, records, totals)?,
        ExportFormat::Report => write_report(sink, &records, &totals)?,
    }
    Ok(count)
}

fn write_csv(sink: &mut dyn Write, records: &[Detection]) -> Result<()> {
    writeln!(sink, "{CSV_HEADER}")?;
    for det in records {
        let frame_id = det.frame_id.map(|id| id.to_string()).unwrap_or_default();
        let (x1, y1, x2, y2) = det.bbox;
        writeln!(
            sink,
            "{},{},{},{:.2},{},{},{},{}",
            det.timestamp, frame_id, det.label, det.confidence, x1, y1, x2, y2
        )?;
    }
    Ok(())
}

fn write_json(
    sink: &mut dyn Write,
    records: Vec<Detection>,
    totals: BTreeMap<String, u64>,
) -> Result<()> {
    let doc = ExportDocument {
        statistics: totals,
        total_detections: records.len(),
        detections: records,
    };
    serde_json::to_writer_pretty(sink, &doc).context("encoding detection export as json")
}

fn write_report(
    sink: &mut dyn Write,
    records: &[Detection],
    totals: &BTreeMap<String, u64>,
) -> Result<()> {
    writeln!(sink, "{RULE_HEAVY}")?;
    writeln!(sink, "Belt anchor-bolt detection report")?;
    writeln!(sink, "Generated: {}", timestamp_now())?;
    writeln!(sink, "{RULE_HEAVY}")?;
    writeln!(sink)?;

    writeln!(sink, "Summary:")?;
    writeln!(sink, "  total detections: {}", records.len())?;
    for (label, count) in totals {
        let share = if records.is_empty() {
            0.0
        } else {
            (*count as f64) * 100.0 / (records.len() as f64)
        };
        writeln!(sink, "  {label}: {count} ({share:.1}%)")?;
    }
    writeln!(sink)?;

    writeln!(sink, "{RULE_LIGHT}")?;
    writeln!(sink, "Detection records:")?;
    writeln!(sink, "{RULE_LIGHT}")?;
    for (i, det) in records.iter().enumerate() {
        let (x1, y1, x2, y2) = det.bbox;
        writeln!(sink)?;
        writeln!(sink, "#{}:", i + 1)?;
        writeln!(sink, "  time: {}", det.timestamp)?;
        if let Some(id) = det.frame_id {
            writeln!(sink, "  frame: {id}")?;
        }
        writeln!(sink, "  class: {}", det.label)?;
        writeln!(sink, "  confidence: {:.2}", det.confidence)?;
        writeln!(sink, "  box: ({x1}, {y1}) - ({x2}, {y2})")?;
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// File helpers
// ----------------------------------------------------------------------------

/// Export to an explicit path, creating parent directories as needed.
pub fn export_to_path(log: &RecordLog, path: &Path, format: ExportFormat) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating export directory {}", parent.display()))?;
        }
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("creating export file {}", path.display()))?;
    let written = export(log, &mut file, format)?;
    file.flush()?;
    Ok(written)
}

/// Export into `dir` under the format's timestamped default file name.
/// Returns the path written and the record count.
pub fn export_to_dir(
    log: &RecordLog,
    dir: &Path,
    format: ExportFormat,
) -> Result<(PathBuf, usize)> {
    let path = dir.join(format.default_filename());
    let written = export_to_path(log, &path, format)?;
    Ok((path, written))
}
