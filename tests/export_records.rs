use std::io::{self, Write};

use anyhow::Result;
use beltwatch::export::{export, ExportDocument, CSV_HEADER};
use beltwatch::{export_to_dir, ExportFormat, RecordLog};
use beltwatch::record::Detection;
use tempfile::tempdir;

fn seeded_log() -> Result<RecordLog> {
    let log = RecordLog::new();
    log.record(
        &[
            Detection::new("bolt", 0.91, (40, 40, 200, 160)),
            Detection::new("bolt", 0.57, (300, 80, 420, 190)),
        ],
        1,
    )?;
    log.record(&[Detection::new("clamp", 0.73, (12, 300, 96, 388))], 2)?;
    Ok(log)
}

/// Sink whose first write fails, for exercising the error path.
struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn json_export_round_trips_records_and_statistics() -> Result<()> {
    let log = seeded_log()?;
    let mut sink = Vec::new();

    let written = export(&log, &mut sink, ExportFormat::Json)?;
    assert_eq!(written, 3);

    let doc: ExportDocument = serde_json::from_slice(&sink)?;
    assert_eq!(doc.total_detections, 3);
    assert_eq!(doc.statistics.get("bolt"), Some(&2));
    assert_eq!(doc.statistics.get("clamp"), Some(&1));

    let first = &doc.detections[0];
    assert_eq!(first.label, "bolt");
    assert!((first.confidence - 0.91).abs() < f32::EPSILON);
    assert_eq!(first.bbox, (40, 40, 200, 160));
    assert_eq!(first.frame_id, Some(1));
    Ok(())
}

#[test]
fn json_serializes_the_label_as_class_name() -> Result<()> {
    let log = seeded_log()?;
    let mut sink = Vec::new();
    export(&log, &mut sink, ExportFormat::Json)?;

    let text = String::from_utf8(sink)?;
    assert!(text.contains("\"class_name\": \"bolt\""));
    assert!(!text.contains("\"label\""));
    Ok(())
}

#[test]
fn csv_export_has_a_header_and_one_row_per_record() -> Result<()> {
    let log = seeded_log()?;
    let mut sink = Vec::new();
    export(&log, &mut sink, ExportFormat::Csv)?;

    let text = String::from_utf8(sink)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], CSV_HEADER);
    assert!(lines[1].contains(",bolt,0.91,40,40,200,160"));
    assert!(lines[3].contains(",2,clamp,0.73,"));
    Ok(())
}

#[test]
fn report_summarizes_classes_and_lists_every_record() -> Result<()> {
    let log = seeded_log()?;
    let mut sink = Vec::new();
    export(&log, &mut sink, ExportFormat::Report)?;

    let text = String::from_utf8(sink)?;
    assert!(text.contains("Belt anchor-bolt detection report"));
    assert!(text.contains("total detections: 3"));
    assert!(text.contains("bolt: 2 (66.7%)"));
    assert!(text.contains("clamp: 1 (33.3%)"));
    assert!(text.contains("#3:"));
    assert!(text.contains("box: (12, 300) - (96, 388)"));
    Ok(())
}

#[test]
fn failed_sink_leaves_the_log_untouched() -> Result<()> {
    let log = seeded_log()?;

    assert!(export(&log, &mut FailingSink, ExportFormat::Csv).is_err());
    assert_eq!(log.len()?, 3);

    // A later export over a healthy sink still sees every record.
    let mut sink = Vec::new();
    assert_eq!(export(&log, &mut sink, ExportFormat::Csv)?, 3);
    Ok(())
}

#[test]
fn export_to_dir_creates_the_results_tree() -> Result<()> {
    let log = seeded_log()?;
    let dir = tempdir()?;
    let nested = dir.path().join("results").join("shift_a");

    let (path, written) = export_to_dir(&log, &nested, ExportFormat::Json)?;
    assert_eq!(written, 3);
    assert!(path.exists());

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    assert!(name.starts_with("detections_"));
    assert!(name.ends_with(".json"));

    let (report_path, _) = export_to_dir(&log, &nested, ExportFormat::Report)?;
    let report_name = report_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    assert!(report_name.starts_with("report_"));
    assert!(report_name.ends_with(".txt"));
    Ok(())
}

#[test]
fn empty_log_exports_cleanly() -> Result<()> {
    let log = RecordLog::new();
    let mut sink = Vec::new();

    assert_eq!(export(&log, &mut sink, ExportFormat::Json)?, 0);
    let doc: ExportDocument = serde_json::from_slice(&sink)?;
    assert_eq!(doc.total_detections, 0);
    assert!(doc.detections.is_empty());
    Ok(())
}

#[test]
fn format_names_are_parsed_case_insensitively() -> Result<()> {
    assert_eq!(ExportFormat::from_name("CSV")?, ExportFormat::Csv);
    assert_eq!(ExportFormat::from_name(" json ")?, ExportFormat::Json);
    assert_eq!(ExportFormat::from_name("txt")?, ExportFormat::Report);
    assert!(ExportFormat::from_name("xml").is_err());
    Ok(())
}
