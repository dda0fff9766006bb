use legato_domain_eval::PerformanceReport;
use legato_domain_score::{export_recording_path, MidiExportError};
use legato_ports::midi::RecordedEvent;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Receives the captured event log when a recording stops.
pub trait PerformanceExportSink: Send {
    /// Returns where the performance went, or `None` if nothing was written.
    fn export(&self, events: &[RecordedEvent], bpm: u32) -> Result<Option<PathBuf>, MidiExportError>;
}

pub trait ReportSink: Send {
    fn publish(&self, report: &PerformanceReport);
}

/// Writes `performance_<unix-secs>.mid` into a directory.
pub struct MidiFileExportSink {
    dir: PathBuf,
}

impl MidiFileExportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(unix_secs: u64) -> String {
        format!("performance_{unix_secs}.mid")
    }
}

impl PerformanceExportSink for MidiFileExportSink {
    fn export(&self, events: &[RecordedEvent], bpm: u32) -> Result<Option<PathBuf>, MidiExportError> {
        if events.is_empty() {
            return Ok(None);
        }
        let unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = self.dir.join(Self::file_name(unix_secs));
        export_recording_path(events, bpm, &path)?;
        info!(path = %path.display(), events = events.len(), "performance exported");
        Ok(Some(path))
    }
}

/// Report sink that writes the summary to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn publish(&self, report: &PerformanceReport) {
        info!(
            overall = report.overall_average,
            tier = ?report.tier,
            notes = report.note_count,
            matched = report.matched_count,
            max_combo = report.combo.max,
            "performance report"
        );
        for line in report.summary_text().lines() {
            info!("{line}");
        }
    }
}
