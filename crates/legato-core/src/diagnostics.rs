use legato_domain_eval::PerformanceReport;
use legato_domain_score::ReferenceTrack;
use legato_ports::midi::RecordedEvent;
use legato_ports::storage::{SettingsDto, StorageError};
use legato_ports::types::{AudioOutputDevice, MidiInputDevice};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct AppVersion {
    name: String,
    version: String,
}

#[derive(Serialize)]
struct PlatformInfo {
    os: String,
    arch: String,
}

#[derive(Serialize)]
struct DeviceSnapshot {
    midi_inputs: Vec<MidiInputDevice>,
    audio_outputs: Vec<AudioOutputDevice>,
}

#[derive(Serialize)]
struct ReferenceSummary {
    notes: usize,
    pedal_intervals: usize,
    total_duration: f64,
    original_bpm: f64,
    target_bpm: u32,
}

pub struct DiagnosticsInput<'a> {
    pub settings: &'a SettingsDto,
    pub midi_inputs: Vec<MidiInputDevice>,
    pub audio_outputs: Vec<AudioOutputDevice>,
    pub reference: &'a ReferenceTrack,
    pub recorded: &'a [RecordedEvent],
    pub report: Option<&'a PerformanceReport>,
}

/// Dumps settings, devices, the loaded reference and the last session
/// into `dir` as JSON files.
pub fn export_diagnostics(dir: &Path, input: DiagnosticsInput<'_>) -> Result<(), StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::Io(e.to_string()))?;

    let app_version = AppVersion {
        name: "Legato".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let platform = PlatformInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    };

    write_json(&dir.join("app_version.json"), &app_version)?;
    write_json(&dir.join("platform.json"), &platform)?;
    write_json(&dir.join("settings.json"), input.settings)?;
    write_json(
        &dir.join("device_snapshot.json"),
        &DeviceSnapshot {
            midi_inputs: input.midi_inputs,
            audio_outputs: input.audio_outputs,
        },
    )?;
    write_json(
        &dir.join("reference.json"),
        &ReferenceSummary {
            notes: input.reference.notes().len(),
            pedal_intervals: input.reference.pedal_intervals().len(),
            total_duration: input.reference.total_duration(),
            original_bpm: input.reference.original_bpm(),
            target_bpm: input.reference.target_bpm(),
        },
    )?;
    write_json(&dir.join("recorded_events.json"), &input.recorded)?;
    if let Some(report) = input.report {
        write_json(&dir.join("last_report.json"), report)?;
    }

    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
    fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))
}
