use crate::config::SettingField;
use legato_domain_eval::PerformanceReport;
use legato_ports::storage::SettingsDto;
use legato_ports::types::{DeviceId, MidiInputDevice, Seconds};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    LoadReference { path: String },
    UpdateSetting { field: SettingField, value: String },
    SelectMidiInput { device_id: DeviceId },
    ListMidiInputs,
    Start,
    Stop,
    DismissReport,
    ExportDiagnostics { path: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Countdown,
    Recording,
    Reporting,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    SessionStateChanged { state: SessionState },
    ReferenceLoaded {
        notes: usize,
        pedal_intervals: usize,
        total_duration: Seconds,
        bars: u32,
    },
    /// Count-in cue `beat` of `of`, 1-based.
    CountIn { beat: u32, of: u32 },
    ReportReady { report: PerformanceReport },
    PerformanceExported { path: String },
    MidiInputsUpdated { devices: Vec<MidiInputDevice> },
    SettingsUpdated { settings: SettingsDto },
}
