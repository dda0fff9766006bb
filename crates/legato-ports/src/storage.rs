use crate::types::*;
use serde::{Deserialize, Serialize};

fn default_bpm() -> u32 {
    108
}

fn default_time_tolerance_s() -> f64 {
    0.2
}

fn default_velocity_tolerance() -> u8 {
    20
}

fn default_pedal_start_tolerance_s() -> f64 {
    2.0
}

fn default_pedal_duration_tolerance_s() -> f64 {
    0.2
}

fn default_countdown_beats() -> u32 {
    4
}

fn default_cue_enabled() -> bool {
    true
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

/// Whether one reference note may be matched by several student notes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceReuse {
    #[default]
    Shared,
    Exclusive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeSettings {
    #[serde(default = "default_bpm")]
    pub bpm: u32,
    #[serde(default = "default_time_tolerance_s")]
    pub time_tolerance_s: f64,
    #[serde(default = "default_velocity_tolerance")]
    pub velocity_tolerance: u8,
    #[serde(default = "default_pedal_start_tolerance_s")]
    pub pedal_start_tolerance_s: f64,
    #[serde(default = "default_pedal_duration_tolerance_s")]
    pub pedal_duration_tolerance_s: f64,
    #[serde(default = "default_countdown_beats")]
    pub countdown_beats: u32,
    pub input_offset_ms: i32,
    pub reference_reuse: ReferenceReuse,
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self {
            bpm: default_bpm(),
            time_tolerance_s: default_time_tolerance_s(),
            velocity_tolerance: default_velocity_tolerance(),
            pedal_start_tolerance_s: default_pedal_start_tolerance_s(),
            pedal_duration_tolerance_s: default_pedal_duration_tolerance_s(),
            countdown_beats: default_countdown_beats(),
            input_offset_ms: 0,
            reference_reuse: ReferenceReuse::Shared,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    pub selected_midi_in: Option<DeviceId>,
    pub selected_audio_out: Option<DeviceId>,
    pub reference_path: Option<String>,
    pub export_dir: Option<String>,
    #[serde(default = "default_cue_enabled")]
    pub cue_enabled: bool,
    pub practice: PracticeSettings,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            selected_midi_in: None,
            selected_audio_out: None,
            reference_path: None,
            export_dir: None,
            cue_enabled: true,
            practice: PracticeSettings::default(),
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;
}
