use legato_domain_eval::{MatchConfig, NoteTolerance, PedalTolerance};
use legato_ports::storage::{PracticeSettings, ReferenceReuse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_BPM: u32 = 4;
pub const MAX_BPM: u32 = 400;
pub const MAX_COUNTDOWN_BEATS: u32 = 16;
pub const MAX_INPUT_OFFSET_MS: i32 = 1_000;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown setting: {0}")]
    UnknownField(String),
    #[error("{field}: cannot parse {value:?}")]
    Parse { field: SettingField, value: String },
    #[error("{field}: {reason}")]
    OutOfRange {
        field: SettingField,
        reason: &'static str,
    },
}

/// A single editable practice parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingField {
    Bpm,
    TimeTolerance,
    VelocityTolerance,
    PedalStartTolerance,
    PedalDurationTolerance,
    CountdownBeats,
    InputOffsetMs,
    ReferenceReuse,
}

impl SettingField {
    pub const ALL: [SettingField; 8] = [
        SettingField::Bpm,
        SettingField::TimeTolerance,
        SettingField::VelocityTolerance,
        SettingField::PedalStartTolerance,
        SettingField::PedalDurationTolerance,
        SettingField::CountdownBeats,
        SettingField::InputOffsetMs,
        SettingField::ReferenceReuse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SettingField::Bpm => "bpm",
            SettingField::TimeTolerance => "time_tolerance",
            SettingField::VelocityTolerance => "velocity_tolerance",
            SettingField::PedalStartTolerance => "pedal_start_tolerance",
            SettingField::PedalDurationTolerance => "pedal_duration_tolerance",
            SettingField::CountdownBeats => "countdown_beats",
            SettingField::InputOffsetMs => "input_offset_ms",
            SettingField::ReferenceReuse => "reference_reuse",
        }
    }
}

impl fmt::Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingField {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        SettingField::ALL
            .into_iter()
            .find(|field| field.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownField(s.to_string()))
    }
}

/// Parses `text` into `field` on a copy of `settings`. The input is never
/// modified; on error the caller keeps what it had.
pub fn apply_setting_text(
    settings: &PracticeSettings,
    field: SettingField,
    text: &str,
) -> Result<PracticeSettings, ConfigError> {
    let text = text.trim();
    let mut next = settings.clone();
    match field {
        SettingField::Bpm => next.bpm = parse(field, text)?,
        SettingField::TimeTolerance => next.time_tolerance_s = parse(field, text)?,
        SettingField::VelocityTolerance => next.velocity_tolerance = parse(field, text)?,
        SettingField::PedalStartTolerance => next.pedal_start_tolerance_s = parse(field, text)?,
        SettingField::PedalDurationTolerance => {
            next.pedal_duration_tolerance_s = parse(field, text)?
        }
        SettingField::CountdownBeats => next.countdown_beats = parse(field, text)?,
        SettingField::InputOffsetMs => next.input_offset_ms = parse(field, text)?,
        SettingField::ReferenceReuse => {
            next.reference_reuse = match text.to_ascii_lowercase().as_str() {
                "shared" => ReferenceReuse::Shared,
                "exclusive" => ReferenceReuse::Exclusive,
                _ => {
                    return Err(ConfigError::Parse {
                        field,
                        value: text.to_string(),
                    })
                }
            }
        }
    }
    validate_settings(&next)?;
    Ok(next)
}

pub fn validate_settings(settings: &PracticeSettings) -> Result<(), ConfigError> {
    if !(MIN_BPM..=MAX_BPM).contains(&settings.bpm) {
        return Err(out_of_range(SettingField::Bpm, "must be between 4 and 400"));
    }
    check_positive(SettingField::TimeTolerance, settings.time_tolerance_s)?;
    if settings.velocity_tolerance > 127 {
        return Err(out_of_range(
            SettingField::VelocityTolerance,
            "must be between 0 and 127",
        ));
    }
    check_positive(SettingField::PedalStartTolerance, settings.pedal_start_tolerance_s)?;
    check_positive(
        SettingField::PedalDurationTolerance,
        settings.pedal_duration_tolerance_s,
    )?;
    if settings.countdown_beats > MAX_COUNTDOWN_BEATS {
        return Err(out_of_range(
            SettingField::CountdownBeats,
            "must be between 0 and 16",
        ));
    }
    if settings.input_offset_ms.abs() > MAX_INPUT_OFFSET_MS {
        return Err(out_of_range(
            SettingField::InputOffsetMs,
            "must be within 1000 ms either way",
        ));
    }
    Ok(())
}

pub fn match_config(settings: &PracticeSettings) -> MatchConfig {
    MatchConfig {
        note: NoteTolerance {
            time: settings.time_tolerance_s,
            velocity: settings.velocity_tolerance,
        },
        pedal: PedalTolerance {
            start: settings.pedal_start_tolerance_s,
            duration: settings.pedal_duration_tolerance_s,
        },
        reuse: settings.reference_reuse,
        bpm: settings.bpm,
    }
}

fn parse<T: FromStr>(field: SettingField, text: &str) -> Result<T, ConfigError> {
    text.parse().map_err(|_| ConfigError::Parse {
        field,
        value: text.to_string(),
    })
}

fn check_positive(field: SettingField, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(out_of_range(field, "must be a positive number of seconds"))
    }
}

fn out_of_range(field: SettingField, reason: &'static str) -> ConfigError {
    ConfigError::OutOfRange { field, reason }
}
