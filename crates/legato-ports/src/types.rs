use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall-clock seconds relative to a recording epoch or a track origin.
pub type Seconds = f64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MidiInputDevice {
    pub id: DeviceId,
    pub name: String,
    pub is_available: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioOutputDevice {
    pub id: DeviceId,
    pub name: String,
    pub sample_rate_hz: u32,
    pub channels: u16,
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
