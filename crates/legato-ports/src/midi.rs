use crate::types::*;
use serde::{Deserialize, Serialize};

pub const STATUS_NOTE_OFF: u8 = 0x80;
pub const STATUS_NOTE_ON: u8 = 0x90;
pub const STATUS_CONTROL_CHANGE: u8 = 0xB0;
pub const SUSTAIN_CONTROLLER: u8 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiLikeEvent {
    NoteOn {
        note: u8,
        velocity: u8,
    },
    NoteOff {
        note: u8,
    },
    /// CC64: value 0..127
    Cc64 {
        value: u8,
    },
}

/// One channel-voice message as delivered by a polling input device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMidiMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl RawMidiMessage {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1,
            data2,
        }
    }

    pub fn from_bytes(message: &[u8]) -> Option<Self> {
        let status = *message.first()?;
        let data1 = message.get(1).copied().unwrap_or(0);
        let data2 = message.get(2).copied().unwrap_or(0);
        Some(Self::new(status, data1, data2))
    }

    /// Channel nibble is ignored. Controllers other than sustain map to None.
    pub fn to_event(&self) -> Option<MidiLikeEvent> {
        match self.status & 0xF0 {
            STATUS_NOTE_ON => {
                if self.data2 == 0 {
                    Some(MidiLikeEvent::NoteOff { note: self.data1 })
                } else {
                    Some(MidiLikeEvent::NoteOn {
                        note: self.data1,
                        velocity: self.data2,
                    })
                }
            }
            STATUS_NOTE_OFF => Some(MidiLikeEvent::NoteOff { note: self.data1 }),
            STATUS_CONTROL_CHANGE if self.data1 == SUSTAIN_CONTROLLER => {
                Some(MidiLikeEvent::Cc64 { value: self.data2 })
            }
            _ => None,
        }
    }
}

/// Captured event, timestamped relative to the recording epoch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub seconds: Seconds,
    pub event: MidiLikeEvent,
}

#[derive(thiserror::Error, Debug)]
pub enum MidiError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Polling-style input device. Implementations buffer whatever the backend
/// delivers until `read` drains it.
pub trait MidiInputSource: Send {
    fn poll(&mut self) -> Result<bool, MidiError>;

    fn read(&mut self, max_events: usize) -> Result<Vec<RawMidiMessage>, MidiError>;

    fn close(self: Box<Self>) {}
}

pub trait MidiInputPort: Send + Sync {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError>;

    fn open_input(&self, device_id: &DeviceId) -> Result<Box<dyn MidiInputSource>, MidiError>;

    /// Opens the first available input.
    fn open_default(&self) -> Result<Box<dyn MidiInputSource>, MidiError> {
        let device = self
            .list_inputs()?
            .into_iter()
            .find(|device| device.is_available)
            .ok_or_else(|| MidiError::DeviceNotFound("no midi input".to_string()))?;
        self.open_input(&device.id)
    }
}

/// Stand-in used when no input device could be opened: never has data.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMidiInput;

impl MidiInputSource for NullMidiInput {
    fn poll(&mut self) -> Result<bool, MidiError> {
        Ok(false)
    }

    fn read(&mut self, _max_events: usize) -> Result<Vec<RawMidiMessage>, MidiError> {
        Ok(Vec::new())
    }
}
