use legato_ports::types::Seconds;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Correct,
    /// Played louder than the reference.
    TooHard,
    /// Played softer than the reference.
    TooLight,
    Incorrect,
}

/// A key press captured from the performer, onset to release.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayedNote {
    pub pitch: u8,
    pub onset: Seconds,
    pub release: Seconds,
    pub velocity: u8,
}

impl PlayedNote {
    pub fn duration(&self) -> Seconds {
        self.release - self.onset
    }
}

/// A key that is still down. Published for display only; never judged.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeldNote {
    pub pitch: u8,
    pub onset: Seconds,
    pub velocity: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayedPedal {
    pub press: Seconds,
    pub release: Seconds,
}

impl PlayedPedal {
    pub fn duration(&self) -> Seconds {
        self.release - self.press
    }
}

/// A finalized, judged student note. `score` is `None` when no reference
/// note qualified.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudentNote {
    pub pitch: u8,
    pub onset: Seconds,
    pub release: Seconds,
    pub velocity: u8,
    pub matched: bool,
    pub classification: Classification,
    pub bar: u32,
    pub score: Option<NoteScore>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PedalEvent {
    pub press: Seconds,
    pub release: Seconds,
    pub matched: bool,
}

/// Per-note score components, each in 0..=100.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteScore {
    pub pitch: f64,
    pub velocity: f64,
    pub timing: f64,
    pub duration: f64,
}

/// Streak of consecutive correct notes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComboState {
    pub current: u32,
    pub max: u32,
    /// Recording-relative time of the last increment.
    pub last_increment: Option<Seconds>,
}

impl ComboState {
    pub fn hit(&mut self, at: Seconds) {
        self.current += 1;
        self.max = self.max.max(self.current);
        self.last_increment = Some(at);
    }

    pub fn break_combo(&mut self) {
        self.current = 0;
        self.last_increment = None;
    }
}
