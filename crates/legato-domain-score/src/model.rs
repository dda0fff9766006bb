use legato_ports::types::Seconds;
use serde::{Deserialize, Serialize};

pub type Tick = i64; // musical time, monotonic in a source file

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceNote {
    pub pitch: u8,
    pub start: Seconds,
    pub end: Seconds,
    pub velocity: u8,
}

impl ReferenceNote {
    pub fn duration(&self) -> Seconds {
        self.end - self.start
    }
}

/// Sustain pedal held from `press` to `release`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PedalInterval {
    pub press: Seconds,
    pub release: Seconds,
}

impl PedalInterval {
    pub fn duration(&self) -> Seconds {
        self.release - self.press
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub tick: Tick,
    pub us_per_quarter: u32,
}

/// Tempo-normalized piece to be played. Times are zeroed at the first note
/// onset and already scaled to the target BPM.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrack {
    notes: Vec<ReferenceNote>,
    pedal_intervals: Vec<PedalInterval>,
    total_duration: Seconds,
    original_bpm: f64,
    target_bpm: u32,
    tempo_ratio: f64,
}

impl ReferenceTrack {
    pub fn empty(target_bpm: u32) -> Self {
        Self {
            notes: Vec::new(),
            pedal_intervals: Vec::new(),
            total_duration: 0.0,
            original_bpm: target_bpm as f64,
            target_bpm,
            tempo_ratio: 1.0,
        }
    }

    /// Builds a track from source-time notes and pedal control values
    /// `(seconds, value)`: scales by `original_bpm / target_bpm`, then shifts
    /// everything so the earliest note starts at zero.
    pub fn normalize(
        notes: Vec<ReferenceNote>,
        pedal_controls: &[(Seconds, u8)],
        original_bpm: f64,
        target_bpm: u32,
    ) -> Self {
        if notes.is_empty() {
            return Self::empty(target_bpm);
        }

        let tempo_ratio = original_bpm / target_bpm.max(1) as f64;
        let first_start = notes
            .iter()
            .map(|note| note.start * tempo_ratio)
            .fold(f64::INFINITY, f64::min);

        let mut notes: Vec<ReferenceNote> = notes
            .into_iter()
            .map(|note| ReferenceNote {
                pitch: note.pitch,
                start: note.start * tempo_ratio - first_start,
                end: note.end * tempo_ratio - first_start,
                velocity: note.velocity,
            })
            .collect();
        notes.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.pitch.cmp(&b.pitch)));

        let mut controls: Vec<(Seconds, u8)> = pedal_controls
            .iter()
            .map(|(time, value)| (time * tempo_ratio - first_start, *value))
            .collect();
        controls.sort_by(|a, b| a.0.total_cmp(&b.0));
        let pedal_intervals = pedal_intervals_from_controls(&controls);

        Self::assemble(notes, pedal_intervals, original_bpm, target_bpm, tempo_ratio)
    }

    /// Track from already-normalized notes and intervals, e.g. for tests or
    /// generated exercises. Times are still zeroed at the first onset.
    pub fn from_notes(
        notes: Vec<ReferenceNote>,
        pedal_intervals: Vec<PedalInterval>,
        bpm: u32,
    ) -> Self {
        if notes.is_empty() {
            return Self::empty(bpm);
        }
        let first_start = notes.iter().map(|n| n.start).fold(f64::INFINITY, f64::min);
        let mut notes: Vec<ReferenceNote> = notes
            .into_iter()
            .map(|note| ReferenceNote {
                start: note.start - first_start,
                end: note.end - first_start,
                ..note
            })
            .collect();
        notes.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.pitch.cmp(&b.pitch)));

        let mut pedal_intervals: Vec<PedalInterval> = pedal_intervals
            .into_iter()
            .map(|interval| PedalInterval {
                press: interval.press - first_start,
                release: interval.release - first_start,
            })
            .collect();
        pedal_intervals.sort_by(|a, b| a.press.total_cmp(&b.press));

        Self::assemble(notes, pedal_intervals, bpm as f64, bpm, 1.0)
    }

    fn assemble(
        notes: Vec<ReferenceNote>,
        pedal_intervals: Vec<PedalInterval>,
        original_bpm: f64,
        target_bpm: u32,
        tempo_ratio: f64,
    ) -> Self {
        let last_note = notes.iter().map(|n| n.end).fold(0.0, f64::max);
        let last_pedal = pedal_intervals.iter().map(|p| p.release).fold(0.0, f64::max);
        Self {
            notes,
            pedal_intervals,
            total_duration: last_note.max(last_pedal),
            original_bpm,
            target_bpm,
            tempo_ratio,
        }
    }

    pub fn notes(&self) -> &[ReferenceNote] {
        &self.notes
    }

    pub fn pedal_intervals(&self) -> &[PedalInterval] {
        &self.pedal_intervals
    }

    pub fn total_duration(&self) -> Seconds {
        self.total_duration
    }

    pub fn original_bpm(&self) -> f64 {
        self.original_bpm
    }

    pub fn target_bpm(&self) -> u32 {
        self.target_bpm
    }

    pub fn tempo_ratio(&self) -> f64 {
        self.tempo_ratio
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Re-normalizes the same piece for another target tempo. Times stay
    /// zeroed at the first onset since scaling preserves zero.
    pub fn retarget(&self, target_bpm: u32) -> Self {
        if self.notes.is_empty() {
            return Self::empty(target_bpm);
        }
        let tempo_ratio = self.original_bpm / target_bpm.max(1) as f64;
        let scale = tempo_ratio / self.tempo_ratio;
        let notes = self
            .notes
            .iter()
            .map(|note| ReferenceNote {
                start: note.start * scale,
                end: note.end * scale,
                ..*note
            })
            .collect();
        let pedal_intervals = self
            .pedal_intervals
            .iter()
            .map(|interval| PedalInterval {
                press: interval.press * scale,
                release: interval.release * scale,
            })
            .collect();
        Self::assemble(
            notes,
            pedal_intervals,
            self.original_bpm,
            target_bpm,
            tempo_ratio,
        )
    }

    /// Number of 4/4 bars needed to cover the whole track at `bpm`.
    pub fn bar_count(&self, bpm: u32) -> u32 {
        if self.notes.is_empty() {
            return 0;
        }
        let bar = 240.0 / bpm.max(1) as f64;
        (self.total_duration / bar).floor() as u32 + 1
    }
}

/// Pairs each sustain press (value >= 64) with the next release (< 64).
/// Input must be chronological. Presses while already down are ignored and a
/// trailing press without release is dropped.
pub fn pedal_intervals_from_controls(controls: &[(Seconds, u8)]) -> Vec<PedalInterval> {
    let mut intervals = Vec::new();
    let mut pressed_at: Option<Seconds> = None;

    for &(time, value) in controls {
        if value >= 64 {
            if pressed_at.is_none() {
                pressed_at = Some(time);
            }
        } else if let Some(press) = pressed_at.take() {
            intervals.push(PedalInterval {
                press,
                release: time,
            });
        }
    }

    intervals
}
