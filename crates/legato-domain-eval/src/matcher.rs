use crate::model::{Classification, NoteScore, PlayedNote};
use legato_domain_score::ReferenceTrack;
use legato_ports::storage::ReferenceReuse;
use legato_ports::types::Seconds;
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteTolerance {
    pub time: Seconds,
    pub velocity: u8,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PedalTolerance {
    pub start: Seconds,
    pub duration: Seconds,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchConfig {
    pub note: NoteTolerance,
    pub pedal: PedalTolerance,
    pub reuse: ReferenceReuse,
    pub bpm: u32,
}

impl MatchConfig {
    /// Length of a 4/4 bar.
    pub fn bar_duration(&self) -> Seconds {
        240.0 / self.bpm.max(1) as f64
    }

    pub fn bar_index(&self, onset: Seconds) -> u32 {
        (onset.max(0.0) / self.bar_duration()).floor() as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteVerdict {
    pub classification: Classification,
    /// Index into the track's notes; `None` when nothing qualified.
    pub reference: Option<usize>,
    pub score: Option<NoteScore>,
}

impl NoteVerdict {
    pub fn matched(&self) -> bool {
        self.reference.is_some()
    }

    fn unmatched() -> Self {
        Self {
            classification: Classification::Incorrect,
            reference: None,
            score: None,
        }
    }
}

pub struct NoteMatcher {
    tolerance: NoteTolerance,
    reuse: ReferenceReuse,
    claimed: HashSet<usize>,
}

impl NoteMatcher {
    pub fn new(tolerance: NoteTolerance, reuse: ReferenceReuse) -> Self {
        Self {
            tolerance,
            reuse,
            claimed: HashSet::new(),
        }
    }

    pub fn reset(&mut self) {
        self.claimed.clear();
    }

    pub fn judge(&mut self, note: &PlayedNote, track: &ReferenceTrack) -> NoteVerdict {
        let mut best: Option<(usize, Seconds)> = None;
        for (idx, candidate) in track.notes().iter().enumerate() {
            if candidate.pitch != note.pitch {
                continue;
            }
            if self.reuse == ReferenceReuse::Exclusive && self.claimed.contains(&idx) {
                continue;
            }
            let delta = (note.onset - candidate.start).abs();
            if delta > self.tolerance.time {
                continue;
            }
            // strict: ties keep the earlier reference note
            if best.map_or(true, |(_, best_delta)| delta < best_delta) {
                best = Some((idx, delta));
            }
        }

        let Some((idx, delta_t)) = best else {
            return NoteVerdict::unmatched();
        };
        if self.reuse == ReferenceReuse::Exclusive {
            self.claimed.insert(idx);
        }

        let reference = &track.notes()[idx];
        let delta_v = reference.velocity as i32 - note.velocity as i32;
        NoteVerdict {
            classification: classify_velocity(delta_v, self.tolerance.velocity),
            reference: Some(idx),
            score: Some(NoteScore {
                pitch: 100.0,
                velocity: velocity_score(delta_v),
                timing: timing_score(delta_t),
                duration: duration_score(note.duration(), reference.duration()),
            }),
        }
    }
}

/// `delta_v` is reference minus student velocity.
pub fn classify_velocity(delta_v: i32, tolerance: u8) -> Classification {
    let tolerance = tolerance as i32;
    if delta_v.abs() <= tolerance {
        Classification::Correct
    } else if delta_v < -tolerance {
        Classification::TooHard
    } else {
        Classification::TooLight
    }
}

pub fn timing_score(delta_t: Seconds) -> f64 {
    (100.0 - 200.0 * delta_t.abs()).max(0.0)
}

pub fn velocity_score(delta_v: i32) -> f64 {
    (100.0 - 2.0 * delta_v.abs() as f64).max(0.0)
}

/// Zero unless both durations are strictly positive.
pub fn duration_score(student: Seconds, reference: Seconds) -> f64 {
    if student <= 0.0 || reference <= 0.0 {
        return 0.0;
    }
    100.0 * (student / reference).min(reference / student)
}
