use crate::aggregator::ScoreAggregator;
use crate::matcher::{MatchConfig, NoteMatcher};
use crate::model::{ComboState, PedalEvent, PlayedNote, PlayedPedal, StudentNote};
use crate::pedal::PedalMatcher;
use crate::report::PerformanceReport;
use legato_domain_score::ReferenceTrack;
use std::sync::Arc;
use tracing::debug;

/// Judges finalized notes and pedal events against one reference track.
/// Owns everything a session mutates, including the raw take so it can be
/// judged again under other tolerances.
pub struct Judge {
    cfg: MatchConfig,
    track: Arc<ReferenceTrack>,
    notes: NoteMatcher,
    pedals: PedalMatcher,
    aggregator: ScoreAggregator,
    student_notes: Vec<StudentNote>,
    student_pedals: Vec<PedalEvent>,
    played_notes: Vec<PlayedNote>,
    played_pedals: Vec<PlayedPedal>,
}

impl Judge {
    pub fn new(cfg: MatchConfig, track: Arc<ReferenceTrack>) -> Self {
        Self {
            notes: NoteMatcher::new(cfg.note, cfg.reuse),
            pedals: PedalMatcher::new(cfg.pedal),
            cfg,
            track,
            aggregator: ScoreAggregator::new(),
            student_notes: Vec::new(),
            student_pedals: Vec::new(),
            played_notes: Vec::new(),
            played_pedals: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.notes.reset();
        self.aggregator.reset();
        self.student_notes.clear();
        self.student_pedals.clear();
        self.played_notes.clear();
        self.played_pedals.clear();
    }

    pub fn config(&self) -> &MatchConfig {
        &self.cfg
    }

    pub fn track(&self) -> &Arc<ReferenceTrack> {
        &self.track
    }

    /// Replays this take through a fresh judge with `cfg` on the same track.
    pub fn rejudge(&self, cfg: MatchConfig) -> Judge {
        let mut judge = Judge::new(cfg, self.track.clone());
        for note in &self.played_notes {
            judge.on_note(*note);
        }
        for pedal in &self.played_pedals {
            judge.on_pedal(*pedal);
        }
        judge
    }

    pub fn on_note(&mut self, played: PlayedNote) -> StudentNote {
        self.played_notes.push(played);
        let verdict = self.notes.judge(&played, &self.track);
        let bar = self.cfg.bar_index(played.onset);

        match verdict.score {
            Some(score) => {
                self.aggregator.record(&score, bar);
                self.aggregator.record_duration(score.duration, bar);
            }
            None => self.aggregator.record_unmatched(),
        }
        self.aggregator
            .record_classification(verdict.classification, played.onset);

        let note = StudentNote {
            pitch: played.pitch,
            onset: played.onset,
            release: played.release,
            velocity: played.velocity,
            matched: verdict.matched(),
            classification: verdict.classification,
            bar,
            score: verdict.score,
        };
        self.student_notes.push(note);
        debug!(
            pitch = note.pitch,
            onset = note.onset,
            bar,
            classification = ?note.classification,
            "note judged"
        );

        note
    }

    pub fn on_pedal(&mut self, played: PlayedPedal) -> PedalEvent {
        self.played_pedals.push(played);
        let matched = self
            .pedals
            .find_match(&played, self.track.pedal_intervals())
            .is_some();
        self.aggregator.record_pedal(matched);

        let pedal = PedalEvent {
            press: played.press,
            release: played.release,
            matched,
        };
        self.student_pedals.push(pedal);
        pedal
    }

    pub fn notes(&self) -> &[StudentNote] {
        &self.student_notes
    }

    pub fn pedals(&self) -> &[PedalEvent] {
        &self.student_pedals
    }

    pub fn combo(&self) -> ComboState {
        self.aggregator.combo()
    }

    pub fn report(&self) -> PerformanceReport {
        self.aggregator.snapshot()
    }
}
