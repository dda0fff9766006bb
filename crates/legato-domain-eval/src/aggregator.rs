use crate::model::{Classification, ComboState, NoteScore};
use crate::report::{BarReport, ClassificationCounts, FeedbackTier, PedalStats, PerformanceReport};
use legato_ports::types::Seconds;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ScoreSums {
    pitch: f64,
    velocity: f64,
    timing: f64,
    duration: f64,
    matched: u32,
}

/// Running score sums for one recording session.
#[derive(Clone, Debug, Default)]
pub struct ScoreAggregator {
    bars: BTreeMap<u32, ScoreSums>,
    overall: ScoreSums,
    note_count: u32,
    notes_analyzed: u32,
    combo: ComboState,
    classifications: ClassificationCounts,
    pedal: PedalStats,
}

impl ScoreAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Adds the pitch/velocity/timing components of a matched note.
    pub fn record(&mut self, score: &NoteScore, bar: u32) {
        for sums in [self.bars.entry(bar).or_default(), &mut self.overall] {
            sums.pitch += score.pitch;
            sums.velocity += score.velocity;
            sums.timing += score.timing;
            sums.matched += 1;
        }
        self.note_count += 1;
    }

    pub fn record_duration(&mut self, duration_score: f64, bar: u32) {
        self.bars.entry(bar).or_default().duration += duration_score;
        self.overall.duration += duration_score;
        if duration_score > 0.0 {
            self.notes_analyzed += 1;
        }
    }

    pub fn record_unmatched(&mut self) {
        self.note_count += 1;
    }

    pub fn record_classification(&mut self, classification: Classification, at: Seconds) {
        match classification {
            Classification::Correct => {
                self.classifications.correct += 1;
                self.combo.hit(at);
            }
            Classification::TooHard => self.classifications.too_hard += 1,
            Classification::TooLight => self.classifications.too_light += 1,
            Classification::Incorrect => {
                self.classifications.incorrect += 1;
                self.combo.break_combo();
            }
        }
    }

    pub fn record_pedal(&mut self, matched: bool) {
        self.pedal.total += 1;
        if matched {
            self.pedal.correct += 1;
        }
        self.pedal.results.push(matched);
    }

    pub fn combo(&self) -> ComboState {
        self.combo
    }

    pub fn snapshot(&self) -> PerformanceReport {
        let avg_pitch = ratio(self.overall.pitch, self.note_count);
        let avg_velocity = ratio(self.overall.velocity, self.overall.matched);
        let avg_timing = ratio(self.overall.timing, self.overall.matched);
        let avg_duration = ratio(self.overall.duration, self.overall.matched);
        let overall_average = (avg_pitch + avg_velocity + avg_timing + avg_duration) / 4.0;

        let bars = self
            .bars
            .iter()
            .map(|(&bar, sums)| BarReport {
                bar,
                matched_count: sums.matched,
                avg_pitch: ratio(sums.pitch, sums.matched),
                avg_velocity: ratio(sums.velocity, sums.matched),
                avg_timing: ratio(sums.timing, sums.matched),
                avg_duration: ratio(sums.duration, sums.matched),
            })
            .collect();

        PerformanceReport {
            note_count: self.note_count,
            matched_count: self.overall.matched,
            avg_pitch,
            avg_velocity,
            avg_timing,
            avg_duration,
            overall_average,
            detail_average: (avg_velocity + avg_timing + avg_duration) / 3.0,
            tier: FeedbackTier::from_average(overall_average),
            bars,
            combo: self.combo,
            pedal: self.pedal.clone(),
            classifications: self.classifications,
            notes_analyzed: self.notes_analyzed,
        }
    }
}

fn ratio(sum: f64, count: u32) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
