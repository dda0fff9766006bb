use crate::model::ComboState;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackTier {
    Excellent,
    Great,
    Good,
    KeepPracticing,
}

impl FeedbackTier {
    pub fn from_average(average: f64) -> Self {
        if average >= 90.0 {
            Self::Excellent
        } else if average >= 80.0 {
            Self::Great
        } else if average >= 70.0 {
            Self::Good
        } else {
            Self::KeepPracticing
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent performance! Keep up the great work.",
            Self::Great => "Great job! A little more polish and it will shine.",
            Self::Good => "Good effort. Focus on the weaker areas below.",
            Self::KeepPracticing => "Keep practicing. Try a slower tempo first.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BarReport {
    pub bar: u32,
    pub matched_count: u32,
    pub avg_pitch: f64,
    pub avg_velocity: f64,
    pub avg_timing: f64,
    pub avg_duration: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PedalStats {
    pub total: u32,
    pub correct: u32,
    /// Per student pedal event, in capture order.
    pub results: Vec<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub correct: u32,
    pub too_hard: u32,
    pub too_light: u32,
    pub incorrect: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub note_count: u32,
    pub matched_count: u32,
    pub avg_pitch: f64,
    pub avg_velocity: f64,
    pub avg_timing: f64,
    pub avg_duration: f64,
    pub overall_average: f64,
    /// Mean of velocity, timing and duration; pitch is left out.
    pub detail_average: f64,
    pub tier: FeedbackTier,
    pub bars: Vec<BarReport>,
    pub combo: ComboState,
    pub pedal: PedalStats,
    pub classifications: ClassificationCounts,
    pub notes_analyzed: u32,
}

impl PerformanceReport {
    pub fn summary_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Overall score: {:.1}", self.overall_average);
        let _ = writeln!(out, "{}", self.tier.message());
        let _ = writeln!(
            out,
            "Notes: {} played, {} matched ({} analyzed for duration)",
            self.note_count, self.matched_count, self.notes_analyzed
        );
        let _ = writeln!(
            out,
            "Pitch {:.1} | Velocity {:.1} | Timing {:.1} | Duration {:.1} | Detail {:.1}",
            self.avg_pitch, self.avg_velocity, self.avg_timing, self.avg_duration, self.detail_average
        );
        let c = &self.classifications;
        let _ = writeln!(
            out,
            "Correct {} | Too hard {} | Too light {} | Incorrect {}",
            c.correct, c.too_hard, c.too_light, c.incorrect
        );
        let _ = writeln!(out, "Max combo: {}", self.combo.max);
        if self.pedal.total > 0 {
            let _ = writeln!(out, "Pedal: {}/{} correct", self.pedal.correct, self.pedal.total);
        }
        for bar in &self.bars {
            let _ = writeln!(
                out,
                "  bar {:>3}: {} matched, pitch {:.0} velocity {:.0} timing {:.0} duration {:.0}",
                bar.bar + 1,
                bar.matched_count,
                bar.avg_pitch,
                bar.avg_velocity,
                bar.avg_timing,
                bar.avg_duration
            );
        }
        out
    }
}
