use crate::matcher::PedalTolerance;
use crate::model::PlayedPedal;
use legato_domain_score::PedalInterval;

pub struct PedalMatcher {
    tolerance: PedalTolerance,
}

impl PedalMatcher {
    pub fn new(tolerance: PedalTolerance) -> Self {
        Self { tolerance }
    }

    /// First reference interval within both tolerances, in track order.
    pub fn find_match(&self, pedal: &PlayedPedal, intervals: &[PedalInterval]) -> Option<usize> {
        intervals.iter().position(|interval| {
            (pedal.press - interval.press).abs() <= self.tolerance.start
                && (pedal.duration() - interval.duration()).abs() <= self.tolerance.duration
        })
    }
}
