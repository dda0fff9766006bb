use crate::model::{Tick, TempoPoint};
use legato_ports::types::Seconds;

pub const DEFAULT_US_PER_QUARTER: u32 = 500_000;

/// Piecewise-constant tempo map for converting file ticks to wall time.
#[derive(Clone, Debug)]
pub struct TempoMap {
    ppq: u16,
    segments: Vec<TempoSegment>,
}

#[derive(Clone, Copy, Debug)]
struct TempoSegment {
    start_tick: Tick,
    start_us: i64,
    us_per_quarter: u32,
}

impl TempoMap {
    pub fn new(ppq: u16, mut points: Vec<TempoPoint>) -> Self {
        let ppq = ppq.max(1);
        points.sort_by_key(|p| p.tick);
        if points.is_empty() || points[0].tick != 0 {
            points.insert(
                0,
                TempoPoint {
                    tick: 0,
                    us_per_quarter: DEFAULT_US_PER_QUARTER,
                },
            );
        }

        let mut segments = Vec::with_capacity(points.len());
        let mut current_us = 0i64;
        for (idx, point) in points.iter().enumerate() {
            if idx > 0 {
                let prev = &points[idx - 1];
                let delta_ticks = point.tick - prev.tick;
                current_us += ticks_to_us(delta_ticks, prev.us_per_quarter, ppq);
            }
            segments.push(TempoSegment {
                start_tick: point.tick,
                start_us: current_us,
                us_per_quarter: point.us_per_quarter.max(1),
            });
        }

        Self { ppq, segments }
    }

    /// Map with a single constant tempo.
    pub fn constant(ppq: u16, bpm: u32) -> Self {
        Self::new(
            ppq,
            vec![TempoPoint {
                tick: 0,
                us_per_quarter: bpm_to_us_per_quarter(bpm),
            }],
        )
    }

    pub fn ppq(&self) -> u16 {
        self.ppq
    }

    /// Tempo in effect at tick 0, in quarter notes per minute.
    pub fn initial_bpm(&self) -> f64 {
        60_000_000.0 / self.segments[0].us_per_quarter as f64
    }

    pub fn tick_to_micros(&self, tick: Tick) -> i64 {
        let seg = self.segment_for_tick(tick);
        let delta_ticks = tick - seg.start_tick;
        seg.start_us + ticks_to_us(delta_ticks, seg.us_per_quarter, self.ppq)
    }

    pub fn tick_to_seconds(&self, tick: Tick) -> Seconds {
        self.tick_to_micros(tick) as f64 / 1_000_000.0
    }

    pub fn micros_to_tick(&self, micros: i64) -> Tick {
        let seg = self.segment_for_micros(micros);
        let delta_us = micros - seg.start_us;
        seg.start_tick + us_to_ticks(delta_us, seg.us_per_quarter, self.ppq)
    }

    pub fn seconds_to_tick(&self, seconds: Seconds) -> Tick {
        self.micros_to_tick((seconds * 1_000_000.0).round() as i64)
    }

    fn segment_for_tick(&self, tick: Tick) -> TempoSegment {
        let mut current = self.segments[0];
        for seg in &self.segments {
            if seg.start_tick > tick {
                break;
            }
            current = *seg;
        }
        current
    }

    fn segment_for_micros(&self, micros: i64) -> TempoSegment {
        let mut current = self.segments[0];
        for seg in &self.segments {
            if seg.start_us > micros {
                break;
            }
            current = *seg;
        }
        current
    }
}

pub fn bpm_to_us_per_quarter(bpm: u32) -> u32 {
    60_000_000 / bpm.max(1)
}

fn ticks_to_us(ticks: Tick, us_per_quarter: u32, ppq: u16) -> i64 {
    let ticks = ticks as i128;
    let us_per_quarter = us_per_quarter as i128;
    let ppq = ppq as i128;
    ((ticks * us_per_quarter) / ppq) as i64
}

fn us_to_ticks(us: i64, us_per_quarter: u32, ppq: u16) -> Tick {
    let us = us as i128;
    let us_per_quarter = us_per_quarter as i128;
    let ppq = ppq as i128;
    ((us * ppq + us_per_quarter / 2) / us_per_quarter) as Tick
}
