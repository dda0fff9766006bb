use legato_ports::audio::CueSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

pub const TICK_INTERVAL: Duration = Duration::from_millis(1);

pub fn beat_interval(bpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / bpm.max(1) as f64)
}

/// Drift-corrected beat schedule. Beats are anchored to the start instant
/// rather than to when the previous cue actually fired.
#[derive(Clone, Copy, Debug)]
pub struct BeatClock {
    interval: Duration,
    next: Instant,
}

impl BeatClock {
    /// First beat is due at `start`.
    pub fn new(start: Instant, interval: Duration) -> Self {
        Self { interval, next: start }
    }

    pub fn next_beat(&self) -> Instant {
        self.next
    }

    /// True when a beat is due at `now`. Falling more than one interval
    /// behind skips the missed beats instead of firing them in a burst.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.interval;
        if now > self.next + self.interval {
            self.next = now + self.interval;
        }
        true
    }
}

/// Count-in before recording. Pure: driven by whatever instant the host
/// passes in, so it never blocks.
#[derive(Clone, Copy, Debug)]
pub struct Countdown {
    start: Instant,
    interval: Duration,
    beats: u32,
    cued: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountdownStep {
    /// 1-based numbers of cues that became due, `first..=last`.
    pub first: u32,
    pub last: u32,
    pub finished: bool,
}

impl CountdownStep {
    pub fn cues(&self) -> u32 {
        if self.last >= self.first {
            self.last - self.first + 1
        } else {
            0
        }
    }
}

impl Countdown {
    pub fn new(start: Instant, interval: Duration, beats: u32) -> Self {
        Self {
            start,
            interval,
            beats,
            cued: 0,
        }
    }

    pub fn beats(&self) -> u32 {
        self.beats
    }

    /// The instant the count-in ends and recording begins.
    pub fn end(&self) -> Instant {
        self.start + self.interval * self.beats
    }

    pub fn poll(&mut self, now: Instant) -> CountdownStep {
        let elapsed = now.saturating_duration_since(self.start);
        let due = if self.interval.is_zero() {
            self.beats
        } else {
            let whole = (elapsed.as_nanos() / self.interval.as_nanos()) as u64;
            (whole + 1).min(self.beats as u64) as u32
        };
        let step = CountdownStep {
            first: self.cued + 1,
            last: due.max(self.cued),
            finished: now >= self.end(),
        };
        self.cued = self.cued.max(due);
        step
    }
}

/// Cue thread for the recording phase.
pub struct Metronome {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Metronome {
    pub fn start(
        start: Instant,
        interval: Duration,
        sink: Arc<dyn CueSink>,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::Builder::new()
            .name("legato-metronome".to_string())
            .spawn(move || {
                let mut clock = BeatClock::new(start, interval);
                let mut beats = 0u64;
                while !stop_flag.load(Ordering::Acquire) {
                    if clock.poll(Instant::now()) {
                        sink.cue();
                        beats += 1;
                    }
                    thread::sleep(TICK_INTERVAL);
                }
                debug!(beats, "metronome stopped");
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.shutdown();
    }
}
