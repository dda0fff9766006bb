use legato_core::{beat_interval, BeatClock, Countdown, CountdownStep, Metronome};
use legato_ports::audio::CueSink;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const BEAT: Duration = Duration::from_millis(500);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn first_beat_fires_at_start() {
    let start = Instant::now();
    let mut clock = BeatClock::new(start, BEAT);

    assert!(clock.poll(start));
    assert!(!clock.poll(start + ms(499)));
    assert!(clock.poll(start + ms(500)));
    assert_eq!(clock.next_beat(), start + ms(1000));
}

#[test]
fn late_poll_keeps_grid_when_within_one_beat() {
    let start = Instant::now();
    let mut clock = BeatClock::new(start, BEAT);
    clock.poll(start);

    assert!(clock.poll(start + ms(620)));
    assert_eq!(clock.next_beat(), start + ms(1000));
}

#[test]
fn falling_far_behind_resyncs_instead_of_bursting() {
    let start = Instant::now();
    let mut clock = BeatClock::new(start, BEAT);
    clock.poll(start);

    let late = start + ms(2_100);
    assert!(clock.poll(late));
    assert_eq!(clock.next_beat(), late + BEAT);
    assert!(!clock.poll(late + ms(10)));
}

#[test]
fn countdown_cues_on_each_beat_then_finishes() {
    let start = Instant::now();
    let mut countdown = Countdown::new(start, BEAT, 4);

    let step = countdown.poll(start);
    assert_eq!(
        step,
        CountdownStep {
            first: 1,
            last: 1,
            finished: false,
        }
    );
    assert_eq!(countdown.poll(start + ms(100)).cues(), 0);
    assert_eq!(countdown.poll(start + ms(500)).cues(), 1);

    let step = countdown.poll(start + ms(1_700));
    assert_eq!((step.first, step.last, step.finished), (3, 4, false));

    let step = countdown.poll(start + ms(2_000));
    assert_eq!(step.cues(), 0);
    assert!(step.finished);
    assert_eq!(countdown.end(), start + ms(2_000));
}

#[test]
fn zero_beat_countdown_finishes_immediately() {
    let start = Instant::now();
    let mut countdown = Countdown::new(start, BEAT, 0);

    let step = countdown.poll(start);
    assert_eq!(step.cues(), 0);
    assert!(step.finished);
}

#[test]
fn beat_interval_follows_bpm() {
    assert_eq!(beat_interval(120), BEAT);
    assert_eq!(beat_interval(60), Duration::from_secs(1));
}

#[derive(Default)]
struct CountingCue(AtomicUsize);

impl CueSink for CountingCue {
    fn cue(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn metronome_thread_cues_and_stops() {
    let cue = Arc::new(CountingCue::default());
    let metronome = Metronome::start(Instant::now(), ms(20), cue.clone()).unwrap();

    thread::sleep(ms(110));
    metronome.stop();
    let after_stop = cue.0.load(Ordering::SeqCst);
    assert!(after_stop >= 2, "only {after_stop} cues");

    thread::sleep(ms(50));
    assert_eq!(cue.0.load(Ordering::SeqCst), after_stop);
}
