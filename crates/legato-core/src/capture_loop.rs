use crate::capture::{CaptureEvent, EventCapture};
use crate::snapshot::{PerformanceSnapshot, SnapshotCell};
use legato_domain_eval::{Classification, Judge};
use legato_ports::midi::{MidiInputSource, NullMidiInput, RecordedEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const MAX_BATCH: usize = 10;
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// What the capture thread hands back when it is stopped.
pub struct CaptureOutcome {
    pub judge: Judge,
    pub source: Box<dyn MidiInputSource>,
    pub log: Vec<RecordedEvent>,
}

/// The thread could not be started. Hands the input source back so the
/// caller keeps its device.
pub struct CaptureSpawnError {
    pub error: std::io::Error,
    pub source: Box<dyn MidiInputSource>,
}

/// Background thread that polls the input source and is the only writer
/// of the session's judge.
pub struct CaptureLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<CaptureOutcome>>,
}

impl CaptureLoop {
    pub fn spawn(
        source: Box<dyn MidiInputSource>,
        judge: Judge,
        capture: EventCapture,
        cell: SnapshotCell,
    ) -> Result<Self, CaptureSpawnError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let slot = Arc::new(Mutex::new(Some(source)));
        let thread_slot = slot.clone();
        let spawned = thread::Builder::new()
            .name("legato-capture".to_string())
            .spawn(move || {
                let source = take_source(&thread_slot);
                run(source, judge, capture, cell, stop_flag)
            });
        match spawned {
            Ok(handle) => Ok(Self {
                stop,
                handle: Some(handle),
            }),
            Err(error) => Err(CaptureSpawnError {
                error,
                source: take_source(&slot),
            }),
        }
    }

    /// Signals the thread and waits for it. `None` if it panicked.
    pub fn stop(mut self) -> Option<CaptureOutcome> {
        self.stop.store(true, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                warn!("capture thread panicked");
                None
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn take_source(slot: &Mutex<Option<Box<dyn MidiInputSource>>>) -> Box<dyn MidiInputSource> {
    slot.lock()
        .take()
        .unwrap_or_else(|| Box::new(NullMidiInput))
}

fn run(
    mut source: Box<dyn MidiInputSource>,
    mut judge: Judge,
    mut capture: EventCapture,
    cell: SnapshotCell,
    stop: Arc<AtomicBool>,
) -> CaptureOutcome {
    debug!("capture loop started");
    while !stop.load(Ordering::Acquire) {
        let ready = match source.poll() {
            Ok(ready) => ready,
            Err(err) => {
                warn!(error = %err, "midi poll failed");
                false
            }
        };
        if !ready {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        let batch = match source.read(MAX_BATCH) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "midi read failed");
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };
        if batch.is_empty() {
            continue;
        }
        for raw in batch {
            if let Some(event) = capture.ingest(raw, Instant::now()) {
                judge_event(&mut judge, event);
            }
        }
        publish(&cell, &judge, &capture);
    }

    for event in capture.finish(Instant::now()) {
        judge_event(&mut judge, event);
    }
    publish(&cell, &judge, &capture);
    debug!(
        notes = judge.notes().len(),
        pedals = judge.pedals().len(),
        events = capture.log().len(),
        "capture loop stopped"
    );

    CaptureOutcome {
        judge,
        source,
        log: capture.into_log(),
    }
}

fn judge_event(judge: &mut Judge, event: CaptureEvent) {
    match event {
        CaptureEvent::Note(note) => {
            let note = judge.on_note(note);
            let combo = judge.combo();
            if note.classification == Classification::Correct
                && combo.current == combo.max
                && combo.current % 10 == 0
            {
                debug!(combo = combo.current, onset = note.onset, "combo milestone");
            }
        }
        CaptureEvent::Pedal(pedal) => {
            let pedal = judge.on_pedal(pedal);
            debug!(
                press = pedal.press,
                release = pedal.release,
                matched = pedal.matched,
                "pedal judged"
            );
        }
    }
}

fn publish(cell: &SnapshotCell, judge: &Judge, capture: &EventCapture) {
    cell.publish(PerformanceSnapshot::from_judge(
        judge,
        capture.held_notes(),
        capture.pedal_down(),
    ));
}
