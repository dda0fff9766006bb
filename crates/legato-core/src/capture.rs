use legato_domain_eval::{HeldNote, PlayedNote, PlayedPedal};
use legato_ports::midi::{MidiLikeEvent, RawMidiMessage, RecordedEvent};
use legato_ports::types::Seconds;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaptureEvent {
    Note(PlayedNote),
    Pedal(PlayedPedal),
}

/// Turns raw input messages into finalized notes and pedal intervals,
/// timestamped relative to the recording epoch.
pub struct EventCapture {
    epoch: Instant,
    input_offset: Seconds,
    active: BTreeMap<u8, (Seconds, u8)>,
    pedal_down: Option<Seconds>,
    log: Vec<RecordedEvent>,
}

impl EventCapture {
    pub fn new(epoch: Instant, input_offset_ms: i32) -> Self {
        Self {
            epoch,
            input_offset: input_offset_ms as f64 / 1000.0,
            active: BTreeMap::new(),
            pedal_down: None,
            log: Vec::new(),
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Recording-relative time of `at`, latency compensated.
    pub fn timestamp(&self, at: Instant) -> Seconds {
        at.saturating_duration_since(self.epoch).as_secs_f64() - self.input_offset
    }

    pub fn ingest(&mut self, raw: RawMidiMessage, at: Instant) -> Option<CaptureEvent> {
        let seconds = self.timestamp(at);
        self.ingest_at(raw, seconds)
    }

    /// Same as [`ingest`](Self::ingest) with an already computed timestamp.
    pub fn ingest_at(&mut self, raw: RawMidiMessage, seconds: Seconds) -> Option<CaptureEvent> {
        let event = raw.to_event()?;
        match event {
            MidiLikeEvent::NoteOn { note, velocity } => {
                // retrigger: close the held note before reopening it
                let finished = self.close_note(note, seconds);
                if finished.is_some() {
                    self.record(seconds, MidiLikeEvent::NoteOff { note });
                }
                self.record(seconds, event);
                self.active.insert(note, (seconds, velocity));
                finished
            }
            MidiLikeEvent::NoteOff { note } => {
                self.record(seconds, event);
                self.close_note(note, seconds)
            }
            MidiLikeEvent::Cc64 { value } => {
                self.record(seconds, event);
                if value > 0 {
                    let finished = self.close_pedal(seconds);
                    self.pedal_down = Some(seconds);
                    finished
                } else {
                    self.close_pedal(seconds)
                }
            }
        }
    }

    /// Closes every held note and an open pedal at `at`, logging the
    /// matching releases.
    pub fn finish(&mut self, at: Instant) -> Vec<CaptureEvent> {
        let seconds = self.timestamp(at);
        self.finish_at(seconds)
    }

    pub fn finish_at(&mut self, seconds: Seconds) -> Vec<CaptureEvent> {
        let mut held: Vec<(u8, Seconds, u8)> = self
            .active
            .iter()
            .map(|(&pitch, &(onset, velocity))| (pitch, onset, velocity))
            .collect();
        held.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        self.active.clear();

        let mut out = Vec::with_capacity(held.len() + 1);
        for (pitch, onset, velocity) in held {
            self.record(seconds, MidiLikeEvent::NoteOff { note: pitch });
            out.push(CaptureEvent::Note(PlayedNote {
                pitch,
                onset,
                release: seconds,
                velocity,
            }));
        }
        if self.pedal_down.is_some() {
            self.record(seconds, MidiLikeEvent::Cc64 { value: 0 });
            out.extend(self.close_pedal(seconds));
        }
        out
    }

    pub fn held_notes(&self) -> Vec<HeldNote> {
        self.active
            .iter()
            .map(|(&pitch, &(onset, velocity))| HeldNote {
                pitch,
                onset,
                velocity,
            })
            .collect()
    }

    pub fn pedal_down(&self) -> bool {
        self.pedal_down.is_some()
    }

    pub fn log(&self) -> &[RecordedEvent] {
        &self.log
    }

    pub fn into_log(self) -> Vec<RecordedEvent> {
        self.log
    }

    fn record(&mut self, seconds: Seconds, event: MidiLikeEvent) {
        self.log.push(RecordedEvent { seconds, event });
    }

    fn close_note(&mut self, pitch: u8, release: Seconds) -> Option<CaptureEvent> {
        let (onset, velocity) = self.active.remove(&pitch)?;
        Some(CaptureEvent::Note(PlayedNote {
            pitch,
            onset,
            release,
            velocity,
        }))
    }

    fn close_pedal(&mut self, release: Seconds) -> Option<CaptureEvent> {
        let press = self.pedal_down.take()?;
        Some(CaptureEvent::Pedal(PlayedPedal { press, release }))
    }
}
