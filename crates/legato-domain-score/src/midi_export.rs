use crate::model::Tick;
use crate::tempo::{bpm_to_us_per_quarter, TempoMap};
use legato_ports::midi::{MidiLikeEvent, RecordedEvent, SUSTAIN_CONTROLLER};
use midly::num::{u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::HashMap;
use std::path::Path;

pub const EXPORT_PPQ: u16 = 480;
const MAX_TEMPO_US: u32 = 0xFF_FFFF;

#[derive(thiserror::Error, Debug)]
pub enum MidiExportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("nothing to export")]
    Empty,
    #[error("{bpm} bpm is too slow for a standard MIDI tempo")]
    UnsupportedTempo { bpm: u32 },
}

/// Writes a captured performance as a single-track SMF at `bpm`.
pub fn export_recording_path(
    events: &[RecordedEvent],
    bpm: u32,
    path: &Path,
) -> Result<(), MidiExportError> {
    let data = export_recording_bytes(events, bpm)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| MidiExportError::Io(e.to_string()))?;
    }
    std::fs::write(path, data).map_err(|e| MidiExportError::Io(e.to_string()))
}

pub fn export_recording_bytes(
    events: &[RecordedEvent],
    bpm: u32,
) -> Result<Vec<u8>, MidiExportError> {
    if events.is_empty() {
        return Err(MidiExportError::Empty);
    }

    let us_per_quarter = bpm_to_us_per_quarter(bpm);
    if us_per_quarter > MAX_TEMPO_US {
        return Err(MidiExportError::UnsupportedTempo { bpm });
    }

    let tempo_map = TempoMap::constant(EXPORT_PPQ, bpm);
    let mut midi_events = Vec::with_capacity(events.len() + 1);
    midi_events.push(MidiEvent {
        tick: 0,
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_quarter))),
    });
    // earliest tick the next event of a key may use
    let mut floors: HashMap<u8, Tick> = HashMap::new();
    for event in events {
        let mut tick = tempo_map.seconds_to_tick(event.seconds.max(0.0));
        match event.event {
            MidiLikeEvent::NoteOn { note, .. } => {
                let floor = floors.entry(note).or_insert(0);
                tick = tick.max(*floor);
                *floor = tick + 1;
            }
            MidiLikeEvent::NoteOff { note } => {
                let floor = floors.entry(note).or_insert(0);
                tick = tick.max(*floor);
                *floor = tick;
            }
            MidiLikeEvent::Cc64 { .. } => {}
        }
        midi_events.push(MidiEvent {
            tick,
            kind: track_event_kind(event.event),
        });
    }
    // stable: events sharing a tick stay in capture order
    midi_events.sort_by_key(|event| event.tick);

    let mut track_events = Vec::with_capacity(midi_events.len() + 1);
    let mut last_tick: Tick = 0;
    for event in midi_events {
        let delta = (event.tick - last_tick).max(0) as u32;
        last_tick = event.tick;
        track_events.push(TrackEvent {
            delta: u28::new(delta),
            kind: event.kind,
        });
    }
    track_events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(EXPORT_PPQ.into()),
        },
        tracks: vec![track_events],
    };

    let mut data = Vec::new();
    smf.write(&mut data)
        .map_err(|e| MidiExportError::Io(e.to_string()))?;
    Ok(data)
}

struct MidiEvent {
    tick: Tick,
    kind: TrackEventKind<'static>,
}

fn track_event_kind(event: MidiLikeEvent) -> TrackEventKind<'static> {
    let channel = u4::new(0);
    let message = match event {
        MidiLikeEvent::NoteOn { note, velocity } => MidiMessage::NoteOn {
            key: u7::new(note & 0x7F),
            vel: u7::new(velocity.clamp(1, 127)),
        },
        MidiLikeEvent::NoteOff { note } => MidiMessage::NoteOff {
            key: u7::new(note & 0x7F),
            vel: u7::new(0),
        },
        MidiLikeEvent::Cc64 { value } => MidiMessage::Controller {
            controller: u7::new(SUSTAIN_CONTROLLER),
            value: u7::new(value & 0x7F),
        },
    };
    TrackEventKind::Midi { channel, message }
}
