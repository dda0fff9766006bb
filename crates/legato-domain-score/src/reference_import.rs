use crate::model::{ReferenceNote, ReferenceTrack, TempoPoint, Tick};
use crate::tempo::TempoMap;
use legato_ports::midi::SUSTAIN_CONTROLLER;
use midly::{Fps, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

#[derive(thiserror::Error, Debug)]
pub enum ReferenceLoadError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no notes found")]
    NoNotes,
}

/// A note decoded from the file, still in ticks.
#[derive(Clone, Copy, Debug)]
struct TickNote {
    pitch: u8,
    start: Tick,
    end: Tick,
    velocity: u8,
}

pub fn load_reference_path(path: &Path, target_bpm: u32) -> Result<ReferenceTrack, ReferenceLoadError> {
    let data = std::fs::read(path).map_err(|e| ReferenceLoadError::Io(e.to_string()))?;
    load_reference_bytes(&data, target_bpm)
}

/// Loads the reference or falls back to an empty track, logging the failure.
pub fn load_reference_or_empty(path: &Path, target_bpm: u32) -> ReferenceTrack {
    match load_reference_path(path, target_bpm) {
        Ok(track) => track,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "reference load failed, using empty track");
            ReferenceTrack::empty(target_bpm)
        }
    }
}

pub fn load_reference_bytes(data: &[u8], target_bpm: u32) -> Result<ReferenceTrack, ReferenceLoadError> {
    let smf = Smf::parse(data).map_err(|e| ReferenceLoadError::Parse(e.to_string()))?;
    let (ppq, tempo_override) = match smf.header.timing {
        Timing::Metrical(ticks) => (ticks.as_int(), None),
        Timing::Timecode(fps, ticks_per_frame) => {
            let (ppq, us_per_quarter) = timecode_ppq_and_tempo(fps, ticks_per_frame);
            (ppq, Some(us_per_quarter))
        }
    };

    let mut tempo_points: BTreeMap<Tick, u32> = BTreeMap::new();
    let mut tick_notes: Vec<TickNote> = Vec::new();
    let mut pedal_ticks: Vec<(Tick, u8)> = Vec::new();

    for track in &smf.tracks {
        let mut tick: Tick = 0;
        let mut open: HashMap<(u8, u8), Vec<(Tick, u8)>> = HashMap::new();

        for event in track {
            tick += event.delta.as_int() as Tick;
            match &event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open.entry((channel, key.as_int()))
                                .or_default()
                                .push((tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            close_notes(&mut open, &mut tick_notes, channel, key.as_int(), tick);
                        }
                        MidiMessage::Controller { controller, value }
                            if controller.as_int() == SUSTAIN_CONTROLLER =>
                        {
                            pedal_ticks.push((tick, value.as_int()));
                        }
                        _ => {}
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    tempo_points.entry(tick).or_insert(us_per_quarter.as_int());
                }
                _ => {}
            }
        }

        // dangling notes end one quarter after the track's last event
        let end_tick = tick.saturating_add(ppq.max(1) as Tick);
        for ((_, pitch), starts) in open {
            for (start, velocity) in starts {
                tick_notes.push(TickNote {
                    pitch,
                    start,
                    end: end_tick.max(start + 1),
                    velocity,
                });
            }
        }
    }

    if tick_notes.is_empty() {
        return Err(ReferenceLoadError::NoNotes);
    }

    let tempo_map = TempoMap::new(ppq, build_tempo_points(tempo_points, tempo_override));
    let original_bpm = tempo_map.initial_bpm();

    let notes: Vec<ReferenceNote> = tick_notes
        .iter()
        .map(|note| ReferenceNote {
            pitch: note.pitch,
            start: tempo_map.tick_to_seconds(note.start),
            end: tempo_map.tick_to_seconds(note.end),
            velocity: note.velocity,
        })
        .collect();

    pedal_ticks.sort_by_key(|(tick, _)| *tick);
    let pedal_controls: Vec<(f64, u8)> = pedal_ticks
        .iter()
        .map(|(tick, value)| (tempo_map.tick_to_seconds(*tick), *value))
        .collect();

    let track = ReferenceTrack::normalize(notes, &pedal_controls, original_bpm, target_bpm);
    debug!(
        notes = track.notes().len(),
        pedal_intervals = track.pedal_intervals().len(),
        original_bpm,
        target_bpm,
        tempo_ratio = track.tempo_ratio(),
        "reference track loaded"
    );
    Ok(track)
}

/// A release closes every open note of that key that began at an earlier tick.
fn close_notes(
    open: &mut HashMap<(u8, u8), Vec<(Tick, u8)>>,
    out: &mut Vec<TickNote>,
    channel: u8,
    pitch: u8,
    tick: Tick,
) {
    let Some(starts) = open.get_mut(&(channel, pitch)) else {
        return;
    };
    starts.retain(|&(start, velocity)| {
        if start < tick {
            out.push(TickNote {
                pitch,
                start,
                end: tick,
                velocity,
            });
            false
        } else {
            true
        }
    });
}

fn build_tempo_points(
    tempo_points: BTreeMap<Tick, u32>,
    override_us_per_quarter: Option<u32>,
) -> Vec<TempoPoint> {
    if let Some(us_per_quarter) = override_us_per_quarter {
        return vec![TempoPoint {
            tick: 0,
            us_per_quarter,
        }];
    }

    tempo_points
        .into_iter()
        .map(|(tick, us_per_quarter)| TempoPoint {
            tick,
            us_per_quarter,
        })
        .collect()
}

fn timecode_ppq_and_tempo(fps: Fps, ticks_per_frame: u8) -> (u16, u32) {
    let ticks_per_frame = ticks_per_frame.max(1) as u16;
    match fps {
        Fps::Fps24 => (24 * ticks_per_frame, 1_000_000),
        Fps::Fps25 => (25 * ticks_per_frame, 1_000_000),
        Fps::Fps30 => (30 * ticks_per_frame, 1_000_000),
        Fps::Fps29 => (30 * ticks_per_frame, 1_001_000),
    }
}
