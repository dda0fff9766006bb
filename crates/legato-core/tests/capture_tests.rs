use legato_core::{CaptureEvent, EventCapture};
use legato_domain_eval::{HeldNote, PlayedNote, PlayedPedal};
use legato_ports::midi::{MidiLikeEvent, RawMidiMessage, RecordedEvent};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

fn on(note: u8, velocity: u8) -> RawMidiMessage {
    RawMidiMessage::new(0x90, note, velocity)
}

fn off(note: u8) -> RawMidiMessage {
    RawMidiMessage::new(0x80, note, 0)
}

fn pedal(value: u8) -> RawMidiMessage {
    RawMidiMessage::new(0xB0, 64, value)
}

fn capture() -> EventCapture {
    EventCapture::new(Instant::now(), 0)
}

#[test]
fn note_on_off_pair_becomes_a_note() {
    let mut capture = capture();

    assert_eq!(capture.ingest_at(on(60, 90), 0.5), None);
    assert_eq!(
        capture.held_notes(),
        vec![HeldNote {
            pitch: 60,
            onset: 0.5,
            velocity: 90,
        }]
    );
    assert_eq!(
        capture.ingest_at(off(60), 1.25),
        Some(CaptureEvent::Note(PlayedNote {
            pitch: 60,
            onset: 0.5,
            release: 1.25,
            velocity: 90,
        }))
    );
    assert!(capture.held_notes().is_empty());
}

#[test]
fn zero_velocity_note_on_releases() {
    let mut capture = capture();
    capture.ingest_at(on(62, 70), 0.0);

    let event = capture.ingest_at(on(62, 0), 0.4);

    assert!(matches!(
        event,
        Some(CaptureEvent::Note(PlayedNote { pitch: 62, .. }))
    ));
}

#[test]
fn channel_nibble_is_ignored() {
    let mut capture = capture();
    capture.ingest_at(RawMidiMessage::new(0x93, 60, 80), 0.0);

    let event = capture.ingest_at(RawMidiMessage::new(0x83, 60, 0), 0.5);

    assert!(event.is_some());
}

#[test]
fn release_without_press_is_ignored() {
    let mut capture = capture();

    assert_eq!(capture.ingest_at(off(60), 0.2), None);
    assert_eq!(capture.ingest_at(pedal(0), 0.3), None);
}

#[test]
fn retrigger_closes_held_note_first() {
    let mut capture = capture();
    capture.ingest_at(on(60, 80), 0.0);

    let event = capture.ingest_at(on(60, 100), 0.5);

    assert_eq!(
        event,
        Some(CaptureEvent::Note(PlayedNote {
            pitch: 60,
            onset: 0.0,
            release: 0.5,
            velocity: 80,
        }))
    );
    assert_eq!(capture.held_notes()[0].velocity, 100);
    let kinds: Vec<MidiLikeEvent> = capture.log().iter().map(|e| e.event).collect();
    assert_eq!(
        kinds,
        vec![
            MidiLikeEvent::NoteOn {
                note: 60,
                velocity: 80,
            },
            MidiLikeEvent::NoteOff { note: 60 },
            MidiLikeEvent::NoteOn {
                note: 60,
                velocity: 100,
            },
        ]
    );
}

#[test]
fn pedal_press_and_release() {
    let mut capture = capture();

    assert_eq!(capture.ingest_at(pedal(127), 1.0), None);
    assert!(capture.pedal_down());
    assert_eq!(
        capture.ingest_at(pedal(0), 3.0),
        Some(CaptureEvent::Pedal(PlayedPedal {
            press: 1.0,
            release: 3.0,
        }))
    );
    assert!(!capture.pedal_down());
}

#[test]
fn second_press_closes_open_pedal() {
    let mut capture = capture();
    capture.ingest_at(pedal(100), 1.0);

    let event = capture.ingest_at(pedal(90), 2.0);

    assert_eq!(
        event,
        Some(CaptureEvent::Pedal(PlayedPedal {
            press: 1.0,
            release: 2.0,
        }))
    );
    assert!(capture.pedal_down());
}

#[test]
fn other_messages_are_dropped() {
    let mut capture = capture();

    assert_eq!(capture.ingest_at(RawMidiMessage::new(0xB0, 7, 100), 0.0), None);
    assert_eq!(capture.ingest_at(RawMidiMessage::new(0xE0, 0, 64), 0.0), None);
    assert!(capture.log().is_empty());
}

#[test]
fn finish_flushes_held_notes_and_pedal() {
    let mut capture = capture();
    capture.ingest_at(on(64, 80), 0.2);
    capture.ingest_at(on(60, 90), 0.1);
    capture.ingest_at(pedal(127), 0.3);

    let flushed = capture.finish_at(2.0);

    assert_eq!(
        flushed,
        vec![
            CaptureEvent::Note(PlayedNote {
                pitch: 60,
                onset: 0.1,
                release: 2.0,
                velocity: 90,
            }),
            CaptureEvent::Note(PlayedNote {
                pitch: 64,
                onset: 0.2,
                release: 2.0,
                velocity: 80,
            }),
            CaptureEvent::Pedal(PlayedPedal {
                press: 0.3,
                release: 2.0,
            }),
        ]
    );
    let tail: Vec<RecordedEvent> = capture.log()[3..].to_vec();
    assert_eq!(
        tail,
        vec![
            RecordedEvent {
                seconds: 2.0,
                event: MidiLikeEvent::NoteOff { note: 60 },
            },
            RecordedEvent {
                seconds: 2.0,
                event: MidiLikeEvent::NoteOff { note: 64 },
            },
            RecordedEvent {
                seconds: 2.0,
                event: MidiLikeEvent::Cc64 { value: 0 },
            },
        ]
    );
    assert!(capture.finish_at(3.0).is_empty());
}

#[test]
fn timestamps_are_epoch_relative_and_offset_compensated() {
    let epoch = Instant::now();
    let capture = EventCapture::new(epoch, 20);

    let t = capture.timestamp(epoch + Duration::from_millis(520));

    assert!((t - 0.5).abs() < 1e-9, "got {t}");
    assert!((capture.timestamp(epoch) + 0.02).abs() < 1e-9);
}
