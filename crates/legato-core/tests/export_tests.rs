use legato_core::{export_diagnostics, DiagnosticsInput, MidiFileExportSink, PerformanceExportSink};
use legato_domain_score::{load_reference_path, ReferenceTrack};
use legato_ports::midi::{MidiLikeEvent, RecordedEvent};
use legato_ports::storage::SettingsDto;

fn event(seconds: f64, event: MidiLikeEvent) -> RecordedEvent {
    RecordedEvent { seconds, event }
}

#[test]
fn midi_file_sink_writes_timestamped_file() {
    let dir = tempfile::tempdir().unwrap();
    let sink = MidiFileExportSink::new(dir.path().join("exports"));
    let events = vec![
        event(0.0, MidiLikeEvent::NoteOn { note: 60, velocity: 90 }),
        event(0.5, MidiLikeEvent::NoteOff { note: 60 }),
        event(0.5, MidiLikeEvent::NoteOn { note: 64, velocity: 70 }),
        event(1.0, MidiLikeEvent::NoteOff { note: 64 }),
    ];

    let path = sink.export(&events, 120).unwrap().expect("file written");

    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("performance_") && name.ends_with(".mid"), "{name}");
    let track = load_reference_path(&path, 120).unwrap();
    assert_eq!(track.notes().len(), 2);
    assert!((track.notes()[1].start - 0.5).abs() < 1e-3);
}

#[test]
fn empty_log_is_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let sink = MidiFileExportSink::new(dir.path());

    assert_eq!(sink.export(&[], 120).unwrap(), None);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn diagnostics_dump_json_files() {
    let dir = tempfile::tempdir().unwrap();
    let settings = SettingsDto::default();
    let track = ReferenceTrack::empty(108);
    let recorded = [event(0.0, MidiLikeEvent::Cc64 { value: 127 })];

    export_diagnostics(
        dir.path(),
        DiagnosticsInput {
            settings: &settings,
            midi_inputs: Vec::new(),
            audio_outputs: Vec::new(),
            reference: &track,
            recorded: &recorded,
            report: None,
        },
    )
    .unwrap();

    for name in [
        "app_version.json",
        "platform.json",
        "settings.json",
        "device_snapshot.json",
        "reference.json",
        "recorded_events.json",
    ] {
        assert!(dir.path().join(name).exists(), "missing {name}");
    }
    assert!(!dir.path().join("last_report.json").exists());

    let stored: SettingsDto =
        serde_json::from_slice(&std::fs::read(dir.path().join("settings.json")).unwrap()).unwrap();
    assert_eq!(stored.practice.bpm, 108);
}
