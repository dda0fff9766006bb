use legato_core::{
    Command, Event, PerformanceExportSink, ReportSink, SessionController, SessionError,
    SessionState, SettingField,
};
use legato_domain_eval::{Classification, PerformanceReport};
use legato_domain_score::{MidiExportError, ReferenceNote, ReferenceTrack};
use legato_ports::audio::CueSink;
use legato_ports::midi::{
    MidiError, MidiInputPort, MidiInputSource, MidiLikeEvent, RawMidiMessage, RecordedEvent,
};
use legato_ports::storage::{SettingsDto, StorageError, StoragePort};
use legato_ports::types::{DeviceId, MidiInputDevice};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Queue = Arc<Mutex<VecDeque<RawMidiMessage>>>;

struct QueueSource {
    queue: Queue,
}

impl MidiInputSource for QueueSource {
    fn poll(&mut self) -> Result<bool, MidiError> {
        Ok(!self.queue.lock().is_empty())
    }

    fn read(&mut self, max_events: usize) -> Result<Vec<RawMidiMessage>, MidiError> {
        let mut queue = self.queue.lock();
        let n = max_events.min(queue.len());
        Ok(queue.drain(..n).collect())
    }
}

struct FakeMidiPort {
    queue: Queue,
    opened: Arc<AtomicUsize>,
}

impl MidiInputPort for FakeMidiPort {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError> {
        Ok(vec![MidiInputDevice {
            id: DeviceId("fake:0".to_string()),
            name: "Fake Keys".to_string(),
            is_available: true,
        }])
    }

    fn open_input(&self, device_id: &DeviceId) -> Result<Box<dyn MidiInputSource>, MidiError> {
        if device_id.0 != "fake:0" {
            return Err(MidiError::DeviceNotFound(device_id.0.clone()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(QueueSource {
            queue: self.queue.clone(),
        }))
    }
}

#[derive(Default)]
struct CountingCue(AtomicUsize);

impl CueSink for CountingCue {
    fn cue(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MemoryStorage {
    saved: Arc<Mutex<Option<SettingsDto>>>,
}

impl StoragePort for MemoryStorage {
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        Ok(self.saved.lock().clone().unwrap_or_default())
    }

    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError> {
        *self.saved.lock() = Some(s.clone());
        Ok(())
    }
}

struct CollectingExport(Arc<Mutex<Vec<RecordedEvent>>>);

impl PerformanceExportSink for CollectingExport {
    fn export(&self, events: &[RecordedEvent], _bpm: u32) -> Result<Option<PathBuf>, MidiExportError> {
        self.0.lock().extend_from_slice(events);
        Ok(Some(PathBuf::from("memory.mid")))
    }
}

struct CollectingReports(Arc<Mutex<Vec<PerformanceReport>>>);

impl ReportSink for CollectingReports {
    fn publish(&self, report: &PerformanceReport) {
        self.0.lock().push(report.clone());
    }
}

struct Harness {
    controller: SessionController,
    queue: Queue,
    cues: Arc<CountingCue>,
    opened: Arc<AtomicUsize>,
    saved: Arc<Mutex<Option<SettingsDto>>>,
    exported: Arc<Mutex<Vec<RecordedEvent>>>,
    reports: Arc<Mutex<Vec<PerformanceReport>>>,
}

/// 30 BPM keeps the recording epoch seconds in the future, so every
/// captured event lands at t = 0 and the metronome stays silent.
fn harness() -> Harness {
    let queue: Queue = Arc::default();
    let cues = Arc::new(CountingCue::default());
    let opened = Arc::new(AtomicUsize::new(0));
    let storage = MemoryStorage::default();
    let saved = storage.saved.clone();
    let mut settings = SettingsDto::default();
    settings.practice.bpm = 30;

    let mut controller = SessionController::with_settings(
        Box::new(FakeMidiPort {
            queue: queue.clone(),
            opened: opened.clone(),
        }),
        cues.clone(),
        Some(Box::new(storage)),
        settings,
    );
    let exported = Arc::new(Mutex::new(Vec::new()));
    let reports = Arc::new(Mutex::new(Vec::new()));
    controller.set_export_sink(Box::new(CollectingExport(exported.clone())));
    controller.add_report_sink(Box::new(CollectingReports(reports.clone())));
    controller
        .set_reference_track(ReferenceTrack::from_notes(
            vec![ReferenceNote {
                pitch: 60,
                start: 0.0,
                end: 1.0,
                velocity: 80,
            }],
            Vec::new(),
            30,
        ))
        .unwrap();
    controller.drain_events();

    Harness {
        controller,
        queue,
        cues,
        opened,
        saved,
        exported,
        reports,
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(2));
    }
}

fn enter_recording(h: &mut Harness) {
    h.controller.start().unwrap();
    assert_eq!(h.controller.state(), SessionState::Countdown);
    h.controller.tick_at(Instant::now() + Duration::from_secs(9));
    assert_eq!(h.controller.state(), SessionState::Recording);
}

fn states(events: &[Event]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::SessionStateChanged { state } => Some(*state),
            _ => None,
        })
        .collect()
}

#[test]
fn full_session_produces_report_and_export() {
    let mut h = harness();
    enter_recording(&mut h);

    h.queue.lock().extend([
        RawMidiMessage::new(0x90, 60, 80),
        RawMidiMessage::new(0x80, 60, 0),
    ]);
    let reader = h.controller.snapshot_reader();
    wait_until(|| reader.latest().notes.len() == 1);

    h.controller.stop().unwrap();
    assert_eq!(h.controller.state(), SessionState::Reporting);

    let report = h.controller.report().expect("report after stop").clone();
    assert_eq!(report.note_count, 1);
    assert_eq!(report.matched_count, 1);
    assert_eq!(report.classifications.correct, 1);
    assert_eq!(report.combo.max, 1);
    assert_eq!(h.controller.student_notes()[0].classification, Classification::Correct);
    assert_eq!(h.reports.lock().as_slice(), &[report.clone()]);

    let exported: Vec<MidiLikeEvent> = h.exported.lock().iter().map(|e| e.event).collect();
    assert_eq!(
        exported,
        vec![
            MidiLikeEvent::NoteOn {
                note: 60,
                velocity: 80,
            },
            MidiLikeEvent::NoteOff { note: 60 },
        ]
    );

    let events = h.controller.drain_events();
    let count_in: Vec<(u32, u32)> = events
        .iter()
        .filter_map(|event| match event {
            Event::CountIn { beat, of } => Some((*beat, *of)),
            _ => None,
        })
        .collect();
    assert_eq!(count_in, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    assert_eq!(
        states(&events),
        vec![
            SessionState::Countdown,
            SessionState::Recording,
            SessionState::Reporting,
        ]
    );
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::ReportReady { report } if report.note_count == 1)));
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::PerformanceExported { path } if path == "memory.mid")));
    assert_eq!(h.cues.0.load(Ordering::SeqCst), 4);
}

#[test]
fn held_note_is_flushed_at_stop() {
    let mut h = harness();
    enter_recording(&mut h);

    h.queue.lock().push_back(RawMidiMessage::new(0x90, 60, 80));
    let reader = h.controller.snapshot_reader();
    wait_until(|| reader.latest().held.len() == 1);

    h.controller.stop().unwrap();

    assert_eq!(h.controller.report().map(|r| r.note_count), Some(1));
    let log = h.controller.recorded_events();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].event, MidiLikeEvent::NoteOff { note: 60 });
    assert!(reader.latest().held.is_empty());
}

#[test]
fn input_source_is_reused_across_sessions() {
    let mut h = harness();
    enter_recording(&mut h);
    h.controller.stop().unwrap();
    h.controller.dismiss().unwrap();
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.controller.report().is_none());

    enter_recording(&mut h);
    h.queue.lock().extend([
        RawMidiMessage::new(0x90, 61, 80),
        RawMidiMessage::new(0x80, 61, 0),
    ]);
    let reader = h.controller.snapshot_reader();
    wait_until(|| reader.latest().notes.len() == 1);
    h.controller.stop().unwrap();

    assert_eq!(h.opened.load(Ordering::SeqCst), 1);
    let report = h.controller.report().unwrap();
    assert_eq!(report.classifications.incorrect, 1);
}

#[test]
fn stop_during_countdown_aborts_to_idle() {
    let mut h = harness();
    h.controller.start().unwrap();
    h.controller.tick_at(Instant::now());

    h.controller.stop().unwrap();

    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.controller.report().is_none());
}

#[test]
fn invalid_transitions_change_nothing() {
    let mut h = harness();

    assert!(matches!(
        h.controller.stop(),
        Err(SessionError::InvalidTransition {
            state: SessionState::Idle,
            ..
        })
    ));
    assert!(h.controller.dismiss().is_err());

    h.controller.start().unwrap();
    assert!(h.controller.start().is_err());
    let err = h.controller.update_setting(SettingField::Bpm, "90").unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
    assert_eq!(h.controller.settings().practice.bpm, 30);
    assert_eq!(h.controller.state(), SessionState::Countdown);
}

#[test]
fn tolerance_change_in_reporting_rescores_the_take() {
    let mut h = harness();
    h.controller
        .update_setting(SettingField::VelocityTolerance, "10")
        .unwrap();
    enter_recording(&mut h);
    h.queue.lock().extend([
        RawMidiMessage::new(0x90, 60, 100),
        RawMidiMessage::new(0x80, 60, 0),
    ]);
    let reader = h.controller.snapshot_reader();
    wait_until(|| reader.latest().notes.len() == 1);
    h.controller.stop().unwrap();
    assert_eq!(
        h.controller.report().map(|r| r.classifications.too_hard),
        Some(1)
    );
    h.controller.drain_events();

    h.controller
        .update_setting(SettingField::VelocityTolerance, "30")
        .unwrap();

    assert_eq!(h.controller.state(), SessionState::Reporting);
    let report = h.controller.report().unwrap().clone();
    assert_eq!(report.classifications.correct, 1);
    assert_eq!(report.classifications.too_hard, 0);
    assert_eq!(h.controller.student_notes()[0].classification, Classification::Correct);
    assert_eq!(reader.latest().notes[0].classification, Classification::Correct);
    assert_eq!(h.controller.recorded_events().len(), 2);
    assert_eq!(h.reports.lock().len(), 2);

    let events = h.controller.drain_events();
    assert!(states(&events).is_empty());
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::ReportReady { report } if report.classifications.correct == 1)));

    h.controller.update_setting(SettingField::Bpm, "60").unwrap();
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.controller.report().is_none());
}

#[test]
fn bpm_change_renormalizes_reference() {
    let mut h = harness();

    h.controller.update_setting(SettingField::Bpm, "60").unwrap();

    let track = h.controller.track();
    assert_eq!(track.target_bpm(), 60);
    assert_eq!(track.notes()[0].end, 0.5);
    let events = h.controller.drain_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::ReferenceLoaded { notes: 1, .. })));
    assert_eq!(
        h.saved.lock().as_ref().map(|s| s.practice.bpm),
        Some(60)
    );
}

#[test]
fn malformed_setting_keeps_previous_value() {
    let mut h = harness();

    let err = h
        .controller
        .handle_command(Command::UpdateSetting {
            field: SettingField::TimeTolerance,
            value: "soon".to_string(),
        })
        .unwrap_err();

    assert!(matches!(err, SessionError::Config(_)));
    assert_eq!(h.controller.settings().practice.time_tolerance_s, 0.2);
    assert!(h.controller.drain_events().is_empty());
}

#[test]
fn missing_reference_file_yields_empty_track() {
    let mut h = harness();

    h.controller
        .handle_command(Command::LoadReference {
            path: "/no/such/file.mid".to_string(),
        })
        .unwrap();

    assert!(h.controller.track().is_empty());
    let events = h.controller.drain_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::ReferenceLoaded { notes: 0, bars: 0, .. })));
}

#[test]
fn lists_and_selects_inputs() {
    let mut h = harness();

    h.controller.handle_command(Command::ListMidiInputs).unwrap();
    h.controller
        .handle_command(Command::SelectMidiInput {
            device_id: DeviceId("fake:0".to_string()),
        })
        .unwrap();
    let missing = h.controller.handle_command(Command::SelectMidiInput {
        device_id: DeviceId("fake:9".to_string()),
    });

    assert!(matches!(missing, Err(SessionError::Midi(MidiError::DeviceNotFound(_)))));
    assert_eq!(
        h.controller.settings().selected_midi_in,
        Some(DeviceId("fake:0".to_string()))
    );
    let events = h.controller.drain_events();
    assert!(matches!(
        events.first(),
        Some(Event::MidiInputsUpdated { devices }) if devices.len() == 1
    ));
}
