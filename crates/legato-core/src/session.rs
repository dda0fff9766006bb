use crate::capture::EventCapture;
use crate::capture_loop::{CaptureLoop, CaptureOutcome};
use crate::config::{apply_setting_text, match_config, validate_settings, ConfigError, SettingField};
use crate::diagnostics::{export_diagnostics, DiagnosticsInput};
use crate::export::{PerformanceExportSink, ReportSink};
use crate::ipc::{Command, Event, SessionState};
use crate::metronome::{beat_interval, Countdown, Metronome};
use crate::snapshot::{PerformanceSnapshot, SnapshotCell, SnapshotReader};
use legato_domain_eval::{Judge, PerformanceReport, StudentNote};
use legato_domain_score::{load_reference_or_empty, MidiExportError, ReferenceTrack};
use legato_ports::audio::{AudioError, AudioOutputPort, CueSink};
use legato_ports::midi::{MidiError, MidiInputPort, MidiInputSource, NullMidiInput, RecordedEvent};
use legato_ports::storage::{PracticeSettings, SettingsDto, StorageError, StoragePort};
use legato_ports::types::DeviceId;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("midi error: {0}")]
    Midi(#[from] MidiError),
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("export error: {0}")]
    Export(#[from] MidiExportError),
    #[error("thread error: {0}")]
    Thread(String),
}

enum Phase {
    Idle,
    Countdown(Countdown),
    Recording {
        metronome: Option<Metronome>,
        capture: CaptureLoop,
    },
    Reporting,
}

/// Drives Idle → Countdown → Recording → Reporting → Idle. The host calls
/// `tick` from its loop and drains events after it.
pub struct SessionController {
    midi_port: Box<dyn MidiInputPort>,
    audio_port: Option<Box<dyn AudioOutputPort>>,
    cue: Arc<dyn CueSink>,
    storage: Option<Box<dyn StoragePort>>,
    export_sink: Option<Box<dyn PerformanceExportSink>>,
    report_sinks: Vec<Box<dyn ReportSink>>,
    settings: SettingsDto,
    track: Arc<ReferenceTrack>,
    phase: Phase,
    source: Option<Box<dyn MidiInputSource>>,
    snapshot: SnapshotCell,
    judge: Option<Judge>,
    recorded: Vec<RecordedEvent>,
    report: Option<PerformanceReport>,
    events: VecDeque<Event>,
}

impl SessionController {
    /// Loads stored settings and opens the stored (or first available) input.
    /// A missing device falls back to a source that never produces events.
    pub fn new(
        midi_port: Box<dyn MidiInputPort>,
        cue: Arc<dyn CueSink>,
        storage: Option<Box<dyn StoragePort>>,
    ) -> Self {
        let settings = match storage.as_ref().map(|storage| storage.load_settings()) {
            Some(Ok(settings)) => settings,
            Some(Err(err)) => {
                warn!(error = %err, "settings load failed, using defaults");
                SettingsDto::default()
            }
            None => SettingsDto::default(),
        };
        Self::with_settings(midi_port, cue, storage, settings)
    }

    pub fn with_settings(
        midi_port: Box<dyn MidiInputPort>,
        cue: Arc<dyn CueSink>,
        storage: Option<Box<dyn StoragePort>>,
        mut settings: SettingsDto,
    ) -> Self {
        if let Err(err) = validate_settings(&settings.practice) {
            warn!(error = %err, "stored practice settings invalid, using defaults");
            settings.practice = PracticeSettings::default();
        }

        let opened = match settings.selected_midi_in.as_ref() {
            Some(device_id) => midi_port.open_input(device_id),
            None => midi_port.open_default(),
        };
        let source = match opened {
            Ok(source) => source,
            Err(err) => {
                warn!(error = %err, "no midi input, capture disabled");
                Box::new(NullMidiInput) as Box<dyn MidiInputSource>
            }
        };

        let track = Arc::new(ReferenceTrack::empty(settings.practice.bpm));
        let mut controller = Self {
            midi_port,
            audio_port: None,
            cue,
            storage,
            export_sink: None,
            report_sinks: Vec::new(),
            settings,
            track,
            phase: Phase::Idle,
            source: Some(source),
            snapshot: SnapshotCell::new(),
            judge: None,
            recorded: Vec::new(),
            report: None,
            events: VecDeque::new(),
        };
        if let Some(path) = controller.settings.reference_path.clone() {
            controller.load_reference_file(Path::new(&path));
        }
        controller
    }

    pub fn set_audio_port(&mut self, port: Box<dyn AudioOutputPort>) {
        self.audio_port = Some(port);
    }

    pub fn set_export_sink(&mut self, sink: Box<dyn PerformanceExportSink>) {
        self.export_sink = Some(sink);
    }

    pub fn add_report_sink(&mut self, sink: Box<dyn ReportSink>) {
        self.report_sinks.push(sink);
    }

    pub fn handle_command(&mut self, cmd: Command) -> Result<(), SessionError> {
        match cmd {
            Command::LoadReference { path } => self.load_reference(Path::new(&path))?,
            Command::UpdateSetting { field, value } => self.update_setting(field, &value)?,
            Command::SelectMidiInput { device_id } => self.select_midi_input(device_id)?,
            Command::ListMidiInputs => {
                let devices = self.midi_port.list_inputs()?;
                self.events.push_back(Event::MidiInputsUpdated { devices });
            }
            Command::Start => self.start()?,
            Command::Stop => self.stop()?,
            Command::DismissReport => self.dismiss()?,
            Command::ExportDiagnostics { path } => self.export_diagnostics(Path::new(&path))?,
        }
        Ok(())
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Advances the count-in against `now`. Recording itself runs on its
    /// own threads and needs nothing from the host.
    pub fn tick_at(&mut self, now: Instant) {
        let Phase::Countdown(countdown) = &mut self.phase else {
            return;
        };
        let step = countdown.poll(now);
        let beats = countdown.beats();
        let epoch = countdown.end();
        for beat in step.first..=step.last {
            if self.settings.cue_enabled {
                self.cue.cue();
            }
            self.events.push_back(Event::CountIn { beat, of: beats });
        }
        if step.finished {
            if let Err(err) = self.begin_recording(epoch) {
                warn!(error = %err, "recording failed to start");
                self.phase = Phase::Idle;
                self.emit_state();
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Countdown(_) => SessionState::Countdown,
            Phase::Recording { .. } => SessionState::Recording,
            Phase::Reporting => SessionState::Reporting,
        }
    }

    pub fn settings(&self) -> &SettingsDto {
        &self.settings
    }

    pub fn track(&self) -> &Arc<ReferenceTrack> {
        &self.track
    }

    /// Live view for the render loop; stays valid across sessions.
    pub fn snapshot_reader(&self) -> SnapshotReader {
        self.snapshot.reader()
    }

    pub fn report(&self) -> Option<&PerformanceReport> {
        self.report.as_ref()
    }

    /// Finalized notes of the last stopped session.
    pub fn student_notes(&self) -> &[StudentNote] {
        self.judge.as_ref().map(|judge| judge.notes()).unwrap_or(&[])
    }

    pub fn recorded_events(&self) -> &[RecordedEvent] {
        &self.recorded
    }

    pub fn load_reference(&mut self, path: &Path) -> Result<(), SessionError> {
        self.require_editable("load a reference")?;
        self.settings.reference_path = Some(path.display().to_string());
        self.load_reference_file(path);
        self.save_settings();
        Ok(())
    }

    /// Uses an already built track; it is re-normalized to the configured
    /// BPM if it was built for another tempo.
    pub fn set_reference_track(&mut self, track: ReferenceTrack) -> Result<(), SessionError> {
        self.require_editable("replace the reference")?;
        let bpm = self.settings.practice.bpm;
        let track = if track.target_bpm() == bpm {
            track
        } else {
            track.retarget(bpm)
        };
        self.install_track(track);
        Ok(())
    }

    pub fn update_setting(&mut self, field: SettingField, text: &str) -> Result<(), SessionError> {
        self.require_editable("change settings")?;
        let next = apply_setting_text(&self.settings.practice, field, text)?;
        self.commit_practice(next);
        Ok(())
    }

    pub fn update_practice(&mut self, practice: PracticeSettings) -> Result<(), SessionError> {
        self.require_editable("change settings")?;
        validate_settings(&practice)?;
        self.commit_practice(practice);
        Ok(())
    }

    pub fn set_cue_enabled(&mut self, enabled: bool) {
        self.settings.cue_enabled = enabled;
        self.save_settings();
    }

    pub fn select_midi_input(&mut self, device_id: DeviceId) -> Result<(), SessionError> {
        self.require_editable("switch midi input")?;
        let source = self.midi_port.open_input(&device_id)?;
        if let Some(old) = self.source.replace(source) {
            old.close();
        }
        info!(device = %device_id, "midi input selected");
        self.settings.selected_midi_in = Some(device_id);
        self.save_settings();
        self.events.push_back(Event::SettingsUpdated {
            settings: self.settings.clone(),
        });
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(self.invalid("start"));
        }
        self.reset_session();
        let practice = &self.settings.practice;
        self.phase = Phase::Countdown(Countdown::new(
            Instant::now(),
            beat_interval(practice.bpm),
            practice.countdown_beats,
        ));
        info!(bpm = practice.bpm, beats = practice.countdown_beats, "count-in started");
        self.emit_state();
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), SessionError> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Countdown(_) => {
                info!("count-in aborted");
                self.emit_state();
                Ok(())
            }
            Phase::Recording { metronome, capture } => {
                if let Some(metronome) = metronome {
                    metronome.stop();
                }
                match capture.stop() {
                    Some(outcome) => self.finish_recording(outcome),
                    None => {
                        self.source = Some(Box::new(NullMidiInput));
                        self.emit_state();
                        return Err(SessionError::Thread("capture thread panicked".to_string()));
                    }
                }
                Ok(())
            }
            other => {
                self.phase = other;
                Err(self.invalid("stop"))
            }
        }
    }

    pub fn dismiss(&mut self) -> Result<(), SessionError> {
        if !matches!(self.phase, Phase::Reporting) {
            return Err(self.invalid("dismiss the report"));
        }
        self.reset_session();
        self.phase = Phase::Idle;
        self.emit_state();
        Ok(())
    }

    pub fn export_diagnostics(&self, dir: &Path) -> Result<(), SessionError> {
        let midi_inputs = self.midi_port.list_inputs()?;
        let audio_outputs = match self.audio_port.as_ref() {
            Some(port) => port.list_outputs()?,
            None => Vec::new(),
        };
        export_diagnostics(
            dir,
            DiagnosticsInput {
                settings: &self.settings,
                midi_inputs,
                audio_outputs,
                reference: &self.track,
                recorded: &self.recorded,
                report: self.report.as_ref(),
            },
        )?;
        info!(dir = %dir.display(), "diagnostics exported");
        Ok(())
    }

    fn begin_recording(&mut self, epoch: Instant) -> Result<(), SessionError> {
        let practice = &self.settings.practice;
        let judge = Judge::new(match_config(practice), self.track.clone());
        let capture = EventCapture::new(epoch, practice.input_offset_ms);

        let metronome = if self.settings.cue_enabled {
            let metronome = Metronome::start(epoch, beat_interval(practice.bpm), self.cue.clone())
                .map_err(|e| SessionError::Thread(e.to_string()))?;
            Some(metronome)
        } else {
            None
        };
        let source = self
            .source
            .take()
            .unwrap_or_else(|| Box::new(NullMidiInput));
        let capture = match CaptureLoop::spawn(source, judge, capture, self.snapshot.clone()) {
            Ok(capture) => capture,
            Err(err) => {
                self.source = Some(err.source);
                if let Some(metronome) = metronome {
                    metronome.stop();
                }
                return Err(SessionError::Thread(err.error.to_string()));
            }
        };

        self.phase = Phase::Recording { metronome, capture };
        info!("recording started");
        self.emit_state();
        Ok(())
    }

    fn finish_recording(&mut self, outcome: CaptureOutcome) {
        let CaptureOutcome { judge, source, log } = outcome;
        self.source = Some(source);

        let report = judge.report();
        if let Some(sink) = self.export_sink.as_ref() {
            match sink.export(&log, self.settings.practice.bpm) {
                Ok(Some(path)) => self.events.push_back(Event::PerformanceExported {
                    path: path.display().to_string(),
                }),
                Ok(None) => debug!("nothing recorded, export skipped"),
                Err(err) => warn!(error = %err, "performance export failed"),
            }
        }
        for sink in &self.report_sinks {
            sink.publish(&report);
        }
        info!(
            overall = report.overall_average,
            notes = report.note_count,
            "recording stopped"
        );

        self.judge = Some(judge);
        self.recorded = log;
        self.report = Some(report.clone());
        self.phase = Phase::Reporting;
        self.emit_state();
        self.events.push_back(Event::ReportReady { report });
    }

    fn commit_practice(&mut self, practice: PracticeSettings) {
        let bpm_changed = practice.bpm != self.settings.practice.bpm;
        self.settings.practice = practice;
        if bpm_changed {
            let track = self.track.retarget(self.settings.practice.bpm);
            self.install_track(track);
        } else if matches!(self.phase, Phase::Reporting) {
            self.rejudge_take();
        }
        debug!(settings = ?self.settings.practice, "practice settings updated");
        self.save_settings();
        self.events.push_back(Event::SettingsUpdated {
            settings: self.settings.clone(),
        });
    }

    /// Scores the finished take again under the current tolerances. The
    /// session stays in Reporting.
    fn rejudge_take(&mut self) {
        let Some(judge) = self.judge.as_ref() else {
            return;
        };
        let judge = judge.rejudge(match_config(&self.settings.practice));
        let report = judge.report();
        self.snapshot
            .publish(PerformanceSnapshot::from_judge(&judge, Vec::new(), false));
        for sink in &self.report_sinks {
            sink.publish(&report);
        }
        info!(
            overall = report.overall_average,
            notes = report.note_count,
            "take re-judged"
        );

        self.judge = Some(judge);
        self.report = Some(report.clone());
        self.events.push_back(Event::ReportReady { report });
    }

    fn load_reference_file(&mut self, path: &Path) {
        let track = load_reference_or_empty(path, self.settings.practice.bpm);
        self.install_track(track);
    }

    /// Swapping the track invalidates whatever session was shown.
    fn install_track(&mut self, track: ReferenceTrack) {
        let bpm = self.settings.practice.bpm;
        info!(
            notes = track.notes().len(),
            pedal_intervals = track.pedal_intervals().len(),
            total_duration = track.total_duration(),
            bpm,
            "reference ready"
        );
        self.events.push_back(Event::ReferenceLoaded {
            notes: track.notes().len(),
            pedal_intervals: track.pedal_intervals().len(),
            total_duration: track.total_duration(),
            bars: track.bar_count(bpm),
        });
        self.track = Arc::new(track);
        self.reset_session();
        if matches!(self.phase, Phase::Reporting) {
            self.phase = Phase::Idle;
            self.emit_state();
        }
    }

    fn reset_session(&mut self) {
        self.judge = None;
        self.recorded.clear();
        self.report = None;
        self.snapshot.clear();
    }

    fn require_editable(&self, action: &'static str) -> Result<(), SessionError> {
        match self.phase {
            Phase::Idle | Phase::Reporting => Ok(()),
            _ => Err(self.invalid(action)),
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state(),
            action,
        }
    }

    fn emit_state(&mut self) {
        let state = self.state();
        debug!(?state, "session state changed");
        self.events.push_back(Event::SessionStateChanged { state });
    }

    fn save_settings(&self) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };
        if let Err(err) = storage.save_settings(&self.settings) {
            warn!(error = %err, "settings save failed");
        }
    }
}
