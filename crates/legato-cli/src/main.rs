use anyhow::{Context, Result};
use clap::Parser;
use legato_core::{
    validate_settings, Command, Event, LogReportSink, MidiFileExportSink, SessionController,
    SessionState, SettingField, SnapshotReader,
};
use legato_domain_eval::Classification;
use legato_infra_audio_cpal::CpalAudioOutputPort;
use legato_infra_midi_midir::MidirMidiInputPort;
use legato_infra_storage_fs::FsStorage;
use legato_ports::audio::{CueSink, SilentCue};
use legato_ports::midi::MidiInputPort;
use legato_ports::storage::{ReferenceReuse, SettingsDto, StoragePort};
use legato_ports::types::DeviceId;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const FRAME: Duration = Duration::from_millis(16);

/// Practice against a reference MIDI file and get scored live.
#[derive(Parser, Debug)]
#[command(name = "legato", version)]
struct Cli {
    /// Reference MIDI file to practice against
    #[arg(short, long)]
    reference: Option<PathBuf>,

    #[arg(long)]
    bpm: Option<u32>,

    /// Onset tolerance in seconds
    #[arg(long)]
    time_tolerance: Option<f64>,

    #[arg(long)]
    velocity_tolerance: Option<u8>,

    #[arg(long)]
    pedal_start_tolerance: Option<f64>,

    #[arg(long)]
    pedal_duration_tolerance: Option<f64>,

    /// Count-in beats before recording
    #[arg(long)]
    countdown: Option<u32>,

    /// Latency compensation subtracted from every timestamp
    #[arg(long, allow_hyphen_values = true)]
    input_offset_ms: Option<i32>,

    /// Each reference note can be matched at most once
    #[arg(long)]
    exclusive: bool,

    /// MIDI input id as printed by --list-inputs
    #[arg(long)]
    midi_in: Option<String>,

    /// Disable the metronome click
    #[arg(long)]
    no_cue: bool,

    /// Where recorded performances are written
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Print the available MIDI inputs and exit
    #[arg(long)]
    list_inputs: bool,
}

impl Cli {
    fn overlay(&self, settings: &mut SettingsDto) {
        let practice = &mut settings.practice;
        if let Some(bpm) = self.bpm {
            practice.bpm = bpm;
        }
        if let Some(value) = self.time_tolerance {
            practice.time_tolerance_s = value;
        }
        if let Some(value) = self.velocity_tolerance {
            practice.velocity_tolerance = value;
        }
        if let Some(value) = self.pedal_start_tolerance {
            practice.pedal_start_tolerance_s = value;
        }
        if let Some(value) = self.pedal_duration_tolerance {
            practice.pedal_duration_tolerance_s = value;
        }
        if let Some(beats) = self.countdown {
            practice.countdown_beats = beats;
        }
        if let Some(offset) = self.input_offset_ms {
            practice.input_offset_ms = offset;
        }
        if self.exclusive {
            practice.reference_reuse = ReferenceReuse::Exclusive;
        }
        if let Some(id) = self.midi_in.as_ref() {
            settings.selected_midi_in = Some(DeviceId(id.clone()));
        }
        if let Some(path) = self.reference.as_ref() {
            settings.reference_path = Some(path.display().to_string());
        }
        if let Some(dir) = self.export_dir.as_ref() {
            settings.export_dir = Some(dir.display().to_string());
        }
        if self.no_cue {
            settings.cue_enabled = false;
        }
    }
}

/// What a console line asks for.
enum Input {
    Toggle,
    Quit,
    Command(Command),
    Help,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word {
        "" => Input::Toggle,
        "q" | "quit" => Input::Quit,
        "?" | "help" => Input::Help,
        "inputs" => Input::Command(Command::ListMidiInputs),
        "input" if !rest.is_empty() => Input::Command(Command::SelectMidiInput {
            device_id: DeviceId(rest.to_string()),
        }),
        "load" if !rest.is_empty() => Input::Command(Command::LoadReference {
            path: rest.to_string(),
        }),
        "diag" if !rest.is_empty() => Input::Command(Command::ExportDiagnostics {
            path: rest.to_string(),
        }),
        "set" => match rest.split_once(char::is_whitespace) {
            Some((field, value)) => match field.parse::<SettingField>() {
                Ok(field) => Input::Command(Command::UpdateSetting {
                    field,
                    value: value.trim().to_string(),
                }),
                Err(err) => Input::Unknown(err.to_string()),
            },
            None => Input::Unknown("usage: set <field> <value>".to_string()),
        },
        other => Input::Unknown(format!("unknown input `{other}`, type `help`")),
    }
}

fn print_help() {
    println!("  <enter>              start / stop / dismiss the report");
    println!("  load <path>          load a reference MIDI file");
    println!("  set <field> <value>  change a practice setting");
    println!("  inputs               list MIDI inputs");
    println!("  input <id>           switch MIDI input");
    println!("  diag <dir>           export diagnostics");
    println!("  q                    quit");
    let fields: Vec<&str> = SettingField::ALL.iter().map(|f| f.name()).collect();
    println!("  fields: {}", fields.join(", "));
}

fn toggle(state: SessionState) -> Command {
    match state {
        SessionState::Idle => Command::Start,
        SessionState::Countdown | SessionState::Recording => Command::Stop,
        SessionState::Reporting => Command::DismissReport,
    }
}

fn print_event(event: &Event) {
    match event {
        Event::SessionStateChanged { state } => match state {
            SessionState::Idle => println!("ready, press enter to start"),
            SessionState::Countdown => println!("counting in..."),
            SessionState::Recording => println!("recording, press enter to stop"),
            SessionState::Reporting => {}
        },
        Event::ReferenceLoaded {
            notes,
            pedal_intervals,
            total_duration,
            bars,
        } => println!(
            "reference: {notes} notes, {pedal_intervals} pedal intervals, {total_duration:.1}s over {bars} bars"
        ),
        Event::CountIn { beat, of } => println!("  {beat}/{of}"),
        Event::ReportReady { report } => {
            println!();
            println!("{}", report.summary_text());
            println!("press enter to dismiss");
        }
        Event::PerformanceExported { path } => println!("saved {path}"),
        Event::MidiInputsUpdated { devices } => {
            if devices.is_empty() {
                println!("no MIDI inputs");
            }
            for device in devices {
                println!("  {}  {}", device.id, device.name);
            }
        }
        Event::SettingsUpdated { settings } => {
            let practice = &settings.practice;
            println!(
                "settings: {} bpm, ±{}s, ±{} velocity, {} count-in beats",
                practice.bpm,
                practice.time_tolerance_s,
                practice.velocity_tolerance,
                practice.countdown_beats
            );
        }
    }
}

/// Prints notes judged since the last frame.
struct LiveFeed {
    reader: SnapshotReader,
    shown: usize,
}

impl LiveFeed {
    fn new(reader: SnapshotReader) -> Self {
        Self { reader, shown: 0 }
    }

    fn reset(&mut self) {
        self.shown = 0;
    }

    fn poll(&mut self) {
        let snapshot = self.reader.latest();
        for note in snapshot.notes.iter().skip(self.shown) {
            let mark = match note.classification {
                Classification::Correct => "ok",
                Classification::TooHard => "too hard",
                Classification::TooLight => "too light",
                Classification::Incorrect => "miss",
            };
            let timing = match note.score {
                Some(score) => format!("timing {:>3.0}", score.timing),
                None => "timing   -".to_string(),
            };
            println!(
                "  bar {:>3}  {:>7.2}s  pitch {:>3}  {:<9}  {timing}  combo {}",
                note.bar, note.onset, note.pitch, mark, snapshot.combo.current
            );
        }
        self.shown = snapshot.notes.len();
    }
}

fn spawn_stdin() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn open_cue(audio: &CpalAudioOutputPort, settings: &SettingsDto) -> Arc<dyn CueSink> {
    if !settings.cue_enabled {
        return Arc::new(SilentCue);
    }
    match audio.open_cue(settings.selected_audio_out.as_ref()) {
        Ok(sink) => Arc::new(sink),
        Err(err) => {
            warn!(error = %err, "no audio output, metronome is silent");
            Arc::new(SilentCue)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let midi_port = MidirMidiInputPort::default();
    if cli.list_inputs {
        let devices = midi_port.list_inputs().context("listing MIDI inputs")?;
        if devices.is_empty() {
            println!("no MIDI inputs");
        }
        for device in devices {
            println!("{}  {}", device.id, device.name);
        }
        return Ok(());
    }

    let storage = FsStorage::default();
    let mut settings = match storage.load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "settings load failed, using defaults");
            SettingsDto::default()
        }
    };
    cli.overlay(&mut settings);
    validate_settings(&settings.practice).context("invalid practice settings")?;

    let export_dir = settings
        .export_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| storage.default_export_dir());
    info!(dir = %export_dir.display(), "performances are saved here");

    let audio = CpalAudioOutputPort::new();
    let cue = open_cue(&audio, &settings);

    let mut session = SessionController::with_settings(
        Box::new(midi_port),
        cue,
        Some(Box::new(storage)),
        settings,
    );
    session.set_audio_port(Box::new(audio));
    session.set_export_sink(Box::new(MidiFileExportSink::new(export_dir)));
    session.add_report_sink(Box::new(LogReportSink));

    let mut feed = LiveFeed::new(session.snapshot_reader());
    let lines = spawn_stdin();
    println!("legato: press enter to start, `help` for commands");

    'host: loop {
        loop {
            let line = match lines.try_recv() {
                Ok(line) => line,
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break 'host,
            };
            let command = match parse_input(&line) {
                Input::Toggle => toggle(session.state()),
                Input::Quit => break 'host,
                Input::Command(command) => command,
                Input::Help => {
                    print_help();
                    continue;
                }
                Input::Unknown(message) => {
                    println!("{message}");
                    continue;
                }
            };
            if matches!(command, Command::Start) {
                feed.reset();
            }
            if let Err(err) = session.handle_command(command) {
                println!("{err}");
            }
        }

        session.tick();
        for event in session.drain_events() {
            print_event(&event);
        }
        if matches!(
            session.state(),
            SessionState::Recording | SessionState::Reporting
        ) {
            feed.poll();
        }
        std::thread::sleep(FRAME);
    }

    if matches!(
        session.state(),
        SessionState::Countdown | SessionState::Recording
    ) {
        session.stop().context("stopping the session")?;
        feed.poll();
        for event in session.drain_events() {
            print_event(&event);
        }
    }
    Ok(())
}
