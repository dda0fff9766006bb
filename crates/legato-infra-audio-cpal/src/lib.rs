use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use legato_ports::audio::{AudioError, AudioOutputPort, CueSink};
use legato_ports::types::{AudioOutputDevice, DeviceId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, warn};

pub const CLICK_FREQUENCY_HZ: f32 = 450.0;
pub const CLICK_DURATION_S: f32 = 0.05;
pub const CLICK_FADE_S: f32 = 0.005;
pub const CLICK_GAIN: f32 = 0.5;

pub struct CpalAudioOutputPort {
    host: cpal::Host,
}

impl CpalAudioOutputPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn with_host(host: cpal::Host) -> Self {
        Self { host }
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host.id()
    }

    fn list_devices_from_host(
        host: &cpal::Host,
    ) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
        let host_id = format!("{:?}", host.id());
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let mut list = Vec::new();
        for (index, device) in devices.enumerate() {
            let name = device
                .name()
                .unwrap_or_else(|_| "Unknown Output".to_string());
            let id = DeviceId(format!("cpal:{}:{}:{}", host_id, index, name));
            list.push((id, device));
        }

        Ok(list)
    }

    /// Opens a click stream on `device_id`, or on the host's default output.
    pub fn open_cue(&self, device_id: Option<&DeviceId>) -> Result<CpalCueSink, AudioError> {
        let device_id = device_id.cloned();
        let host_id = self.host.id();
        let triggers = Arc::new(AtomicU32::new(0));
        let stream_triggers = triggers.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        // cpal::Stream is not Send; it never leaves this thread
        let join_handle = thread::spawn(move || {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(err) => {
                    let _ = ready_tx.send(Err(AudioError::Backend(err.to_string())));
                    return;
                }
            };
            let device = match find_device(&host, device_id.as_ref()) {
                Ok(device) => device,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let supported = match device.default_output_config() {
                Ok(config) => config,
                Err(err) => {
                    let _ = ready_tx.send(Err(AudioError::Backend(err.to_string())));
                    return;
                }
            };

            let sample_format = supported.sample_format();
            let config: StreamConfig = supported.config();
            let stream = match build_click_stream(&device, &config, sample_format, stream_triggers) {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::Backend(err.to_string())));
                return;
            }

            debug!(
                sample_rate = config.sample_rate.0,
                channels = config.channels,
                "cue stream started"
            );
            let _ = ready_tx.send(Ok(()));
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))?
        {
            Ok(()) => Ok(CpalCueSink {
                triggers,
                stop_tx: Mutex::new(Some(stop_tx)),
                join_handle: Mutex::new(Some(join_handle)),
            }),
            Err(err) => Err(err),
        }
    }
}

impl Default for CpalAudioOutputPort {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutputPort for CpalAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        let devices = Self::list_devices_from_host(&self.host)?;
        let mut results = Vec::new();

        for (id, device) in devices {
            let name = device
                .name()
                .unwrap_or_else(|_| "Unknown Output".to_string());
            let default_config = match device.default_output_config() {
                Ok(config) => config,
                Err(_) => continue,
            };

            results.push(AudioOutputDevice {
                id,
                name,
                sample_rate_hz: default_config.sample_rate().0,
                channels: default_config.channels(),
            });
        }

        Ok(results)
    }
}

/// Metronome click on a cpal output stream. `cue` only bumps a counter the
/// audio callback picks up, so it never blocks.
pub struct CpalCueSink {
    triggers: Arc<AtomicU32>,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    join_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalCueSink {
    pub fn close(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.join_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl CueSink for CpalCueSink {
    fn cue(&self) {
        self.triggers.fetch_add(1, Ordering::Release);
    }
}

impl Drop for CpalCueSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sine burst with linear fades. Restarting mid-click starts over.
#[derive(Clone, Debug)]
pub struct ClickVoice {
    sample_rate: f32,
    length: usize,
    fade: usize,
    position: Option<usize>,
}

impl ClickVoice {
    pub fn new(sample_rate_hz: u32) -> Self {
        let sample_rate = sample_rate_hz.max(1) as f32;
        Self {
            sample_rate,
            length: (CLICK_DURATION_S * sample_rate).round().max(1.0) as usize,
            fade: (CLICK_FADE_S * sample_rate).round().max(1.0) as usize,
            position: None,
        }
    }

    pub fn trigger(&mut self) {
        self.position = Some(0);
    }

    pub fn is_active(&self) -> bool {
        self.position.is_some()
    }

    pub fn len_samples(&self) -> usize {
        self.length
    }

    /// Fills `out` with mono samples; silence once the click has ended.
    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = match self.position {
                Some(pos) if pos < self.length => {
                    self.position = Some(pos + 1);
                    self.sample_at(pos)
                }
                Some(_) => {
                    self.position = None;
                    0.0
                }
                None => 0.0,
            };
        }
    }

    fn sample_at(&self, pos: usize) -> f32 {
        let t = pos as f32 / self.sample_rate;
        let fade_in = (pos as f32 / self.fade as f32).min(1.0);
        let fade_out = ((self.length - pos) as f32 / self.fade as f32).min(1.0);
        let phase = 2.0 * std::f32::consts::PI * CLICK_FREQUENCY_HZ * t;
        phase.sin() * CLICK_GAIN * fade_in.min(fade_out)
    }
}

fn find_device(host: &cpal::Host, device_id: Option<&DeviceId>) -> Result<cpal::Device, AudioError> {
    match device_id {
        Some(device_id) => CpalAudioOutputPort::list_devices_from_host(host)?
            .into_iter()
            .find(|(id, _)| id == device_id)
            .map(|(_, device)| device)
            .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string())),
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("default output".to_string())),
    }
}

fn build_click_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    triggers: Arc<AtomicU32>,
) -> Result<cpal::Stream, AudioError> {
    let channels = config.channels as usize;
    let mut voice = ClickVoice::new(config.sample_rate.0);
    let mut mono: Vec<f32> = vec![0.0; 8192];
    let error_callback = |err| {
        warn!(error = %err, "cpal stream error");
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let frames = render_frames(&mut voice, &triggers, &mut mono, data.len(), channels);
                write_interleaved(data, channels, &mono[..frames], |v| v);
            },
            error_callback,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            config,
            move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                let frames = render_frames(&mut voice, &triggers, &mut mono, data.len(), channels);
                write_interleaved(data, channels, &mono[..frames], f32_to_i16);
            },
            error_callback,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            config,
            move |data: &mut [u16], _info: &cpal::OutputCallbackInfo| {
                let frames = render_frames(&mut voice, &triggers, &mut mono, data.len(), channels);
                write_interleaved(data, channels, &mono[..frames], f32_to_u16);
            },
            error_callback,
            None,
        ),
        other => {
            return Err(AudioError::UnsupportedConfig(format!(
                "sample format {other:?}"
            )))
        }
    };

    stream.map_err(|e| AudioError::Backend(e.to_string()))
}

fn render_frames(
    voice: &mut ClickVoice,
    triggers: &AtomicU32,
    mono: &mut Vec<f32>,
    samples: usize,
    channels: usize,
) -> usize {
    let frames = samples / channels.max(1);
    if frames > mono.len() {
        mono.resize(frames, 0.0);
    }
    if triggers.swap(0, Ordering::Acquire) > 0 {
        voice.trigger();
    }
    voice.render(&mut mono[..frames]);
    frames
}

fn write_interleaved<T: Copy>(data: &mut [T], channels: usize, mono: &[f32], convert: impl Fn(f32) -> T) {
    if channels == 0 {
        return;
    }
    for (frame, chunk) in data.chunks_mut(channels).enumerate() {
        let value = convert(mono.get(frame).copied().unwrap_or(0.0));
        for sample in chunk {
            *sample = value;
        }
    }
}

fn f32_to_i16(value: f32) -> i16 {
    let v = value.clamp(-1.0, 1.0);
    (v * i16::MAX as f32) as i16
}

fn f32_to_u16(value: f32) -> u16 {
    let v = value.clamp(-1.0, 1.0);
    let scaled = (v * 0.5 + 0.5) * u16::MAX as f32;
    scaled.round().clamp(0.0, u16::MAX as f32) as u16
}
