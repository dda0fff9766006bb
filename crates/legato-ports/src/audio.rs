use crate::types::*;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Fire-and-forget metronome click. Called from the metronome thread, so
/// implementations must return immediately.
pub trait CueSink: Send + Sync {
    fn cue(&self);
}

pub trait AudioOutputPort: Send + Sync {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SilentCue;

impl CueSink for SilentCue {
    fn cue(&self) {}
}
