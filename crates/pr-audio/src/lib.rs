//! Live audio output for polyrender.

mod cpal_backend;

pub use cpal_backend::{fill_output, CpalOutput};

/// Error type for audio operations.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("output device has no stereo f32 mode at {rate} Hz (device default: {})", describe_rate(.default))]
    UnsupportedRate { rate: u32, default: Option<u32> },
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
}

fn describe_rate(rate: &Option<u32>) -> String {
    rate.map_or_else(|| "unknown".into(), |hz| format!("{hz} Hz"))
}
