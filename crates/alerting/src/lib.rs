//! Alerting System
//!
//! Audible drowsiness alarm: a three-pulse swept square-wave tone with a
//! hard three-second bound, and an emitter that never overlaps alarms.

#[cfg(feature = "device")]
mod device;
mod emitter;
mod pattern;

#[cfg(feature = "device")]
pub use device::DeviceOutput;
pub use emitter::{AlarmEmitter, AudioOutput, FlagPlayback, Playback, SilentOutput};
pub use pattern::{AlarmPattern, HARD_STOP};

use thiserror::Error;

/// Audio output errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("Audio stream error: {0}")]
    Stream(String),
}
