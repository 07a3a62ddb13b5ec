//! Driver Monitoring System (DMS)
//!
//! Drowsiness monitoring built around a periodic sample-and-analyze loop:
//! - Camera acquisition and release tied to the monitoring state
//! - A still sampled every interval and judged by a frame analyzer
//! - Fail-open handling of analyzer outages
//! - Audible and visible alert with automatic resume after a cooldown

pub mod analysis;
pub mod analyzer;
pub mod config;
pub mod gemini;
pub mod monitor;
pub mod schedule;
pub mod state;

pub use analysis::{AnalysisVerdict, DrowsinessSign};
pub use analyzer::{analyze_fail_open, AnalyzerError, FrameAnalyzer};
pub use config::{AnalyzerConfig, MonitorConfig};
pub use gemini::GeminiAnalyzer;
pub use monitor::{Command, Monitor, MonitorHandle, MonitorStatus, SampleResult};
pub use schedule::{Schedule, TimerKind};
pub use state::{DetectionState, Session};

use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor task is no longer running")]
    ChannelClosed,
}
