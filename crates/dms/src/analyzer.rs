//! Frame analyzer port

use crate::analysis::AnalysisVerdict;
use async_trait::async_trait;
use camera_capture::JpegStill;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Analyzer failures. None of these reach the driver.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Analyzer request failed: {0}")]
    Request(String),

    #[error("Analyzer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Analyzer returned no content")]
    EmptyResponse,

    #[error("Malformed verdict: {0}")]
    Malformed(String),

    #[error("Analyzer timed out after {0}ms")]
    Timeout(u64),

    #[error("Analyzer API key not configured")]
    MissingApiKey,
}

/// Something that can judge drowsiness from a still
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    async fn analyze(&self, still: &JpegStill) -> Result<AnalysisVerdict, AnalyzerError>;
}

/// Analyze with a deadline, substituting the fail-open verdict on any failure.
pub async fn analyze_fail_open(
    analyzer: &dyn FrameAnalyzer,
    still: &JpegStill,
    timeout: Duration,
) -> AnalysisVerdict {
    let outcome = match tokio::time::timeout(timeout, analyzer.analyze(still)).await {
        Ok(Ok(verdict)) if verdict.is_well_formed() => Ok(verdict),
        Ok(Ok(verdict)) => Err(AnalyzerError::Malformed(format!(
            "confidence {} outside [0, 1]",
            verdict.confidence
        ))),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(AnalyzerError::Timeout(timeout.as_millis() as u64)),
    };

    match outcome {
        Ok(verdict) => {
            debug!(
                "Sample {} analyzed: drowsy={} confidence={:.2}",
                still.sequence, verdict.is_drowsy, verdict.confidence
            );
            verdict
        }
        Err(e) => {
            warn!("Analysis of sample {} failed, assuming alert driver: {}", still.sequence, e);
            metrics::counter!("dms_analyzer_failures_total").increment(1);
            AnalysisVerdict::fail_open()
        }
    }
}
