//! Drowsiness verdicts returned for each sample

use serde::{Deserialize, Serialize};

/// Reason attached to the verdict substituted for a failed analysis
pub const ANALYSIS_FAILED: &str = "analysis failed";

/// Signs the analyzer is asked to look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrowsinessSign {
    /// Mouth open wide
    Yawning,
    /// Hands touching or covering the eyes
    RubbingEyes,
    /// Both eyes closed
    EyesClosed,
    /// Head drooping, chin toward chest
    HeadDown,
}

impl DrowsinessSign {
    pub const ALL: [DrowsinessSign; 4] = [
        DrowsinessSign::Yawning,
        DrowsinessSign::RubbingEyes,
        DrowsinessSign::EyesClosed,
        DrowsinessSign::HeadDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DrowsinessSign::Yawning => "yawning",
            DrowsinessSign::RubbingEyes => "rubbing_eyes",
            DrowsinessSign::EyesClosed => "eyes_closed",
            DrowsinessSign::HeadDown => "head_down",
        }
    }

    /// Match a free-form sign reported by the analyzer
    pub fn parse(text: &str) -> Option<DrowsinessSign> {
        let normalized = text.trim().to_lowercase().replace([' ', '-'], "_");
        DrowsinessSign::ALL
            .into_iter()
            .find(|sign| normalized.contains(sign.as_str()))
    }
}

/// Structured drowsiness judgment for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisVerdict {
    /// True if any drowsiness criterion is met
    pub is_drowsy: bool,
    /// Short description of the observed state
    pub reason: String,
    /// Confidence between 0 and 1
    pub confidence: f64,
    /// Specific signs detected, in the order reported
    pub detected_signs: Vec<String>,
}

impl AnalysisVerdict {
    /// Verdict used when the analyzer could not be consulted
    pub fn fail_open() -> Self {
        Self {
            is_drowsy: false,
            reason: ANALYSIS_FAILED.to_string(),
            confidence: 0.0,
            detected_signs: Vec::new(),
        }
    }

    pub fn is_fail_open(&self) -> bool {
        !self.is_drowsy && self.confidence == 0.0 && self.reason == ANALYSIS_FAILED
    }

    /// Whether every field holds a usable value
    pub fn is_well_formed(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }

    /// Signs that map onto the known criteria
    pub fn known_signs(&self) -> Vec<DrowsinessSign> {
        self.detected_signs
            .iter()
            .filter_map(|s| DrowsinessSign::parse(s))
            .collect()
    }
}
