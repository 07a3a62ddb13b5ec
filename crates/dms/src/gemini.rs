//! Gemini-backed frame analyzer

use crate::analysis::AnalysisVerdict;
use crate::analyzer::{AnalyzerError, FrameAnalyzer};
use crate::config::AnalyzerConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use camera_capture::JpegStill;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

const SYSTEM_INSTRUCTION: &str = "\
You are a highly accurate Drowsiness Detection System for vehicle safety.
Your job is to analyze the provided image of a driver's face and determine if they are \
showing signs of drowsiness or distraction.

Specific criteria for Drowsiness/Danger:
1. Yawning (Mouth open wide).
2. Rubbing eyes (Hands touching or covering eyes).
3. Eyes closed (Both eyes closed for a prolonged moment - \
assume captured frame is representative).
4. Head facing downward (Nodding off, chin near chest).

Return a strict JSON response.";

const USER_PROMPT: &str = "Analyze the driver's state. \
    Are they drowsy based on: yawning, rubbing eyes, eyes closed, or head down?";

/// Analyzer calling the Gemini `generateContent` endpoint
pub struct GeminiAnalyzer {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl GeminiAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(AnalyzerError::MissingApiKey)?;

        let url = format!(
            "{}/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );
        info!("Gemini analyzer using model {}", config.model);

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            api_key,
        })
    }

    fn request_body(still: &JpegStill) -> Value {
        json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": [{
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": still.mime_type(),
                            "data": STANDARD.encode(&still.data)
                        }
                    },
                    { "text": USER_PROMPT }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": verdict_schema()
            }
        })
    }
}

fn verdict_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "isDrowsy": {
                "type": "BOOLEAN",
                "description": "True if any drowsiness criteria are met."
            },
            "reason": {
                "type": "STRING",
                "description": "Short description of the detected state (e.g., 'User is yawning')."
            },
            "confidence": {
                "type": "NUMBER",
                "description": "Confidence level between 0 and 1."
            },
            "detectedSigns": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "List of specific signs detected (e.g., ['yawning', 'eyes_closed'])."
            }
        },
        "required": ["isDrowsy", "reason", "confidence", "detectedSigns"]
    })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Pull the verdict out of a `generateContent` response body
fn parse_verdict(body: &str) -> Result<AnalysisVerdict, AnalyzerError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| AnalyzerError::Malformed(e.to_string()))?;

    let text = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(AnalyzerError::EmptyResponse)?;

    let verdict: AnalysisVerdict =
        serde_json::from_str(&text).map_err(|e| AnalyzerError::Malformed(e.to_string()))?;
    if !verdict.is_well_formed() {
        return Err(AnalyzerError::Malformed(format!(
            "confidence {} outside [0, 1]",
            verdict.confidence
        )));
    }
    Ok(verdict)
}

#[async_trait]
impl FrameAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, still: &JpegStill) -> Result<AnalysisVerdict, AnalyzerError> {
        debug!("Sending {} byte still to analyzer", still.len());

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(still))
            .send()
            .await
            .map_err(|e| AnalyzerError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalyzerError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalyzerError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        parse_verdict(&body)
    }
}
