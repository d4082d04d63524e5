//! Snow depth estimation through a Gemini-compatible vision model.

use crate::config::VisionConfig;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const SNOW_DEPTH_PROMPT: &str = "You are looking at a still frame from a weather station camera. \
A snow measurement stake marked in centimeters is in view. Estimate the snow depth at the stake in \
centimeters. Answer with a single JSON object and nothing else, for example {\"snow_depth_cm\": 12.5}. \
If the stake is not visible or the depth cannot be determined, answer {\"snow_depth_cm\": -1}.";

#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Sends `prompt` plus a base64 jpeg and returns the model's text answer.
    async fn describe(&self, prompt: &str, image_base64: &str) -> Result<String>;
}

pub struct GeminiVision {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl GeminiVision {
    pub fn new(http: reqwest::Client, cfg: &VisionConfig) -> Self {
        Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.resolved_api_key(),
            timeout: Duration::from_secs(cfg.timeout_seconds.max(1)),
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl VisionModel for GeminiVision {
    async fn describe(&self, prompt: &str, image_base64: &str) -> Result<String> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": "image/jpeg", "data": image_base64 } }
                ]
            }]
        });

        let mut request = self.http.post(&self.endpoint).timeout(self.timeout).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("x-goog-api-key", key);
        }

        let response: GenerateResponse = request
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?
            .error_for_status()?
            .json()
            .await
            .context("vision response is not a generateContent reply")?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("vision model returned no candidates"))?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        if text.trim().is_empty() {
            bail!("vision model returned an empty answer");
        }
        Ok(text)
    }
}

/// Pulls `snow_depth_cm` out of a model answer. Markdown fences and any text
/// around the JSON object are tolerated. `Ok(None)` means the model said it
/// could not tell (a negative depth).
pub fn parse_snow_depth(answer: &str) -> Result<Option<f64>> {
    let cleaned = answer.replace("```json", "").replace("```", "");
    let start = cleaned
        .find('{')
        .ok_or_else(|| anyhow!("no JSON object in answer: {}", answer.trim()))?;
    let end = cleaned
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("unterminated JSON object in answer: {}", answer.trim()))?;

    let object: Value = serde_json::from_str(&cleaned[start..=end]).context("answer is not valid JSON")?;
    let depth = match object.get("snow_depth_cm") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| anyhow!("answer has no numeric snow_depth_cm"))?;

    if depth < 0.0 {
        Ok(None)
    } else {
        Ok(Some(depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_answer() {
        assert_eq!(parse_snow_depth(r#"{"snow_depth_cm": 23.5}"#).unwrap(), Some(23.5));
    }

    #[test]
    fn test_fenced_answer() {
        let answer = "```json\n{\"snow_depth_cm\": 8}\n```\n";
        assert_eq!(parse_snow_depth(answer).unwrap(), Some(8.0));
    }

    #[test]
    fn test_chatty_answer() {
        let answer = "Sure! Here is my estimate: {\"snow_depth_cm\": \"14.2\"} based on the stake.";
        assert_eq!(parse_snow_depth(answer).unwrap(), Some(14.2));
    }

    #[test]
    fn test_sentinel() {
        assert_eq!(parse_snow_depth(r#"{"snow_depth_cm": -1}"#).unwrap(), None);
    }

    #[test]
    fn test_garbage() {
        assert!(parse_snow_depth("no idea").is_err());
        assert!(parse_snow_depth(r#"{"depth": 3}"#).is_err());
        assert!(parse_snow_depth("} {").is_err());
    }
}
