//! Generative content client: the single choke point for AI calls. Callers
//! say what they want back (structured JSON or plain text) and how capable
//! a model the task needs; transport, timeout, and parse failures come back
//! as distinct error kinds so the UI can tell "the network failed" apart
//! from "the AI answered wrong". No automatic retries here; a retry is
//! always a user-initiated re-invocation.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::GenerativeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    StructuredJson,
    PlainText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Capable,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub response_format: ResponseFormat,
    pub model_tier: ModelTier,
}

#[derive(Debug, Clone)]
pub enum GenerateOutput {
    Structured(Value),
    Text(String),
}

impl GenerateOutput {
    pub fn into_structured(self) -> Result<Value, LlmError> {
        match self {
            GenerateOutput::Structured(value) => Ok(value),
            GenerateOutput::Text(_) => Err(LlmError::MalformedResponse(
                "expected structured JSON, got plain text".to_string(),
            )),
        }
    }

    pub fn into_text(self) -> Result<String, LlmError> {
        match self {
            GenerateOutput::Text(text) => Ok(text),
            GenerateOutput::Structured(_) => Err(LlmError::MalformedResponse(
                "expected plain text, got structured JSON".to_string(),
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("generative request timed out after {0} seconds")]
    Timeout(u64),
    #[error("generative service transport failure: {0}")]
    Transport(String),
    #[error("generative service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed AI response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateOutput, LlmError>;
}

/// Locate the first balanced top-level JSON object or array in raw model
/// output, tolerating leading/trailing commentary. Returns the slice
/// covering exactly that region.
pub fn extract_json_region(raw: &str) -> Option<&str> {
    let start = raw.find(|c| c == '{' || c == '[')?;
    let bytes = raw.as_bytes();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Gemini-style `generateContent` client over reqwest.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    fast_model: String,
    capable_model: String,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(config: &GenerativeConfig) -> Self {
        GeminiClient {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            fast_model: config.fast_model.clone(),
            capable_model: config.capable_model.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Capable => &self.capable_model,
        }
    }

    async fn call(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        parsed
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                LlmError::MalformedResponse("response carried no candidate text".to_string())
            })
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateOutput, LlmError> {
        let model = self.model_for(request.model_tier).to_string();
        let budget = Duration::from_secs(self.timeout_secs);

        let raw = match tokio::time::timeout(budget, self.call(&model, &request.prompt)).await {
            Ok(result) => result?,
            Err(_) => return Err(LlmError::Timeout(self.timeout_secs)),
        };

        match request.response_format {
            ResponseFormat::PlainText => Ok(GenerateOutput::Text(raw)),
            ResponseFormat::StructuredJson => {
                let region = extract_json_region(&raw).ok_or_else(|| {
                    LlmError::MalformedResponse(
                        "no balanced JSON object or array in response".to_string(),
                    )
                })?;
                let value: Value = serde_json::from_str(region)
                    .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
                Ok(GenerateOutput::Structured(value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_wrapped_in_commentary() {
        let raw = "Sure! Here is the JSON you asked for:\n{\"questions\": [\"a?\"]}\nHope that helps.";
        assert_eq!(extract_json_region(raw), Some("{\"questions\": [\"a?\"]}"));
    }

    #[test]
    fn extracts_array_at_top_level() {
        let raw = "[1, 2, [3]] trailing";
        assert_eq!(extract_json_region(raw), Some("[1, 2, [3]]"));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let raw = "{\"plan\": \"use {curly} braces :]\"}";
        assert_eq!(extract_json_region(raw), Some(raw));
    }

    #[test]
    fn escaped_quotes_inside_strings_are_handled() {
        let raw = "note {\"line\": \"she said \\\"go\\\" {now}\"} done";
        assert_eq!(
            extract_json_region(raw),
            Some("{\"line\": \"she said \\\"go\\\" {now}\"}")
        );
    }

    #[test]
    fn unbalanced_or_absent_json_yields_none() {
        assert_eq!(extract_json_region("no json here"), None);
        assert_eq!(extract_json_region("{\"open\": ["), None);
    }

    #[test]
    fn output_mode_mismatch_is_malformed() {
        let err = GenerateOutput::Text("hi".to_string())
            .into_structured()
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }
}
