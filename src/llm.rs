use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("Language model returned no text")]
    EmptyResponse,
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),
}

/// Opaque text generation: prompt in, text out. Every call may fail.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        (**self).generate(prompt)
    }
}

/// Gemini `generateContent` over HTTPS.
#[derive(Clone)]
pub struct GeminiClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

impl GeminiClient {
    /// Build a client from config. The key is read from the environment
    /// variable named by `api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerateError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerateError::MissingApiKey(config.api_key_env.clone()))?;

        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self {
            agent: ureq::Agent::new_with_config(agent_config),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model);
        log::debug!("POST {url} ({} prompt chars)", prompt.len());

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let response: GenerateResponse = self
            .agent
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .send_json(&body)?
            .body_mut()
            .read_json()?;

        response.into_text().ok_or(GenerateError::EmptyResponse)
    }
}
