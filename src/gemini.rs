// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Gemini API client for image descriptions

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::describe::Describer;
use crate::{AppConfig, Result, StocktagError};

/// Prompt used to check credential and model before a batch
const HEALTH_CHECK_PROMPT: &str = "Test connection";

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retries: u32,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Inline { inline_data: InlineData },
    Text { text: String },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    /// Create a client from the application config
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retries: config.retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Check that the key and model answer a trivial text prompt
    pub async fn health_check(&self) -> Result<()> {
        let request = build_request(HEALTH_CHECK_PROMPT, None);
        let reply = self.send(&request).await.map_err(|e| {
            StocktagError::GeminiUnavailable(format!(
                "Cannot reach model {} at {}: {}",
                self.model, self.base_url, e
            ))
        })?;

        if reply.trim().is_empty() {
            return Err(StocktagError::GeminiUnavailable(format!(
                "Model {} returned an empty reply",
                self.model
            )));
        }
        Ok(())
    }

    /// Generate with image (inline base64 data)
    pub async fn generate_with_image(&self, prompt: &str, image: &[u8], mime_type: &str) -> Result<String> {
        debug!("Sending vision request to Gemini: model={}", self.model);
        let request = build_request(prompt, Some((image, mime_type)));
        self.send(&request).await
    }

    /// Generate with retry logic
    pub async fn generate_with_retry(&self, prompt: &str, image: &[u8], mime_type: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                let delay = backoff(attempt);
                warn!("Retrying Gemini request in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }

            match self.generate_with_image(prompt, image, mime_type).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            StocktagError::GeminiUnavailable("Unknown error".to_string())
        }))
    }

    async fn send(&self, request: &GenerateRequest) -> Result<String> {
        let response = self.client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StocktagError::GeminiUnavailable(format!(
                "Gemini returned status {}: {}",
                status,
                body.trim()
            )));
        }

        let result: GenerateResponse = response.json().await?;
        Ok(reply_text(result))
    }
}

#[async_trait]
impl Describer for GeminiClient {
    async fn describe(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<String> {
        self.generate_with_retry(prompt, image, mime_type).await
    }
}

/// Delay before retry `attempt` (1-based): 1s, 2s, 4s, …
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt.saturating_sub(1).min(6)))
}

fn build_request(prompt: &str, image: Option<(&[u8], &str)>) -> GenerateRequest {
    let mut parts = Vec::with_capacity(2);
    if let Some((bytes, mime_type)) = image {
        parts.push(RequestPart::Inline {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data: general_purpose::STANDARD.encode(bytes),
            },
        });
    }
    parts.push(RequestPart::Text { text: prompt.to_string() });

    GenerateRequest {
        contents: vec![RequestContent { parts }],
    }
}

/// Concatenated text parts of the first candidate
fn reply_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}
