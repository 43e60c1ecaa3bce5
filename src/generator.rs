//! Answer generation against an OpenAI-compatible chat-completions endpoint.
//!
//! The [`Generator`] trait hides the model behind a prompt-in, text-out seam.
//! When no generator is configured the pipeline falls back to extractive
//! answers assembled by the engine, so everything here is strictly optional.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::{RagError, Result};

/// Produces a free-text answer from a fully assembled prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the grounded answer prompt from a question and a context block.
///
/// The instructions pin the model to the supplied context and ask it to
/// admit ignorance rather than speculate.
pub fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "Answer the question using only the reference information below. \
         If the reference information is not sufficient to answer, say that \
         you cannot answer based on the available information. Be accurate \
         and concise, and do not invent facts.\n\n\
         Reference information:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// Chat-completions client for an OpenAI-compatible endpoint.
pub struct HttpGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl HttpGenerator {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::upstream("generation", e))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagError::upstream("generation", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream {
                service: "generation",
                message: format!("HTTP {status}: {body_text}"),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::Parse(format!("chat response: {e}")))?;

        let answer = parse_chat_response(&json)?;
        debug!(chars = answer.len(), "generated answer");
        Ok(answer)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| RagError::Parse("chat response missing choices[0].message.content".to_string()))
}
