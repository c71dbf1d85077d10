//! Hosted text-generation adapter

use super::{ExplanationProvider, ExplanationRequest};
use crate::config::ExplanationConfig;
use crate::error::ExplanationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Text-generation request body
#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    input: String,
    parameters: GenerationParameters,
    model_id: &'a str,
    project_id: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
}

/// Explanation provider backed by a text-generation HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpExplainer {
    client: Client,
    endpoint: String,
    api_key: String,
    model_id: String,
    project_id: String,
    max_new_tokens: u32,
    temperature: f32,
}

impl HttpExplainer {
    /// Build from configuration; an empty endpoint means no provider
    pub fn from_config(config: &ExplanationConfig) -> Result<Self, ExplanationError> {
        if config.endpoint.trim().is_empty() {
            return Err(ExplanationError::Unavailable(
                "no explanation endpoint configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model_id: config.model_id.clone(),
            project_id: config.project_id.clone(),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
        })
    }

    fn body(&self, request: &ExplanationRequest) -> GenerationRequest<'_> {
        GenerationRequest {
            input: build_prompt(request),
            parameters: GenerationParameters {
                max_new_tokens: self.max_new_tokens,
                temperature: self.temperature,
            },
            model_id: &self.model_id,
            project_id: &self.project_id,
        }
    }
}

#[async_trait]
impl ExplanationProvider for HttpExplainer {
    async fn explain(&self, request: &ExplanationRequest) -> Result<String, ExplanationError> {
        let mut call = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&self.body(request));

        if !self.api_key.is_empty() {
            call = call.bearer_auth(&self.api_key);
        }

        let data: Value = call.send().await?.error_for_status()?.json().await?;

        extract_text(&data).ok_or(ExplanationError::EmptyResponse)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Prompt sent to the model
fn build_prompt(request: &ExplanationRequest) -> String {
    let scores = serde_json::to_string_pretty(&request.scores).unwrap_or_default();
    format!(
        "Transaction Analysis:\n\
         - Amount: {:.2}\n\
         - Category: {}\n\
         - Merchant: {}\n\n\
         Risk Scores: {}\n\
         Risk Level: {}\n\n\
         Provide a brief, clear explanation of why this transaction is flagged:",
        request.transaction.amount,
        request.transaction.category,
        request.transaction.merchant,
        scores,
        request.level,
    )
}

/// Pull generated text out of the response, whichever common shape it has
fn extract_text(data: &Value) -> Option<String> {
    const FIELDS: [&str; 3] = ["generated_text", "text", "output"];

    let first_result = data
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first());

    let from_result = first_result.and_then(|first| {
        FIELDS
            .iter()
            .find_map(|field| first.get(*field).and_then(Value::as_str))
    });

    let text = from_result.or_else(|| {
        ["generated_text", "output"]
            .iter()
            .find_map(|field| data.get(*field).and_then(Value::as_str))
    })?;

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
