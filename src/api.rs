use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::EngineError;

/// Text revealed when the service has no answer for a question
pub const FALLBACK_ANSWER: &str = "No answer found for this question.";

/// The remote answer/suggestion service.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Autocomplete suggestions for a partial prompt.
    async fn suggestions(&self, query: &str) -> Result<Vec<String>, EngineError>;

    /// The full answer for a submitted prompt. An empty string means the
    /// service had nothing to say.
    async fn answer(&self, query: &str) -> Result<String, EngineError>;
}

/// Substitute the fallback text for a blank answer.
pub fn answer_or_fallback(answer: &str) -> &str {
    if answer.trim().is_empty() {
        FALLBACK_ANSWER
    } else {
        answer
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuggestionItem {
    Text(String),
    Entry { input: String },
}

/// Pull suggestion strings out of a response body.
///
/// Accepts a bare array or `{ "suggestions": [...] }`; array elements may be
/// strings or `{ "input": ... }` objects. Anything else yields no suggestions.
pub fn parse_suggestions(value: Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("suggestions") {
            Some(Value::Array(items)) => items,
            _ => {
                tracing::debug!("Suggestion payload has no suggestion list");
                return Vec::new();
            }
        },
        _ => {
            tracing::debug!("Suggestion payload is not a list");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<SuggestionItem>(item) {
            Ok(SuggestionItem::Text(text)) | Ok(SuggestionItem::Entry { input: text }) => Some(text),
            Err(_) => None,
        })
        .filter(|text| !text.trim().is_empty())
        .collect()
}

/// Pull the answer text out of a response body; missing means empty.
pub fn parse_answer(value: &Value) -> String {
    value
        .get("answer")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// HTTP client for the answer/suggestion service
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get(&self, endpoint: &str, query: &str) -> Result<String, EngineError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Network(format!(
                "{} returned {}: {}",
                endpoint,
                status,
                error_text.trim()
            )));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl AssistantApi for ApiClient {
    async fn suggestions(&self, query: &str) -> Result<Vec<String>, EngineError> {
        let body = self.get("suggestion", query).await?;

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(parse_suggestions(value)),
            Err(err) => {
                tracing::warn!("Malformed suggestion payload, treating as empty: {}", err);
                Ok(Vec::new())
            }
        }
    }

    async fn answer(&self, query: &str) -> Result<String, EngineError> {
        let body = self.get("answer", query).await?;

        let value: Value = serde_json::from_str(&body)
            .map_err(|err| EngineError::Network(format!("malformed answer payload: {}", err)))?;
        Ok(parse_answer(&value))
    }
}
