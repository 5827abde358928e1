//! Extraction over a plain HTTP model endpoint.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use kfuse_core::error::{FusionError, FusionResult};
use kfuse_core::traits::{ExtractionConfig, Extractor};

use crate::prompt::PromptTemplate;

static JSON_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").unwrap());
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([\]}])").unwrap());

/// Posts `{"prompt": ...}` to a model endpoint and parses the reply body as
/// one extraction batch.
pub struct HttpExtractor {
    client: reqwest::Client,
    url: String,
    timeout_ms: u64,
    prompt: PromptTemplate,
}

impl HttpExtractor {
    pub fn new(config: &ExtractionConfig) -> FusionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FusionError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            timeout_ms: config.timeout_ms,
            prompt: PromptTemplate::default(),
        })
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, chunk: &str) -> FusionResult<Value> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "prompt": self.prompt.render(chunk) }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FusionError::timeout("extraction request", self.timeout_ms)
                } else {
                    FusionError::extraction(format!("Extraction request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FusionError::extraction(format!("Failed to read model response: {}", e)))?;

        if !status.is_success() {
            return Err(FusionError::extraction(format!("Model returned {}: {}", status, body)));
        }
        debug!(chars = body.len(), "Model response received");
        parse_model_output(&body)
    }
}

/// Parse a model reply into a batch.
///
/// Accepts the array inside a markdown code fence, repairs single quotes and
/// trailing commas, and wraps a lone group object in an array.
pub fn parse_model_output(content: &str) -> FusionResult<Value> {
    let json_str = extract_json(content);
    if json_str.is_empty() {
        return Err(FusionError::invalid_response("empty model response"));
    }

    let value = match serde_json::from_str::<Value>(json_str) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Model output is not valid JSON, attempting repair");
            lenient_parse(json_str)
                .ok_or_else(|| FusionError::invalid_response(format!("unparseable model output: {}", e)))?
        }
    };

    Ok(match value {
        Value::Object(_) => Value::Array(vec![value]),
        other => other,
    })
}

fn extract_json(content: &str) -> &str {
    if let Some(m) = JSON_BLOCK.captures(content).and_then(|caps| caps.get(1)) {
        return m.as_str().trim();
    }
    content.trim()
}

fn lenient_parse(json_str: &str) -> Option<Value> {
    let fixed = json_str.replace('\'', "\"");
    let fixed = TRAILING_COMMA.replace_all(&fixed, "$1");
    serde_json::from_str(&fixed).ok()
}
