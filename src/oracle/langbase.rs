use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{Oracle, OracleReply};
use crate::completion::parse_json_completion;
use crate::config::{LangbaseConfig, RequestConfig};
use crate::error::{OracleError, OracleResult};
use crate::prompts::ORACLE_SYSTEM_PROMPT;

/// Message in a Langbase conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request to run a Langbase pipe
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    /// Pipe name (required by Langbase API)
    pub name: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
}

impl PipeRequest {
    /// Create a new pipe request with name and messages
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            stream: false,
        }
    }
}

/// Response from a Langbase pipe
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    pub success: bool,
    pub completion: String,
    pub raw: Option<RawResponse>,
}

/// Raw model response details
#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// Token usage information; only the total feeds oracle accounting.
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub total_tokens: Option<u32>,
}

/// Oracle backed by a single Langbase pipe.
///
/// Several instances with different pipe names form an oracle panel.
#[derive(Clone)]
pub struct LangbaseOracle {
    client: Client,
    base_url: String,
    api_key: String,
    pipe: String,
    request_config: RequestConfig,
}

impl LangbaseOracle {
    /// Create an oracle for `pipe`.
    pub fn new(
        config: &LangbaseConfig,
        pipe: impl Into<String>,
        request_config: RequestConfig,
    ) -> OracleResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(OracleError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            pipe: pipe.into(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call the pipe, retrying with exponential backoff.
    pub async fn call_pipe(&self, request: PipeRequest) -> OracleResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    pipe = %self.pipe,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %self.pipe,
                        latency_ms = start.elapsed().as_millis(),
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        pipe = %self.pipe,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Langbase pipe call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(OracleError::Unavailable {
            oracle: self.pipe.clone(),
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    async fn execute_request(&self, url: &str, request: &PipeRequest) -> OracleResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout {
                        oracle: self.pipe.clone(),
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    OracleError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }
}

/// Read a self-reported `confidence` field from a JSON completion.
fn reported_confidence(completion: &str) -> Option<f64> {
    parse_json_completion(completion)
        .and_then(|value| value.get("confidence").and_then(serde_json::Value::as_f64))
}

#[async_trait]
impl Oracle for LangbaseOracle {
    fn name(&self) -> &str {
        &self.pipe
    }

    async fn query(&self, prompt: &str, context: &serde_json::Value) -> OracleResult<OracleReply> {
        let context_json = serde_json::to_string_pretty(context).map_err(|e| {
            OracleError::InvalidResponse {
                message: format!("Failed to serialize context: {}", e),
            }
        })?;

        let request = PipeRequest::new(
            self.pipe.clone(),
            vec![
                Message::system(ORACLE_SYSTEM_PROMPT),
                Message::user(format!("{}\n\nContext:\n{}", prompt, context_json)),
            ],
        );

        let response = self.call_pipe(request).await?;
        if !response.success {
            return Err(OracleError::InvalidResponse {
                message: "Pipe reported success=false".to_string(),
            });
        }

        let usage = response.raw.as_ref().and_then(|raw| raw.usage.as_ref());
        let model = response.raw.as_ref().and_then(|raw| raw.model.clone());

        Ok(OracleReply {
            confidence: reported_confidence(&response.completion),
            tokens_used: usage.and_then(|u| u.total_tokens),
            cost_estimate: None,
            provider: model.unwrap_or_else(|| self.pipe.clone()),
            text: response.completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_creation_trims_base_url() {
        let config = LangbaseConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.langbase.com/".to_string(),
        };
        let oracle = LangbaseOracle::new(&config, "oracle-a", RequestConfig::default()).unwrap();
        assert_eq!(oracle.base_url(), "https://api.langbase.com");
        assert_eq!(oracle.name(), "oracle-a");
    }

    #[test]
    fn test_reported_confidence() {
        assert_eq!(
            reported_confidence("{\"verdict\": \"scam\", \"confidence\": 0.82}"),
            Some(0.82)
        );
        assert_eq!(reported_confidence("I am very confident"), None);
        assert_eq!(reported_confidence("{\"verdict\": \"scam\"}"), None);
    }

    #[test]
    fn test_usage_ignores_per_side_token_counts() {
        let raw: RawResponse = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o-mini",
            "usage": { "prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150 }
        }))
        .unwrap();
        assert_eq!(raw.usage.and_then(|u| u.total_tokens), Some(150));
    }

    #[test]
    fn test_pipe_request_serialization() {
        let request = PipeRequest::new(
            "oracle-a",
            vec![Message::system("be careful"), Message::user("hi")],
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["name"], "oracle-a");
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert!(value.get("variables").is_none());
    }
}
