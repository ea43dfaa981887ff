//! Generation collaborator over a messages-style HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{Generation, GenerationError, GenerationRequest};
use crate::config::GenerationConfig;

/// Maximum length for error bodies kept in errors and logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((byte, _)) => format!("{}... (truncated)", &body[..byte]),
        None => body.to_string(),
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

pub struct HttpGenerationClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: String,
    api_version: String,
    timeout: Duration,
}

impl HttpGenerationClient {
    /// Builds a client, reading the API key from the configured env var.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingCredentials(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: String) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(config.call_timeout())
            .build()
            .map_err(|e| GenerationError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
            api_version: config.api_version.clone(),
            timeout: config.call_timeout(),
        })
    }
}

fn map_status(status: StatusCode, body: &str) -> GenerationError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerationError::Quota(truncate_body(body))
    } else {
        GenerationError::Status {
            status: status.as_u16(),
            body: truncate_body(body),
        }
    }
}

#[async_trait]
impl Generation for HttpGenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &request.instruction,
            messages: vec![Message {
                role: "user",
                content: &request.payload,
            }],
        };

        debug!(
            "Sending {:?} request ({} payload chars)",
            request.task,
            request.payload.chars().count()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout)
                } else {
                    GenerationError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("Invalid response body: {}", e)))?;

        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .filter(|text| !text.is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            GenerationError::Quota(_)
        ));
        match map_status(StatusCode::BAD_GATEWAY, "upstream") {
            GenerationError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_long_error_body_is_truncated() {
        let body = "x".repeat(500);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("... (truncated)"));
        assert_eq!(truncated.len(), MAX_ERROR_BODY_LENGTH + "... (truncated)".len());
    }

    #[test]
    fn test_request_shape() {
        let body = MessagesRequest {
            model: "m",
            max_tokens: 10,
            system: "sys",
            messages: vec![Message {
                role: "user",
                content: "hello",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["system"], "sys");
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        let config = GenerationConfig {
            api_key_env: "CASEPRESS_TEST_MISSING_KEY".to_string(),
            ..Default::default()
        };
        std::env::remove_var("CASEPRESS_TEST_MISSING_KEY");
        let err = HttpGenerationClient::from_config(&config).err().unwrap();
        assert!(matches!(err, GenerationError::MissingCredentials(_)));
    }

    #[test]
    #[serial]
    fn test_api_key_from_env() {
        let config = GenerationConfig {
            api_key_env: "CASEPRESS_TEST_PRESENT_KEY".to_string(),
            ..Default::default()
        };
        std::env::set_var("CASEPRESS_TEST_PRESENT_KEY", "sk-test");
        let client = HttpGenerationClient::from_config(&config).unwrap();
        std::env::remove_var("CASEPRESS_TEST_PRESENT_KEY");
        assert_eq!(client.api_key, "sk-test");
    }
}
