//! OpenAI-compatible chat completions backend.
//!
//! Works with any endpoint that speaks the `/chat/completions` protocol
//! (Groq, OpenAI, vLLM, Ollama). Each call is a single non-streaming request
//! bounded by the request's timeout.

use crate::brain::{GenerationRequest, TextGenerator};
use crate::config::LlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

/// Text generator backed by an OpenAI-compatible chat endpoint.
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleGenerator {
    /// Create a generator from configuration, resolving the API key.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!(
                    "{}: env var '{}' not set",
                    config.provider, config.api_key_env
                ),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a generator with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        })
    }

    fn parse_response(body: &Value) -> Result<String, LlmError> {
        let message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        message
            .get("content")
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Choice has no text content".to_string(),
            })
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, status = %status, "Authentication failed");
                LlmError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            429 => {
                // "Rate limit reached ... try again in 7s"
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim().trim_end_matches('.').trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            status if status >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);
        let timeout_secs = request.timeout.as_secs();

        debug!(url = %url, model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout { timeout_secs }
                } else if e.is_connect() {
                    LlmError::Connection {
                        message: e.to_string(),
                    }
                } else {
                    LlmError::ApiRequest {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout { timeout_secs }
            } else {
                LlmError::ApiRequest {
                    message: format!("Failed to read response body: {}", e),
                }
            }
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            base_url: "http://localhost:9999/v1/".into(),
            api_key: Some("test-key".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_text_response() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "  WHY: because\n"}}]
        });
        assert_eq!(
            OpenAiCompatibleGenerator::parse_response(&body).unwrap(),
            "WHY: because"
        );
    }

    #[test]
    fn test_parse_response_no_choices() {
        let err = OpenAiCompatibleGenerator::parse_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_parse_response_null_content() {
        let body = json!({"choices": [{"message": {"content": null}}]});
        let err = OpenAiCompatibleGenerator::parse_response(&body).unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_http_error_mapping_auth() {
        let err = OpenAiCompatibleGenerator::map_http_error(
            reqwest::StatusCode::UNAUTHORIZED,
            "bad key",
        );
        assert!(matches!(err, LlmError::AuthFailed { .. }));
        let err =
            OpenAiCompatibleGenerator::map_http_error(reqwest::StatusCode::FORBIDDEN, "denied");
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn test_http_error_mapping_429() {
        let body = r#"{"error":{"message":"Rate limit reached, please try again in 7s"}}"#;
        let err = OpenAiCompatibleGenerator::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            body,
        );
        assert_eq!(err, LlmError::RateLimited { retry_after_secs: 7 });
    }

    #[test]
    fn test_http_error_mapping_500() {
        let err = OpenAiCompatibleGenerator::map_http_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "boom",
        );
        assert!(matches!(err, LlmError::ApiRequest { .. }));
    }

    #[test]
    fn test_request_body_shape() {
        let generator = OpenAiCompatibleGenerator::new(&test_config()).unwrap();
        let body = generator.request_body(&GenerationRequest::new("sys", "usr").with_max_tokens(900));
        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["max_tokens"], 900);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let generator = OpenAiCompatibleGenerator::new(&test_config()).unwrap();
        assert_eq!(generator.base_url, "http://localhost:9999/v1");
    }

    #[test]
    fn test_new_missing_key() {
        let config = LlmConfig {
            api_key: None,
            api_key_env: "KESTREL_TEST_NONEXISTENT_KEY_98765".into(),
            ..Default::default()
        };
        let result = OpenAiCompatibleGenerator::new(&config);
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
    }
}
