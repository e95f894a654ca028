//! Brain module: the text-generation abstraction.
//!
//! Defines the `TextGenerator` trait used for explanations and the overall
//! narrative. Generation is a single bounded call per request; callers decide
//! how to degrade when it fails.

use crate::error::LlmError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// A single bounded text-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: 300,
            temperature: 0.2,
            timeout: Duration::from_secs(45),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Trait for text-generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce text for the request, or fail with a typed error.
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Scripted generator for tests.
///
/// Replies are consumed in order; once the script runs out, every further
/// call fails with `LlmError::Unavailable`.
pub struct MockTextGenerator {
    model: String,
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a generator that answers every call with the same text.
    pub fn with_response(text: &str) -> Self {
        let generator = Self::new();
        for _ in 0..32 {
            generator.queue_text(text);
        }
        generator
    }

    /// Create a generator whose every call fails.
    pub fn failing(error: LlmError) -> Self {
        let generator = Self::new();
        for _ in 0..32 {
            generator.queue_error(error.clone());
        }
        generator
    }

    pub fn queue_text(&self, text: &str) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(text.to_string()));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }

    /// Number of `generate` calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Snapshot of every request received.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Unavailable {
                    reason: "mock script exhausted".into(),
                })
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let generator = MockTextGenerator::new();
        generator.queue_text("first");
        generator.queue_error(LlmError::Timeout { timeout_secs: 1 });

        let first = generator.generate(GenerationRequest::new("s", "u")).await;
        assert_eq!(first.unwrap(), "first");
        let second = generator.generate(GenerationRequest::new("s", "u")).await;
        assert_eq!(second.unwrap_err(), LlmError::Timeout { timeout_secs: 1 });
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_exhausted_is_unavailable() {
        let generator = MockTextGenerator::new();
        let err = generator
            .generate(GenerationRequest::new("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let generator = MockTextGenerator::with_response("ok");
        let request = GenerationRequest::new("system", "user")
            .with_max_tokens(900)
            .with_timeout(Duration::from_secs(60));
        generator.generate(request.clone()).await.unwrap();
        assert_eq!(generator.requests(), vec![request]);
    }
}
