//! Text-generation backend implementations.
//!
//! Use `create_generator()` to build the configured backend. An unresolvable
//! API key is not an error: it means the pipeline runs without a backend and
//! falls back to templated explanations.

pub mod openai_compat;

use crate::brain::TextGenerator;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;
use tracing::{debug, info};

pub use openai_compat::OpenAiCompatibleGenerator;

/// Build the configured backend, or `None` when no API key is available.
pub fn create_generator(config: &LlmConfig) -> Result<Option<Arc<dyn TextGenerator>>, LlmError> {
    let Some(api_key) = config.resolve_api_key() else {
        debug!(
            env = %config.api_key_env,
            "No API key resolved; text generation disabled"
        );
        return Ok(None);
    };

    match config.provider.as_str() {
        "openai-compatible" | "openai" | "groq" => {
            let generator = OpenAiCompatibleGenerator::new_with_key(config, api_key)?;
            info!(model = %config.model, "Text generation enabled");
            Ok(Some(Arc::new(generator)))
        }
        other => Err(LlmError::Unavailable {
            reason: format!("unsupported provider '{}'", other),
        }),
    }
}
