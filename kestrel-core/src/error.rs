//! Error types for the Kestrel core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! for text generation, tool execution, and configuration. Config-document
//! parse failures are *not* errors at this level: they are carried as
//! [`ConfigParseError`](crate::types::ConfigParseError) records inside the report.

use std::path::PathBuf;

/// Errors from the text-generation backend.
///
/// None of these ever escape the explanation step; they are logged and the
/// caller degrades to a templated explanation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Text generation is unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors from tool registration and execution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = LlmError::ApiRequest {
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "API request failed: connection refused");
    }

    #[test]
    fn test_error_display_tool() {
        let err = ToolError::InvalidArguments {
            name: "retrieve_docs".into(),
            reason: "top_k must be between 1 and 10".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid arguments for tool 'retrieve_docs': top_k must be between 1 and 10"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = LlmError::Timeout { timeout_secs: 45 };
        assert_eq!(err.to_string(), "Request timed out after 45s");
    }

    #[test]
    fn test_config_error_display_names_path() {
        let err = ConfigError::FileNotFound {
            path: PathBuf::from("/etc/kestrel.toml"),
        };
        assert_eq!(err.to_string(), "Configuration file not found: /etc/kestrel.toml");
    }
}
