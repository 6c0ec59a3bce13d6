//! LLM client abstraction for the chat assistant
//!
//! Provides an `LlmClient` trait plus the response shape shared by all
//! implementations. Client errors carry a structured [`ErrorClass`] so the
//! retry policy never has to inspect error text.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// LlmClient trait
// ============================================================================

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one generation call. No retries happen at this layer.
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<LlmResponse, LlmError>;

    /// Client name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Generation config
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

/// Settings used for every chat call.
pub const CHAT_GENERATION: GenerationConfig = GenerationConfig {
    temperature: 0.7,
    top_p: 0.9,
    top_k: 40,
    max_output_tokens: 2048,
};

impl Default for GenerationConfig {
    fn default() -> Self {
        CHAT_GENERATION
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
}

impl FinishReason {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "STOP" => Self::Stop,
            "MAX_TOKENS" => Self::MaxTokens,
            "SAFETY" => Self::Safety,
            "RECITATION" => Self::Recitation,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Candidate {
    pub parts: Vec<String>,
    pub finish_reason: Option<FinishReason>,
}

/// A generation result.
///
/// `text` is the flat accessor for single-part answers; multi-part answers
/// leave it empty and carry their fragments in `candidates`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LlmResponse {
    pub text: Option<String>,
    pub candidates: Vec<Candidate>,
}

impl LlmResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            candidates: Vec::new(),
        }
    }

    pub fn from_candidates(candidates: Vec<Candidate>) -> Self {
        Self {
            text: None,
            candidates,
        }
    }

    /// The answer text: the flat accessor if present, otherwise every part
    /// of every candidate concatenated in order. Trimmed.
    pub fn extract_text(&self) -> String {
        if let Some(text) = &self.text {
            return text.trim().to_string();
        }

        self.candidates
            .iter()
            .flat_map(|c| c.parts.iter())
            .map(String::as_str)
            .collect::<String>()
            .trim()
            .to_string()
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.candidates.first().and_then(|c| c.finish_reason)
    }

    pub fn is_truncated(&self) -> bool {
        self.finish_reason() == Some(FinishReason::MaxTokens)
    }
}

// ============================================================================
// Error types
// ============================================================================

/// How the retry policy should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Permanent,
    InputInvalid,
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("service unavailable ({code}): {message}")]
    Unavailable { code: u16, message: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid prompt: {0}")]
    InvalidInput(String),

    #[error("Missing API key")]
    MissingApiKey,
}

impl LlmError {
    /// Map an HTTP status from the provider onto an error.
    pub fn from_status(code: u16, message: String) -> Self {
        match code {
            429 => Self::RateLimited(message),
            408 | 504 => Self::Timeout(message),
            500..=599 => Self::Unavailable { code, message },
            _ => Self::Api { code, message },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited(_)
            | Self::Timeout(_)
            | Self::Unavailable { .. }
            | Self::Connection(_) => ErrorClass::Retryable,
            Self::InvalidInput(_) => ErrorClass::InputInvalid,
            Self::Api { .. } | Self::MalformedResponse(_) | Self::MissingApiKey => {
                ErrorClass::Permanent
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            Self::Connection(e.to_string())
        } else if e.is_decode() || e.is_body() {
            Self::MalformedResponse(e.to_string())
        } else {
            match e.status() {
                Some(status) => Self::from_status(status.as_u16(), e.to_string()),
                None => Self::Connection(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_text_wins_and_is_trimmed() {
        let response = LlmResponse {
            text: Some("  Apply gypsum.\n".into()),
            candidates: vec![Candidate {
                parts: vec!["ignored".into()],
                finish_reason: Some(FinishReason::Stop),
            }],
        };
        assert_eq!(response.extract_text(), "Apply gypsum.");
    }

    #[test]
    fn test_multi_part_concatenates_all_candidates_in_order() {
        let response = LlmResponse::from_candidates(vec![
            Candidate {
                parts: vec!["Iron ".into(), "deficiency ".into()],
                finish_reason: Some(FinishReason::Stop),
            },
            Candidate {
                parts: vec!["is treatable.".into()],
                finish_reason: None,
            },
        ]);
        assert_eq!(response.extract_text(), "Iron deficiency is treatable.");
    }

    #[test]
    fn test_truncation_detected_from_first_candidate() {
        let response = LlmResponse::from_candidates(vec![Candidate {
            parts: vec!["partial".into()],
            finish_reason: Some(FinishReason::from_wire("MAX_TOKENS")),
        }]);
        assert!(response.is_truncated());
        assert!(!LlmResponse::from_text("x").is_truncated());
    }

    #[test]
    fn test_status_classification() {
        assert!(LlmError::from_status(429, "quota".into()).is_retryable());
        assert!(LlmError::from_status(503, "down".into()).is_retryable());
        assert!(LlmError::from_status(500, "oops".into()).is_retryable());
        assert!(LlmError::from_status(504, "deadline".into()).is_retryable());
        assert_eq!(
            LlmError::from_status(400, "bad".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            LlmError::from_status(403, "key".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            LlmError::MalformedResponse("no candidates".into()).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            LlmError::InvalidInput("empty".into()).class(),
            ErrorClass::InputInvalid
        );
    }

    #[test]
    fn test_generation_config_serializes_camel_case() {
        let json = serde_json::to_value(CHAT_GENERATION).unwrap();
        assert_eq!(json["topK"], 40);
        assert_eq!(json["maxOutputTokens"], 2048);
    }
}
