//! Retrying LLM query executor
//!
//! Runs up to `max_retries` attempts. Retryable errors back off for
//! `base_delay * 2^(attempt-1)` before the next attempt; any other error, or
//! running out of attempts, ends the run immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::RetryIf;

use crate::config::ChatConfig;
use crate::llm::{GenerationConfig, LlmClient, LlmError, CHAT_GENERATION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(3),
        }
    }
}

impl From<&ChatConfig> for RetryPolicy {
    fn from(config: &ChatConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.base_delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Sleeps between attempts: one fewer than the attempt count.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let policy = *self;
        (0..self.max_retries.saturating_sub(1)).map(move |n| policy.delay_after(n + 1))
    }

    /// Sleep after failed attempt `attempt` (1-based), saturating at `Duration::MAX`.
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(2u32.saturating_pow(exponent))
            .unwrap_or(Duration::MAX)
    }
}

/// Terminal state of one execution.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Success(String),
    Exhausted { attempts: usize, last_error: LlmError },
}

pub struct QueryExecutor {
    client: Arc<dyn LlmClient>,
    policy: RetryPolicy,
    generation: GenerationConfig,
}

impl QueryExecutor {
    pub fn new(client: Arc<dyn LlmClient>, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            generation: CHAT_GENERATION,
        }
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    pub async fn execute(&self, prompt: &str) -> ExecutionOutcome {
        let attempts = AtomicUsize::new(0);
        let max_attempts = self.policy.max_retries.max(1);
        let counter = &attempts;
        let client = &self.client;
        let generation = &self.generation;

        let result = RetryIf::spawn(
            self.policy.delays(),
            move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::debug!(attempt, client = client.name(), "LLM attempt");
                client.generate(prompt, generation)
            },
            |e: &LlmError| {
                let attempt = counter.load(Ordering::SeqCst);
                let retry = e.is_retryable() && attempt < max_attempts;
                if retry {
                    let wait = self.policy.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        wait_secs = wait.as_secs_f64(),
                        error = %e,
                        "Retryable LLM error, backing off"
                    );
                }
                retry
            },
        )
        .await;

        let attempts = attempts.load(Ordering::SeqCst);

        match result {
            Ok(response) => {
                if response.is_truncated() {
                    tracing::warn!("LLM response may have been truncated by max_output_tokens");
                } else if let Some(reason) = response.finish_reason() {
                    tracing::debug!(?reason, "LLM finish reason");
                }

                let text = response.extract_text();
                if text.is_empty() {
                    tracing::error!(attempts, "LLM returned no text");
                    return ExecutionOutcome::Exhausted {
                        attempts,
                        last_error: LlmError::MalformedResponse(
                            "response contained no text".to_string(),
                        ),
                    };
                }

                tracing::info!(attempts, chars = text.len(), "LLM response generated");
                ExecutionOutcome::Success(text)
            }
            Err(e) => {
                tracing::error!(
                    attempts,
                    class = ?e.class(),
                    error = %e,
                    "LLM query failed"
                );
                ExecutionOutcome::Exhausted {
                    attempts,
                    last_error: e,
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
