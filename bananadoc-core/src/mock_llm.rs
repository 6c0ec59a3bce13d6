//! Scripted `LlmClient` for tests. Built only under `cfg(test)` or the
//! `test-support` feature.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::llm::{GenerationConfig, LlmClient, LlmError, LlmResponse};

/// Replays queued results in order; once the script runs out every call
/// returns `fallback_text`.
#[derive(Debug)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    fallback_text: String,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<LlmResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            fallback_text: "scripted response".to_string(),
        }
    }

    /// Client that always answers with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback_text: text.into(),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(LlmResponse::from_text(self.fallback_text.clone())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
