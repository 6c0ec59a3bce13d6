//! Conversation coordinator
//!
//! Owns the conversation store and the optional LLM executor. A chat query
//! is validated, turned into a prompt from a snapshot of the store, sent to
//! the LLM, and recorded only when the LLM answers. Every other path ends in
//! the templated fallback, so `process_query` never fails for valid input.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::InputError;
use crate::executor::{ExecutionOutcome, QueryExecutor};
use crate::fallback;
use crate::models::{ConversationSnapshot, PredictionRecord};
use crate::prompt;
use crate::store::ConversationStore;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub source: ReplySource,
}

pub struct ConversationCoordinator {
    store: Arc<Mutex<ConversationStore>>,
    executor: Option<QueryExecutor>,
}

impl ConversationCoordinator {
    /// `executor` is `None` when no LLM is configured; every answer then
    /// comes from the fallback responder.
    pub fn new(store: ConversationStore, executor: Option<QueryExecutor>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            executor,
        }
    }

    pub fn llm_enabled(&self) -> bool {
        self.executor.is_some()
    }

    pub fn llm_name(&self) -> Option<&str> {
        self.executor.as_ref().map(|e| e.client_name())
    }

    /// Make `record` the diagnosis subsequent chat queries refer to.
    pub async fn update_with_prediction(&self, record: PredictionRecord) {
        tracing::info!(
            deficiency = %record.deficiency,
            confidence = record.confidence,
            "Updating conversation with new prediction"
        );
        self.mutate(move |store| store.update_prediction(record)).await;
    }

    /// Answer one chat query.
    ///
    /// `context` is a diagnosis supplied by the caller. When absent, a legacy
    /// inline diagnosis in the query text is used, then the stored prediction.
    pub async fn process_query(
        &self,
        query: &str,
        context: Option<PredictionRecord>,
    ) -> Result<ChatReply, InputError> {
        validation::validate_query(query)?;

        let (stored, history) = {
            let store = self.store.lock().await;
            (store.current_prediction().cloned(), store.history().to_vec())
        };

        let diagnosis = context
            .filter(PredictionRecord::has_diagnosis)
            .or_else(|| fallback::parse_inline_context(query))
            .or(stored);

        let Some(executor) = &self.executor else {
            tracing::debug!("LLM disabled, answering from templates");
            return Ok(fallback_reply(query, diagnosis.as_ref()));
        };

        let prompt = prompt::build_prompt(diagnosis.as_ref(), &history, query);
        tracing::debug!(
            prompt_chars = prompt.len(),
            history_turns = history.len(),
            has_diagnosis = diagnosis.is_some(),
            "Built chat prompt"
        );

        match executor.execute(&prompt).await {
            ExecutionOutcome::Success(response) => {
                let (turn_query, turn_response) = (query.to_string(), response.clone());
                self.mutate(move |store| store.add_turn(turn_query, turn_response))
                    .await;
                Ok(ChatReply {
                    response,
                    source: ReplySource::Llm,
                })
            }
            ExecutionOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::warn!(
                    attempts,
                    error = %last_error,
                    "LLM unavailable, using fallback response"
                );
                Ok(fallback_reply(query, diagnosis.as_ref()))
            }
        }
    }

    pub async fn snapshot(&self) -> ConversationSnapshot {
        self.store.lock().await.snapshot()
    }

    pub async fn clear(&self) {
        self.mutate(ConversationStore::clear).await;
        tracing::info!("Conversation context cleared");
    }

    /// Apply a store mutation on the blocking pool; mutations persist to disk.
    async fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut ConversationStore) + Send + 'static,
    {
        let mut store = Arc::clone(&self.store).lock_owned().await;
        if let Err(e) = tokio::task::spawn_blocking(move || f(&mut *store)).await {
            tracing::error!(error = %e, "Conversation store update failed to run");
        }
    }
}

fn fallback_reply(query: &str, diagnosis: Option<&PredictionRecord>) -> ChatReply {
    ChatReply {
        response: fallback::respond(query, diagnosis),
        source: ReplySource::Fallback,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RetryPolicy;
    use crate::llm::{LlmError, LlmResponse};
    use crate::mock_llm::ScriptedLlmClient;
    use std::time::Duration;
    use tokio::time::Instant;

    fn iron() -> PredictionRecord {
        let mut record = PredictionRecord::new("Iron", 0.9);
        record.symptoms = "Yellow young leaves".into();
        record.treatment = "Apply iron sulfate.".into();
        record.prevention = "Keep soil pH below 7".into();
        record
    }

    fn with_client(client: &Arc<ScriptedLlmClient>) -> ConversationCoordinator {
        let executor = QueryExecutor::new(
            client.clone(),
            RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_secs(3),
            },
        );
        ConversationCoordinator::new(ConversationStore::in_memory(10), Some(executor))
    }

    #[tokio::test]
    async fn test_llm_answer_is_recorded() {
        let client = Arc::new(ScriptedLlmClient::always("Use iron chelates."));
        let coordinator = with_client(&client);
        coordinator.update_with_prediction(iron()).await;

        let reply = coordinator.process_query("What now?", None).await.unwrap();
        assert_eq!(reply.source, ReplySource::Llm);
        assert_eq!(reply.response, "Use iron chelates.");

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.conversation_history.len(), 1);
        assert_eq!(snapshot.conversation_history[0].user_query, "What now?");
        assert_eq!(snapshot.conversation_history[0].llm_response, "Use iron chelates.");

        let prompt = &client.prompts()[0];
        assert!(prompt.contains("DEFICIENCY DETECTED: Iron"));
        assert!(prompt.contains("User's question: What now?"));
    }

    #[tokio::test]
    async fn test_second_query_sees_history() {
        let client = Arc::new(ScriptedLlmClient::always("answer"));
        let coordinator = with_client(&client);

        coordinator.process_query("first", None).await.unwrap();
        coordinator.process_query("second", None).await.unwrap();

        let prompts = client.prompts();
        assert!(!prompts[0].contains(prompt::HISTORY_HEADER));
        assert!(prompts[1].contains("User: first\nAssistant: answer"));
        assert!(prompts[1].contains("User's current question: second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_llm_falls_back_without_recording() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::RateLimited("429".into())),
            Err(LlmError::RateLimited("429".into())),
            Err(LlmError::RateLimited("429".into())),
        ]));
        let coordinator = with_client(&client);
        coordinator.update_with_prediction(iron()).await;

        let start = Instant::now();
        let reply = coordinator
            .process_query("How do I treat this?", None)
            .await
            .unwrap();

        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(reply.response.contains("Iron"));
        assert!(reply.response.contains("Apply iron sulfate."));
        assert_eq!(client.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(9));
        assert!(coordinator.snapshot().await.conversation_history.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_query_never_reaches_llm() {
        let client = Arc::new(ScriptedLlmClient::always("unused"));
        let coordinator = with_client(&client);

        assert_eq!(
            coordinator.process_query("   ", None).await,
            Err(InputError::EmptyQuery)
        );
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_without_llm_uses_fallback() {
        let coordinator = ConversationCoordinator::new(ConversationStore::in_memory(10), None);
        assert!(!coordinator.llm_enabled());

        let reply = coordinator.process_query("hello", None).await.unwrap();
        assert_eq!(reply.source, ReplySource::Fallback);
        assert_eq!(reply.response, fallback::GENERIC_RESPONSE);
    }

    #[tokio::test]
    async fn test_request_context_overrides_stored_prediction() {
        let coordinator = ConversationCoordinator::new(ConversationStore::in_memory(10), None);
        coordinator.update_with_prediction(iron()).await;

        let mut zinc = PredictionRecord::new("Zinc", 0.7);
        zinc.treatment = "Spray zinc sulfate".into();

        let reply = coordinator
            .process_query("how do I fix it", Some(zinc))
            .await
            .unwrap();
        assert!(reply.response.contains("Zinc"));
        assert!(reply.response.contains("Spray zinc sulfate"));

        // The stored prediction is untouched.
        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.current_prediction.unwrap().data.deficiency, "Iron");
    }

    #[tokio::test]
    async fn test_inline_diagnosis_in_query_text() {
        let coordinator = ConversationCoordinator::new(ConversationStore::in_memory(10), None);

        let reply = coordinator
            .process_query("Deficiency: Boron\nTreatment: Apply borax\nHow do I treat it?", None)
            .await
            .unwrap();
        assert!(reply.response.contains("Boron"));
        assert!(reply.response.contains("Apply borax"));
    }

    #[tokio::test]
    async fn test_clear_resets_prediction_and_history() {
        let client = Arc::new(ScriptedLlmClient::always("ok"));
        let coordinator = with_client(&client);
        coordinator.update_with_prediction(iron()).await;
        coordinator.process_query("hi", None).await.unwrap();

        coordinator.clear().await;

        let snapshot = coordinator.snapshot().await;
        assert!(snapshot.current_prediction.is_none());
        assert!(snapshot.conversation_history.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_queries_keep_file_in_step_with_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation_context.json");
        let client = Arc::new(ScriptedLlmClient::always("Use iron chelates."));
        let executor = QueryExecutor::new(
            client.clone(),
            RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
            },
        );
        let coordinator = Arc::new(ConversationCoordinator::new(
            ConversationStore::load(&path, 5),
            Some(executor),
        ));
        coordinator.update_with_prediction(iron()).await;

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    coordinator
                        .process_query(&format!("question {i}"), None)
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().source, ReplySource::Llm);
        }

        let snapshot = coordinator.snapshot().await;
        assert_eq!(client.calls(), 12);
        assert_eq!(snapshot.conversation_history.len(), 5);

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::to_value(&snapshot).unwrap());
        assert!(!path.with_extension("json.tmp").exists());
    }
}
