//! Conversation store: latest prediction plus a bounded chat history
//!
//! Every mutation is written to the snapshot file before the call returns.
//! Write failures are logged and swallowed: the in-memory state stays
//! authoritative for the rest of the process lifetime.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BananaDocError;
use crate::models::{ConversationSnapshot, ConversationTurn, CurrentPrediction, PredictionRecord};

/// Default number of turns kept in the history.
pub const DEFAULT_MAX_HISTORY: usize = 10;

#[derive(Debug)]
pub struct ConversationStore {
    state: ConversationSnapshot,
    max_history: usize,
    path: Option<PathBuf>,
}

impl ConversationStore {
    /// Store with no backing file.
    pub fn in_memory(max_history: usize) -> Self {
        Self {
            state: ConversationSnapshot::default(),
            max_history,
            path: None,
        }
    }

    /// Restore from `path`, or start empty if the file is missing or unreadable.
    pub fn load(path: impl Into<PathBuf>, max_history: usize) -> Self {
        let path = path.into();

        let mut state = match read_snapshot(&path) {
            Ok(Some(state)) => {
                tracing::info!(
                    path = %path.display(),
                    turns = state.conversation_history.len(),
                    has_prediction = state.current_prediction.is_some(),
                    "Restored conversation context"
                );
                state
            }
            Ok(None) => ConversationSnapshot::default(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not read conversation context, starting empty"
                );
                ConversationSnapshot::default()
            }
        };

        trim_front(&mut state.conversation_history, max_history);

        Self {
            state,
            max_history,
            path: Some(path),
        }
    }

    /// Replace the current prediction wholesale, stamped with the current time.
    pub fn update_prediction(&mut self, record: PredictionRecord) {
        self.state.current_prediction = Some(CurrentPrediction {
            timestamp: Utc::now(),
            data: record,
        });
        self.persist();
    }

    /// Append a turn, evicting the oldest ones beyond `max_history`.
    pub fn add_turn(&mut self, user_query: impl Into<String>, llm_response: impl Into<String>) {
        self.state
            .conversation_history
            .push(ConversationTurn::new(user_query, llm_response));
        trim_front(&mut self.state.conversation_history, self.max_history);
        self.persist();
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.state.clone()
    }

    pub fn current_prediction(&self) -> Option<&PredictionRecord> {
        self.state.current_prediction.as_ref().map(|p| &p.data)
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.state.conversation_history
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn clear(&mut self) {
        self.state = ConversationSnapshot::default();
        self.persist();
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };

        if let Err(e) = write_snapshot(path, &self.state) {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to save conversation context, keeping in-memory state"
            );
        }
    }
}

fn trim_front(history: &mut Vec<ConversationTurn>, max: usize) {
    if history.len() > max {
        let excess = history.len() - max;
        history.drain(..excess);
    }
}

fn read_snapshot(path: &Path) -> Result<Option<ConversationSnapshot>, BananaDocError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Write to a sibling temp file then rename over the target.
fn write_snapshot(path: &Path, state: &ConversationSnapshot) -> Result<(), BananaDocError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let body = serde_json::to_string_pretty(state)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, body)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn iron_record() -> PredictionRecord {
        let mut record = PredictionRecord::new("Iron", 0.87);
        record.symptoms = "Interveinal yellowing of young leaves.".into();
        record.treatment = "Apply iron sulfate.".into();
        record.prevention = "Keep soil pH at 6.0-6.5.".into();
        record.probabilities.insert("Iron".into(), 0.87);
        record.probabilities.insert("Zinc".into(), 0.08);
        record
    }

    #[test]
    fn test_history_is_bounded_and_keeps_newest_in_order() {
        for max in [1usize, 3, DEFAULT_MAX_HISTORY] {
            for total in 0..25usize {
                let mut store = ConversationStore::in_memory(max);
                for i in 0..total {
                    store.add_turn(format!("q{i}"), format!("a{i}"));
                    assert!(store.history().len() <= max);
                }

                let expected: Vec<String> = (total.saturating_sub(max)..total)
                    .map(|i| format!("q{i}"))
                    .collect();
                let actual: Vec<String> =
                    store.history().iter().map(|t| t.user_query.clone()).collect();

                assert_eq!(store.history().len(), total.min(max));
                assert_eq!(actual, expected, "max={max} total={total}");
            }
        }
    }

    #[test]
    fn test_update_prediction_then_snapshot_matches_input() {
        let mut store = ConversationStore::in_memory(DEFAULT_MAX_HISTORY);
        let before = Utc::now();
        store.update_prediction(iron_record());

        let snapshot = store.snapshot();
        let current = snapshot.current_prediction.expect("prediction should be set");
        assert_eq!(current.data, iron_record());
        assert!(current.timestamp >= before);
    }

    #[test]
    fn test_update_prediction_replaces_without_merging() {
        let mut store = ConversationStore::in_memory(DEFAULT_MAX_HISTORY);
        store.update_prediction(iron_record());
        store.update_prediction(PredictionRecord::new("Healthy", 0.99));

        let current = store.current_prediction().unwrap();
        assert_eq!(current.deficiency, "Healthy");
        assert!(current.treatment.is_empty());
        assert!(current.probabilities.is_empty());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut store = ConversationStore::in_memory(DEFAULT_MAX_HISTORY);
        store.update_prediction(iron_record());
        store.add_turn("q", "a");
        store.clear();

        let json = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "current_prediction": {}, "conversation_history": [] })
        );
    }

    #[test]
    fn test_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("conversation_context.json");

        let mut store = ConversationStore::load(&path, DEFAULT_MAX_HISTORY);
        store.update_prediction(iron_record());
        store.add_turn("What is wrong?", "Iron deficiency.");
        assert!(path.exists(), "snapshot should be written on mutation");

        let restored = ConversationStore::load(&path, DEFAULT_MAX_HISTORY);
        assert_eq!(restored.snapshot(), store.snapshot());
    }

    #[test]
    fn test_clear_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.json");

        let mut store = ConversationStore::load(&path, DEFAULT_MAX_HISTORY);
        store.update_prediction(iron_record());
        store.clear();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["current_prediction"], serde_json::json!({}));
        assert_eq!(raw["conversation_history"], serde_json::json!([]));
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = ConversationStore::load(&path, DEFAULT_MAX_HISTORY);
        assert!(store.current_prediction().is_none());
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_restored_history_is_truncated_to_bound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.json");

        let mut wide = ConversationStore::load(&path, 8);
        for i in 0..8 {
            wide.add_turn(format!("q{i}"), "a");
        }

        let narrow = ConversationStore::load(&path, 3);
        let queries: Vec<&str> = narrow.history().iter().map(|t| t.user_query.as_str()).collect();
        assert_eq!(queries, vec!["q5", "q6", "q7"]);
    }

    #[test]
    fn test_save_failure_keeps_in_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the snapshot file should be makes the rename fail.
        let path = dir.path().join("ctx.json");
        std::fs::create_dir_all(&path).unwrap();

        let mut store = ConversationStore::load(&path, DEFAULT_MAX_HISTORY);
        store.add_turn("q", "a");
        store.update_prediction(iron_record());

        assert_eq!(store.history().len(), 1);
        assert_eq!(store.current_prediction().unwrap().deficiency, "Iron");
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
