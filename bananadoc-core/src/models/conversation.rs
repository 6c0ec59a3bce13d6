use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prediction::CurrentPrediction;

/// One user query paired with the assistant's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    pub user_query: String,
    pub llm_response: String,
}

impl ConversationTurn {
    pub fn new(user_query: impl Into<String>, llm_response: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_query: user_query.into(),
            llm_response: llm_response.into(),
        }
    }
}

/// Point-in-time copy of the conversation state; also the on-disk layout.
///
/// An absent prediction serializes as `{}` rather than `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    #[serde(default, with = "empty_object")]
    pub current_prediction: Option<CurrentPrediction>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
}

mod empty_object {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use crate::models::prediction::CurrentPrediction;

    pub fn serialize<S>(value: &Option<CurrentPrediction>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(prediction) => prediction.serialize(serializer),
            None => serde_json::Map::new().serialize(serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<CurrentPrediction>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            other => serde_json::from_value(other).map(Some).map_err(D::Error::custom),
        }
    }
}
