pub mod conversation;
pub mod prediction;

pub use conversation::{ConversationSnapshot, ConversationTurn};
pub use prediction::{CurrentPrediction, PredictionRecord};
