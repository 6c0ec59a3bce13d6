pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod gemini;
pub mod imaging;
pub mod knowledge;
pub mod llm;
#[cfg(any(test, feature = "test-support"))]
pub mod mock_llm;
pub mod models;
pub mod prompt;
pub mod store;
pub mod validation;

pub use classifier::{ClassMapping, Classifier, ClassifierError, FixedClassifier, OnnxClassifier};
pub use config::BananaDocConfig;
pub use coordinator::{ChatReply, ConversationCoordinator, ReplySource};
pub use error::{BananaDocError, InputError};
pub use executor::{ExecutionOutcome, QueryExecutor, RetryPolicy};
pub use gemini::GeminiClient;
pub use llm::{ErrorClass, LlmClient, LlmError, LlmResponse};
pub use models::{ConversationSnapshot, ConversationTurn, PredictionRecord};
pub use store::ConversationStore;
