use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BananaDocConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
    /// Serve the raw conversation snapshot on `GET /context`.
    pub expose_context: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            expose_context: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5002,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub max_history: usize,
    pub max_retries: usize,
    pub base_delay_secs: u64,
    pub context_file: String,
    pub persist: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            max_retries: 3,
            base_delay_secs: 3,
            context_file: "data/conversation_context.json".to_string(),
            persist: true,
        }
    }
}

impl ChatConfig {
    pub fn context_path(&self) -> PathBuf {
        expand_path(&self.context_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    /// Name of the environment variable holding the Gemini API key.
    pub api_key_env: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-lite".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    pub class_mapping: String,
    /// ONNX intra-op threads; 0 means one per CPU.
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models_runtime/banana_nutrient_model.onnx".to_string(),
            class_mapping: "models_runtime/class_mapping.txt".to_string(),
            intra_threads: 0,
        }
    }
}

impl ModelConfig {
    pub fn model_path(&self) -> PathBuf {
        expand_path(&self.path)
    }

    pub fn class_mapping_path(&self) -> PathBuf {
        expand_path(&self.class_mapping)
    }

    pub fn threads(&self) -> usize {
        if self.intra_threads == 0 {
            num_cpus::get()
        } else {
            self.intra_threads
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

impl BananaDocConfig {
    /// Load from a TOML file (optional) overlaid with `BANANADOC__SECTION__KEY` env vars.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("BANANADOC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }
}
