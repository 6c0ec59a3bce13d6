use std::sync::Arc;

use bananadoc_core::{
    BananaDocConfig, Classifier, ConversationCoordinator, ConversationStore, GeminiClient,
    LlmError, OnnxClassifier, QueryExecutor, RetryPolicy,
};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use bananadoc_server::http::{start_http_server, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "bananadoc.toml")]
    config: String,

    /// Override `http.host`
    #[arg(long)]
    host: Option<String>,

    /// Override `http.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = match BananaDocConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }

    // RUST_LOG wins over the configured level
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    let store = if config.chat.persist {
        ConversationStore::load(config.chat.context_path(), config.chat.max_history)
    } else {
        ConversationStore::in_memory(config.chat.max_history)
    };

    let executor = match GeminiClient::from_config(&config.llm) {
        Ok(client) => {
            tracing::info!(model = %config.llm.model, "Gemini client ready");
            Some(QueryExecutor::new(
                Arc::new(client),
                RetryPolicy::from(&config.chat),
            ))
        }
        Err(LlmError::MissingApiKey) => {
            tracing::warn!(
                env = %config.llm.api_key_env,
                "No Gemini API key set, chat will use templated responses only"
            );
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Gemini client unavailable, chat will use templated responses only");
            None
        }
    };

    let classifier: Option<Arc<dyn Classifier>> = match OnnxClassifier::new(&config.model) {
        Ok(c) => {
            tracing::info!(classifier = ?c, "Leaf classifier loaded");
            Some(Arc::new(c))
        }
        Err(e) => {
            tracing::warn!(error = %e, "No model loaded. Server will start but predictions will fail.");
            None
        }
    };

    let state = HttpState {
        coordinator: Arc::new(ConversationCoordinator::new(store, executor)),
        classifier,
        config,
    };

    let (tx, rx) = broadcast::channel(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                // Keep the sender alive so the server is not shut down.
                std::future::pending::<()>().await;
            }
        }
        let _ = tx.send(());
    });

    start_http_server(state, rx).await
}
