//! bananadoc-cli: command-line client for the BananaDoc HTTP API
//!
//! # Subcommands
//! - `status`                     server health
//! - `predict <image> [--json]`   diagnose a leaf photo (JPEG or PNG)
//! - `chat <query> [--json]`      ask about the current diagnosis
//! - `context`                    dump the stored conversation context
//! - `clear`                      forget the diagnosis and chat history
//! - `deficiencies [name]`        list known deficiencies, or show one

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use base64::Engine as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:5002";
const TOP_ALTERNATIVES: usize = 3;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "bananadoc-cli",
    version,
    about = "BananaDoc banana leaf deficiency diagnosis client"
)]
struct Cli {
    /// BananaDoc server URL (overrides BANANADOC_URL env var)
    #[arg(long, env = "BANANADOC_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server status
    Status,

    /// Diagnose a leaf image
    Predict {
        /// Path to a JPEG or PNG photo of the leaf
        image: PathBuf,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Ask the assistant a question
    Chat {
        query: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show the stored diagnosis and chat history
    Context,

    /// Clear the stored diagnosis and chat history
    Clear,

    /// List known deficiencies, or show details for one
    Deficiencies {
        name: Option<String>,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Prediction {
    pub deficiency: String,
    pub confidence: f64,
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub treatment: String,
    #[serde(default)]
    pub prevention: String,
    #[serde(default)]
    pub probabilities: std::collections::BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub source: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// ============================================================================
// Formatting
// ============================================================================

/// `data:` URL for an image file, typed by extension (PNG or JPEG).
pub fn encode_image(path: &Path, bytes: &[u8]) -> anyhow::Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        other => bail!("unsupported image type '{other}', expected .png, .jpg or .jpeg"),
    };
    Ok(format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

pub fn format_prediction(p: &Prediction) -> String {
    let mut out = format!(
        "Diagnosis:   {} ({:.1}%)\n\nSymptoms:    {}\nTreatment:   {}\nPrevention:  {}",
        p.deficiency,
        p.confidence * 100.0,
        p.symptoms,
        p.treatment,
        p.prevention
    );

    let mut ranked: Vec<(&String, &f64)> = p.probabilities.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(a.1));
    let alternatives: Vec<String> = ranked
        .into_iter()
        .filter(|(label, _)| **label != p.deficiency)
        .take(TOP_ALTERNATIVES)
        .map(|(label, prob)| format!("  {label}: {:.1}%", prob * 100.0))
        .collect();

    if !alternatives.is_empty() {
        out.push_str("\n\nOther possibilities:\n");
        out.push_str(&alternatives.join("\n"));
    }
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Turn a non-2xx response into an error carrying the server's message.
fn check(resp: reqwest::blocking::Response) -> anyhow::Result<reqwest::blocking::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    bail!("server returned {status}: {message}")
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{server}/health");
    let resp = client(10)?
        .get(&url)
        .send()
        .with_context(|| format!("cannot reach {url}"))?;
    let body: serde_json::Value = check(resp)?.json()?;

    let yes_no = |v: &serde_json::Value| if v.as_bool() == Some(true) { "yes" } else { "no" };
    println!("BananaDoc server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:          {}", body["version"].as_str().unwrap_or("?"));
    println!("Model loaded:     {}", yes_no(&body["model_loaded"]));
    println!("LLM enabled:      {}", yes_no(&body["llm_enabled"]));
    Ok(())
}

fn do_predict(server: &str, image: &Path, json: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("cannot read {}", image.display()))?;
    let payload = serde_json::json!({ "image": encode_image(image, &bytes)? });

    let url = format!("{server}/predict");
    let resp = client(60)?
        .post(&url)
        .json(&payload)
        .send()
        .with_context(|| format!("connection failed to {url}"))?;
    let body: serde_json::Value = check(resp)?.json()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        let prediction: Prediction = serde_json::from_value(body)?;
        println!("{}", format_prediction(&prediction));
    }
    Ok(())
}

fn do_chat(server: &str, query: &str, json: bool) -> anyhow::Result<()> {
    let url = format!("{server}/chat");
    // Long enough to cover the server's LLM retries.
    let resp = client(120)?
        .post(&url)
        .json(&serde_json::json!({ "query": query }))
        .send()
        .with_context(|| format!("connection failed to {url}"))?;
    let body: serde_json::Value = check(resp)?.json()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        let reply: ChatReply = serde_json::from_value(body)?;
        println!("{}", reply.response);
        if reply.source == "fallback" {
            eprintln!("(assistant offline: templated answer)");
        }
    }
    Ok(())
}

fn do_context(server: &str) -> anyhow::Result<()> {
    let url = format!("{server}/context");
    let resp = client(10)?
        .get(&url)
        .send()
        .with_context(|| format!("cannot reach {url}"))?;
    let body: serde_json::Value = check(resp)?.json()?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn do_clear(server: &str) -> anyhow::Result<()> {
    let url = format!("{server}/clear-context");
    let resp = client(10)?
        .post(&url)
        .send()
        .with_context(|| format!("connection failed to {url}"))?;
    let body: serde_json::Value = check(resp)?.json()?;
    println!("{}", body["message"].as_str().unwrap_or("Context cleared"));
    Ok(())
}

fn do_deficiencies(server: &str, name: Option<&str>) -> anyhow::Result<()> {
    let url = match name {
        Some(n) => format!("{server}/deficiency/{n}"),
        None => format!("{server}/deficiencies"),
    };
    let resp = client(10)?
        .get(&url)
        .send()
        .with_context(|| format!("cannot reach {url}"))?;
    let body: serde_json::Value = check(resp)?.json()?;

    match name {
        Some(n) => {
            println!("{n}\n");
            println!("Symptoms:    {}", body["symptoms"].as_str().unwrap_or("?"));
            println!("Treatment:   {}", body["treatment"].as_str().unwrap_or("?"));
            println!("Prevention:  {}", body["prevention"].as_str().unwrap_or("?"));
        }
        None => {
            for label in body["deficiencies"].as_array().into_iter().flatten() {
                println!("{}", label.as_str().unwrap_or_default());
            }
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Predict { image, json } => do_predict(&server, &image, json),
        Commands::Chat { query, json } => do_chat(&server, &query, json),
        Commands::Context => do_context(&server),
        Commands::Clear => do_clear(&server),
        Commands::Deficiencies { name } => do_deficiencies(&server, name.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("bananadoc-cli: {e:#}");
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn iron() -> Prediction {
        Prediction {
            deficiency: "Iron".to_string(),
            confidence: 0.75,
            symptoms: "Yellow young leaves".to_string(),
            treatment: "Apply iron sulfate".to_string(),
            prevention: "Avoid waterlogging".to_string(),
            probabilities: [
                ("Iron", 0.75),
                ("Zinc", 0.125),
                ("Healthy", 0.05),
                ("Boron", 0.03125),
                ("Calcium", 0.03125),
            ]
            .into_iter()
            .map(|(l, p)| (l.to_string(), p))
            .collect(),
        }
    }

    #[test]
    fn test_encode_image_builds_data_url() {
        let url = encode_image(Path::new("leaf.PNG"), b"\x89PNG").unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw==");

        let url = encode_image(Path::new("leaf.jpeg"), b"\xff\xd8").unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_encode_image_rejects_other_types() {
        let err = encode_image(Path::new("leaf.gif"), b"GIF89a").unwrap_err();
        assert!(err.to_string().contains("unsupported image type 'gif'"));
        assert!(encode_image(Path::new("leaf"), b"").is_err());
    }

    #[test]
    fn test_format_prediction_lists_alternatives() {
        let text = format_prediction(&iron());
        assert!(text.starts_with("Diagnosis:   Iron (75.0%)"));
        assert!(text.contains("Other possibilities:\n  Zinc: 12.5%\n  Healthy: 5.0%"));
        assert!(!text.contains("  Iron:"));
    }

    #[test]
    fn test_format_prediction_without_probabilities() {
        let mut p = iron();
        p.probabilities.clear();
        assert!(!format_prediction(&p).contains("Other possibilities"));
    }

    #[test]
    fn test_chat_reply_parses() {
        let reply: ChatReply =
            serde_json::from_str(r#"{"response": "Use lime", "source": "fallback"}"#).unwrap();
        assert_eq!(reply.response, "Use lime");
        assert_eq!(reply.source, "fallback");
    }
}
