use std::env;
use std::path::PathBuf;

use anyhow::Result;

/// Connection settings for the judgment oracle backend (any
/// OpenAI-compatible chat completions endpoint).
#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_attempts: usize,
}

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
    /// Lower token bound for a coarse chunk; chunks close once they would
    /// exceed twice this value.
    pub min_tokens: usize,
    /// Hard cap on coarse chunk count per document.
    pub max_chunks: usize,
    /// Lower token bound when re-chunking a selected chunk in the fine pass.
    pub fine_min_tokens: usize,
    /// How many sub-chunks of each selected chunk survive into fine judging.
    pub fine_split: usize,
    /// How many top-ranked coarse chunks enter the fine pass.
    pub max_selected_chunks: usize,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub qa_log_dir: PathBuf,
    pub max_pages: usize,
    /// Simultaneous in-flight oracle calls per filtration batch.
    pub concurrency: usize,
    pub oracle: OracleConfig,
    pub chunking: ChunkingConfig,
}

impl AppConfig {
    /// Read configuration from the environment once at startup. The API key
    /// has no default; everything else does.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("REASONING_MODEL_API_KEY").map_err(|_| {
            anyhow::anyhow!("REASONING_MODEL_API_KEY is not set; export it before starting")
        })?;

        Ok(Self {
            bind_addr: env::var("DOCQA_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            qa_log_dir: env::var("DOCQA_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("qa_logs")),
            max_pages: env_or("DOCQA_MAX_PAGES", 1_000),
            concurrency: env_or("DOCQA_CONCURRENCY", 5),
            oracle: OracleConfig {
                model: env::var("REASONING_MODEL_NAME")
                    .unwrap_or_else(|_| "deepseek-chat".to_string()),
                base_url: env::var("REASONING_MODEL_BASE_URL")
                    .unwrap_or_else(|_| "https://api.deepseek.com/v1".to_string()),
                api_key,
                max_tokens: env_or("REASONING_MODEL_MAX_TOKENS", 1_024),
                temperature: env::var("REASONING_MODEL_TEMPERATURE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.3),
                timeout_secs: env_or("REASONING_MODEL_TIMEOUT_SECS", 30),
                max_attempts: env_or("REASONING_MODEL_MAX_ATTEMPTS", 3),
            },
            chunking: ChunkingConfig {
                min_tokens: env_or("DOCQA_CHUNK_MIN_TOKENS", 500),
                max_chunks: env_or("DOCQA_MAX_CHUNKS", 20),
                fine_min_tokens: env_or("DOCQA_FINE_MIN_TOKENS", 100),
                fine_split: env_or("DOCQA_FINE_SPLIT", 3),
                max_selected_chunks: env_or("DOCQA_MAX_SELECTED_CHUNKS", 3),
            },
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
