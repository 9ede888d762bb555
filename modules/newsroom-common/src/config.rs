//! Environment- and file-backed configuration: required secrets come from
//! the environment (loaded via `dotenvy` in non-production runs), tunable
//! knobs come from an optional TOML file.
use std::path::Path;

use serde::Deserialize;
use tracing::info;

fn preview(secret: &str) -> String {
    if secret.len() <= 8 {
        return "*".repeat(secret.len());
    }
    format!("{}...{}", &secret[..4], &secret[secret.len() - 4..])
}

fn preview_opt(secret: &Option<String>) -> String {
    match secret {
        Some(s) => preview(s),
        None => "<unset>".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub openai_api_key: String,
    pub anthropic_api_key: Option<String>,
    pub search_api_key: String,
    pub search_base_url: Option<String>,
    pub embedding_model: String,
    pub completion_model: String,
    pub port: u16,
}

impl AppConfig {
    /// Load required secrets from the process environment. Call
    /// `dotenvy::dotenv()` before this in `main` for local development; a
    /// missing `.env` file is not an error, a missing required variable is.
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let config = Self {
            database_url: std::env::var("DATABASE_URL")?,
            openai_api_key: std::env::var("OPENAI_API_KEY")?,
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            search_api_key: std::env::var("SEARCH_API_KEY")?,
            search_base_url: std::env::var("SEARCH_BASE_URL").ok(),
            embedding_model: std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            completion_model: std::env::var("COMPLETION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            port: std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080),
        };
        config.log_keys();
        Ok(config)
    }

    /// Log which keys were loaded without ever logging their values.
    pub fn log_keys(&self) {
        info!(
            database_url = %preview(&self.database_url),
            openai_api_key = %preview(&self.openai_api_key),
            anthropic_api_key = %preview_opt(&self.anthropic_api_key),
            search_api_key = %preview(&self.search_api_key),
            embedding_model = %self.embedding_model,
            completion_model = %self.completion_model,
            port = self.port,
            "loaded configuration",
        );
    }
}

/// Tunable knobs that don't belong in the environment: pipeline defaults,
/// retrieval weights, memory decay. Kept separate from `AppConfig` so
/// behavior tuning never requires touching secrets/connection strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub chunk_target_tokens: u32,
    pub chunk_overlap_tokens: u32,
    pub memory_decay_halflife_days: f64,
    pub retrieval_top_k: usize,
    pub retrieval_similarity_floor: f32,
    pub dialogue_history_summarize_after: usize,
    pub pipeline_concurrency: usize,
    pub per_user_concurrency: usize,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            chunk_target_tokens: 256,
            chunk_overlap_tokens: 32,
            memory_decay_halflife_days: 14.0,
            retrieval_top_k: 8,
            retrieval_similarity_floor: 0.2,
            dialogue_history_summarize_after: 20,
            pipeline_concurrency: 4,
            per_user_concurrency: 1,
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(ConfigLoadError::Io)?;
        toml::from_str(&raw).map_err(ConfigLoadError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    Io(std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_redacts_middle_of_long_secrets() {
        let p = preview("sk-abcdefghijklmnop");
        assert!(p.starts_with("sk-a"));
        assert!(p.ends_with("mnop"));
        assert!(!p.contains("efgh"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = FileConfig::load(Path::new("/nonexistent/path/newsroom.toml")).unwrap();
        assert_eq!(cfg.chunk_target_tokens, 256);
        assert_eq!(cfg.per_user_concurrency, 1);
    }
}
