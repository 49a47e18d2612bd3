//! Process configuration, read once at startup from the environment.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub github_token: String,
    #[serde(skip_serializing)]
    pub github_webhook_secret: String,
    #[serde(skip_serializing)]
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://reviews.sqlite?mode=rwc".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed("PORT", 8000)?,
            github_token: required("GITHUB_TOKEN")?,
            github_webhook_secret: required("GITHUB_WEBHOOK_SECRET")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| "gpt-4".to_string()),
            max_tokens: parsed("MAX_TOKENS", 4000)?,
            temperature: parsed("TEMPERATURE", 0.1)?,
        };
        tracing::debug!(model = %settings.model, "loaded settings");
        Ok(settings)
    }
}
