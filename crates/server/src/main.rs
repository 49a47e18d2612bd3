use std::sync::Arc;

use config::{ConfigError, Settings};
use db::{DBService, DbErr};
use server::{AppState, http};
use services::services::{
    analysis::CodeAnalysisService, github::GitHubService, static_analysis::StaticAnalysisService,
};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DbErr),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,server={level},services={level},db={level},utils={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).expect("Failed to create tracing filter");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let settings = Settings::from_env()?;
    let db = DBService::new(&settings.database_url).await?;

    let source = Arc::new(GitHubService::new(&settings.github_token));
    let analyzer = Arc::new(CodeAnalysisService::new(
        &settings.openai_base_url,
        &settings.openai_api_key,
        &settings.model,
        settings.temperature,
        settings.max_tokens,
    ));
    let static_analyzer = Arc::new(StaticAnalysisService::new());

    let state = AppState::new(db, settings.clone(), source, analyzer, static_analyzer);
    let app_router = http::router(state);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", settings.host, settings.port)).await?;
    tracing::info!(
        "Server running on http://{}",
        listener.local_addr()?,
    );

    axum::serve(listener, app_router).await?;
    Ok(())
}
