use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use db::{
    models::{
        code_review::CodeReview, pull_request::PullRequest, repository::Repository,
        review_session::ReviewSession,
    },
    types::SessionStatus,
};
use serde::{Deserialize, Serialize};
use services::services::{
    analysis::{AiAnalysis, FileContext},
    orchestrator::AnalysisRequest,
    static_analysis::StaticAnalysisReport,
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

const RECENT_PULL_REQUEST_LIMIT: u64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reviews/analyze", post(analyze_pull_request))
        .route("/reviews/session/{session_id}", get(get_review_session))
        .route(
            "/reviews/session/{session_id}/results",
            get(get_review_results),
        )
        .route("/reviews/manual", post(analyze_code_manually))
        .route("/reviews/repositories", get(get_repositories))
        .route(
            "/reviews/repositories/{repo_id}/pull-requests",
            get(get_repository_pull_requests),
        )
}

#[derive(Debug, Serialize)]
pub struct SessionStarted {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub message: &'static str,
}

/// Creates a pending session and detaches the analysis run; the caller
/// polls the session endpoint for progress.
pub async fn analyze_pull_request(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<ResponseJson<ApiResponse<SessionStarted>>, ApiError> {
    let session = state.orchestrator.start(request).await?;
    Ok(ResponseJson(ApiResponse::success(SessionStarted {
        session_id: session.uuid,
        status: session.status,
        message: "Analysis started",
    })))
}

pub async fn get_review_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ReviewSession>>, ApiError> {
    let session = ReviewSession::find_by_uuid(&state.db.conn, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Review session not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(session)))
}

/// Findings for the session's (repository, pull request) scope. Readable
/// while the session is still running; the list grows as files finish.
pub async fn get_review_results(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<CodeReview>>>, ApiError> {
    let session = ReviewSession::find_by_uuid(&state.db.conn, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Review session not found".to_string()))?;
    let reviews =
        CodeReview::find_by_scope(&state.db.conn, session.repository_id, session.pull_request_id)
            .await?;
    Ok(ResponseJson(ApiResponse::success(reviews)))
}

fn default_repository_name() -> String {
    "manual-analysis".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ManualAnalysisRequest {
    pub code: String,
    pub file_path: String,
    pub language: String,
    #[serde(default = "default_repository_name")]
    pub repository_name: String,
}

#[derive(Debug, Serialize)]
pub struct ManualAnalysisResult {
    pub file_path: String,
    pub language: String,
    pub ai_analysis: AiAnalysis,
    pub static_analysis: StaticAnalysisReport,
    pub timestamp: DateTime<Utc>,
}

/// Ad-hoc analysis of a pasted snippet. Nothing is persisted; both
/// collaborators run synchronously and the combined result is returned.
pub async fn analyze_code_manually(
    State(state): State<AppState>,
    Json(request): Json<ManualAnalysisRequest>,
) -> Result<ResponseJson<ApiResponse<ManualAnalysisResult>>, ApiError> {
    let context = FileContext {
        code: request.code.clone(),
        file_path: request.file_path.clone(),
        language: request.language.clone(),
        repository_name: request.repository_name.clone(),
        pr_title: "Manual Analysis".to_string(),
        changed_lines: Vec::new(),
    };
    let ai_analysis = state.analyzer.analyze(&context).await?;
    let static_analysis = state
        .static_analyzer
        .analyze(&request.code, &request.language, &request.file_path)
        .await?;

    Ok(ResponseJson(ApiResponse::success(ManualAnalysisResult {
        file_path: request.file_path,
        language: request.language,
        ai_analysis,
        static_analysis,
        timestamp: Utc::now(),
    })))
}

pub async fn get_repositories(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<Repository>>>, ApiError> {
    let repositories = Repository::find_all_active(&state.db.conn).await?;
    Ok(ResponseJson(ApiResponse::success(repositories)))
}

pub async fn get_repository_pull_requests(
    State(state): State<AppState>,
    Path(repo_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<Vec<PullRequest>>>, ApiError> {
    let pull_requests =
        PullRequest::find_by_repository(&state.db.conn, repo_id, RECENT_PULL_REQUEST_LIMIT)
            .await?;
    Ok(ResponseJson(ApiResponse::success(pull_requests)))
}
