use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::{
    DbErr,
    models::{
        code_review::CodeReviewError, pull_request::PullRequestError,
        repository::RepositoryError, review_session::ReviewSessionError,
    },
};
use services::services::{
    analysis::AnalysisError,
    github::GitHubServiceError,
    orchestrator::OrchestratorError,
    static_analysis::StaticAnalysisError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    PullRequest(#[from] PullRequestError),
    #[error(transparent)]
    ReviewSession(#[from] ReviewSessionError),
    #[error(transparent)]
    CodeReview(#[from] CodeReviewError),
    #[error(transparent)]
    GitHubService(#[from] GitHubServiceError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    StaticAnalysis(#[from] StaticAnalysisError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Database(db_err) => ApiError::Database(db_err),
            OrchestratorError::Source(gh_err) => ApiError::GitHubService(gh_err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::Repository(err) => match err {
                RepositoryError::NotFound => (StatusCode::NOT_FOUND, "RepositoryError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "RepositoryError"),
            },
            ApiError::PullRequest(err) => match err {
                PullRequestError::NotFound => (StatusCode::NOT_FOUND, "PullRequestError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "PullRequestError"),
            },
            ApiError::ReviewSession(err) => match err {
                ReviewSessionError::NotFound => (StatusCode::NOT_FOUND, "ReviewSessionError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "ReviewSessionError"),
            },
            ApiError::CodeReview(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CodeReviewError"),
            ApiError::GitHubService(_) => (StatusCode::INTERNAL_SERVER_ERROR, "GitHubServiceError"),
            ApiError::Analysis(_) => (StatusCode::INTERNAL_SERVER_ERROR, "AnalysisError"),
            ApiError::StaticAnalysis(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "StaticAnalysisError")
            }
            ApiError::Database(db_err) => match db_err {
                DbErr::RecordNotFound(_) => (StatusCode::NOT_FOUND, "DatabaseError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
            },
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        };

        let error_message = match &self {
            ApiError::Unauthorized => "Invalid signature".to_string(),
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            _ => format!("{}: {}", error_type, self),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_maps_to_expected_http_statuses() {
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::BadRequest("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("missing".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("boom".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_errors_map_to_expected_http_statuses() {
        assert_eq!(
            ApiError::from(RepositoryError::NotFound)
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ReviewSessionError::NotFound)
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(DbErr::RecordNotFound("session".to_string()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AnalysisError::EmptyResponse)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
