use std::collections::BTreeMap;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::{Duration, NaiveDate, Utc};
use db::models::{
    code_review::CodeReview, pull_request::PullRequest, repository::Repository,
    review_session::ReviewSession,
};
use serde::{Deserialize, Serialize};
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

const TOP_FILE_LIMIT: u64 = 10;
const RECENT_PR_LIMIT: u64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/stats", get(get_dashboard_stats))
        .route("/dashboard/trends", get(get_review_trends))
        .route("/dashboard/sessions", get(get_recent_sessions))
        .route(
            "/dashboard/repositories/{repo_id}/analytics",
            get(get_repository_analytics),
        )
}

#[derive(Debug, Serialize)]
pub struct Overview {
    pub total_repositories: u64,
    pub total_pull_requests: u64,
    pub total_reviews: u64,
    pub total_sessions: u64,
}

#[derive(Debug, Serialize)]
pub struct RecentActivity {
    pub pull_requests_week: u64,
    pub reviews_week: u64,
    pub sessions_week: u64,
}

#[derive(Debug, Serialize)]
pub struct IssueBreakdown {
    pub by_type: BTreeMap<String, i64>,
    pub by_severity: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub overview: Overview,
    pub recent_activity: RecentActivity,
    pub issue_breakdown: IssueBreakdown,
}

pub async fn get_dashboard_stats(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<DashboardStats>>, ApiError> {
    let db = &state.db.conn;
    let week_ago = Utc::now() - Duration::days(7);

    let stats = DashboardStats {
        overview: Overview {
            total_repositories: Repository::count_active(db).await?,
            total_pull_requests: PullRequest::count_all(db).await?,
            total_reviews: CodeReview::count_all(db).await?,
            total_sessions: ReviewSession::count_all(db).await?,
        },
        recent_activity: RecentActivity {
            pull_requests_week: PullRequest::count_since(db, week_ago).await?,
            reviews_week: CodeReview::count_since(db, week_ago).await?,
            sessions_week: ReviewSession::count_since(db, week_ago).await?,
        },
        issue_breakdown: IssueBreakdown {
            by_type: CodeReview::count_by_type(db, None)
                .await?
                .into_iter()
                .map(|(review_type, count)| (review_type.to_string(), count))
                .collect(),
            by_severity: CodeReview::count_by_severity(db)
                .await?
                .into_iter()
                .map(|(severity, count)| (severity.to_string(), count))
                .collect(),
        },
    };
    Ok(ResponseJson(ApiResponse::success(stats)))
}

fn default_trend_days() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    #[serde(default = "default_trend_days")]
    pub days: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct IssueTrend {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub review_type: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct ReviewTrends {
    pub daily_prs: Vec<DailyCount>,
    pub daily_reviews: Vec<DailyCount>,
    pub issue_trends: Vec<IssueTrend>,
}

pub async fn get_review_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendsQuery>,
) -> Result<ResponseJson<ApiResponse<ReviewTrends>>, ApiError> {
    let db = &state.db.conn;
    let since = Utc::now() - Duration::days(query.days.max(1));

    let trends = ReviewTrends {
        daily_prs: PullRequest::count_by_day(db, since)
            .await?
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect(),
        daily_reviews: CodeReview::count_by_day(db, since)
            .await?
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect(),
        issue_trends: CodeReview::count_by_day_and_type(db, since)
            .await?
            .into_iter()
            .map(|(date, review_type, count)| IssueTrend {
                date,
                review_type: review_type.to_string(),
                count,
            })
            .collect(),
    };
    Ok(ResponseJson(ApiResponse::success(trends)))
}

fn default_session_limit() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct RecentSessionsQuery {
    #[serde(default = "default_session_limit")]
    pub limit: u64,
}

pub async fn get_recent_sessions(
    State(state): State<AppState>,
    Query(query): Query<RecentSessionsQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<ReviewSession>>>, ApiError> {
    let sessions = ReviewSession::list_recent(&state.db.conn, query.limit).await?;
    Ok(ResponseJson(ApiResponse::success(sessions)))
}

#[derive(Debug, Serialize)]
pub struct FileIssueCount {
    pub file_path: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct RepositoryAnalytics {
    pub repository: Repository,
    pub pull_request_count: u64,
    pub review_count: u64,
    pub issues_by_type: BTreeMap<String, i64>,
    pub recent_pull_requests: Vec<PullRequest>,
    pub top_files: Vec<FileIssueCount>,
}

pub async fn get_repository_analytics(
    State(state): State<AppState>,
    Path(repo_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<RepositoryAnalytics>>, ApiError> {
    let db = &state.db.conn;
    let repository = Repository::find_by_id(db, repo_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Repository not found".to_string()))?;

    let analytics = RepositoryAnalytics {
        pull_request_count: PullRequest::count_by_repository(db, repo_id).await?,
        review_count: CodeReview::count_by_repository(db, repo_id).await?,
        issues_by_type: CodeReview::count_by_type(db, Some(repo_id))
            .await?
            .into_iter()
            .map(|(review_type, count)| (review_type.to_string(), count))
            .collect(),
        recent_pull_requests: PullRequest::find_by_repository(db, repo_id, RECENT_PR_LIMIT)
            .await?,
        top_files: CodeReview::top_files(db, repo_id, TOP_FILE_LIMIT)
            .await?
            .into_iter()
            .map(|(file_path, count)| FileIssueCount { file_path, count })
            .collect(),
        repository,
    };
    Ok(ResponseJson(ApiResponse::success(analytics)))
}
