//! GitHub webhook intake. The raw body is verified against the shared
//! secret before any parsing; persistence failures inside an event handler
//! are logged and the delivery is still acknowledged so GitHub does not
//! retry a payload we cannot use.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json as ResponseJson,
    routing::post,
};
use db::{
    DbErr,
    models::{
        pull_request::{PullRequest, UpsertPullRequest},
        repository::{CreateRepository, Repository},
    },
};
use serde::Serialize;
use serde_json::Value;
use services::services::{
    events::{self, WebhookEvent},
    github,
};
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/github", post(github_webhook))
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub event: String,
}

pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ResponseJson<ApiResponse<WebhookAck>>, ApiError> {
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !github::verify_signature(
        &body,
        signature,
        state.settings.github_webhook_secret.as_bytes(),
    ) {
        tracing::warn!("invalid webhook signature");
        return Err(ApiError::Unauthorized);
    }

    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON".to_string()))?;

    tracing::info!(event = %event_type, "received GitHub webhook");

    let event = events::classify(&event_type, &payload);
    let result = match &event {
        WebhookEvent::PullRequestOpened
        | WebhookEvent::PullRequestSynchronized { .. }
        | WebhookEvent::PullRequestClosed => {
            handle_pull_request_event(&state, &event, &payload).await
        }
        WebhookEvent::RepositoryCreated => handle_repository_created(&state, &payload).await,
        WebhookEvent::RepositoryDeleted => handle_repository_deleted(&state, &payload).await,
        WebhookEvent::PushObserved => {
            let commits = payload
                .get("commits")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            let repo = payload
                .pointer("/repository/full_name")
                .and_then(Value::as_str);
            tracing::info!(repo, commits, "push event observed");
            Ok(())
        }
        WebhookEvent::Unrecognized => {
            tracing::info!(event = %event_type, "unhandled webhook event");
            Ok(())
        }
    };
    if let Err(err) = result {
        tracing::error!(event = %event_type, error = %err, "failed to process webhook event");
    }

    Ok(ResponseJson(ApiResponse::success(WebhookAck {
        status: "success",
        event: event_type,
    })))
}

fn repository_from_payload(payload: &Value) -> Option<CreateRepository> {
    let repo = payload.get("repository")?;
    Some(CreateRepository {
        github_id: repo.get("id").and_then(Value::as_i64)?,
        name: repo.get("name").and_then(Value::as_str)?.to_string(),
        full_name: repo.get("full_name").and_then(Value::as_str)?.to_string(),
        owner: repo
            .pointer("/owner/login")
            .and_then(Value::as_str)?
            .to_string(),
        url: repo
            .get("html_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn pull_request_from_payload(payload: &Value, repository_id: i64) -> Option<UpsertPullRequest> {
    let pr = payload.get("pull_request")?;
    Some(UpsertPullRequest {
        github_id: pr.get("id").and_then(Value::as_i64)?,
        repository_id,
        number: pr.get("number").and_then(Value::as_i64)?,
        title: pr
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        body: pr.get("body").and_then(Value::as_str).map(str::to_string),
        state: pr
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or("open")
            .to_string(),
        author: pr
            .pointer("/user/login")
            .and_then(Value::as_str)
            .map(str::to_string),
        head_sha: pr
            .pointer("/head/sha")
            .and_then(Value::as_str)?
            .to_string(),
        base_sha: pr
            .pointer("/base/sha")
            .and_then(Value::as_str)?
            .to_string(),
    })
}

async fn handle_pull_request_event(
    state: &AppState,
    event: &WebhookEvent,
    payload: &Value,
) -> Result<(), DbErr> {
    let Some(repo_data) = repository_from_payload(payload) else {
        tracing::warn!("missing repository information in pull_request webhook");
        return Ok(());
    };

    if matches!(event, WebhookEvent::PullRequestClosed) {
        if let Some(github_id) = payload.pointer("/pull_request/id").and_then(Value::as_i64) {
            PullRequest::mark_closed(&state.db.conn, github_id).await?;
            tracing::info!(repo = %repo_data.full_name, "pull request closed");
        }
        return Ok(());
    }

    let repository = Repository::find_or_create(&state.db.conn, &repo_data).await?;
    let Some(pr_data) = pull_request_from_payload(payload, repository.id) else {
        tracing::warn!(
            repo = %repo_data.full_name,
            "missing pull request information in webhook"
        );
        return Ok(());
    };
    let pull_request = PullRequest::upsert(&state.db.conn, &pr_data).await?;
    tracing::info!(
        repo = %repository.full_name,
        pr = pull_request.number,
        "pull request recorded"
    );

    if event.triggers_analysis() {
        let orchestrator = state.orchestrator.clone();
        let owner = repository.owner.clone();
        let repo_name = repository.name.clone();
        tokio::spawn(async move {
            let result = orchestrator
                .start_for_pull_request(
                    pull_request.repository_id,
                    pull_request.id,
                    &owner,
                    &repo_name,
                    pull_request.number,
                    &pull_request.title,
                    &pull_request.head_sha,
                    &pull_request.base_sha,
                )
                .await;
            if let Err(err) = result {
                tracing::error!(
                    repo = %format!("{owner}/{repo_name}"),
                    pr = pull_request.number,
                    error = %err,
                    "failed to start analysis"
                );
            }
        });
    }
    Ok(())
}

async fn handle_repository_created(state: &AppState, payload: &Value) -> Result<(), DbErr> {
    let Some(repo_data) = repository_from_payload(payload) else {
        tracing::warn!("missing repository information in repository webhook");
        return Ok(());
    };
    let repository = Repository::find_or_create(&state.db.conn, &repo_data).await?;
    tracing::info!(repo = %repository.full_name, "repository registered");
    Ok(())
}

async fn handle_repository_deleted(state: &AppState, payload: &Value) -> Result<(), DbErr> {
    let Some(full_name) = payload
        .pointer("/repository/full_name")
        .and_then(Value::as_str)
    else {
        tracing::warn!("missing repository information in repository webhook");
        return Ok(());
    };
    if Repository::deactivate_by_full_name(&state.db.conn, full_name).await? {
        tracing::info!(repo = %full_name, "repository deactivated");
    }
    Ok(())
}
