use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{entities::review_session, types::SessionStatus};

#[derive(Debug, Error)]
pub enum ReviewSessionError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Review session not found")]
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSession {
    pub id: i64,
    pub uuid: Uuid,
    pub repository_id: i64,
    pub pull_request_id: i64,
    pub status: SessionStatus,
    pub total_files: i64,
    pub processed_files: i64,
    pub total_issues: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ReviewSession {
    fn from_model(model: review_session::Model) -> Self {
        Self {
            id: model.id,
            uuid: model.uuid,
            repository_id: model.repository_id,
            pull_request_id: model.pull_request_id,
            status: model.status,
            total_files: model.total_files,
            processed_files: model.processed_files,
            total_issues: model.total_issues,
            started_at: model.started_at,
            completed_at: model.completed_at,
            error_message: model.error_message,
        }
    }

    /// Creates a session in `pending` with `total_files` fixed for its
    /// lifetime. The returned uuid is the caller-facing session identifier.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        pull_request_id: i64,
        total_files: i64,
    ) -> Result<Self, DbErr> {
        let active = review_session::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            repository_id: Set(repository_id),
            pull_request_id: Set(pull_request_id),
            status: Set(SessionStatus::Pending),
            total_files: Set(total_files),
            processed_files: Set(0),
            total_issues: Set(0),
            started_at: Set(Utc::now()),
            completed_at: Set(None),
            error_message: Set(None),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }

    pub async fn find_by_uuid<C: ConnectionTrait>(
        db: &C,
        uuid: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let record = review_session::Entity::find()
            .filter(review_session::Column::Uuid.eq(uuid))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn list_recent<C: ConnectionTrait>(db: &C, limit: u64) -> Result<Vec<Self>, DbErr> {
        let records = review_session::Entity::find()
            .order_by_desc(review_session::Column::StartedAt)
            .limit(limit)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn count_all<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        review_session::Entity::find().count(db).await
    }

    pub async fn count_since<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        review_session::Entity::find()
            .filter(review_session::Column::StartedAt.gte(since))
            .count(db)
            .await
    }

    /// Atomic `pending -> running` claim. Exactly one caller observes `true`
    /// for a given session; a redelivered trigger sees `false` and must not
    /// process the session.
    pub async fn try_claim<C: ConnectionTrait>(db: &C, uuid: Uuid) -> Result<bool, DbErr> {
        let result = review_session::Entity::update_many()
            .col_expr(
                review_session::Column::Status,
                Expr::value(SessionStatus::Running),
            )
            .filter(review_session::Column::Uuid.eq(uuid))
            .filter(review_session::Column::Status.eq(SessionStatus::Pending))
            .exec(db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Persists per-file progress so a polling reader observes monotonically
    /// increasing counters while the run is in flight.
    pub async fn update_progress<C: ConnectionTrait>(
        db: &C,
        uuid: Uuid,
        processed_files: i64,
        total_issues: i64,
    ) -> Result<(), DbErr> {
        review_session::Entity::update_many()
            .col_expr(
                review_session::Column::ProcessedFiles,
                Expr::value(processed_files),
            )
            .col_expr(review_session::Column::TotalIssues, Expr::value(total_issues))
            .filter(review_session::Column::Uuid.eq(uuid))
            .filter(review_session::Column::Status.eq(SessionStatus::Running))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn complete<C: ConnectionTrait>(db: &C, uuid: Uuid) -> Result<(), DbErr> {
        Self::finish(db, uuid, SessionStatus::Completed, None).await
    }

    pub async fn fail<C: ConnectionTrait>(
        db: &C,
        uuid: Uuid,
        error_message: &str,
    ) -> Result<(), DbErr> {
        Self::finish(db, uuid, SessionStatus::Failed, Some(error_message)).await
    }

    /// Terminal transition. The status filter keeps an already-terminal
    /// session from transitioning twice.
    async fn finish<C: ConnectionTrait>(
        db: &C,
        uuid: Uuid,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> Result<(), DbErr> {
        let mut update = review_session::Entity::update_many()
            .col_expr(review_session::Column::Status, Expr::value(status))
            .col_expr(
                review_session::Column::CompletedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(review_session::Column::Uuid.eq(uuid))
            .filter(review_session::Column::Status.is_in([
                SessionStatus::Pending,
                SessionStatus::Running,
            ]));
        if let Some(message) = error_message {
            update = update.col_expr(
                review_session::Column::ErrorMessage,
                Expr::value(Some(message.to_string())),
            );
        }
        update.exec(db).await?;
        Ok(())
    }
}

impl From<review_session::Model> for ReviewSession {
    fn from(model: review_session::Model) -> Self {
        Self::from_model(model)
    }
}
