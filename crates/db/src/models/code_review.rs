use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::{Expr, ExprTrait, Order},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    entities::code_review,
    types::{FindingSource, ReviewStatus, ReviewType, Severity},
};

#[derive(Debug, Error)]
pub enum CodeReviewError {
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// One reported issue, tied to a (repository, pull request) scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeReview {
    pub id: i64,
    pub repository_id: i64,
    pub pull_request_id: i64,
    pub file_path: String,
    pub line_number: Option<i64>,
    pub review_type: ReviewType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub suggestion: Option<String>,
    pub ai_confidence: i32,
    pub status: ReviewStatus,
    pub source: FindingSource,
    pub tool: Option<String>,
    pub analysis_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCodeReview {
    pub repository_id: i64,
    pub pull_request_id: i64,
    pub file_path: String,
    pub line_number: Option<i64>,
    pub review_type: ReviewType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub suggestion: Option<String>,
    pub ai_confidence: i32,
    pub source: FindingSource,
    pub tool: Option<String>,
    pub analysis_type: Option<String>,
}

impl CodeReview {
    fn from_model(model: code_review::Model) -> Self {
        Self {
            id: model.id,
            repository_id: model.repository_id,
            pull_request_id: model.pull_request_id,
            file_path: model.file_path,
            line_number: model.line_number,
            review_type: model.review_type,
            severity: model.severity,
            title: model.title,
            description: model.description,
            suggestion: model.suggestion,
            ai_confidence: model.ai_confidence,
            status: model.status,
            source: model.source,
            tool: model.tool,
            analysis_type: model.analysis_type,
            created_at: model.created_at,
        }
    }

    /// Append-only finding record. Confidence values outside [0, 100] are
    /// clamped rather than rejected.
    pub async fn record<C: ConnectionTrait>(
        db: &C,
        data: &CreateCodeReview,
    ) -> Result<Self, DbErr> {
        let active = code_review::ActiveModel {
            repository_id: Set(data.repository_id),
            pull_request_id: Set(data.pull_request_id),
            file_path: Set(data.file_path.clone()),
            line_number: Set(data.line_number),
            review_type: Set(data.review_type),
            severity: Set(data.severity),
            title: Set(data.title.clone()),
            description: Set(data.description.clone()),
            suggestion: Set(data.suggestion.clone()),
            ai_confidence: Set(data.ai_confidence.clamp(0, 100)),
            status: Set(ReviewStatus::Open),
            source: Set(data.source),
            tool: Set(data.tool.clone()),
            analysis_type: Set(data.analysis_type.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }

    pub async fn find_by_scope<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        pull_request_id: i64,
    ) -> Result<Vec<Self>, DbErr> {
        let records = code_review::Entity::find()
            .filter(code_review::Column::RepositoryId.eq(repository_id))
            .filter(code_review::Column::PullRequestId.eq(pull_request_id))
            .order_by_asc(code_review::Column::Id)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn count_all<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        code_review::Entity::find().count(db).await
    }

    pub async fn count_since<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        code_review::Entity::find()
            .filter(code_review::Column::CreatedAt.gte(since))
            .count(db)
            .await
    }

    pub async fn count_by_type<C: ConnectionTrait>(
        db: &C,
        repository_id: Option<i64>,
    ) -> Result<Vec<(ReviewType, i64)>, DbErr> {
        let mut query = code_review::Entity::find()
            .select_only()
            .column(code_review::Column::ReviewType)
            .column_as(Expr::col(code_review::Column::Id).count(), "count")
            .group_by(code_review::Column::ReviewType);
        if let Some(repository_id) = repository_id {
            query = query.filter(code_review::Column::RepositoryId.eq(repository_id));
        }
        query.into_tuple().all(db).await
    }

    pub async fn count_by_severity<C: ConnectionTrait>(
        db: &C,
    ) -> Result<Vec<(Severity, i64)>, DbErr> {
        code_review::Entity::find()
            .select_only()
            .column(code_review::Column::Severity)
            .column_as(Expr::col(code_review::Column::Id).count(), "count")
            .group_by(code_review::Column::Severity)
            .into_tuple()
            .all(db)
            .await
    }

    /// Files with the most findings for one repository, most affected first.
    pub async fn top_files<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        limit: u64,
    ) -> Result<Vec<(String, i64)>, DbErr> {
        code_review::Entity::find()
            .select_only()
            .column(code_review::Column::FilePath)
            .column_as(Expr::col(code_review::Column::Id).count(), "count")
            .filter(code_review::Column::RepositoryId.eq(repository_id))
            .group_by(code_review::Column::FilePath)
            .order_by(Expr::col(code_review::Column::Id).count(), Order::Desc)
            .limit(limit)
            .into_tuple()
            .all(db)
            .await
    }

    pub async fn count_by_repository<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
    ) -> Result<u64, DbErr> {
        code_review::Entity::find()
            .filter(code_review::Column::RepositoryId.eq(repository_id))
            .count(db)
            .await
    }

    /// Daily finding counts since `since`, oldest day first. Day grouping
    /// happens in memory so it behaves the same across database backends.
    pub async fn count_by_day<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
    ) -> Result<Vec<(NaiveDate, i64)>, DbErr> {
        let stamps: Vec<DateTime<Utc>> = code_review::Entity::find()
            .select_only()
            .column(code_review::Column::CreatedAt)
            .filter(code_review::Column::CreatedAt.gte(since))
            .into_tuple()
            .all(db)
            .await?;
        Ok(super::day_counts(stamps))
    }

    /// Daily finding counts split by review type, ordered by day then type.
    pub async fn count_by_day_and_type<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
    ) -> Result<Vec<(NaiveDate, ReviewType, i64)>, DbErr> {
        let rows: Vec<(DateTime<Utc>, ReviewType)> = code_review::Entity::find()
            .select_only()
            .column(code_review::Column::CreatedAt)
            .column(code_review::Column::ReviewType)
            .filter(code_review::Column::CreatedAt.gte(since))
            .into_tuple()
            .all(db)
            .await?;

        let mut buckets: BTreeMap<(NaiveDate, String), (ReviewType, i64)> = BTreeMap::new();
        for (stamp, review_type) in rows {
            buckets
                .entry((stamp.date_naive(), review_type.to_string()))
                .or_insert((review_type, 0))
                .1 += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|((date, _), (review_type, count))| (date, review_type, count))
            .collect())
    }
}

impl From<code_review::Model> for CodeReview {
    fn from(model: code_review::Model) -> Self {
        Self::from_model(model)
    }
}
