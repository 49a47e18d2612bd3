use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::pull_request;

#[derive(Debug, Error)]
pub enum PullRequestError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Pull request not found")]
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub github_id: i64,
    pub repository_id: i64,
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub author: Option<String>,
    pub head_sha: String,
    pub base_sha: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertPullRequest {
    pub github_id: i64,
    pub repository_id: i64,
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub author: Option<String>,
    pub head_sha: String,
    pub base_sha: String,
}

impl PullRequest {
    fn from_model(model: pull_request::Model) -> Self {
        Self {
            id: model.id,
            github_id: model.github_id,
            repository_id: model.repository_id,
            number: model.number,
            title: model.title,
            body: model.body,
            state: model.state,
            author: model.author,
            head_sha: model.head_sha,
            base_sha: model.base_sha,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, DbErr> {
        let record = pull_request::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_github_id<C: ConnectionTrait>(
        db: &C,
        github_id: i64,
    ) -> Result<Option<Self>, DbErr> {
        let record = pull_request::Entity::find()
            .filter(pull_request::Column::GithubId.eq(github_id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_repository<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
        limit: u64,
    ) -> Result<Vec<Self>, DbErr> {
        let records = pull_request::Entity::find()
            .filter(pull_request::Column::RepositoryId.eq(repository_id))
            .order_by_desc(pull_request::Column::CreatedAt)
            .limit(limit)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn count_all<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        pull_request::Entity::find().count(db).await
    }

    pub async fn count_by_repository<C: ConnectionTrait>(
        db: &C,
        repository_id: i64,
    ) -> Result<u64, DbErr> {
        pull_request::Entity::find()
            .filter(pull_request::Column::RepositoryId.eq(repository_id))
            .count(db)
            .await
    }

    pub async fn count_since<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        pull_request::Entity::find()
            .filter(pull_request::Column::CreatedAt.gte(since))
            .count(db)
            .await
    }

    /// Daily pull request counts since `since`, oldest day first.
    pub async fn count_by_day<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
    ) -> Result<Vec<(NaiveDate, i64)>, DbErr> {
        let stamps: Vec<DateTime<Utc>> = pull_request::Entity::find()
            .select_only()
            .column(pull_request::Column::CreatedAt)
            .filter(pull_request::Column::CreatedAt.gte(since))
            .into_tuple()
            .all(db)
            .await?;
        Ok(super::day_counts(stamps))
    }

    /// Upsert keyed by the GitHub id. Repeat webhook deliveries overwrite
    /// the mutable fields (title, body, state, author, head/base shas) and
    /// leave identity fields alone.
    pub async fn upsert<C: ConnectionTrait>(
        db: &C,
        data: &UpsertPullRequest,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        if let Some(existing) = pull_request::Entity::find()
            .filter(pull_request::Column::GithubId.eq(data.github_id))
            .one(db)
            .await?
        {
            let mut active: pull_request::ActiveModel = existing.into();
            active.title = Set(data.title.clone());
            active.body = Set(data.body.clone());
            active.state = Set(data.state.clone());
            active.author = Set(data.author.clone());
            active.head_sha = Set(data.head_sha.clone());
            active.base_sha = Set(data.base_sha.clone());
            active.updated_at = Set(now);
            let model = active.update(db).await?;
            return Ok(Self::from_model(model));
        }

        let active = pull_request::ActiveModel {
            github_id: Set(data.github_id),
            repository_id: Set(data.repository_id),
            number: Set(data.number),
            title: Set(data.title.clone()),
            body: Set(data.body.clone()),
            state: Set(data.state.clone()),
            author: Set(data.author.clone()),
            head_sha: Set(data.head_sha.clone()),
            base_sha: Set(data.base_sha.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }

    pub async fn mark_closed<C: ConnectionTrait>(db: &C, github_id: i64) -> Result<(), DbErr> {
        let Some(existing) = pull_request::Entity::find()
            .filter(pull_request::Column::GithubId.eq(github_id))
            .one(db)
            .await?
        else {
            return Ok(());
        };

        let mut active: pull_request::ActiveModel = existing.into();
        active.state = Set("closed".to_string());
        active.updated_at = Set(Utc::now());
        active.update(db).await?;
        Ok(())
    }
}

impl From<pull_request::Model> for PullRequest {
    fn from(model: pull_request::Model) -> Self {
        Self::from_model(model)
    }
}
