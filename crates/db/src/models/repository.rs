use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::repository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Repository not found")]
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub github_id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub url: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRepository {
    pub github_id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub url: String,
}

impl Repository {
    fn from_model(model: repository::Model) -> Self {
        Self {
            id: model.id,
            github_id: model.github_id,
            name: model.name,
            full_name: model.full_name,
            owner: model.owner,
            url: model.url,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, DbErr> {
        let record = repository::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_by_full_name<C: ConnectionTrait>(
        db: &C,
        full_name: &str,
    ) -> Result<Option<Self>, DbErr> {
        let record = repository::Entity::find()
            .filter(repository::Column::FullName.eq(full_name))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_all_active<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        let records = repository::Entity::find()
            .filter(repository::Column::IsActive.eq(true))
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn count_active<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        repository::Entity::find()
            .filter(repository::Column::IsActive.eq(true))
            .count(db)
            .await
    }

    /// Webhook-driven repository registration, keyed by full name.
    /// Creation-only: when the repository already exists its stored fields
    /// are left untouched, whatever the incoming payload says.
    pub async fn find_or_create<C: ConnectionTrait>(
        db: &C,
        data: &CreateRepository,
    ) -> Result<Self, DbErr> {
        if let Some(existing) = Self::find_by_full_name(db, &data.full_name).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let active = repository::ActiveModel {
            github_id: Set(data.github_id),
            name: Set(data.name.clone()),
            full_name: Set(data.full_name.clone()),
            owner: Set(data.owner.clone()),
            url: Set(data.url.clone()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match active.insert(db).await {
            Ok(model) => Ok(Self::from_model(model)),
            // Concurrent webhook delivery may have inserted the same full
            // name first; fall back to the winning row.
            Err(err) => match Self::find_by_full_name(db, &data.full_name).await? {
                Some(existing) => Ok(existing),
                None => Err(err),
            },
        }
    }

    /// Marks a repository inactive. Unknown full names are a no-op, not an
    /// error: deletion webhooks can arrive for repositories we never tracked.
    pub async fn deactivate_by_full_name<C: ConnectionTrait>(
        db: &C,
        full_name: &str,
    ) -> Result<bool, DbErr> {
        let Some(record) = repository::Entity::find()
            .filter(repository::Column::FullName.eq(full_name))
            .one(db)
            .await?
        else {
            return Ok(false);
        };

        let mut active: repository::ActiveModel = record.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(db).await?;
        Ok(true)
    }
}

impl From<repository::Model> for Repository {
    fn from(model: repository::Model) -> Self {
        Self::from_model(model)
    }
}
