use sea_orm::entity::prelude::*;

use crate::types::{FindingSource, ReviewStatus, ReviewType, Severity};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "code_reviews")]
pub struct Model {
    #[sea_orm(primary_key)]
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
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
