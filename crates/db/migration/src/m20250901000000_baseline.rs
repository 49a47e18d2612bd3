use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

fn pk_id_col(name: impl IntoIden) -> ColumnDef {
    ColumnDef::new(name)
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn timestamp_col(name: impl IntoIden) -> ColumnDef {
    ColumnDef::new(name)
        .timestamp_with_time_zone()
        .not_null()
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Repositories::Table)
                    .col(pk_id_col(Repositories::Id))
                    .col(
                        ColumnDef::new(Repositories::GithubId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Repositories::Name).string().not_null())
                    .col(ColumnDef::new(Repositories::FullName).string().not_null())
                    .col(ColumnDef::new(Repositories::Owner).string().not_null())
                    .col(ColumnDef::new(Repositories::Url).string().not_null())
                    .col(
                        ColumnDef::new(Repositories::IsActive)
                            .boolean()
                            .not_null()
                            .default(Expr::val(true)),
                    )
                    .col(timestamp_col(Repositories::CreatedAt))
                    .col(timestamp_col(Repositories::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_repositories_github_id")
                    .table(Repositories::Table)
                    .col(Repositories::GithubId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_repositories_full_name")
                    .table(Repositories::Table)
                    .col(Repositories::FullName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(PullRequests::Table)
                    .col(pk_id_col(PullRequests::Id))
                    .col(
                        ColumnDef::new(PullRequests::GithubId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PullRequests::RepositoryId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PullRequests::Number).big_integer().not_null())
                    .col(ColumnDef::new(PullRequests::Title).string().not_null())
                    .col(ColumnDef::new(PullRequests::Body).text())
                    .col(ColumnDef::new(PullRequests::State).string().not_null())
                    .col(ColumnDef::new(PullRequests::Author).string())
                    .col(ColumnDef::new(PullRequests::HeadSha).string().not_null())
                    .col(ColumnDef::new(PullRequests::BaseSha).string().not_null())
                    .col(timestamp_col(PullRequests::CreatedAt))
                    .col(timestamp_col(PullRequests::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pull_requests_repository_id")
                            .from(PullRequests::Table, PullRequests::RepositoryId)
                            .to(Repositories::Table, Repositories::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pull_requests_github_id")
                    .table(PullRequests::Table)
                    .col(PullRequests::GithubId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pull_requests_repository_id")
                    .table(PullRequests::Table)
                    .col(PullRequests::RepositoryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(ReviewSessions::Table)
                    .col(pk_id_col(ReviewSessions::Id))
                    .col(ColumnDef::new(ReviewSessions::Uuid).uuid().not_null())
                    .col(
                        ColumnDef::new(ReviewSessions::RepositoryId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReviewSessions::PullRequestId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReviewSessions::Status)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("pending")),
                    )
                    .col(
                        ColumnDef::new(ReviewSessions::TotalFiles)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReviewSessions::ProcessedFiles)
                            .big_integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(
                        ColumnDef::new(ReviewSessions::TotalIssues)
                            .big_integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(timestamp_col(ReviewSessions::StartedAt))
                    .col(ColumnDef::new(ReviewSessions::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ReviewSessions::ErrorMessage).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_review_sessions_repository_id")
                            .from(ReviewSessions::Table, ReviewSessions::RepositoryId)
                            .to(Repositories::Table, Repositories::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_review_sessions_pull_request_id")
                            .from(ReviewSessions::Table, ReviewSessions::PullRequestId)
                            .to(PullRequests::Table, PullRequests::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_review_sessions_uuid")
                    .table(ReviewSessions::Table)
                    .col(ReviewSessions::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_review_sessions_status")
                    .table(ReviewSessions::Table)
                    .col(ReviewSessions::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(CodeReviews::Table)
                    .col(pk_id_col(CodeReviews::Id))
                    .col(
                        ColumnDef::new(CodeReviews::RepositoryId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CodeReviews::PullRequestId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CodeReviews::FilePath).string().not_null())
                    .col(ColumnDef::new(CodeReviews::LineNumber).big_integer())
                    .col(
                        ColumnDef::new(CodeReviews::ReviewType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CodeReviews::Severity)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CodeReviews::Title).string().not_null())
                    .col(ColumnDef::new(CodeReviews::Description).text().not_null())
                    .col(ColumnDef::new(CodeReviews::Suggestion).text())
                    .col(
                        ColumnDef::new(CodeReviews::AiConfidence)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CodeReviews::Status)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("open")),
                    )
                    .col(
                        ColumnDef::new(CodeReviews::Source)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CodeReviews::Tool).string())
                    .col(ColumnDef::new(CodeReviews::AnalysisType).string())
                    .col(timestamp_col(CodeReviews::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_code_reviews_repository_id")
                            .from(CodeReviews::Table, CodeReviews::RepositoryId)
                            .to(Repositories::Table, Repositories::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_code_reviews_pull_request_id")
                            .from(CodeReviews::Table, CodeReviews::PullRequestId)
                            .to(PullRequests::Table, PullRequests::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_code_reviews_scope")
                    .table(CodeReviews::Table)
                    .col(CodeReviews::RepositoryId)
                    .col(CodeReviews::PullRequestId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_code_reviews_file_path")
                    .table(CodeReviews::Table)
                    .col(CodeReviews::FilePath)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CodeReviews::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ReviewSessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PullRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Repositories::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum Repositories {
    Table,
    Id,
    GithubId,
    Name,
    FullName,
    Owner,
    Url,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum PullRequests {
    Table,
    Id,
    GithubId,
    RepositoryId,
    Number,
    Title,
    Body,
    State,
    Author,
    HeadSha,
    BaseSha,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ReviewSessions {
    Table,
    Id,
    Uuid,
    RepositoryId,
    PullRequestId,
    Status,
    TotalFiles,
    ProcessedFiles,
    TotalIssues,
    StartedAt,
    CompletedAt,
    ErrorMessage,
}

#[derive(Iden)]
enum CodeReviews {
    Table,
    Id,
    RepositoryId,
    PullRequestId,
    FilePath,
    LineNumber,
    ReviewType,
    Severity,
    Title,
    Description,
    Suggestion,
    AiConfidence,
    Status,
    Source,
    Tool,
    AnalysisType,
    CreatedAt,
}
