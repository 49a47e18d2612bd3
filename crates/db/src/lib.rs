use db_migration::Migrator;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub use sea_orm;
pub use sea_orm::DbErr;

pub mod entities;
pub mod models;
pub mod types;

#[derive(Clone)]
pub struct DBService {
    pub conn: DatabaseConnection,
}

impl DBService {
    /// Connects and brings the schema up to date. `database_url` accepts
    /// both sqlite and postgres URLs.
    pub async fn new(database_url: &str) -> Result<DBService, DbErr> {
        let conn = Database::connect(database_url).await?;
        Migrator::up(&conn, None).await?;
        Ok(DBService { conn })
    }

    /// Fresh in-memory database, used by tests.
    pub async fn new_in_memory() -> Result<DBService, DbErr> {
        Self::new("sqlite::memory:").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            code_review::{CodeReview, CreateCodeReview},
            pull_request::{PullRequest, UpsertPullRequest},
            repository::{CreateRepository, Repository},
            review_session::ReviewSession,
        },
        types::{FindingSource, ReviewType, SessionStatus, Severity},
    };

    async fn setup() -> DBService {
        DBService::new_in_memory().await.unwrap()
    }

    fn repo_fixture(full_name: &str, owner: &str) -> CreateRepository {
        CreateRepository {
            github_id: 42,
            name: full_name.split('/').next_back().unwrap().to_string(),
            full_name: full_name.to_string(),
            owner: owner.to_string(),
            url: format!("https://github.com/{full_name}"),
        }
    }

    async fn seed_scope(db: &DBService) -> (Repository, PullRequest) {
        let repo = Repository::find_or_create(&db.conn, &repo_fixture("acme/widgets", "acme"))
            .await
            .unwrap();
        let pr = PullRequest::upsert(
            &db.conn,
            &UpsertPullRequest {
                github_id: 7,
                repository_id: repo.id,
                number: 12,
                title: "Add widget".to_string(),
                body: None,
                state: "open".to_string(),
                author: Some("octocat".to_string()),
                head_sha: "abc".to_string(),
                base_sha: "def".to_string(),
            },
        )
        .await
        .unwrap();
        (repo, pr)
    }

    #[tokio::test]
    async fn repository_creation_is_create_only() {
        let db = setup().await;
        let first = Repository::find_or_create(&db.conn, &repo_fixture("acme/widgets", "acme"))
            .await
            .unwrap();
        let second =
            Repository::find_or_create(&db.conn, &repo_fixture("acme/widgets", "someone-else"))
                .await
                .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.owner, "acme");
    }

    #[tokio::test]
    async fn deactivate_unknown_repository_is_noop() {
        let db = setup().await;
        let affected = Repository::deactivate_by_full_name(&db.conn, "nobody/nothing")
            .await
            .unwrap();
        assert!(!affected);
    }

    #[tokio::test]
    async fn deactivated_repository_leaves_active_listing() {
        let db = setup().await;
        Repository::find_or_create(&db.conn, &repo_fixture("acme/widgets", "acme"))
            .await
            .unwrap();
        assert_eq!(Repository::find_all_active(&db.conn).await.unwrap().len(), 1);
        assert!(
            Repository::deactivate_by_full_name(&db.conn, "acme/widgets")
                .await
                .unwrap()
        );
        assert!(Repository::find_all_active(&db.conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pull_request_upsert_overwrites_mutable_fields() {
        let db = setup().await;
        let (repo, pr) = seed_scope(&db).await;
        let updated = PullRequest::upsert(
            &db.conn,
            &UpsertPullRequest {
                github_id: 7,
                repository_id: repo.id,
                number: 12,
                title: "Add widget (rebased)".to_string(),
                body: Some("now with tests".to_string()),
                state: "open".to_string(),
                author: Some("octocat".to_string()),
                head_sha: "abc2".to_string(),
                base_sha: "def".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.id, pr.id);
        assert_eq!(updated.title, "Add widget (rebased)");
        assert_eq!(updated.head_sha, "abc2");
    }

    #[tokio::test]
    async fn session_claim_is_exactly_once() {
        let db = setup().await;
        let (repo, pr) = seed_scope(&db).await;
        let session = ReviewSession::create(&db.conn, repo.id, pr.id, 3).await.unwrap();
        assert_eq!(session.status, SessionStatus::Pending);

        assert!(ReviewSession::try_claim(&db.conn, session.uuid).await.unwrap());
        assert!(!ReviewSession::try_claim(&db.conn, session.uuid).await.unwrap());

        let reloaded = ReviewSession::find_by_uuid(&db.conn, session.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn terminal_session_does_not_transition_again() {
        let db = setup().await;
        let (repo, pr) = seed_scope(&db).await;
        let session = ReviewSession::create(&db.conn, repo.id, pr.id, 1).await.unwrap();
        ReviewSession::try_claim(&db.conn, session.uuid).await.unwrap();
        ReviewSession::complete(&db.conn, session.uuid).await.unwrap();
        ReviewSession::fail(&db.conn, session.uuid, "too late").await.unwrap();

        let reloaded = ReviewSession::find_by_uuid(&db.conn, session.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, SessionStatus::Completed);
        assert!(reloaded.completed_at.is_some());
        assert!(reloaded.error_message.is_none());
    }

    #[tokio::test]
    async fn finding_confidence_is_clamped() {
        let db = setup().await;
        let (repo, pr) = seed_scope(&db).await;
        let review = CodeReview::record(
            &db.conn,
            &CreateCodeReview {
                repository_id: repo.id,
                pull_request_id: pr.id,
                file_path: "a.py".to_string(),
                line_number: Some(3),
                review_type: ReviewType::Bug,
                severity: Severity::Medium,
                title: "off by one".to_string(),
                description: "loop bound".to_string(),
                suggestion: None,
                ai_confidence: 250,
                source: FindingSource::Ai,
                tool: None,
                analysis_type: Some("bug".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(review.ai_confidence, 100);

        let scoped = CodeReview::find_by_scope(&db.conn, repo.id, pr.id).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].file_path, "a.py");
    }

    #[tokio::test]
    async fn daily_counts_bucket_findings_by_type() {
        let db = setup().await;
        let (repo, pr) = seed_scope(&db).await;
        for (review_type, title) in [
            (ReviewType::Bug, "off by one"),
            (ReviewType::Bug, "unchecked index"),
            (ReviewType::Security, "hardcoded token"),
        ] {
            CodeReview::record(
                &db.conn,
                &CreateCodeReview {
                    repository_id: repo.id,
                    pull_request_id: pr.id,
                    file_path: "a.py".to_string(),
                    line_number: None,
                    review_type,
                    severity: Severity::Medium,
                    title: title.to_string(),
                    description: String::new(),
                    suggestion: None,
                    ai_confidence: 75,
                    source: FindingSource::Ai,
                    tool: None,
                    analysis_type: None,
                },
            )
            .await
            .unwrap();
        }

        let since = chrono::Utc::now() - chrono::Duration::days(1);
        let daily = CodeReview::count_by_day(&db.conn, since).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].1, 3);

        let by_type = CodeReview::count_by_day_and_type(&db.conn, since).await.unwrap();
        assert_eq!(by_type.len(), 2);
        assert!(
            by_type
                .iter()
                .any(|(_, review_type, count)| *review_type == ReviewType::Bug && *count == 2)
        );
        assert!(
            by_type
                .iter()
                .any(|(_, review_type, count)| *review_type == ReviewType::Security && *count == 1)
        );

        let prs = PullRequest::count_by_day(&db.conn, since).await.unwrap();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].1, 1);
    }
}
