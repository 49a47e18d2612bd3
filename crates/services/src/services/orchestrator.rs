//! The analysis pipeline: claims a review session, walks the changed files
//! in input order, fans each file out to the AI and static-analysis
//! collaborators, persists findings and progress incrementally, and drives
//! the session to a terminal state.
//!
//! Failure containment is per file: an unreachable file, an analyzer
//! failure, or a tool timeout costs that one file its findings and nothing
//! else. Only errors outside the per-file scope (the session row itself,
//! progress persistence) fail the session.

use std::sync::Arc;

use db::{
    DBService, DbErr,
    models::{
        code_review::{CodeReview, CreateCodeReview},
        review_session::ReviewSession,
    },
    types::{FindingSource, ReviewType, Severity},
};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::services::{
    analysis::{AiIssue, CodeAnalyzer, FileContext, SummaryContext},
    github::{GitHubServiceError, SourceProvider},
    static_analysis::{StaticAnalyzer, StaticIssue},
};

/// Sentinel file path for the session-level summary finding.
pub const SUMMARY_FILE_PATH: &str = "SUMMARY";

const DEFAULT_BUG_CONFIDENCE: i32 = 75;
const DEFAULT_SECURITY_CONFIDENCE: i32 = 85;
const DEFAULT_QUALITY_CONFIDENCE: i32 = 75;
const DEFAULT_STATIC_CONFIDENCE: i32 = 80;
const SUMMARY_CONFIDENCE: i32 = 90;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Source(#[from] GitHubServiceError),
}

/// One file to analyze, as supplied by the trigger request.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    pub path: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub changed_lines: Option<Vec<i64>>,
}

/// Everything one analysis run needs, fixed at session creation.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub repository_id: i64,
    pub pull_request_id: i64,
    pub owner: String,
    pub repo: String,
    pub pr_number: i64,
    pub pr_title: String,
    pub head_sha: String,
    pub base_sha: String,
    pub files: Vec<FileSpec>,
}

/// Findings recorded for one file during the run. Also the unit the
/// session summary is aggregated from.
#[derive(Debug, Default, Clone)]
struct FileReport {
    bugs: usize,
    security: usize,
    quality: usize,
}

impl FileReport {
    fn issue_count(&self) -> usize {
        self.bugs + self.security + self.quality
    }
}

/// Explicit per-file result; a skipped file keeps whatever findings were
/// already recorded before the failure.
enum FileOutcome {
    Analyzed(FileReport),
    Skipped { reason: String, report: FileReport },
}

impl FileOutcome {
    fn report(&self) -> &FileReport {
        match self {
            FileOutcome::Analyzed(report) => report,
            FileOutcome::Skipped { report, .. } => report,
        }
    }
}

#[derive(Clone)]
pub struct AnalysisOrchestrator {
    db: DBService,
    source: Arc<dyn SourceProvider>,
    analyzer: Arc<dyn CodeAnalyzer>,
    static_analyzer: Arc<dyn StaticAnalyzer>,
}

impl AnalysisOrchestrator {
    pub fn new(
        db: DBService,
        source: Arc<dyn SourceProvider>,
        analyzer: Arc<dyn CodeAnalyzer>,
        static_analyzer: Arc<dyn StaticAnalyzer>,
    ) -> Self {
        Self {
            db,
            source,
            analyzer,
            static_analyzer,
        }
    }

    /// Creates the `pending` session and detaches the run from the caller.
    /// The HTTP handler returns as soon as the session row exists.
    pub async fn start(&self, request: AnalysisRequest) -> Result<ReviewSession, DbErr> {
        let session = ReviewSession::create(
            &self.db.conn,
            request.repository_id,
            request.pull_request_id,
            request.files.len() as i64,
        )
        .await?;

        let orchestrator = self.clone();
        let session_uuid = session.uuid;
        tokio::spawn(async move {
            orchestrator.run(session_uuid, request).await;
        });

        Ok(session)
    }

    /// Webhook entry point: enumerates the pull request's changed files and
    /// starts a run over them. Returns `None` when there is nothing to
    /// analyze.
    #[allow(clippy::too_many_arguments)]
    pub async fn start_for_pull_request(
        &self,
        repository_id: i64,
        pull_request_id: i64,
        owner: &str,
        repo: &str,
        pr_number: i64,
        pr_title: &str,
        head_sha: &str,
        base_sha: &str,
    ) -> Result<Option<ReviewSession>, OrchestratorError> {
        let files = self
            .source
            .list_pull_request_files(owner, repo, pr_number)
            .await?;

        let specs: Vec<FileSpec> = files
            .iter()
            .filter(|file| file.is_analyzable())
            .map(|file| FileSpec {
                path: file.filename.clone(),
                language: Some(utils::language::detect_language(&file.filename).to_string()),
                changed_lines: file
                    .patch
                    .as_deref()
                    .map(utils::language::extract_changed_lines),
            })
            .collect();

        if specs.is_empty() {
            tracing::info!(
                repo = %format!("{owner}/{repo}"),
                pr_number,
                "no analyzable files in pull request"
            );
            return Ok(None);
        }

        let session = self
            .start(AnalysisRequest {
                repository_id,
                pull_request_id,
                owner: owner.to_string(),
                repo: repo.to_string(),
                pr_number,
                pr_title: pr_title.to_string(),
                head_sha: head_sha.to_string(),
                base_sha: base_sha.to_string(),
                files: specs,
            })
            .await?;
        Ok(Some(session))
    }

    /// The detached background run. Has no caller to report to: every
    /// outcome lands in the session row.
    pub async fn run(&self, session_uuid: Uuid, request: AnalysisRequest) {
        match ReviewSession::try_claim(&self.db.conn, session_uuid).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    session = %session_uuid,
                    "session already claimed; skipping duplicate run"
                );
                return;
            }
            Err(err) => {
                tracing::error!(session = %session_uuid, error = %err, "failed to claim session");
                return;
            }
        }

        if let Err(err) = self.run_claimed(session_uuid, &request).await {
            tracing::error!(session = %session_uuid, error = %err, "analysis run failed");
            if let Err(fail_err) =
                ReviewSession::fail(&self.db.conn, session_uuid, &err.to_string()).await
            {
                tracing::error!(
                    session = %session_uuid,
                    error = %fail_err,
                    "failed to mark session as failed"
                );
            }
        }
    }

    async fn run_claimed(
        &self,
        session_uuid: Uuid,
        request: &AnalysisRequest,
    ) -> Result<(), DbErr> {
        let mut total_issues: i64 = 0;
        let mut reports: Vec<FileReport> = Vec::new();

        for (index, file) in request.files.iter().enumerate() {
            let outcome = self.process_file(request, file).await;
            total_issues += outcome.report().issue_count() as i64;
            match outcome {
                FileOutcome::Analyzed(report) => reports.push(report),
                FileOutcome::Skipped { reason, report } => {
                    tracing::warn!(file = %file.path, reason, "file skipped");
                    reports.push(report);
                }
            }
            ReviewSession::update_progress(
                &self.db.conn,
                session_uuid,
                (index + 1) as i64,
                total_issues,
            )
            .await?;
        }

        self.record_summary(request, &reports).await;

        ReviewSession::complete(&self.db.conn, session_uuid).await?;
        tracing::info!(
            session = %session_uuid,
            files = request.files.len(),
            issues = total_issues,
            "analysis completed"
        );
        Ok(())
    }

    /// All per-file failure modes collapse into `Skipped`; the session
    /// keeps going with the findings recorded so far.
    async fn process_file(&self, request: &AnalysisRequest, file: &FileSpec) -> FileOutcome {
        let mut report = FileReport::default();

        let content = match self
            .source
            .fetch_file_content(&request.owner, &request.repo, &file.path, &request.head_sha)
            .await
        {
            Ok(content) => content,
            Err(err) => {
                return FileOutcome::Skipped {
                    reason: format!("could not fetch content: {err}"),
                    report,
                };
            }
        };

        let language = file
            .language
            .clone()
            .unwrap_or_else(|| utils::language::detect_language(&file.path).to_string());
        let context = FileContext {
            code: content,
            file_path: file.path.clone(),
            language: language.clone(),
            repository_name: format!("{}/{}", request.owner, request.repo),
            pr_title: request.pr_title.clone(),
            changed_lines: file.changed_lines.clone().unwrap_or_default(),
        };

        // The two collaborators are independent; either may fail without
        // taking the other's findings down.
        let ai_result = match self.analyzer.analyze(&context).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(file = %file.path, error = %err, "AI analysis failed");
                Default::default()
            }
        };
        let static_result = match self
            .static_analyzer
            .analyze(&context.code, &language, &file.path)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(file = %file.path, error = %err, "static analysis failed");
                Default::default()
            }
        };

        for issue in &ai_result.bugs {
            if let Err(err) = self
                .record_ai_issue(
                    request,
                    file,
                    issue,
                    ReviewType::Bug,
                    Severity::Medium,
                    DEFAULT_BUG_CONFIDENCE,
                    "Bug detected",
                )
                .await
            {
                return FileOutcome::Skipped {
                    reason: format!("failed to persist finding: {err}"),
                    report,
                };
            }
            report.bugs += 1;
        }
        for issue in &ai_result.security_issues {
            if let Err(err) = self
                .record_ai_issue(
                    request,
                    file,
                    issue,
                    ReviewType::Security,
                    Severity::High,
                    DEFAULT_SECURITY_CONFIDENCE,
                    "Security issue",
                )
                .await
            {
                return FileOutcome::Skipped {
                    reason: format!("failed to persist finding: {err}"),
                    report,
                };
            }
            report.security += 1;
        }
        for issue in &ai_result.quality_issues {
            if let Err(err) = self
                .record_ai_issue(
                    request,
                    file,
                    issue,
                    ReviewType::Quality,
                    Severity::Medium,
                    DEFAULT_QUALITY_CONFIDENCE,
                    "Quality issue",
                )
                .await
            {
                return FileOutcome::Skipped {
                    reason: format!("failed to persist finding: {err}"),
                    report,
                };
            }
            report.quality += 1;
        }

        for issue in &static_result.security_issues {
            if let Err(err) = self
                .record_static_issue(request, file, issue, ReviewType::Security, None)
                .await
            {
                return FileOutcome::Skipped {
                    reason: format!("failed to persist finding: {err}"),
                    report,
                };
            }
            report.security += 1;
        }
        for issue in &static_result.quality_issues {
            if let Err(err) = self
                .record_static_issue(request, file, issue, ReviewType::Quality, None)
                .await
            {
                return FileOutcome::Skipped {
                    reason: format!("failed to persist finding: {err}"),
                    report,
                };
            }
            report.quality += 1;
        }
        // Vulnerable dependencies land in the security bucket, tagged with
        // their own analysis type so they stay distinguishable.
        for issue in &static_result.dependency_issues {
            if let Err(err) = self
                .record_static_issue(
                    request,
                    file,
                    issue,
                    ReviewType::Security,
                    Some("dependency"),
                )
                .await
            {
                return FileOutcome::Skipped {
                    reason: format!("failed to persist finding: {err}"),
                    report,
                };
            }
            report.security += 1;
        }

        FileOutcome::Analyzed(report)
    }

    async fn record_ai_issue(
        &self,
        request: &AnalysisRequest,
        file: &FileSpec,
        issue: &AiIssue,
        review_type: ReviewType,
        default_severity: Severity,
        default_confidence: i32,
        default_title: &str,
    ) -> Result<(), DbErr> {
        let analysis_type = review_type.to_string();
        CodeReview::record(
            &self.db.conn,
            &CreateCodeReview {
                repository_id: request.repository_id,
                pull_request_id: request.pull_request_id,
                file_path: file.path.clone(),
                line_number: issue.line,
                review_type,
                severity: parse_severity(issue.severity.as_deref(), default_severity),
                title: issue
                    .title
                    .clone()
                    .unwrap_or_else(|| default_title.to_string()),
                description: issue.description.clone().unwrap_or_default(),
                suggestion: issue.suggestion.clone(),
                ai_confidence: issue.confidence.unwrap_or(default_confidence),
                source: FindingSource::Ai,
                tool: None,
                analysis_type: Some(analysis_type),
            },
        )
        .await?;
        Ok(())
    }

    async fn record_static_issue(
        &self,
        request: &AnalysisRequest,
        file: &FileSpec,
        issue: &StaticIssue,
        review_type: ReviewType,
        analysis_type: Option<&str>,
    ) -> Result<(), DbErr> {
        CodeReview::record(
            &self.db.conn,
            &CreateCodeReview {
                repository_id: request.repository_id,
                pull_request_id: request.pull_request_id,
                file_path: file.path.clone(),
                line_number: issue.line,
                review_type,
                severity: parse_severity(issue.severity.as_deref(), Severity::Medium),
                title: issue.title.clone(),
                description: issue.description.clone(),
                suggestion: None,
                ai_confidence: issue.confidence.unwrap_or(DEFAULT_STATIC_CONFIDENCE),
                source: FindingSource::Static,
                tool: Some(issue.tool.clone()),
                analysis_type: analysis_type.map(str::to_string),
            },
        )
        .await?;
        Ok(())
    }

    /// Session summary over everything recorded during the run. Failure
    /// here is logged and never blocks completion.
    async fn record_summary(&self, request: &AnalysisRequest, reports: &[FileReport]) {
        let context = SummaryContext {
            repository_name: format!("{}/{}", request.owner, request.repo),
            pr_title: request.pr_title.clone(),
            files_analyzed: reports.len(),
            total_bugs: reports.iter().map(|r| r.bugs).sum(),
            total_security: reports.iter().map(|r| r.security).sum(),
            total_quality: reports.iter().map(|r| r.quality).sum(),
        };

        let summary = match self.analyzer.summarize(&context).await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(error = %err, "summary generation failed");
                return;
            }
        };

        let result = CodeReview::record(
            &self.db.conn,
            &CreateCodeReview {
                repository_id: request.repository_id,
                pull_request_id: request.pull_request_id,
                file_path: SUMMARY_FILE_PATH.to_string(),
                line_number: Some(0),
                review_type: ReviewType::Summary,
                severity: Severity::Info,
                title: "AI Code Review Summary".to_string(),
                description: summary,
                suggestion: None,
                ai_confidence: SUMMARY_CONFIDENCE,
                source: FindingSource::Ai,
                tool: None,
                analysis_type: Some("summary".to_string()),
            },
        )
        .await;
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist summary finding");
        }
    }
}

fn parse_severity(raw: Option<&str>, default: Severity) -> Severity {
    raw.and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use db::{
        models::{
            pull_request::{PullRequest, UpsertPullRequest},
            repository::{CreateRepository, Repository},
        },
        types::{ReviewType, SessionStatus},
    };
    use reqwest::StatusCode;

    use super::*;
    use crate::services::{
        analysis::{AiAnalysis, AnalysisError},
        github::PullRequestFile,
        static_analysis::{StaticAnalysisError, StaticAnalysisReport},
    };

    struct MockSource {
        contents: HashMap<String, String>,
        pr_files: Vec<PullRequestFile>,
    }

    #[async_trait]
    impl SourceProvider for MockSource {
        async fn list_pull_request_files(
            &self,
            _owner: &str,
            _repo: &str,
            _pr_number: i64,
        ) -> Result<Vec<PullRequestFile>, GitHubServiceError> {
            Ok(self.pr_files.clone())
        }

        async fn fetch_file_content(
            &self,
            _owner: &str,
            _repo: &str,
            path: &str,
            _reference: &str,
        ) -> Result<String, GitHubServiceError> {
            self.contents
                .get(path)
                .cloned()
                .ok_or(GitHubServiceError::Status {
                    status: StatusCode::NOT_FOUND,
                    path: path.to_string(),
                })
        }
    }

    struct MockAnalyzer {
        bugs_for: HashMap<String, Vec<AiIssue>>,
        fail_files: HashSet<String>,
        fail_summary: bool,
    }

    impl MockAnalyzer {
        fn empty() -> Self {
            Self {
                bugs_for: HashMap::new(),
                fail_files: HashSet::new(),
                fail_summary: false,
            }
        }
    }

    #[async_trait]
    impl CodeAnalyzer for MockAnalyzer {
        async fn analyze(&self, input: &FileContext) -> Result<AiAnalysis, AnalysisError> {
            if self.fail_files.contains(&input.file_path) {
                return Err(AnalysisError::EmptyResponse);
            }
            Ok(AiAnalysis {
                bugs: self
                    .bugs_for
                    .get(&input.file_path)
                    .cloned()
                    .unwrap_or_default(),
                security_issues: Vec::new(),
                quality_issues: Vec::new(),
            })
        }

        async fn summarize(&self, _input: &SummaryContext) -> Result<String, AnalysisError> {
            if self.fail_summary {
                return Err(AnalysisError::EmptyResponse);
            }
            Ok("Looks reasonable overall.".to_string())
        }
    }

    struct NoopStatic;

    #[async_trait]
    impl StaticAnalyzer for NoopStatic {
        async fn analyze(
            &self,
            _code: &str,
            _language: &str,
            _file_path: &str,
        ) -> Result<StaticAnalysisReport, StaticAnalysisError> {
            Ok(StaticAnalysisReport::default())
        }
    }

    /// Reports one vulnerable dependency for manifest files, nothing else.
    struct DependencyStatic;

    #[async_trait]
    impl StaticAnalyzer for DependencyStatic {
        async fn analyze(
            &self,
            _code: &str,
            _language: &str,
            file_path: &str,
        ) -> Result<StaticAnalysisReport, StaticAnalysisError> {
            let mut report = StaticAnalysisReport::default();
            if file_path.ends_with("requirements.txt") {
                report.dependency_issues.push(StaticIssue {
                    line: None,
                    severity: Some("high".to_string()),
                    title: "Vulnerable dependency: django".to_string(),
                    description: "SQL injection in trunc().".to_string(),
                    tool: "safety".to_string(),
                    confidence: None,
                });
            }
            Ok(report)
        }
    }

    async fn seed_scope(db: &DBService) -> (Repository, PullRequest) {
        let repo = Repository::find_or_create(
            &db.conn,
            &CreateRepository {
                github_id: 1,
                name: "widgets".to_string(),
                full_name: "acme/widgets".to_string(),
                owner: "acme".to_string(),
                url: "https://github.com/acme/widgets".to_string(),
            },
        )
        .await
        .unwrap();
        let pr = PullRequest::upsert(
            &db.conn,
            &UpsertPullRequest {
                github_id: 11,
                repository_id: repo.id,
                number: 5,
                title: "Fix parser".to_string(),
                body: None,
                state: "open".to_string(),
                author: None,
                head_sha: "abc".to_string(),
                base_sha: "def".to_string(),
            },
        )
        .await
        .unwrap();
        (repo, pr)
    }

    fn request(repo: &Repository, pr: &PullRequest, paths: &[&str]) -> AnalysisRequest {
        AnalysisRequest {
            repository_id: repo.id,
            pull_request_id: pr.id,
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            pr_number: pr.number,
            pr_title: pr.title.clone(),
            head_sha: pr.head_sha.clone(),
            base_sha: pr.base_sha.clone(),
            files: paths
                .iter()
                .map(|path| FileSpec {
                    path: path.to_string(),
                    language: None,
                    changed_lines: None,
                })
                .collect(),
        }
    }

    fn orchestrator(
        db: &DBService,
        source: MockSource,
        analyzer: MockAnalyzer,
    ) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(
            db.clone(),
            Arc::new(source),
            Arc::new(analyzer),
            Arc::new(NoopStatic),
        )
    }

    #[tokio::test]
    async fn single_bug_on_one_of_two_files() {
        let db = DBService::new_in_memory().await.unwrap();
        let (repo, pr) = seed_scope(&db).await;

        let source = MockSource {
            contents: HashMap::from([
                ("a.py".to_string(), "def a(): pass".to_string()),
                ("b.py".to_string(), "def b(): pass".to_string()),
            ]),
            pr_files: Vec::new(),
        };
        let mut analyzer = MockAnalyzer::empty();
        analyzer.bugs_for.insert(
            "a.py".to_string(),
            vec![AiIssue {
                line: Some(1),
                severity: Some("high".to_string()),
                title: Some("Unreachable branch".to_string()),
                description: Some("dead code".to_string()),
                suggestion: None,
                confidence: None,
            }],
        );

        let orch = orchestrator(&db, source, analyzer);
        let req = request(&repo, &pr, &["a.py", "b.py"]);
        let session = ReviewSession::create(&db.conn, repo.id, pr.id, 2).await.unwrap();
        orch.run(session.uuid, req).await;

        let done = ReviewSession::find_by_uuid(&db.conn, session.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.processed_files, 2);
        assert_eq!(done.total_issues, 1);
        assert!(done.completed_at.is_some());

        let findings = CodeReview::find_by_scope(&db.conn, repo.id, pr.id).await.unwrap();
        let issues: Vec<_> = findings
            .iter()
            .filter(|f| f.review_type != ReviewType::Summary)
            .collect();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file_path, "a.py");
        assert_eq!(issues[0].review_type, ReviewType::Bug);
        // Default confidence for an AI bug with none reported.
        assert_eq!(issues[0].ai_confidence, 75);
        // Summary row rides along on success.
        assert!(
            findings
                .iter()
                .any(|f| f.review_type == ReviewType::Summary
                    && f.file_path == SUMMARY_FILE_PATH)
        );
    }

    #[tokio::test]
    async fn unfetchable_file_is_skipped_not_fatal() {
        let db = DBService::new_in_memory().await.unwrap();
        let (repo, pr) = seed_scope(&db).await;

        // b.py is missing from the source; fetch will 404.
        let source = MockSource {
            contents: HashMap::from([
                ("a.py".to_string(), "x = 1".to_string()),
                ("c.py".to_string(), "y = 2".to_string()),
            ]),
            pr_files: Vec::new(),
        };
        let mut analyzer = MockAnalyzer::empty();
        for path in ["a.py", "b.py", "c.py"] {
            analyzer
                .bugs_for
                .insert(path.to_string(), vec![AiIssue::default()]);
        }

        let orch = orchestrator(&db, source, analyzer);
        let req = request(&repo, &pr, &["a.py", "b.py", "c.py"]);
        let session = ReviewSession::create(&db.conn, repo.id, pr.id, 3).await.unwrap();
        orch.run(session.uuid, req).await;

        let done = ReviewSession::find_by_uuid(&db.conn, session.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.processed_files, 3);
        assert_eq!(done.total_issues, 2);

        let findings = CodeReview::find_by_scope(&db.conn, repo.id, pr.id).await.unwrap();
        assert!(findings.iter().all(|f| f.file_path != "b.py"));
    }

    #[tokio::test]
    async fn vulnerable_dependency_is_recorded_as_security_finding() {
        let db = DBService::new_in_memory().await.unwrap();
        let (repo, pr) = seed_scope(&db).await;

        let source = MockSource {
            contents: HashMap::from([("requirements.txt".to_string(), "django==3.2.0".to_string())]),
            pr_files: Vec::new(),
        };
        let orch = AnalysisOrchestrator::new(
            db.clone(),
            Arc::new(source),
            Arc::new(MockAnalyzer::empty()),
            Arc::new(DependencyStatic),
        );
        let req = request(&repo, &pr, &["requirements.txt"]);
        let session = ReviewSession::create(&db.conn, repo.id, pr.id, 1).await.unwrap();
        orch.run(session.uuid, req).await;

        let done = ReviewSession::find_by_uuid(&db.conn, session.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.total_issues, 1);

        let findings = CodeReview::find_by_scope(&db.conn, repo.id, pr.id).await.unwrap();
        let dependency: Vec<_> = findings
            .iter()
            .filter(|f| f.analysis_type.as_deref() == Some("dependency"))
            .collect();
        assert_eq!(dependency.len(), 1);
        assert_eq!(dependency[0].review_type, ReviewType::Security);
        assert_eq!(dependency[0].tool.as_deref(), Some("safety"));
        assert_eq!(dependency[0].ai_confidence, 80);
    }

    #[tokio::test]
    async fn summary_failure_does_not_fail_session() {
        let db = DBService::new_in_memory().await.unwrap();
        let (repo, pr) = seed_scope(&db).await;

        let source = MockSource {
            contents: HashMap::from([("a.py".to_string(), "x = 1".to_string())]),
            pr_files: Vec::new(),
        };
        let mut analyzer = MockAnalyzer::empty();
        analyzer.fail_summary = true;

        let orch = orchestrator(&db, source, analyzer);
        let req = request(&repo, &pr, &["a.py"]);
        let session = ReviewSession::create(&db.conn, repo.id, pr.id, 1).await.unwrap();
        orch.run(session.uuid, req).await;

        let done = ReviewSession::find_by_uuid(&db.conn, session.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!(done.error_message.is_none());

        let findings = CodeReview::find_by_scope(&db.conn, repo.id, pr.id).await.unwrap();
        assert!(findings.iter().all(|f| f.review_type != ReviewType::Summary));
    }

    #[tokio::test]
    async fn ai_failure_on_one_file_keeps_session_alive() {
        let db = DBService::new_in_memory().await.unwrap();
        let (repo, pr) = seed_scope(&db).await;

        let source = MockSource {
            contents: HashMap::from([
                ("a.py".to_string(), "x".to_string()),
                ("b.py".to_string(), "y".to_string()),
            ]),
            pr_files: Vec::new(),
        };
        let mut analyzer = MockAnalyzer::empty();
        analyzer.fail_files.insert("a.py".to_string());
        analyzer
            .bugs_for
            .insert("b.py".to_string(), vec![AiIssue::default()]);

        let orch = orchestrator(&db, source, analyzer);
        let req = request(&repo, &pr, &["a.py", "b.py"]);
        let session = ReviewSession::create(&db.conn, repo.id, pr.id, 2).await.unwrap();
        orch.run(session.uuid, req).await;

        let done = ReviewSession::find_by_uuid(&db.conn, session.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.processed_files, 2);
        assert_eq!(done.total_issues, 1);
    }

    #[tokio::test]
    async fn duplicate_run_does_not_double_process() {
        let db = DBService::new_in_memory().await.unwrap();
        let (repo, pr) = seed_scope(&db).await;

        let source = MockSource {
            contents: HashMap::from([("a.py".to_string(), "x".to_string())]),
            pr_files: Vec::new(),
        };
        let mut analyzer = MockAnalyzer::empty();
        analyzer
            .bugs_for
            .insert("a.py".to_string(), vec![AiIssue::default()]);

        let orch = orchestrator(&db, source, analyzer);
        let req = request(&repo, &pr, &["a.py"]);
        let session = ReviewSession::create(&db.conn, repo.id, pr.id, 1).await.unwrap();
        orch.run(session.uuid, req.clone()).await;
        // Redelivered trigger: the claim fails and nothing is re-recorded.
        orch.run(session.uuid, req).await;

        let done = ReviewSession::find_by_uuid(&db.conn, session.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.total_issues, 1);

        let findings = CodeReview::find_by_scope(&db.conn, repo.id, pr.id).await.unwrap();
        let issues = findings
            .iter()
            .filter(|f| f.review_type != ReviewType::Summary)
            .count();
        assert_eq!(issues, 1);
    }

    #[tokio::test]
    async fn start_for_pull_request_skips_non_analyzable_files() {
        let db = DBService::new_in_memory().await.unwrap();
        let (repo, pr) = seed_scope(&db).await;

        let source = MockSource {
            contents: HashMap::new(),
            pr_files: vec![
                PullRequestFile {
                    filename: "kept.py".to_string(),
                    status: "modified".to_string(),
                    patch: Some("@@ -1,2 +3,4 @@".to_string()),
                },
                PullRequestFile {
                    filename: "gone.py".to_string(),
                    status: "removed".to_string(),
                    patch: None,
                },
            ],
        };
        let orch = orchestrator(&db, source, MockAnalyzer::empty());
        let session = orch
            .start_for_pull_request(repo.id, pr.id, "acme", "widgets", 5, "Fix parser", "abc", "def")
            .await
            .unwrap()
            .expect("one analyzable file");
        assert_eq!(session.total_files, 1);
        assert_eq!(session.status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn start_for_pull_request_with_no_files_creates_no_session() {
        let db = DBService::new_in_memory().await.unwrap();
        let (repo, pr) = seed_scope(&db).await;

        let source = MockSource {
            contents: HashMap::new(),
            pr_files: Vec::new(),
        };
        let orch = orchestrator(&db, source, MockAnalyzer::empty());
        let session = orch
            .start_for_pull_request(repo.id, pr.id, "acme", "widgets", 5, "Fix parser", "abc", "def")
            .await
            .unwrap();
        assert!(session.is_none());
    }
}
