//! AI collaborator: prompts an OpenAI-compatible chat-completions API for
//! bug, security, and quality findings on a single file, and for the
//! session-level review summary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("AI API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("AI API returned no choices")]
    EmptyResponse,
}

/// Everything the analyzer needs to review one file.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub code: String,
    pub file_path: String,
    pub language: String,
    pub repository_name: String,
    pub pr_title: String,
    pub changed_lines: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct SummaryContext {
    pub repository_name: String,
    pub pr_title: String,
    pub files_analyzed: usize,
    pub total_bugs: usize,
    pub total_security: usize,
    pub total_quality: usize,
}

/// One issue reported by the model. Fields the model omits stay `None`;
/// the orchestrator fills in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiIssue {
    #[serde(default)]
    pub line: Option<i64>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub confidence: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AiAnalysis {
    pub bugs: Vec<AiIssue>,
    pub security_issues: Vec<AiIssue>,
    pub quality_issues: Vec<AiIssue>,
}

#[async_trait]
pub trait CodeAnalyzer: Send + Sync {
    async fn analyze(&self, input: &FileContext) -> Result<AiAnalysis, AnalysisError>;

    async fn summarize(&self, input: &SummaryContext) -> Result<String, AnalysisError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct BugPass {
    #[serde(default)]
    bugs: Vec<AiIssue>,
}

#[derive(Debug, Default, Deserialize)]
struct SecurityPass {
    #[serde(default)]
    security_issues: Vec<AiIssue>,
}

#[derive(Debug, Default, Deserialize)]
struct QualityPass {
    #[serde(default)]
    quality_issues: Vec<AiIssue>,
}

const SYSTEM_PROMPT: &str = "You are an expert code reviewer. Analyze the \
provided code and report findings strictly as JSON matching the schema in \
the request. Do not include prose outside the JSON object.";

pub struct CodeAnalysisService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl CodeAnalysisService {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            max_tokens,
        }
    }

    async fn chat(&self, prompt: String) -> Result<String, AnalysisError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(AnalysisError::EmptyResponse)
    }

    fn file_prompt(input: &FileContext, focus: &str, schema: &str) -> String {
        format!(
            "Analyze this code for {focus}.\n\n\
             File: {path}\nLanguage: {language}\nRepository: {repo}\n\
             Pull request: {pr_title}\nChanged lines: {changed:?}\n\n\
             ```{language}\n{code}\n```\n\n\
             Respond with JSON of the form {schema}.",
            focus = focus,
            path = input.file_path,
            language = input.language,
            repo = input.repository_name,
            pr_title = input.pr_title,
            changed = input.changed_lines,
            code = input.code,
            schema = schema,
        )
    }

    /// Models occasionally wrap JSON in a markdown fence despite the system
    /// prompt; strip it before parsing.
    fn parse_pass<T: Default + serde::de::DeserializeOwned>(raw: &str, pass: &str) -> T {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .map(|rest| rest.trim_end_matches("```"))
            .unwrap_or(trimmed);
        match serde_json::from_str(body.trim()) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(pass, error = %err, "AI response was not valid JSON; treating as no findings");
                T::default()
            }
        }
    }
}

#[async_trait]
impl CodeAnalyzer for CodeAnalysisService {
    async fn analyze(&self, input: &FileContext) -> Result<AiAnalysis, AnalysisError> {
        tracing::debug!(file = %input.file_path, "running AI analysis passes");

        let bug_raw = self
            .chat(Self::file_prompt(
                input,
                "potential bugs (logic errors, edge cases, race conditions)",
                r#"{"bugs": [{"line", "severity", "title", "description", "suggestion", "confidence"}]}"#,
            ))
            .await?;
        let security_raw = self
            .chat(Self::file_prompt(
                input,
                "security vulnerabilities (injection, auth bypass, input validation, secret exposure)",
                r#"{"security_issues": [{"line", "severity", "title", "description", "suggestion", "confidence"}]}"#,
            ))
            .await?;
        let quality_raw = self
            .chat(Self::file_prompt(
                input,
                "quality and maintainability problems (complexity, duplication, error handling)",
                r#"{"quality_issues": [{"line", "severity", "title", "description", "suggestion", "confidence"}]}"#,
            ))
            .await?;

        let bugs: BugPass = Self::parse_pass(&bug_raw, "bugs");
        let security: SecurityPass = Self::parse_pass(&security_raw, "security");
        let quality: QualityPass = Self::parse_pass(&quality_raw, "quality");

        Ok(AiAnalysis {
            bugs: bugs.bugs,
            security_issues: security.security_issues,
            quality_issues: quality.quality_issues,
        })
    }

    async fn summarize(&self, input: &SummaryContext) -> Result<String, AnalysisError> {
        let prompt = format!(
            "Write a concise, professional code review summary.\n\n\
             Repository: {repo}\nPull request: {pr_title}\n\
             Files analyzed: {files}\nBugs found: {bugs}\n\
             Security issues: {security}\nQuality issues: {quality}\n\n\
             Cover the overall assessment, issues needing immediate \
             attention, and recommendations. Plain text, no JSON.",
            repo = input.repository_name,
            pr_title = input.pr_title,
            files = input.files_analyzed,
            bugs = input.total_bugs,
            security = input.total_security,
            quality = input.total_quality,
        );
        self.chat(prompt).await
    }
}
