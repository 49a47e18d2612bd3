//! Static-analysis collaborator: shells out to bandit, safety and semgrep
//! with the file under review written to a temp path. Every tool invocation
//! runs under a bounded timeout; a timeout or tool failure yields zero
//! findings for that file, never an aborted session.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

const BANDIT_TIMEOUT: Duration = Duration::from_secs(30);
const SAFETY_TIMEOUT: Duration = Duration::from_secs(30);
const SEMGREP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StaticAnalysisError {
    #[error("failed to stage file for analysis: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct StaticIssue {
    pub line: Option<i64>,
    pub severity: Option<String>,
    pub title: String,
    pub description: String,
    pub tool: String,
    pub confidence: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StaticAnalysisReport {
    pub security_issues: Vec<StaticIssue>,
    pub quality_issues: Vec<StaticIssue>,
    pub dependency_issues: Vec<StaticIssue>,
}

#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        code: &str,
        language: &str,
        file_path: &str,
    ) -> Result<StaticAnalysisReport, StaticAnalysisError>;
}

fn file_extension(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "python" | "py" => ".py",
        "javascript" => ".js",
        "typescript" => ".ts",
        "java" => ".java",
        "cpp" => ".cpp",
        "c" => ".c",
        "go" => ".go",
        "rust" => ".rs",
        _ => ".txt",
    }
}

/// Files that list third-party dependencies rather than code. Only these
/// are handed to the dependency scanner.
fn is_dependency_manifest(file_path: &str) -> bool {
    let name = file_path.rsplit('/').next().unwrap_or(file_path);
    name.starts_with("requirements") && name.ends_with(".txt")
}

/// Accepts both safety output shapes: the legacy top-level array of
/// `[package, spec, installed, advisory, id]` rows and the newer object
/// with a `vulnerabilities` list.
fn parse_safety_output(stdout: &str) -> Vec<StaticIssue> {
    let Ok(data) = serde_json::from_str::<Value>(stdout) else {
        tracing::warn!("safety produced non-JSON output");
        return Vec::new();
    };

    if let Some(rows) = data.as_array() {
        return rows
            .iter()
            .filter_map(|row| {
                let fields = row.as_array()?;
                let package = fields.first().and_then(Value::as_str)?;
                let advisory = fields.get(3).and_then(Value::as_str).unwrap_or_default();
                Some(dependency_issue(package, advisory))
            })
            .collect();
    }

    data.get("vulnerabilities")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let package = row.get("package_name").and_then(Value::as_str)?;
                    let advisory = row
                        .get("advisory")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    Some(dependency_issue(package, advisory))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn dependency_issue(package: &str, advisory: &str) -> StaticIssue {
    StaticIssue {
        line: None,
        severity: Some("high".to_string()),
        title: format!("Vulnerable dependency: {package}"),
        description: advisory.to_string(),
        tool: "safety".to_string(),
        confidence: None,
    }
}

fn semgrep_language(language: &str) -> Option<&'static str> {
    match language.to_lowercase().as_str() {
        "python" => Some("python"),
        "javascript" => Some("javascript"),
        "typescript" => Some("typescript"),
        "java" => Some("java"),
        "cpp" => Some("cpp"),
        "c" => Some("c"),
        "go" => Some("go"),
        "rust" => Some("rust"),
        _ => None,
    }
}

/// Runs a tool under its timeout and returns stdout, or `None` when the
/// tool is missing, times out, or exits without parseable output.
async fn run_tool(tool: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let result = tokio::time::timeout(timeout, Command::new(tool).args(args).output()).await;
    match result {
        Ok(Ok(output)) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
        Ok(Err(err)) => {
            tracing::warn!(tool, error = %err, "static analysis tool failed to run");
            None
        }
        Err(_) => {
            tracing::warn!(tool, timeout_secs = timeout.as_secs(), "static analysis timed out");
            None
        }
    }
}

pub struct StaticAnalysisService;

impl StaticAnalysisService {
    pub fn new() -> Self {
        Self
    }

    async fn run_bandit(&self, file_path: &str) -> Vec<StaticIssue> {
        let Some(stdout) = run_tool("bandit", &["-f", "json", file_path], BANDIT_TIMEOUT).await
        else {
            return Vec::new();
        };
        let Ok(data) = serde_json::from_str::<Value>(&stdout) else {
            tracing::warn!("bandit produced non-JSON output");
            return Vec::new();
        };

        data.get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .map(|item| StaticIssue {
                        line: item.get("line_number").and_then(Value::as_i64),
                        severity: item
                            .get("issue_severity")
                            .and_then(Value::as_str)
                            .map(|s| s.to_lowercase()),
                        title: item
                            .get("issue_text")
                            .and_then(Value::as_str)
                            .unwrap_or("Security issue")
                            .to_string(),
                        description: item
                            .get("issue_description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        tool: "bandit".to_string(),
                        confidence: Some(80),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn run_safety(&self, file_path: &str) -> Vec<StaticIssue> {
        let Some(stdout) = run_tool(
            "safety",
            &["check", "--file", file_path, "--json"],
            SAFETY_TIMEOUT,
        )
        .await
        else {
            return Vec::new();
        };
        parse_safety_output(&stdout)
    }

    async fn run_semgrep(&self, file_path: &str, language: &str) -> StaticAnalysisReport {
        let Some(lang) = semgrep_language(language) else {
            return StaticAnalysisReport::default();
        };
        let Some(stdout) = run_tool(
            "semgrep",
            &["--config=auto", "--json", "--lang", lang, file_path],
            SEMGREP_TIMEOUT,
        )
        .await
        else {
            return StaticAnalysisReport::default();
        };
        let Ok(data) = serde_json::from_str::<Value>(&stdout) else {
            tracing::warn!("semgrep produced non-JSON output");
            return StaticAnalysisReport::default();
        };

        let mut report = StaticAnalysisReport::default();
        let Some(results) = data.get("results").and_then(Value::as_array) else {
            return report;
        };
        for item in results {
            let message = item
                .pointer("/extra/message")
                .and_then(Value::as_str)
                .unwrap_or("Issue found");
            let issue = StaticIssue {
                line: item.pointer("/start/line").and_then(Value::as_i64),
                severity: item
                    .pointer("/extra/severity")
                    .and_then(Value::as_str)
                    .map(|s| s.to_lowercase()),
                title: message.to_string(),
                description: message.to_string(),
                tool: "semgrep".to_string(),
                confidence: Some(85),
            };
            let category = item
                .pointer("/extra/metadata/category")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            if matches!(category, "security" | "vulnerability") {
                report.security_issues.push(issue);
            } else {
                report.quality_issues.push(issue);
            }
        }
        report
    }
}

impl Default for StaticAnalysisService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StaticAnalyzer for StaticAnalysisService {
    async fn analyze(
        &self,
        code: &str,
        language: &str,
        file_path: &str,
    ) -> Result<StaticAnalysisReport, StaticAnalysisError> {
        let mut temp = tempfile::Builder::new()
            .suffix(file_extension(language))
            .tempfile()?;
        temp.write_all(code.as_bytes())?;
        let temp_path = temp.path().to_string_lossy().into_owned();

        let mut report = StaticAnalysisReport::default();
        if matches!(language.to_lowercase().as_str(), "python" | "py") {
            report.security_issues = self.run_bandit(&temp_path).await;
        }
        if is_dependency_manifest(file_path) {
            report.dependency_issues = self.run_safety(&temp_path).await;
        }
        let semgrep = self.run_semgrep(&temp_path, language).await;
        report.security_issues.extend(semgrep.security_issues);
        report.quality_issues.extend(semgrep.quality_issues);

        tracing::debug!(
            file = file_path,
            security = report.security_issues.len(),
            quality = report.quality_issues.len(),
            dependencies = report.dependency_issues.len(),
            "static analysis finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_map_known_languages() {
        assert_eq!(file_extension("python"), ".py");
        assert_eq!(file_extension("Rust"), ".rs");
        assert_eq!(file_extension("cobol"), ".txt");
    }

    #[test]
    fn semgrep_skips_unsupported_languages() {
        assert_eq!(semgrep_language("python"), Some("python"));
        assert_eq!(semgrep_language("markdown"), None);
    }

    #[test]
    fn dependency_manifests_are_recognized() {
        assert!(is_dependency_manifest("requirements.txt"));
        assert!(is_dependency_manifest("backend/requirements-dev.txt"));
        assert!(!is_dependency_manifest("app/main.py"));
        assert!(!is_dependency_manifest("docs/requirements.md"));
    }

    #[test]
    fn safety_legacy_array_output_is_parsed() {
        let stdout = r#"[["django", "<3.2.14", "3.2.0", "Django 3.2.x before 3.2.14 allows SQL injection.", "49733"]]"#;
        let issues = parse_safety_output(stdout);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "Vulnerable dependency: django");
        assert_eq!(issues[0].tool, "safety");
        assert_eq!(issues[0].severity.as_deref(), Some("high"));
    }

    #[test]
    fn safety_vulnerabilities_object_output_is_parsed() {
        let stdout = r#"{"vulnerabilities": [{"package_name": "requests", "advisory": "Requests before 2.31.0 leaks Proxy-Authorization headers."}]}"#;
        let issues = parse_safety_output(stdout);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "Vulnerable dependency: requests");
        assert!(issues[0].description.contains("Proxy-Authorization"));
    }

    #[test]
    fn malformed_safety_output_yields_no_findings() {
        assert!(parse_safety_output("not json").is_empty());
        assert!(parse_safety_output("{}").is_empty());
    }

    #[tokio::test]
    async fn missing_tool_yields_no_findings() {
        // The tool binary will not exist in the test environment; the
        // invocation must degrade to zero findings rather than error.
        let out = run_tool("definitely-not-a-real-tool", &["--json"], Duration::from_secs(1)).await;
        assert!(out.is_none());
    }
}
