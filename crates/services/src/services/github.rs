//! GitHub collaborator: webhook signature verification and the REST calls
//! the orchestrator needs (changed files of a pull request, file content at
//! a revision).

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "review-backend";

/// Parses an `X-Hub-Signature-256` header value ("sha256=<hex>") into raw
/// bytes. Returns `None` for malformed headers; never panics.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 signature of a payload. Used by tests to build
/// valid webhook deliveries.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a raw signature as a GitHub-style header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Verifies a webhook signature against the payload and shared secret.
/// Constant-time comparison; malformed input simply fails verification.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Error)]
pub enum GitHubServiceError {
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub returned {status} for {path}")]
    Status { status: StatusCode, path: String },
    #[error("failed to decode file content for {path}: {reason}")]
    Decode { path: String, reason: String },
}

/// One changed file in a pull request, as reported by the GitHub API.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub patch: Option<String>,
}

impl PullRequestFile {
    /// Only added and modified files are worth analyzing; removed and
    /// renamed-without-change entries carry no reviewable content.
    pub fn is_analyzable(&self) -> bool {
        matches!(self.status.as_str(), "added" | "modified")
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    #[serde(default)]
    encoding: String,
}

/// Read access to the source-control system backing a pull request.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn list_pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        pr_number: i64,
    ) -> Result<Vec<PullRequestFile>, GitHubServiceError>;

    async fn fetch_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<String, GitHubServiceError>;
}

pub struct GitHubService {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl GitHubService {
    pub fn new(token: &str) -> Self {
        Self::with_api_base(token, GITHUB_API_BASE)
    }

    pub fn with_api_base(token: &str, api_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, GitHubServiceError> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GitHubServiceError::Status {
                status: response.status(),
                path: path.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SourceProvider for GitHubService {
    async fn list_pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        pr_number: i64,
    ) -> Result<Vec<PullRequestFile>, GitHubServiceError> {
        self.get_json(&format!("/repos/{owner}/{repo}/pulls/{pr_number}/files"))
            .await
    }

    async fn fetch_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<String, GitHubServiceError> {
        let contents: ContentsResponse = self
            .get_json(&format!(
                "/repos/{owner}/{repo}/contents/{path}?ref={reference}"
            ))
            .await?;

        if !contents.encoding.is_empty() && contents.encoding != "base64" {
            return Err(GitHubServiceError::Decode {
                path: path.to_string(),
                reason: format!("unexpected encoding {}", contents.encoding),
            });
        }

        // The contents API wraps base64 at 60 columns.
        let compact: String = contents
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|err| GitHubServiceError::Decode {
                path: path.to_string(),
                reason: err.to_string(),
            })?;
        String::from_utf8(bytes).map_err(|err| GitHubServiceError::Decode {
            path: path.to_string(),
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_correctly_computed_signature() {
        let payload = b"{\"action\":\"opened\"}";
        let secret = b"It's a Secret to Everybody";
        let header = format_signature_header(&compute_signature(payload, secret));
        assert!(verify_signature(payload, &header, secret));
    }

    #[test]
    fn rejects_bit_flipped_signature() {
        let payload = b"{\"action\":\"opened\"}";
        let secret = b"shared-secret";
        let mut sig = compute_signature(payload, secret);
        for i in 0..sig.len() {
            for bit in 0..8 {
                sig[i] ^= 1 << bit;
                let header = format_signature_header(&sig);
                assert!(!verify_signature(payload, &header, secret));
                sig[i] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn rejects_wrong_secret_and_modified_payload() {
        let payload = b"payload";
        let secret = b"secret";
        let header = format_signature_header(&compute_signature(payload, secret));
        assert!(!verify_signature(payload, &header, b"other-secret"));
        assert!(!verify_signature(b"tampered", &header, secret));
    }

    #[test]
    fn malformed_headers_fail_closed() {
        let payload = b"x";
        let secret = b"secret";
        assert!(!verify_signature(payload, "", secret));
        assert!(!verify_signature(payload, "sha256=", secret));
        assert!(!verify_signature(payload, "sha256=zzzz", secret));
        assert!(!verify_signature(payload, "sha1=abcd", secret));
        assert!(!verify_signature(payload, "abcd", secret));
    }

    #[test]
    fn analyzable_statuses() {
        let file = |status: &str| PullRequestFile {
            filename: "a.py".to_string(),
            status: status.to_string(),
            patch: None,
        };
        assert!(file("added").is_analyzable());
        assert!(file("modified").is_analyzable());
        assert!(!file("removed").is_analyzable());
        assert!(!file("renamed").is_analyzable());
    }
}
