//! GitHub REST API client.
//!
//! Only the two endpoints the sync workflow consumes: creating a pull
//! request and listing the open ones. Authentication is basic-auth style
//! (username + personal access token), injected at construction and never
//! looked up ambiently.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::errors::GitHubError;

/// Default GitHub API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// A pull request as returned by the GitHub API.
///
/// Only the fields the workflow reads; everything else in the response is
/// ignored during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
}

/// Request body for `POST /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    body: &'a str,
    maintainer_can_modify: bool,
    head: &'a str,
    base: &'a str,
}

/// Asynchronous GitHub REST API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    username: String,
    token: String,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("forgesync/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("failed to build reqwest client");
        info!(api_url = %api_url, "created GitHubClient");
        Self {
            http,
            api_url,
            username: username.into(),
            token: token.into(),
        }
    }

    /// Open a pull request from `head` into `base`.
    ///
    /// The GitHub contract for this endpoint is strict: anything other than
    /// HTTP 201 is a failure and surfaces the response body for diagnosis.
    #[instrument(skip(self, body))]
    pub async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, GitHubError> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_url, owner, repo);
        let payload = CreatePullRequest {
            title,
            body,
            maintainer_can_modify: true,
            head,
            base,
        };
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.token))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::CREATED {
            return Err(self.status_error(status, resp).await);
        }

        let pr: PullRequest = resp.json().await?;
        info!(number = pr.number, "created pull request");
        Ok(pr)
    }

    /// List open pull requests for a repository.
    #[instrument(skip(self))]
    pub async fn list_open_pull_requests(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_url, owner, repo);
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.token))
            .query(&[("state", "open")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.status_error(status, resp).await);
        }

        let prs: Vec<PullRequest> = resp.json().await?;
        debug!(count = prs.len(), "fetched open pull requests");
        Ok(prs)
    }

    async fn status_error(&self, status: StatusCode, resp: reqwest::Response) -> GitHubError {
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return GitHubError::AuthenticationFailed(format!("HTTP {}: {}", status, body));
        }
        GitHubError::ApiError {
            status: status.as_u16(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_request_deserializes_from_api_shape() {
        let json = r#"{
            "number": 7,
            "title": "Important forgesync template update 1.3.0 released!",
            "html_url": "https://github.com/acme/proj/pull/7",
            "state": "open",
            "locked": false,
            "user": {"login": "homer"}
        }"#;
        let pr: PullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pr.number, 7);
        assert!(pr.title.contains("1.3.0"));
        assert_eq!(pr.state, "open");
    }

    #[test]
    fn test_create_payload_shape() {
        let payload = CreatePullRequest {
            title: "t",
            body: "b",
            maintainer_can_modify: true,
            head: "TEMPLATE",
            base: "development",
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["head"], "TEMPLATE");
        assert_eq!(value["base"], "development");
        assert_eq!(value["maintainer_can_modify"], true);
    }

    #[test]
    fn test_api_url_trailing_slash_trimmed() {
        let client = GitHubClient::new("https://api.github.com/", "homer", "tok");
        assert_eq!(client.api_url, "https://api.github.com");
    }
}
