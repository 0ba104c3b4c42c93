//! Application configuration and environment variable parsing.
//!
//! This module handles loading configuration settings from the environment (e.g., .env file).
//! It defines the `AppConfig` struct which governs which repositories are tracked, how hard
//! the GitHub API may be hit per run, and where the checkpoint and metrics end up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Branch assumed when a tracked repository entry does not name one.
pub const DEFAULT_BASE_BRANCH: &str = "master";

/// A repository whose merged pull requests are measured.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// The owner of the repository (e.g., "arrow-kt").
    pub owner: String,
    /// The name of the repository (e.g., "arrow").
    pub name: String,
    /// Only pull requests targeting this branch are considered.
    pub base_branch: String,
}

impl RepositoryConfig {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        base_branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            base_branch: base_branch.into(),
        }
    }

    /// Identity key used for checkpoints and metric names ("owner/name").
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RepositoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Repositories to track.
    /// Expected format: comma-separated "owner/name" or "owner/name:branch" entries.
    /// Example: "arrow-kt/arrow:master,JasonEtco/create-an-issue"
    #[serde(deserialize_with = "deserialize_repositories")]
    pub tracked_repositories: Vec<RepositoryConfig>,

    /// Optional GitHub Personal Access Token for higher rate limits.
    pub github_api_token: Option<String>,

    /// Base URL of the GitHub REST API.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// File holding the per-repository "done until" checkpoints.
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    /// Graphite plaintext endpoint the metric points are written to.
    #[serde(default = "default_graphite_addr")]
    pub graphite_addr: String,

    /// Number of pull requests requested per page (GitHub caps this at 100).
    #[serde(default = "default_pr_page_size")]
    pub pr_page_size: u8,

    /// Maximum number of repositories walked at the same time.
    #[serde(default = "default_repo_concurrency_limit")]
    pub repo_concurrency_limit: usize,

    /// Maximum number of commit lists fetched at the same time for one page.
    #[serde(default = "default_commit_fetch_concurrency")]
    pub commit_fetch_concurrency: usize,

    /// A repository is skipped when fewer API requests than this remain.
    #[serde(default = "default_min_rate_limit_remaining")]
    pub min_rate_limit_remaining: u64,

    /// Also measure the time between merge and the next release merge.
    #[serde(default)]
    pub track_merge_until_release: bool,

    /// Branch whose merges are never followed by a release merge.
    #[serde(default = "default_mainline_branch")]
    pub mainline_branch: String,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoint.json")
}

fn default_graphite_addr() -> String {
    "127.0.0.1:2003".to_string()
}

fn default_pr_page_size() -> u8 {
    100
}

fn default_repo_concurrency_limit() -> usize {
    10
}

fn default_commit_fetch_concurrency() -> usize {
    15
}

fn default_min_rate_limit_remaining() -> u64 {
    1
}

fn default_mainline_branch() -> String {
    DEFAULT_BASE_BRANCH.to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Configuration with every optional setting at its default.
    pub fn with_repositories(tracked_repositories: Vec<RepositoryConfig>) -> Self {
        Self {
            tracked_repositories,
            github_api_token: None,
            github_api_url: default_github_api_url(),
            checkpoint_path: default_checkpoint_path(),
            graphite_addr: default_graphite_addr(),
            pr_page_size: default_pr_page_size(),
            repo_concurrency_limit: default_repo_concurrency_limit(),
            commit_fetch_concurrency: default_commit_fetch_concurrency(),
            min_rate_limit_remaining: default_min_rate_limit_remaining(),
            track_merge_until_release: false,
            mainline_branch: default_mainline_branch(),
        }
    }

    /// First page of closed pull requests for a repository, most recently updated first.
    pub fn pull_requests_url(&self, repo: &RepositoryConfig) -> Result<String, url::ParseError> {
        let mut url = self.api_url(&["repos", &repo.owner, &repo.name, "pulls"])?;
        url.query_pairs_mut()
            .append_pair("state", "closed")
            .append_pair("base", &repo.base_branch)
            .append_pair("sort", "updated")
            .append_pair("direction", "desc")
            .append_pair("per_page", &self.pr_page_size.min(100).to_string());
        Ok(url.into())
    }

    /// Commits on `branch` of `repository` ("owner/name") since the given instant.
    pub fn commits_since_url(
        &self,
        repository: &str,
        branch: &str,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<String, url::ParseError> {
        let mut segments = vec!["repos"];
        segments.extend(repository.split('/'));
        segments.push("commits");

        let mut url = self.api_url(&segments)?;
        url.query_pairs_mut()
            .append_pair("sha", branch)
            .append_pair("since", &since.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        Ok(url.into())
    }

    /// The API base with `segments` appended, each one percent-encoded.
    fn api_url(&self, segments: &[&str]) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.github_api_url)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn deserialize_repositories<'de, D>(deserializer: D) -> Result<Vec<RepositoryConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(parse_repositories(&s))
}

fn parse_repositories(s: &str) -> Vec<RepositoryConfig> {
    s.split(',')
        .filter_map(|part| {
            let (slug, branch) = match part.trim().split_once(':') {
                Some((slug, branch)) => (slug, branch.trim()),
                None => (part.trim(), DEFAULT_BASE_BRANCH),
            };
            let parts: Vec<&str> = slug.split('/').collect();
            if parts.len() == 2 && !branch.is_empty() {
                Some(RepositoryConfig::new(
                    parts[0].trim(),
                    parts[1].trim(),
                    branch,
                ))
            } else {
                if !part.trim().is_empty() {
                    tracing::warn!(entry = part, "Ignoring malformed repository entry");
                }
                None
            }
        })
        .collect()
}
