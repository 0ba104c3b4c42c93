//! Access to the GitHub REST API.
//!
//! The collector only talks to GitHub through the `Upstream` trait so the pagination
//! engine can be driven by canned pages in tests. `GitHubClient` is the octocrab-backed
//! implementation used by the binary.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::{Octocrab, Page};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A closed pull request as returned by the pull list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub url: String,
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(rename = "_links")]
    pub links: PullRequestLinks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestLinks {
    pub commits: Href,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Href {
    pub href: String,
}

impl PullRequestRecord {
    pub fn commits_url(&self) -> &str {
        &self.links.commits.href
    }
}

/// One page of pull requests plus the `rel="next"` link, if GitHub advertised one.
#[derive(Debug, Clone, Default)]
pub struct PullRequestPage {
    pub items: Vec<PullRequestRecord>,
    pub next: Option<String>,
}

/// The parts of a commit the collector looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub committer_date: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Deserialize)]
struct CommitEnvelope {
    commit: GitCommit,
}

#[derive(Deserialize)]
struct GitCommit {
    #[serde(default)]
    message: String,
    committer: Option<GitActor>,
}

#[derive(Deserialize)]
struct GitActor {
    date: Option<DateTime<Utc>>,
}

impl From<CommitEnvelope> for CommitRecord {
    fn from(envelope: CommitEnvelope) -> Self {
        Self {
            committer_date: envelope.commit.committer.and_then(|c| c.date),
            message: envelope.commit.message,
        }
    }
}

/// Core API quota as reported by `/rate_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds at which the quota resets.
    pub reset: u64,
}

/// The GitHub endpoints the collector depends on.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch one page of pull requests from an absolute URL.
    async fn fetch_pull_request_page(&self, url: &str) -> Result<PullRequestPage>;

    /// Fetch the first page of a commit list from an absolute URL.
    async fn fetch_commits(&self, url: &str) -> Result<Vec<CommitRecord>>;

    /// Fetch the remaining core API quota.
    async fn fetch_rate_limit(&self) -> Result<RateLimitSnapshot>;
}

#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
}

impl GitHubClient {
    pub fn new(token: Option<String>, api_url: &str) -> Result<Self> {
        let mut builder = Octocrab::builder().base_uri(api_url)?;
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }

        Ok(Self {
            octocrab: builder.build()?,
        })
    }

    /// GET one page from an absolute URL; octocrab follows the `Link` header for `next`.
    async fn get_page<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>> {
        tracing::debug!(url, "GET");
        let Ok(uri) = url.parse() else {
            return Err(Error::Malformed(format!("invalid page URL {url}")));
        };

        self.octocrab
            .get_page::<T>(&Some(uri))
            .await
            .map_err(|e| upstream_error(e, url))?
            .ok_or_else(|| Error::Malformed(format!("no page returned for {url}")))
    }
}

/// Non-success responses become `Error::Upstream` with their status code.
fn upstream_error(error: octocrab::Error, url: &str) -> Error {
    match error {
        octocrab::Error::GitHub { source, .. } => Error::Upstream {
            status: source.status_code.as_u16(),
            url: url.to_string(),
        },
        other => Error::Transport(other),
    }
}

#[async_trait]
impl Upstream for GitHubClient {
    async fn fetch_pull_request_page(&self, url: &str) -> Result<PullRequestPage> {
        let page = self.get_page::<PullRequestRecord>(url).await?;
        Ok(PullRequestPage {
            items: page.items,
            next: page.next.map(|uri| uri.to_string()),
        })
    }

    async fn fetch_commits(&self, url: &str) -> Result<Vec<CommitRecord>> {
        let page = self.get_page::<CommitEnvelope>(url).await?;
        Ok(page.items.into_iter().map(CommitRecord::from).collect())
    }

    async fn fetch_rate_limit(&self) -> Result<RateLimitSnapshot> {
        let rate_limit = self
            .octocrab
            .ratelimit()
            .get()
            .await
            .map_err(|e| upstream_error(e, "/rate_limit"))?;
        let core = rate_limit.resources.core;

        Ok(RateLimitSnapshot {
            limit: core.limit as u64,
            remaining: core.remaining as u64,
            reset: core.reset,
        })
    }
}
