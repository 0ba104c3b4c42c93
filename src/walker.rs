//! Incremental walk over the paged pull request list of one repository.
//!
//! Pages are requested one after another because the next link and the stop condition
//! both depend on the outcome of the current page. Within a page the commit lists of all
//! eligible pull requests are fetched concurrently.

use crate::config::RepositoryConfig;
use crate::duration;
use crate::error::{Error, Result};
use crate::github::{PullRequestRecord, Upstream};
use crate::types::BranchLifeTime;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};

pub struct PagedCollectionWalker<'a, U> {
    upstream: &'a U,
    repo: &'a RepositoryConfig,
    concurrency: usize,
}

impl<'a, U: Upstream> PagedCollectionWalker<'a, U> {
    pub fn new(upstream: &'a U, repo: &'a RepositoryConfig, concurrency: usize) -> Self {
        Self {
            upstream,
            repo,
            concurrency: concurrency.max(1),
        }
    }

    /// Walks the pull requests starting at `start_url` and returns one branch life time per
    /// merged pull request newer than `stop_before`.
    ///
    /// A failed page request yields an empty sequence for the whole repository.
    pub async fn walk(
        &self,
        start_url: &str,
        stop_before: Option<DateTime<Utc>>,
    ) -> Vec<BranchLifeTime> {
        match self.try_walk(start_url, stop_before).await {
            Ok(results) => results,
            Err(e) => {
                self.log_rate_limit().await;
                tracing::error!(repository = %self.repo, "Could not fetch any PRs: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_walk(
        &self,
        start_url: &str,
        stop_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<BranchLifeTime>> {
        let mut results = Vec::new();
        let mut next_url = Some(start_url.to_string());
        let mut page_count = 0u32;

        while let Some(url) = next_url.take() {
            let page = self.upstream.fetch_pull_request_page(&url).await?;
            page_count += 1;

            let page_results = self.resolve_page(page.items, stop_before).await;
            tracing::debug!(
                repository = %self.repo,
                page = page_count,
                results = page_results.len(),
                "Processed page"
            );

            // Pages come most recently updated first, so an empty page means we caught up.
            if page_results.is_empty() {
                break;
            }
            results.extend(page_results);
            next_url = page.next;
        }

        Ok(results)
    }

    /// Turns the eligible pull requests of one page into branch life times.
    ///
    /// If any commit fetch fails, the whole page yields nothing.
    async fn resolve_page(
        &self,
        items: Vec<PullRequestRecord>,
        stop_before: Option<DateTime<Utc>>,
    ) -> Vec<BranchLifeTime> {
        let eligible: Vec<PullRequestRecord> = items
            .into_iter()
            .filter(|pr| is_eligible(pr, stop_before))
            .collect();

        let batch: Result<Vec<Option<BranchLifeTime>>> = stream::iter(eligible)
            .map(|pr| self.branch_life_time(pr))
            .buffered(self.concurrency)
            .try_collect()
            .await;

        match batch {
            Ok(results) => results.into_iter().flatten().collect(),
            Err(e) => {
                tracing::error!(repository = %self.repo, "Could not fetch commits of PR: {}", e);
                Vec::new()
            }
        }
    }

    async fn branch_life_time(&self, pr: PullRequestRecord) -> Result<Option<BranchLifeTime>> {
        let Some(merged_at) = pr.merged_at else {
            return Ok(None);
        };

        let commits = self
            .upstream
            .fetch_commits(pr.commits_url())
            .await
            .map_err(|e| Error::DetailFetch {
                url: pr.commits_url().to_string(),
                source: Box::new(e),
            })?;

        // The first listed commit is taken as the earliest one. GitHub pages commit lists,
        // so for long-lived branches this may not be the true first commit.
        let Some(first_commit) = commits.first().and_then(|c| c.committer_date) else {
            tracing::warn!(pr = %pr.url, "{}", Error::Malformed("PR has no dated commits".into()));
            return Ok(None);
        };

        let raw = duration::raw_seconds(first_commit, merged_at);
        if raw < 0 {
            tracing::warn!(pr = %pr.url, raw, "Skipping PR merged before its first commit");
            return Ok(None);
        }

        Ok(Some(BranchLifeTime {
            repository: self.repo.key(),
            base_branch: self.repo.base_branch.clone(),
            merged_at,
            duration_sec: duration::normalize(raw),
        }))
    }

    async fn log_rate_limit(&self) {
        match self.upstream.fetch_rate_limit().await {
            Ok(rate) => tracing::info!(
                repository = %self.repo,
                remaining = rate.remaining,
                limit = rate.limit,
                reset = rate.reset,
                "GitHub rate limit"
            ),
            Err(e) => tracing::warn!(repository = %self.repo, "Could not fetch rate limit: {}", e),
        }
    }
}

/// Merged, and not yet covered by the checkpoint.
fn is_eligible(pr: &PullRequestRecord, stop_before: Option<DateTime<Utc>>) -> bool {
    pr.merged_at
        .is_some_and(|merged_at| stop_before.is_none_or(|cutoff| merged_at > cutoff))
}
