//! Orchestration of one collection run across all tracked repositories.
//!
//! This module implements `BranchLifeTimeCollector`, which:
//! 1. Loads the checkpoint once and shares it read-only with every repository pass.
//! 2. Checks the API quota and walks each repository concurrently.
//! 3. Merges the fresh high-water marks into the checkpoint and saves it after the join.

use crate::checkpoint::{self, CheckpointStore, Checkpoints};
use crate::config::{AppConfig, RepositoryConfig};
use crate::error::Result;
use crate::github::Upstream;
use crate::types::BranchLifeTime;
use crate::walker::PagedCollectionWalker;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

pub struct BranchLifeTimeCollector<U> {
    upstream: U,
    config: AppConfig,
    store: CheckpointStore,
}

impl<U: Upstream> BranchLifeTimeCollector<U> {
    pub fn new(upstream: U, config: AppConfig) -> Self {
        let store = CheckpointStore::new(config.checkpoint_path.clone());
        Self {
            upstream,
            config,
            store,
        }
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Collects the branch life times of every merged pull request not seen in a previous run.
    ///
    /// Fails only if the updated checkpoint cannot be written.
    pub async fn collect_all(&self, repos: &[RepositoryConfig]) -> Result<Vec<BranchLifeTime>> {
        tracing::info!("Start fetching branch life times...");
        let prior = self.store.load().await;

        let per_repository: Vec<Vec<BranchLifeTime>> = stream::iter(repos)
            .map(|repo| self.collect_repository(repo, &prior))
            .buffer_unordered(self.config.repo_concurrency_limit.max(1))
            .collect()
            .await;

        let fresh: Vec<_> = per_repository
            .iter()
            .filter_map(|results| checkpoint::fresh_checkpoint(results))
            .collect();
        self.store.save(&fresh, &prior).await?;

        let branch_life_times: Vec<BranchLifeTime> = per_repository.into_iter().flatten().collect();
        tracing::info!(
            count = branch_life_times.len(),
            "Finished fetching branch life times."
        );
        Ok(branch_life_times)
    }

    /// Walks a single repository, or returns nothing if the quota does not allow it.
    async fn collect_repository(
        &self,
        repo: &RepositoryConfig,
        prior: &Checkpoints,
    ) -> Vec<BranchLifeTime> {
        if !self.has_quota(repo).await {
            return Vec::new();
        }

        let done_until: Option<DateTime<Utc>> = prior.get(&repo.key()).copied();
        let start_url = match self.config.pull_requests_url(repo) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(repository = %repo, "Invalid pull request URL: {}", e);
                return Vec::new();
            }
        };
        tracing::info!(repository = %repo, done_until = ?done_until, "Walking pull requests");

        let results =
            PagedCollectionWalker::new(&self.upstream, repo, self.config.commit_fetch_concurrency)
                .walk(&start_url, done_until)
                .await;

        tracing::info!(repository = %repo, count = results.len(), "Collected branch life times");
        results
    }

    async fn has_quota(&self, repo: &RepositoryConfig) -> bool {
        match self.upstream.fetch_rate_limit().await {
            Ok(rate) if rate.remaining < self.config.min_rate_limit_remaining => {
                tracing::warn!(
                    repository = %repo,
                    remaining = rate.remaining,
                    reset = rate.reset,
                    "GitHub rate limit exhausted, skipping repository"
                );
                false
            }
            Ok(rate) => {
                tracing::debug!(repository = %repo, remaining = rate.remaining, "GitHub rate limit");
                true
            }
            Err(e) => {
                tracing::error!(repository = %repo, "Could not fetch GitHub rate limit: {}", e);
                false
            }
        }
    }
}
