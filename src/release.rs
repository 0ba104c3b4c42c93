//! Time from merge until the change is shipped by a release merge.
//!
//! Only pull requests merged into a non-mainline branch are considered. The release is the
//! last "Merge release branch" commit on that branch after the merge, looked up on the first
//! page of the commit list.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::github::Upstream;
use crate::types::{BranchLifeTime, MergeUntilRelease};
use futures::stream::{self, StreamExt};

const RELEASE_MERGE_PREFIX: &str = "Merge release branch";

/// Looks up the release merge for every eligible branch life time.
///
/// Items whose lookup fails are logged and left out.
pub async fn merge_until_release<U: Upstream>(
    upstream: &U,
    config: &AppConfig,
    branch_life_times: &[BranchLifeTime],
) -> Vec<MergeUntilRelease> {
    tracing::info!("Start fetching merge-until-release times...");

    let times: Vec<MergeUntilRelease> = stream::iter(
        branch_life_times
            .iter()
            .filter(|blt| blt.base_branch != config.mainline_branch),
    )
    .map(|blt| async move {
        match fetch_merge_until_release(upstream, config, blt).await {
            Ok(time) => Some(time),
            Err(e) => {
                tracing::error!(
                    repository = %blt.repository,
                    merged_at = %blt.merged_at,
                    "Could not fetch commits since merge commit: {}",
                    e
                );
                None
            }
        }
    })
    .buffer_unordered(config.commit_fetch_concurrency.max(1))
    .filter_map(|time| async move { time })
    .collect()
    .await;

    tracing::info!(count = times.len(), "Finished fetching merge-until-release times.");
    times
}

// TODO: follow the commit list pagination; GitHub returns newest commits first, so the
// first page alone can miss the release merge on busy branches.
async fn fetch_merge_until_release<U: Upstream>(
    upstream: &U,
    config: &AppConfig,
    blt: &BranchLifeTime,
) -> Result<MergeUntilRelease> {
    let url = config.commits_since_url(&blt.repository, &blt.base_branch, blt.merged_at)?;
    let commits = upstream.fetch_commits(&url).await?;

    let release_date = commits
        .iter()
        .rfind(|commit| commit.message.starts_with(RELEASE_MERGE_PREFIX))
        .and_then(|commit| commit.committer_date)
        .ok_or_else(|| Error::Malformed("no release merge since the merge commit".into()))?;

    let millis = (release_date - blt.merged_at).num_milliseconds();
    let until_release_min = millis.div_euclid(60_000) + i64::from(millis.rem_euclid(60_000) > 0);

    Ok(MergeUntilRelease {
        repository: blt.repository.clone(),
        merged_at: blt.merged_at,
        until_release_min,
    })
}
