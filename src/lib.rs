pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod duration;
pub mod error;
pub mod github;
pub mod metrics;
pub mod release;
pub mod sink;
pub mod types;
pub mod walker;

use collector::BranchLifeTimeCollector;
use config::AppConfig;
use github::GitHubClient;
use sink::GraphiteSink;

/// Runs one collection: fetch new branch life times, update the checkpoint and ship the
/// resulting metric points to Graphite.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let client = GitHubClient::new(config.github_api_token.clone(), &config.github_api_url)?;
    let repos = config.tracked_repositories.clone();
    let collector = BranchLifeTimeCollector::new(client, config.clone());

    let branch_life_times = collector.collect_all(&repos).await?;
    let mut points = metrics::build(&branch_life_times);

    if config.track_merge_until_release {
        let times =
            release::merge_until_release(collector.upstream(), &config, &branch_life_times).await;
        points.extend(metrics::build_merge_until_release(&times));
    }

    if points.is_empty() {
        tracing::info!("No new merged pull requests, nothing to send");
        return Ok(());
    }

    GraphiteSink::new(&config.graphite_addr).send(&points).await?;
    Ok(())
}
