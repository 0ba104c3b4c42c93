use async_trait::async_trait;
use branch_lifetime::checkpoint::{CheckpointStore, FetchCheckpoint};
use branch_lifetime::collector::BranchLifeTimeCollector;
use branch_lifetime::config::{AppConfig, RepositoryConfig};
use branch_lifetime::error::{Error, Result};
use branch_lifetime::github::{
    CommitRecord, Href, PullRequestLinks, PullRequestPage, PullRequestRecord, RateLimitSnapshot,
    Upstream,
};
use branch_lifetime::metrics;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Serves canned pages and commit lists keyed by URL.
#[derive(Default)]
struct FakeGitHub {
    pages: HashMap<String, PullRequestPage>,
    commits: HashMap<String, Vec<CommitRecord>>,
    /// Scripted rate limit answers, consumed in order; `None` fails the request.
    rate_limits: Mutex<VecDeque<Option<u64>>>,
    requested_pages: Mutex<Vec<String>>,
}

impl FakeGitHub {
    fn add_pr(
        &mut self,
        page_url: &str,
        id: u32,
        merged_at: DateTime<Utc>,
        first_commit: DateTime<Utc>,
    ) {
        let commits_url = format!("{page_url}/{id}/commits");
        self.pages
            .entry(page_url.to_string())
            .or_default()
            .items
            .push(PullRequestRecord {
                url: format!("{page_url}/{id}"),
                merged_at: Some(merged_at),
                links: PullRequestLinks {
                    commits: Href {
                        href: commits_url.clone(),
                    },
                },
            });
        self.commits.insert(
            commits_url,
            vec![CommitRecord {
                committer_date: Some(first_commit),
                message: "initial".to_string(),
            }],
        );
    }

    fn script_rate_limits(&self, answers: &[Option<u64>]) {
        self.rate_limits.lock().unwrap().extend(answers.iter().copied());
    }

    fn page_requests(&self) -> usize {
        self.requested_pages.lock().unwrap().len()
    }
}

#[async_trait]
impl Upstream for FakeGitHub {
    async fn fetch_pull_request_page(&self, url: &str) -> Result<PullRequestPage> {
        self.requested_pages.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or(Error::Upstream {
            status: 502,
            url: url.to_string(),
        })
    }

    async fn fetch_commits(&self, url: &str) -> Result<Vec<CommitRecord>> {
        self.commits.get(url).cloned().ok_or(Error::Upstream {
            status: 404,
            url: url.to_string(),
        })
    }

    async fn fetch_rate_limit(&self) -> Result<RateLimitSnapshot> {
        match self.rate_limits.lock().unwrap().pop_front().unwrap_or(Some(5000)) {
            Some(remaining) => Ok(RateLimitSnapshot {
                limit: 5000,
                remaining,
                reset: 0,
            }),
            None => Err(Error::Upstream {
                status: 403,
                url: "rate_limit".to_string(),
            }),
        }
    }
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

fn test_config(dir: &tempfile::TempDir, repos: Vec<RepositoryConfig>) -> AppConfig {
    let mut config = AppConfig::with_repositories(repos);
    config.github_api_url = "http://github.test".to_string();
    config.checkpoint_path = dir.path().join("checkpoint.json");
    // Sequential repository passes keep the scripted rate limit answers in order.
    config.repo_concurrency_limit = 1;
    config
}

fn demo() -> RepositoryConfig {
    RepositoryConfig::new("octo", "demo", "master")
}

fn other() -> RepositoryConfig {
    RepositoryConfig::new("octo", "other", "master")
}

/// Links `from` to `to` as its next page.
fn link_pages(github: &mut FakeGitHub, from: &str, to: &str) {
    github.pages.entry(from.to_string()).or_default().next = Some(to.to_string());
}

#[tokio::test]
async fn test_single_pull_request_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, vec![demo()]);
    let mut github = FakeGitHub::default();
    github.add_pr(&config.pull_requests_url(&demo()).unwrap(), 1, at(10, 12), at(8, 12));

    let collector = BranchLifeTimeCollector::new(github, config.clone());
    let results = collector.collect_all(&[demo()]).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].repository, "octo/demo");
    assert_eq!(results[0].duration_sec, 0);

    let points = metrics::build(&results);
    assert_eq!(points[0].stat, "leadtime.branchlifetime.octo-demo");
    assert_eq!(points[0].timestamp_sec, at(10, 12).timestamp());

    let checkpoint = CheckpointStore::new(&config.checkpoint_path).load().await;
    assert_eq!(checkpoint.get("octo/demo"), Some(&at(10, 12)));
}

#[tokio::test]
async fn test_second_run_without_new_items_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, vec![demo()]);
    let first_page = config.pull_requests_url(&demo()).unwrap();
    let mut github = FakeGitHub::default();
    github.add_pr(&first_page, 1, at(10, 12), at(10, 10));
    github.add_pr(&first_page, 2, at(9, 12), at(9, 11));

    let collector = BranchLifeTimeCollector::new(github, config.clone());
    let first = collector.collect_all(&[demo()]).await.unwrap();
    let store = CheckpointStore::new(&config.checkpoint_path);
    let after_first = store.load().await;

    let second = collector.collect_all(&[demo()]).await.unwrap();
    let after_second = store.load().await;

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    assert_eq!(after_first, after_second);
    assert_eq!(after_second.get("octo/demo"), Some(&at(10, 12)));
}

#[tokio::test]
async fn test_checkpoint_is_deduplicated_by_repository() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, vec![demo()]);
    let prior = vec![
        FetchCheckpoint {
            repository: "octo/demo".to_string(),
            done_until: at(5, 12),
        },
        FetchCheckpoint {
            repository: "untracked/repo".to_string(),
            done_until: at(1, 12),
        },
    ];
    std::fs::write(&config.checkpoint_path, serde_json::to_string(&prior).unwrap()).unwrap();

    let mut github = FakeGitHub::default();
    let first_page = config.pull_requests_url(&demo()).unwrap();
    github.add_pr(&first_page, 1, at(10, 12), at(10, 10));
    github.add_pr(&first_page, 2, at(4, 12), at(4, 10));

    let results = BranchLifeTimeCollector::new(github, config.clone())
        .collect_all(&[demo()])
        .await
        .unwrap();

    // The PR merged before the prior checkpoint was processed in an earlier run.
    assert_eq!(results.len(), 1);

    let saved: Vec<FetchCheckpoint> =
        serde_json::from_str(&std::fs::read_to_string(&config.checkpoint_path).unwrap()).unwrap();
    let demo_entries: Vec<_> = saved.iter().filter(|c| c.repository == "octo/demo").collect();
    assert_eq!(demo_entries.len(), 1);
    assert_eq!(demo_entries[0].done_until, at(10, 12));
    assert!(saved.iter().any(|c| c.repository == "untracked/repo"));
}

#[tokio::test]
async fn test_failed_rate_limit_lookup_skips_only_that_repository() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, vec![demo(), other()]);
    let mut github = FakeGitHub::default();
    github.add_pr(&config.pull_requests_url(&demo()).unwrap(), 1, at(10, 12), at(10, 10));
    github.add_pr(&config.pull_requests_url(&other()).unwrap(), 1, at(9, 12), at(9, 10));
    github.script_rate_limits(&[None, Some(4000)]);

    let collector = BranchLifeTimeCollector::new(github, config.clone());
    let results = collector.collect_all(&[demo(), other()]).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].repository, "octo/other");
    assert_eq!(collector.upstream().page_requests(), 1);

    let checkpoint = CheckpointStore::new(&config.checkpoint_path).load().await;
    assert!(!checkpoint.contains_key("octo/demo"));
    assert_eq!(checkpoint.get("octo/other"), Some(&at(9, 12)));
}

#[tokio::test]
async fn test_exhausted_quota_skips_repository() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, vec![demo()]);
    let mut github = FakeGitHub::default();
    github.add_pr(&config.pull_requests_url(&demo()).unwrap(), 1, at(10, 12), at(10, 10));
    github.script_rate_limits(&[Some(0)]);

    let collector = BranchLifeTimeCollector::new(github, config);
    let results = collector.collect_all(&[demo()]).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(collector.upstream().page_requests(), 0);
}

#[tokio::test]
async fn test_upstream_failure_keeps_prior_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, vec![demo(), other()]);
    let prior = vec![FetchCheckpoint {
        repository: "octo/demo".to_string(),
        done_until: at(3, 12),
    }];
    std::fs::write(&config.checkpoint_path, serde_json::to_string(&prior).unwrap()).unwrap();

    // Only `other` has a first page; fetching the `demo` page fails.
    let mut github = FakeGitHub::default();
    github.add_pr(&config.pull_requests_url(&other()).unwrap(), 1, at(9, 12), at(9, 10));

    let results = BranchLifeTimeCollector::new(github, config.clone())
        .collect_all(&[demo(), other()])
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let checkpoint = CheckpointStore::new(&config.checkpoint_path).load().await;
    assert_eq!(checkpoint.get("octo/demo"), Some(&at(3, 12)));
    assert_eq!(checkpoint.get("octo/other"), Some(&at(9, 12)));
}

#[tokio::test]
async fn test_unwritable_checkpoint_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir, vec![demo()]);
    config.checkpoint_path = dir.path().join("missing").join("checkpoint.json");
    let mut github = FakeGitHub::default();
    github.add_pr(&config.pull_requests_url(&demo()).unwrap(), 1, at(10, 12), at(10, 10));

    let result = BranchLifeTimeCollector::new(github, config)
        .collect_all(&[demo()])
        .await;

    assert!(matches!(result, Err(Error::Persistence { .. })));
}

#[tokio::test]
async fn test_later_pages_are_collected_in_the_same_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir, vec![demo()]);
    let first_page = config.pull_requests_url(&demo()).unwrap();
    let second_page = format!("{first_page}&page=2");
    let mut github = FakeGitHub::default();
    github.add_pr(&first_page, 1, at(10, 12), at(10, 10));
    github.add_pr(&second_page, 2, at(9, 12), at(9, 10));
    link_pages(&mut github, &first_page, &second_page);

    let collector = BranchLifeTimeCollector::new(github, config.clone());
    let mut merged: Vec<DateTime<Utc>> = Vec::new();
    for _ in 0..3 {
        let results = collector.collect_all(&[demo()]).await.unwrap();
        merged.extend(results.iter().map(|blt| blt.merged_at));
    }

    // Everything is collected on the first run and never again.
    assert_eq!(merged, vec![at(10, 12), at(9, 12)]);
    let checkpoint = CheckpointStore::new(&config.checkpoint_path).load().await;
    assert_eq!(checkpoint.get("octo/demo"), Some(&at(10, 12)));
}

#[tokio::test]
async fn test_repositories_are_walked_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let repos: Vec<RepositoryConfig> = (1..=6)
        .map(|i| RepositoryConfig::new("octo", format!("repo{i}"), "master"))
        .collect();
    let mut config = test_config(&dir, repos.clone());
    config.repo_concurrency_limit = AppConfig::with_repositories(vec![]).repo_concurrency_limit;

    let mut github = FakeGitHub::default();
    for (i, repo) in (1..).zip(&repos) {
        let first_page = config.pull_requests_url(repo).unwrap();
        github.add_pr(&first_page, 1, at(i + 1, 12), at(i + 1, 10));
        github.add_pr(&first_page, 2, at(i, 12), at(i, 10));
    }

    let results = BranchLifeTimeCollector::new(github, config.clone())
        .collect_all(&repos)
        .await
        .unwrap();

    assert_eq!(results.len(), 12);
    let checkpoint = CheckpointStore::new(&config.checkpoint_path).load().await;
    assert_eq!(checkpoint.len(), 6);
    for (i, repo) in (1..).zip(&repos) {
        let repo_results: Vec<_> = results
            .iter()
            .filter(|blt| blt.repository == repo.key())
            .collect();
        assert_eq!(repo_results.len(), 2);
        assert_eq!(checkpoint.get(&repo.key()), Some(&at(i + 1, 12)));
    }
}
