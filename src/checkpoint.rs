//! Persistence of the per-repository "done until" markers.
//!
//! The checkpoint file is a JSON array of `{"repository": ..., "doneUntil": ...}` records.
//! It is read once at the start of a run and overwritten as a whole at the end.

use crate::error::{Error, Result};
use crate::types::BranchLifeTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Most recent merge already processed for a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchCheckpoint {
    pub repository: String,
    pub done_until: DateTime<Utc>,
}

/// Repository key ("owner/name") to the merge timestamp it is done until.
pub type Checkpoints = BTreeMap<String, DateTime<Utc>>;

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the checkpoints.
    ///
    /// Returns an empty mapping if the file doesn't exist or can't be parsed, which
    /// makes the next walk a full scan.
    pub async fn load(&self) -> Checkpoints {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::info!(path = %self.path.display(), "No checkpoint loaded, starting fresh: {}", e);
                return Checkpoints::new();
            }
        };

        match serde_json::from_str::<Vec<FetchCheckpoint>>(&content) {
            Ok(entries) => {
                let mut checkpoints = Checkpoints::new();
                for entry in entries {
                    checkpoints.entry(entry.repository).or_insert(entry.done_until);
                }
                tracing::info!(
                    path = %self.path.display(),
                    repositories = checkpoints.len(),
                    "Loaded checkpoint"
                );
                checkpoints
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to parse checkpoint file: {}", e);
                Checkpoints::new()
            }
        }
    }

    /// Merges `fresh` over `prior` and replaces the checkpoint file with the result.
    pub async fn save(
        &self,
        fresh: &[FetchCheckpoint],
        prior: &Checkpoints,
    ) -> Result<Vec<FetchCheckpoint>> {
        let merged = merge(fresh, prior);
        let json = serde_json::to_string_pretty(&merged)?;

        // Write next to the target and rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        let persist = |source| Error::Persistence {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, json).await.map_err(persist)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(persist)?;

        tracing::info!(
            path = %self.path.display(),
            repositories = merged.len(),
            "Saved checkpoint"
        );
        Ok(merged)
    }
}

/// The new checkpoint for a repository is the merge time of its first result.
///
/// Results follow GitHub's most-recently-updated-first order, so this is the newest merge
/// seen as long as that order is stable. Repositories without results get no entry.
pub fn fresh_checkpoint(results: &[BranchLifeTime]) -> Option<FetchCheckpoint> {
    results.first().map(|first| FetchCheckpoint {
        repository: first.repository.clone(),
        done_until: first.merged_at,
    })
}

/// Concatenates fresh then prior entries and keeps the first entry per repository.
pub fn merge(fresh: &[FetchCheckpoint], prior: &Checkpoints) -> Vec<FetchCheckpoint> {
    let prior = prior.iter().map(|(repository, done_until)| FetchCheckpoint {
        repository: repository.clone(),
        done_until: *done_until,
    });

    let mut seen = HashSet::new();
    fresh
        .iter()
        .cloned()
        .chain(prior)
        .filter(|entry| seen.insert(entry.repository.clone()))
        .collect()
}
