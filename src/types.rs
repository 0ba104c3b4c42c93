use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How long one merged pull request stayed open, in business-hours-adjusted seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchLifeTime {
    /// "owner/name" of the repository the pull request belongs to.
    pub repository: String,
    pub base_branch: String,
    pub merged_at: DateTime<Utc>,
    pub duration_sec: i64,
}

/// Minutes between a merge and the release merge that shipped it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeUntilRelease {
    pub repository: String,
    pub merged_at: DateTime<Utc>,
    pub until_release_min: i64,
}
