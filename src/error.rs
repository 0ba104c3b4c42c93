use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while collecting branch life times.
#[derive(Error, Debug)]
pub enum Error {
    /// The collection or quota endpoint answered with a non-success status.
    #[error("GitHub responded with {status} for {url}")]
    Upstream { status: u16, url: String },

    /// Fetching the commit list of a single pull request failed.
    #[error("Could not fetch commits from {url}: {source}")]
    DetailFetch {
        url: String,
        #[source]
        source: Box<Error>,
    },

    /// The upstream answered, but not with data we can use.
    #[error("Malformed upstream data: {0}")]
    Malformed(String),

    /// The checkpoint file could not be written.
    #[error("Could not persist checkpoint to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("GitHub request failed: {0}")]
    Transport(#[from] octocrab::Error),

    #[error("Invalid GitHub URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not send metrics: {0}")]
    Sink(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
