use std::path::PathBuf;

use thiserror::Error;

/// Why a page or post could not be turned into a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("expected element not found: {0}")]
    NotFound(&'static str),
    #[error("malformed data: {0}")]
    MalformedData(String),
    #[error("malformed title: {0}")]
    MalformedTitle(String),
    #[error("malformed body: {0}")]
    MalformedBody(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable at {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("response decoding error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("poller task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
