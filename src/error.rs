use std::path::PathBuf;

/// Errors surfaced by scribex components.
///
/// Only `MissingApiKey` aborts an operation outright; the persistence and
/// network variants are caught where they happen and reported as outcomes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("ANTHROPIC_API_KEY environment variable not set")]
    MissingApiKey,
    #[error("{0}")]
    Validation(&'static str),
    #[error("could not persist '{key}': {source}")]
    Persistence {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API request failed ({status}): {body}")]
    Api { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, Error>;
