//! Error types for live-page fetching.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected http status {status} for {url}")]
    Status { status: u16, url: String },
}
