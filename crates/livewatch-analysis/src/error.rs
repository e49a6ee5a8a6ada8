//! Error types for the analysis client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Transport failure: the backend is unreachable or timed out.
    #[error("analysis backend unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("analysis backend returned status {status}")]
    Status { status: u16 },
}

impl AnalysisError {
    /// True when the backend answered at all.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}
