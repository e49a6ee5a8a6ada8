//! livewatch-analysis: HTTP client for the external keyword-analysis backend.
//! The backend downloads and transcribes a video and searches it for
//! keywords; this crate only submits jobs and checks health.

pub mod client;
pub mod error;

pub use client::{AnalysisClient, AnalysisResponse, KeywordAnalyzer, KeywordMatch};
pub use error::AnalysisError;
