//! KeywordAnalyzer trait and the reqwest-backed client.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub keyword: String,
    /// `HH:MM:SS` offset into the video.
    pub timestamp: String,
    /// Transcript segment containing the keyword.
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub matches: Vec<KeywordMatch>,
    #[serde(default)]
    pub keywords_searched: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    video_url: &'a str,
    keywords: &'a [String],
}

/// Analysis backend seam. Enables mock injection for poll-loop tests.
#[async_trait]
pub trait KeywordAnalyzer: Send + Sync {
    /// Submit a video for analysis and wait for the result.
    async fn analyze(
        &self,
        video_url: &str,
        keywords: &[String],
    ) -> Result<AnalysisResponse, AnalysisError>;

    async fn health(&self) -> Result<(), AnalysisError>;

    /// Base URL used by subsequent requests.
    fn set_base_url(&self, _base_url: &str) {}
}

pub struct AnalysisClient {
    client: reqwest::Client,
    base_url: RwLock<String>,
}

impl AnalysisClient {
    /// No overall request timeout: an analysis covers download and
    /// transcription and routinely takes minutes.
    pub fn new(base_url: &str) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: RwLock::new(normalize(base_url)),
        })
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .read()
            .map(|u| u.clone())
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url())
    }
}

fn normalize(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl KeywordAnalyzer for AnalysisClient {
    async fn analyze(
        &self,
        video_url: &str,
        keywords: &[String],
    ) -> Result<AnalysisResponse, AnalysisError> {
        let url = self.endpoint("analyze");
        tracing::debug!(url = %url, video_url, keywords = ?keywords, "submitting analysis request");

        let response = self
            .client
            .post(&url)
            .json(&AnalyzeRequest {
                video_url,
                keywords,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    async fn health(&self) -> Result<(), AnalysisError> {
        let response = self
            .client
            .get(self.endpoint("health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AnalysisError::Status {
                status: status.as_u16(),
            })
        }
    }

    fn set_base_url(&self, base_url: &str) {
        let base_url = normalize(base_url);
        if let Ok(mut guard) = self.base_url.write() {
            if *guard != base_url {
                tracing::debug!(base_url = %base_url, "analysis backend url updated");
                *guard = base_url;
            }
        }
    }
}
