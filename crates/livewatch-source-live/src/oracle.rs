//! LiveStatusOracle trait and the HTTP implementation.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use livewatch_core::LiveStatus;

use crate::error::OracleError;
use crate::parse::parse_live_page;

pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

/// Desktop browser user agent; the live page is served differently to unknown clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Answers "is this channel live, and with which video". Enables mock
/// injection for poll-loop tests.
///
/// Infallible by contract: implementations map every failure to
/// [`LiveStatus::offline`].
#[async_trait]
pub trait LiveStatusOracle: Send + Sync {
    async fn check(&self, channel_id: &str) -> LiveStatus;

    /// Raw cookie header to send with subsequent requests.
    fn set_cookies(&self, _cookies: &str) {}
}

/// Oracle backed by the channel's `/live` page.
pub struct HttpLiveOracle {
    client: reqwest::Client,
    base_url: String,
    cookies: RwLock<String>,
}

impl HttpLiveOracle {
    pub fn new(timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            cookies: RwLock::new(String::new()),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn live_url(&self, channel_id: &str) -> String {
        format!("{}/channel/{channel_id}/live", self.base_url)
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Fetch and parse the live page, surfacing errors.
    pub async fn fetch(&self, channel_id: &str) -> Result<LiveStatus, OracleError> {
        let url = self.live_url(channel_id);
        tracing::debug!(channel_id, url = %url, "fetching live status");

        let mut request = self.client.get(&url);
        let cookies = self.cookie_header();
        if !cookies.is_empty() {
            request = request.header(reqwest::header::COOKIE, cookies);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let html = response.text().await?;
        Ok(parse_live_page(&html))
    }
}

#[async_trait]
impl LiveStatusOracle for HttpLiveOracle {
    async fn check(&self, channel_id: &str) -> LiveStatus {
        match self.fetch(channel_id).await {
            Ok(status) => {
                match (status.is_live, status.video_id.as_deref()) {
                    (true, Some(video_id)) => {
                        tracing::debug!(channel_id, video_id, "live stream detected");
                    }
                    (true, None) => {
                        tracing::debug!(channel_id, "live flag present but no video id found");
                    }
                    (false, _) => {
                        tracing::debug!(channel_id, "no live stream detected");
                    }
                }
                status
            }
            Err(e) => {
                tracing::debug!(channel_id, error = %e, "live status check failed, treating as offline");
                LiveStatus::offline()
            }
        }
    }

    fn set_cookies(&self, cookies: &str) {
        if let Ok(mut guard) = self.cookies.write() {
            if *guard != cookies {
                *guard = cookies.to_string();
            }
        }
    }
}
