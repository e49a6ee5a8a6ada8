use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ─── Channel ──────────────────────────────────────────────────────

/// What the control server should do while a channel is the selected stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutomationAction {
    #[default]
    #[serde(rename = "none", alias = "no-obs")]
    None,
    #[serde(rename = "stream")]
    StartStreaming,
    #[serde(rename = "record")]
    StartRecording,
}

impl AutomationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::StartStreaming => "stream",
            Self::StartRecording => "record",
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for AutomationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "no-obs" => Ok(Self::None),
            "stream" => Ok(Self::StartStreaming),
            "record" => Ok(Self::StartRecording),
            _ => Err(format!("unknown automation action: {s}")),
        }
    }
}

/// A configured channel, in the order the user listed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub automation_action: AutomationAction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl Channel {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            automation_action: AutomationAction::None,
            keywords: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: AutomationAction) -> Self {
        self.automation_action = action;
        self
    }

    #[must_use]
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }
}

/// Split a comma-separated keyword field, trimming and dropping empties.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

// ─── Live status ──────────────────────────────────────────────────

/// Result of asking the oracle about one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStatus {
    pub is_live: bool,
    pub video_id: Option<String>,
}

impl LiveStatus {
    pub fn live(video_id: impl Into<String>) -> Self {
        Self {
            is_live: true,
            video_id: Some(video_id.into()),
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    /// Video id when the channel is live with a known video.
    /// A live flag without a video id is not actionable.
    pub fn live_video(&self) -> Option<&str> {
        if self.is_live {
            self.video_id.as_deref()
        } else {
            None
        }
    }
}

/// A channel that is live right now, published to the UI every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveChannel {
    #[serde(flatten)]
    pub channel: Channel,
    pub video_id: String,
}

impl LiveChannel {
    pub fn video_url(&self) -> String {
        watch_url(&self.video_id)
    }
}

/// The channel currently driving automation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedStream {
    pub channel_id: String,
    pub video_id: String,
    pub automation_action: AutomationAction,
}

impl From<&LiveChannel> for SelectedStream {
    fn from(live: &LiveChannel) -> Self {
        Self {
            channel_id: live.channel.id.clone(),
            video_id: live.video_id.clone(),
            automation_action: live.channel.automation_action,
        }
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

// ─── Settings ─────────────────────────────────────────────────────

/// Connection settings for the automation-control server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSettings {
    #[serde(default = "default_control_host")]
    pub host: String,
    /// An absent key means unset; the 4455 default only applies when the
    /// whole `[control]` table is missing.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub password: String,
}

fn default_control_host() -> String {
    "localhost".to_string()
}

fn default_control_port() -> Option<u16> {
    Some(4455)
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            port: default_control_port(),
            password: String::new(),
        }
    }
}

impl ControlSettings {
    /// Host and port are both required before any socket is opened.
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty() && self.port.is_some()
    }

    pub fn url(&self) -> Option<String> {
        let port = self.port?;
        if self.host.trim().is_empty() {
            return None;
        }
        Some(format!("ws://{}:{port}", self.host.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_analysis_url")]
    pub base_url: String,
}

fn default_analysis_url() -> String {
    "http://localhost:5001".to_string()
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            base_url: default_analysis_url(),
        }
    }
}

/// Everything persisted in the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub verbose_logging: bool,
    /// Stored and exposed, but only consulted for selection when
    /// `prefer_priority_channel` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_channel: Option<String>,
    #[serde(default)]
    pub prefer_priority_channel: bool,
    /// Raw cookie header sent with live-page requests.
    #[serde(default)]
    pub cookies: String,
    #[serde(default)]
    pub control: ControlSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl Settings {
    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Priority falls back to the first channel when unset, as the
    /// settings form always did on save.
    pub fn effective_priority_channel(&self) -> Option<&str> {
        self.priority_channel
            .as_deref()
            .or_else(|| self.channels.first().map(|c| c.id.as_str()))
    }

    /// Point the priority at the first channel when it is unset or names a
    /// channel that no longer exists. Applied on every save.
    pub fn normalize_priority(&mut self) {
        let valid = self
            .priority_channel
            .as_deref()
            .is_some_and(|id| self.channel(id).is_some());
        if !valid {
            self.priority_channel = self.channels.first().map(|c| c.id.clone());
        }
    }
}
