//! Poll loop: settings → oracle → selection → control/analysis pipeline.
//! Runs as a tokio task, one cycle at a time, at a configurable interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use livewatch_analysis::{AnalysisClient, KeywordAnalyzer};
use livewatch_control::{ActionKind, AutomationControl, ClientOptions, ControlClient};
use livewatch_core::selection::LiveTransition;
use livewatch_core::{
    CycleDecision, LiveChannel, PollerState, SelectionOptions, SettingsStore, decide,
};
use livewatch_source_live::{HttpLiveOracle, LiveStatusOracle};

use crate::cli::DaemonOpts;
use crate::logging::VerboseSwitch;
use crate::server::{self, ServerContext};

pub const STATUS_ANALYSIS_FAILED: &str = "Analysis failed - check backend";
pub const STATUS_BACKEND_OFFLINE: &str = "Backend offline";

/// Analysis backend reachability, as last seen by the health loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendHealth {
    #[default]
    Unknown,
    Online,
    /// Reachable but answered with an error status.
    Error,
    Offline,
}

/// Shared daemon state protected by a mutex.
#[derive(Debug, Default)]
pub struct DaemonState {
    pub poller: PollerState,
    /// Live channels from the latest cycle, in configuration order.
    pub live_channels: Vec<LiveChannel>,
    pub analysis_status: Option<String>,
    pub backend: BackendHealth,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl DaemonState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Notifications pushed to subscribed UI clients.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    LiveChannelsChanged(Vec<LiveChannel>),
    AnalysisStatusChanged(String),
}

impl UiEvent {
    pub fn method(&self) -> &'static str {
        match self {
            Self::LiveChannelsChanged(_) => "live_channels_changed",
            Self::AnalysisStatusChanged(_) => "analysis_status_changed",
        }
    }

    pub fn params(&self) -> serde_json::Value {
        match self {
            Self::LiveChannelsChanged(live) => {
                serde_json::json!({ "channels": server::live_channels_json(live) })
            }
            Self::AnalysisStatusChanged(status) => serde_json::json!({ "status": status }),
        }
    }
}

/// Everything one poll cycle needs. Collaborators sit behind traits so the
/// cycle can be driven with fakes.
pub struct Poller {
    pub oracle: Arc<dyn LiveStatusOracle>,
    pub control: Arc<dyn AutomationControl>,
    pub analyzer: Arc<dyn KeywordAnalyzer>,
    pub store: SettingsStore,
    pub state: Arc<Mutex<DaemonState>>,
    pub events: broadcast::Sender<UiEvent>,
    pub debounce: TimeDelta,
    /// Absent when no reloadable subscriber is installed.
    pub log_switch: Option<VerboseSwitch>,
}

impl Poller {
    /// Run one cycle and return the decision it executed.
    ///
    /// Only a settings read failure is an error; oracle, control and analysis
    /// failures are logged and never abort the cycle.
    pub async fn run_cycle(&self) -> anyhow::Result<CycleDecision> {
        let settings = self.store.load()?;
        if let Some(switch) = &self.log_switch {
            switch.apply(settings.verbose_logging);
        }
        self.oracle.set_cookies(&settings.cookies);
        self.control.apply_settings(&settings.control);
        self.analyzer.set_base_url(&settings.analysis.base_url);

        tracing::debug!(
            channels = settings.channels.len(),
            priority = ?settings.priority_channel,
            "checking live status"
        );

        // Strictly sequential, in configuration order.
        let mut statuses = Vec::with_capacity(settings.channels.len());
        for channel in &settings.channels {
            let status = self.oracle.check(&channel.id).await;
            statuses.push(status);
        }

        let now = Utc::now();
        let opts = SelectionOptions {
            debounce: self.debounce,
            prefer_priority_channel: settings.prefer_priority_channel,
        };

        let (live, decision) = {
            let mut st = self.state.lock().await;
            let mut live = Vec::new();
            for (channel, status) in settings.channels.iter().zip(&statuses) {
                match st.poller.record_status(&channel.id, status) {
                    LiveTransition::WentLive => tracing::info!(
                        channel_id = %channel.id,
                        name = %channel.display_name,
                        video_id = ?status.video_id,
                        "channel is live"
                    ),
                    LiveTransition::MayHaveEnded => tracing::info!(
                        channel_id = %channel.id,
                        name = %channel.display_name,
                        "stream may have ended"
                    ),
                    LiveTransition::StillLive | LiveTransition::Offline => {}
                }
                if let Some(video_id) = status.live_video() {
                    live.push(LiveChannel {
                        channel: channel.clone(),
                        video_id: video_id.to_string(),
                    });
                }
            }

            let decision = decide(
                &st.poller,
                &settings.channels,
                &live,
                settings.effective_priority_channel(),
                now,
                opts,
            );
            st.poller.apply(&decision, now);
            st.live_channels = live.clone();
            st.last_cycle_at = Some(now);
            (live, decision)
        };

        // Published every cycle, whatever the outcome.
        let _ = self.events.send(UiEvent::LiveChannelsChanged(live));

        self.execute(&decision).await;
        Ok(decision)
    }

    async fn execute(&self, decision: &CycleDecision) {
        match decision {
            CycleDecision::Idle => tracing::debug!("no live channels"),
            CycleDecision::Unchanged { channel_id } => {
                tracing::debug!(channel_id = %channel_id, "selection unchanged");
            }
            CycleDecision::Debounced { channel_id } => {
                tracing::debug!(channel_id = %channel_id, "selection debounced");
            }
            CycleDecision::Clear { previous } => {
                tracing::info!(channel_id = %previous.channel_id, "no channels live, stopping automation");
                self.request(ActionKind::StopAll).await;
            }
            CycleDecision::Select { stream, channel } => {
                tracing::info!(
                    channel_id = %stream.channel_id,
                    name = %channel.channel.display_name,
                    video_id = %stream.video_id,
                    action = %stream.automation_action,
                    "new stream selected"
                );
                spawn_analysis(
                    Arc::clone(&self.analyzer),
                    Arc::clone(&self.state),
                    self.events.clone(),
                    channel.clone(),
                );
                if let Some(kind) = ActionKind::start(stream.automation_action) {
                    self.request(kind).await;
                }
            }
        }
    }

    async fn request(&self, kind: ActionKind) {
        match self.control.send_action(kind).await {
            Ok(outcome) => tracing::debug!(action = %kind, outcome = ?outcome, "automation request done"),
            Err(e) => tracing::warn!(action = %kind, error = %e, "automation request failed"),
        }
    }
}

// ─── Analysis ────────────────────────────────────────────────────────

async fn publish_analysis_status(
    state: &Mutex<DaemonState>,
    events: &broadcast::Sender<UiEvent>,
    status: String,
) {
    state.lock().await.analysis_status = Some(status.clone());
    let _ = events.send(UiEvent::AnalysisStatusChanged(status));
}

/// Fire-and-forget keyword analysis for a newly selected stream.
/// Returns `None` when the channel has no keywords.
pub fn spawn_analysis(
    analyzer: Arc<dyn KeywordAnalyzer>,
    state: Arc<Mutex<DaemonState>>,
    events: broadcast::Sender<UiEvent>,
    channel: LiveChannel,
) -> Option<tokio::task::JoinHandle<()>> {
    if channel.channel.keywords.is_empty() {
        tracing::debug!(name = %channel.channel.display_name, "no keywords set, skipping analysis");
        return None;
    }
    Some(tokio::spawn(async move {
        run_analysis(analyzer.as_ref(), &state, &events, &channel).await;
    }))
}

async fn run_analysis(
    analyzer: &dyn KeywordAnalyzer,
    state: &Mutex<DaemonState>,
    events: &broadcast::Sender<UiEvent>,
    channel: &LiveChannel,
) {
    let name = &channel.channel.display_name;
    let video_url = channel.video_url();
    let keywords = &channel.channel.keywords;

    tracing::debug!(name = %name, video_url = %video_url, keywords = ?keywords, "triggering keyword analysis");
    publish_analysis_status(state, events, format!("Analyzing {name}...")).await;

    let status = match analyzer.analyze(&video_url, keywords).await {
        Ok(resp) => {
            tracing::info!(name = %name, matches = resp.matches.len(), message = %resp.message, "analysis complete");
            for m in &resp.matches {
                tracing::debug!(keyword = %m.keyword, timestamp = %m.timestamp, text = %m.text, "keyword match");
            }
            format!("Found {} matches for {name}", resp.matches.len())
        }
        Err(e) if e.is_backend_error() => {
            tracing::warn!(name = %name, error = %e, "analysis request rejected");
            STATUS_ANALYSIS_FAILED.to_string()
        }
        Err(e) => {
            tracing::warn!(name = %name, error = %e, "analysis backend unreachable");
            STATUS_BACKEND_OFFLINE.to_string()
        }
    };
    publish_analysis_status(state, events, status).await;
}

/// One health probe; updates the shared state and logs changes.
pub async fn check_backend_health(analyzer: &dyn KeywordAnalyzer, state: &Mutex<DaemonState>) -> BackendHealth {
    let health = match analyzer.health().await {
        Ok(()) => BackendHealth::Online,
        Err(e) if e.is_backend_error() => BackendHealth::Error,
        Err(_) => BackendHealth::Offline,
    };
    let mut st = state.lock().await;
    if st.backend != health {
        tracing::info!(from = ?st.backend, to = ?health, "analysis backend health changed");
        st.backend = health;
    }
    health
}

// ─── Loops ──────────────────────────────────────────────────────────

async fn run_poll_loop(poller: Poller, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = cancel.cancelled() => break,
        }
        tokio::select! {
            result = poller.run_cycle() => {
                if let Err(e) = result {
                    tracing::warn!("poll cycle failed: {e}");
                }
            }
            () = cancel.cancelled() => break,
        }
    }
}

async fn run_health_loop(
    analyzer: Arc<dyn KeywordAnalyzer>,
    state: Arc<Mutex<DaemonState>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = cancel.cancelled() => break,
        }
        check_backend_health(analyzer.as_ref(), &state).await;
    }
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("cannot register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}

/// Run the daemon: starts poll loop, health loop and UDS server, waits for
/// a shutdown signal.
pub async fn run_daemon(
    opts: DaemonOpts,
    socket_path: &str,
    store: SettingsStore,
    log_switch: VerboseSwitch,
) -> anyhow::Result<()> {
    let settings = match store.load() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("cannot read settings, starting with defaults: {e}");
            Default::default()
        }
    };
    tracing::info!(
        path = %store.path().display(),
        channels = settings.channels.len(),
        "settings loaded"
    );

    let oracle: Arc<dyn LiveStatusOracle> =
        Arc::new(HttpLiveOracle::new(Duration::from_secs(opts.oracle_timeout_secs))?);
    let control: Arc<dyn AutomationControl> = Arc::new(ControlClient::new(
        settings.control.clone(),
        ClientOptions {
            keepalive_interval: Duration::from_secs(opts.keepalive_secs),
            handshake_timeout: Duration::from_secs(opts.handshake_timeout_secs),
        },
    ));
    let analyzer: Arc<dyn KeywordAnalyzer> =
        Arc::new(AnalysisClient::new(&settings.analysis.base_url)?);

    let state = Arc::new(Mutex::new(DaemonState::new()));
    let (events, _) = broadcast::channel(64);
    let cancel = CancellationToken::new();

    // Start UDS server
    let ctx = Arc::new(ServerContext {
        state: Arc::clone(&state),
        store: store.clone(),
        control: Arc::clone(&control),
        events: events.clone(),
    });
    let server_socket = socket_path.to_string();
    let server_cancel = cancel.clone();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, ctx, server_cancel).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Start poll loop
    let poller = Poller {
        oracle,
        control,
        analyzer: Arc::clone(&analyzer),
        store,
        state: Arc::clone(&state),
        events,
        debounce: TimeDelta::seconds(opts.debounce_secs),
        log_switch: Some(log_switch),
    };
    let poll_interval = Duration::from_secs(opts.poll_interval_secs.max(1));
    let mut poll_handle = tokio::spawn(run_poll_loop(poller, poll_interval, cancel.clone()));

    // Start health loop
    let health_interval = Duration::from_secs(opts.health_interval_secs.max(1));
    let health_handle = tokio::spawn(run_health_loop(
        analyzer,
        Arc::clone(&state),
        health_interval,
        cancel.clone(),
    ));

    tokio::select! {
        () = shutdown_signal() => {}
        _ = &mut poll_handle => {
            tracing::warn!("poll loop exited unexpectedly");
        }
        _ = &mut server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    cancel.cancel();
    for handle in [poll_handle, server_handle, health_handle] {
        if !handle.is_finished() {
            let _ = handle.await;
        }
    }

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}
