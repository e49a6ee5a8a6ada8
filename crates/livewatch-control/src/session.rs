//! Control-session client: connection state machine, single-flight connect,
//! keep-alive and action requests.
//!
//! Lifecycle of one session (owned by a spawned task):
//! 1. Open the WebSocket (`Connecting`)
//! 2. Receive Hello; when it carries a challenge, answer it (`AwaitingAuth`)
//! 3. Send Identify, receive Identified (`Identified`), start the keep-alive
//! 4. Forward queued requests, log responses
//! 5. On close, error or handshake timeout the task ends and the session is
//!    discarded; the next action opens a fresh one.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use livewatch_core::ControlSettings;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

use crate::auth::compute_auth;
use crate::error::ControlError;
use crate::protocol::{
    ActionKind, ClientMessage, Identify, Request, RequestResponse, RequestType, ServerMessage,
};

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code the server uses when the Identify credential is wrong.
const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

/// Externally visible connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingAuth,
    Identified,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Identified => "identified",
        }
    }
}

/// What happened to a `send_action` call that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Requests were queued on an identified session.
    Sent,
    /// The connect attempt resolved without an identified session.
    NotConnected,
    /// Another stop-all was already in flight.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub keepalive_interval: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Automation seam used by the poller. Enables mock injection for testing.
#[async_trait]
pub trait AutomationControl: Send + Sync {
    async fn send_action(&self, kind: ActionKind) -> Result<ActionOutcome, ControlError>;

    async fn state(&self) -> ConnectionState;

    /// Settings used by the next connect attempt.
    fn apply_settings(&self, settings: &ControlSettings);
}

// ─── Session status (published by the session task) ─────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionStatus {
    Connecting,
    AwaitingAuth,
    Identified,
    Closed,
    AuthFailed(String),
}

impl SessionStatus {
    fn is_settled(&self) -> bool {
        !matches!(self, Self::Connecting | Self::AwaitingAuth)
    }

    fn connection_state(&self) -> ConnectionState {
        match self {
            Self::Connecting => ConnectionState::Connecting,
            Self::AwaitingAuth => ConnectionState::AwaitingAuth,
            Self::Identified => ConnectionState::Identified,
            Self::Closed | Self::AuthFailed(_) => ConnectionState::Disconnected,
        }
    }
}

struct SessionHandle {
    id: u64,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    fn current(&self) -> SessionStatus {
        self.status.borrow().clone()
    }
}

/// Clears the stop-in-flight flag when dropped.
struct StopGuard<'a>(&'a AtomicBool);

impl<'a> StopGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ─── ControlClient ──────────────────────────────────────────────────

/// Process-wide client for the automation-control server.
///
/// All socket state lives in the session task; this type only holds a handle
/// to the current session. Callers never touch the socket directly.
pub struct ControlClient {
    settings: RwLock<ControlSettings>,
    options: ClientOptions,
    session: Mutex<Option<SessionHandle>>,
    stopping: AtomicBool,
    next_request_id: AtomicU64,
    next_session_id: AtomicU64,
}

impl ControlClient {
    pub fn new(settings: ControlSettings, options: ClientOptions) -> Self {
        Self {
            settings: RwLock::new(settings),
            options,
            session: Mutex::new(None),
            stopping: AtomicBool::new(false),
            next_request_id: AtomicU64::new(1),
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> ClientOptions {
        self.options
    }

    fn settings(&self) -> ControlSettings {
        self.settings
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn apply_settings(&self, settings: &ControlSettings) {
        if let Ok(mut guard) = self.settings.write() {
            if *guard != *settings {
                tracing::debug!(host = %settings.host, port = ?settings.port, "control settings updated");
                *guard = settings.clone();
            }
        }
    }

    pub async fn state(&self) -> ConnectionState {
        let session = self.session.lock().await;
        session
            .as_ref()
            .map_or(ConnectionState::Disconnected, |s| s.current().connection_state())
    }

    /// Make sure there is an identified session.
    ///
    /// Returns immediately when already identified. Concurrent callers share
    /// the single in-flight attempt; only one socket is ever opened at a
    /// time. Resolves `Identified`, or `Disconnected` when the attempt closed
    /// or failed. Rejects only for missing configuration or an unanswerable
    /// auth challenge.
    pub async fn ensure_connected(&self) -> Result<ConnectionState, ControlError> {
        let settings = self.settings();
        let Some(url) = settings.url() else {
            tracing::warn!("control server not configured, set host and port");
            return Err(ControlError::NotConfigured);
        };

        let mut status_rx = {
            let mut slot = self.session.lock().await;
            let in_flight = match slot.as_ref() {
                Some(session) => match session.current() {
                    SessionStatus::Identified => {
                        tracing::debug!(session = session.id, "control session already identified");
                        return Ok(ConnectionState::Identified);
                    }
                    SessionStatus::Connecting | SessionStatus::AwaitingAuth => {
                        tracing::debug!(session = session.id, "joining in-flight connect");
                        Some(session.status.clone())
                    }
                    SessionStatus::Closed | SessionStatus::AuthFailed(_) => None,
                },
                None => None,
            };

            match in_flight {
                Some(rx) => rx,
                None => {
                    let session = self.spawn_session(url, settings.password);
                    let rx = session.status.clone();
                    *slot = Some(session);
                    rx
                }
            }
        };

        let outcome = status_rx
            .wait_for(SessionStatus::is_settled)
            .await
            .map(|s| s.clone());
        match outcome {
            Ok(SessionStatus::Identified) => Ok(ConnectionState::Identified),
            Ok(SessionStatus::AuthFailed(reason)) => Err(ControlError::Auth(reason)),
            Ok(_) | Err(_) => Ok(ConnectionState::Disconnected),
        }
    }

    fn spawn_session(&self, url: String, password: String) -> SessionHandle {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (status_tx, status_rx) = watch::channel(SessionStatus::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tracing::info!(session = id, url = %url, password_set = !password.is_empty(), "opening control session");
        tokio::spawn(run_session(SessionTask {
            id,
            url,
            password,
            options: self.options,
            status_tx,
            outbound_rx,
        }));

        SessionHandle {
            id,
            outbound: outbound_tx,
            status: status_rx,
        }
    }

    fn request_id(&self, request_type: RequestType) -> String {
        let n = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", request_type.as_str().to_ascii_lowercase())
    }

    /// Ask the control server to perform `kind`.
    ///
    /// Does not wait for the server's response; responses are only logged.
    /// Overlapping stop-all calls are skipped while one is outstanding.
    pub async fn send_action(&self, kind: ActionKind) -> Result<ActionOutcome, ControlError> {
        let _stop_guard = match kind {
            ActionKind::StopAll => match StopGuard::acquire(&self.stopping) {
                Some(guard) => Some(guard),
                None => {
                    tracing::debug!("stop already in progress, skipping");
                    return Ok(ActionOutcome::Skipped);
                }
            },
            ActionKind::StartStreaming | ActionKind::StartRecording => None,
        };

        tracing::debug!(action = %kind, "requesting automation action");
        if self.ensure_connected().await? != ConnectionState::Identified {
            tracing::warn!(action = %kind, "control session not open, cannot send request");
            return Ok(ActionOutcome::NotConnected);
        }

        let outbound = {
            let slot = self.session.lock().await;
            slot.as_ref()
                .filter(|s| s.current() == SessionStatus::Identified)
                .map(|s| s.outbound.clone())
        };
        let Some(outbound) = outbound else {
            tracing::warn!(action = %kind, "control session closed before request could be sent");
            return Ok(ActionOutcome::NotConnected);
        };

        for &request_type in kind.request_types() {
            let request = Request {
                request_type,
                request_id: self.request_id(request_type),
            };
            let request_id = request.request_id.clone();
            if outbound.send(ClientMessage::Request(request)).is_err() {
                tracing::warn!(request_type = %request_type, "control session ended, request dropped");
                return Ok(ActionOutcome::NotConnected);
            }
            tracing::info!(request_type = %request_type, request_id = %request_id, "sent control request");
        }
        Ok(ActionOutcome::Sent)
    }
}

#[async_trait]
impl AutomationControl for ControlClient {
    async fn send_action(&self, kind: ActionKind) -> Result<ActionOutcome, ControlError> {
        ControlClient::send_action(self, kind).await
    }

    async fn state(&self) -> ConnectionState {
        ControlClient::state(self).await
    }

    fn apply_settings(&self, settings: &ControlSettings) {
        ControlClient::apply_settings(self, settings);
    }
}

// ─── Session task ───────────────────────────────────────────────────

struct SessionTask {
    id: u64,
    url: String,
    password: String,
    options: ClientOptions,
    status_tx: watch::Sender<SessionStatus>,
    outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
}

/// Why a session ended.
#[derive(Debug)]
enum SessionEnd {
    Closed,
    Dropped,
    TimedOut,
    Auth(String),
    Error(ControlError),
}

async fn run_session(mut task: SessionTask) {
    let end = drive_session(&mut task).await;
    let id = task.id;
    let final_status = match end {
        SessionEnd::Closed => {
            tracing::info!(session = id, "control session closed");
            SessionStatus::Closed
        }
        SessionEnd::Dropped => {
            tracing::debug!(session = id, "control session handle dropped");
            SessionStatus::Closed
        }
        SessionEnd::TimedOut => {
            tracing::warn!(session = id, "control session handshake timed out");
            SessionStatus::Closed
        }
        SessionEnd::Auth(reason) => {
            tracing::warn!(session = id, reason = %reason, "control session authentication failed");
            SessionStatus::AuthFailed(reason)
        }
        SessionEnd::Error(e) => {
            tracing::warn!(session = id, error = %e, "control session error");
            SessionStatus::Closed
        }
    };
    task.status_tx.send_replace(final_status);
}

async fn drive_session(task: &mut SessionTask) -> SessionEnd {
    let deadline = Instant::now() + task.options.handshake_timeout;

    let ws = match tokio::time::timeout_at(deadline, tokio_tungstenite::connect_async(&task.url)).await
    {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => return SessionEnd::Error(e.into()),
        Err(_) => return SessionEnd::TimedOut,
    };
    tracing::debug!(session = task.id, "control socket opened");

    let (mut sink, mut stream) = ws.split();

    let period = task.options.keepalive_interval;
    let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let handshake = tokio::time::sleep_until(deadline);
    tokio::pin!(handshake);
    let mut identified = false;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(session = task.id, frame = ?frame, "server sent close frame");
                        if !identified
                            && frame.as_ref().is_some_and(|f| u16::from(f.code) == CLOSE_AUTHENTICATION_FAILED)
                        {
                            return SessionEnd::Auth("server rejected the credential".to_string());
                        }
                        return SessionEnd::Closed;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return SessionEnd::Error(e.into()),
                    None => return SessionEnd::Closed,
                };

                let parsed = match ServerMessage::parse(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::debug!(session = task.id, error = %e, "ignoring unparseable message");
                        continue;
                    }
                };

                match parsed {
                    ServerMessage::Hello(hello) => {
                        let authentication = match hello.authentication {
                            Some(challenge) => {
                                task.status_tx.send_replace(SessionStatus::AwaitingAuth);
                                tracing::debug!(session = task.id, "authentication required");
                                Some(compute_auth(&task.password, &challenge.salt, &challenge.challenge))
                            }
                            None => {
                                tracing::debug!(session = task.id, "no authentication required");
                                None
                            }
                        };
                        let identify = ClientMessage::Identify(Identify::new(authentication));
                        if let Err(e) = send_message(&mut sink, &identify).await {
                            return SessionEnd::Error(e);
                        }
                        tracing::debug!(session = task.id, "sent identify");
                    }
                    ServerMessage::Identified(_) => {
                        identified = true;
                        keepalive.reset();
                        task.status_tx.send_replace(SessionStatus::Identified);
                        tracing::info!(session = task.id, "control session identified");
                    }
                    ServerMessage::RequestResponse(resp) => log_response(task.id, &resp),
                    ServerMessage::Other { op } => {
                        tracing::debug!(session = task.id, op, "ignoring message");
                    }
                }
            }

            out = task.outbound_rx.recv() => {
                let Some(out) = out else {
                    let _ = sink.close().await;
                    return SessionEnd::Dropped;
                };
                if let Err(e) = send_message(&mut sink, &out).await {
                    return SessionEnd::Error(e);
                }
            }

            _ = keepalive.tick(), if identified => {
                // A failed ping surfaces as a read error or close on the next poll.
                match send_message(&mut sink, &ClientMessage::Ping).await {
                    Ok(()) => tracing::trace!(session = task.id, "sent keep-alive ping"),
                    Err(e) => tracing::debug!(session = task.id, error = %e, "keep-alive ping failed"),
                }
            }

            () = &mut handshake, if !identified => {
                let _ = sink.close().await;
                return SessionEnd::TimedOut;
            }
        }
    }
}

async fn send_message<S>(sink: &mut S, msg: &ClientMessage) -> Result<(), ControlError>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(msg.to_json()?)).await?;
    Ok(())
}

fn log_response(session: u64, resp: &RequestResponse) {
    let what = match resp.request_type.as_str() {
        "StartStream" => RequestType::StartStream.describe(),
        "StartRecord" => RequestType::StartRecord.describe(),
        "StopStream" => RequestType::StopStream.describe(),
        "StopRecord" => RequestType::StopRecord.describe(),
        other => {
            tracing::debug!(session, request_type = other, "response to unknown request type");
            return;
        }
    };
    if resp.request_status.result {
        tracing::info!(session, request_id = ?resp.request_id, "{what} succeeded");
    } else {
        tracing::warn!(
            session,
            request_id = ?resp.request_id,
            code = ?resp.request_status.code,
            comment = ?resp.request_status.comment,
            "failed to {what}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_statuses() {
        assert!(!SessionStatus::Connecting.is_settled());
        assert!(!SessionStatus::AwaitingAuth.is_settled());
        assert!(SessionStatus::Identified.is_settled());
        assert!(SessionStatus::Closed.is_settled());
        assert!(SessionStatus::AuthFailed("x".into()).is_settled());
        assert_eq!(
            SessionStatus::AuthFailed("x".into()).connection_state(),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn stop_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let guard = StopGuard::acquire(&flag).expect("first acquire");
        assert!(StopGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(StopGuard::acquire(&flag).is_some());
    }

    #[test]
    fn request_ids_are_unique_and_typed() {
        let client = ControlClient::new(ControlSettings::default(), ClientOptions::default());
        let a = client.request_id(RequestType::StartStream);
        let b = client.request_id(RequestType::StartStream);
        assert!(a.starts_with("startstream-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn missing_port_rejects_before_connecting() {
        let client = ControlClient::new(
            ControlSettings {
                port: None,
                ..ControlSettings::default()
            },
            ClientOptions::default(),
        );
        let err = client.ensure_connected().await.expect_err("should reject");
        assert!(matches!(err, ControlError::NotConfigured));
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn refused_connection_resolves_disconnected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let client = ControlClient::new(
            ControlSettings {
                host: "127.0.0.1".into(),
                port: Some(port),
                password: String::new(),
            },
            ClientOptions::default(),
        );
        let state = client.ensure_connected().await.expect("resolves");
        assert_eq!(state, ConnectionState::Disconnected);
        let outcome = client
            .send_action(ActionKind::StartStreaming)
            .await
            .expect("resolves");
        assert_eq!(outcome, ActionOutcome::NotConnected);
    }
}
