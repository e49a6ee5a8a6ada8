//! UDS JSON-RPC server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON. `subscribe` keeps the
//! connection open and streams notifications.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use livewatch_control::AutomationControl;
use livewatch_core::{LiveChannel, Settings, SettingsStore};

use crate::poll_loop::{DaemonState, UiEvent};

const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const PARSE_ERROR: i32 = -32700;
const SERVER_ERROR: i32 = -32000;

/// What the server reads and writes on behalf of clients.
pub struct ServerContext {
    pub state: Arc<Mutex<DaemonState>>,
    pub store: SettingsStore,
    pub control: Arc<dyn AutomationControl>,
    pub events: broadcast::Sender<UiEvent>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Run the UDS JSON-RPC server until the token is cancelled.
pub async fn run_server(
    socket_path: &str,
    ctx: Arc<ServerContext>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    // Create socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let ctx = Arc::clone(&ctx);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx, cancel).await {
                        tracing::debug!("connection error: {e}");
                    }
                });
            }
            () = cancel.cancelled() => {
                tracing::info!("UDS server: cancellation requested, shutting down");
                break;
            }
        }
    }
    Ok(())
}

async fn write_line(writer: &mut OwnedWriteHalf, value: &serde_json::Value) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

fn response(id: &serde_json::Value, result: Result<serde_json::Value, JsonRpcError>) -> serde_json::Value {
    match result {
        Ok(result) => serde_json::json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err(error) => serde_json::json!({
            "jsonrpc": "2.0",
            "error": error,
            "id": id,
        }),
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    ctx: Arc<ServerContext>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = match serde_json::from_str(line.trim()) {
        Ok(r) => r,
        Err(e) => {
            let err = JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}"));
            write_line(&mut writer, &response(&serde_json::Value::Null, Err(err))).await?;
            return Ok(());
        }
    };
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    if method == "subscribe" {
        // Subscribe before acknowledging so no event can slip between the two.
        let rx = ctx.events.subscribe();
        write_line(&mut writer, &response(&id, Ok(serde_json::json!({"subscribed": true})))).await?;
        return stream_notifications(writer, rx, cancel).await;
    }

    let result = dispatch(&ctx, method, &request["params"]).await;
    write_line(&mut writer, &response(&id, result)).await
}

async fn stream_notifications(
    mut writer: OwnedWriteHalf,
    mut rx: broadcast::Receiver<UiEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            () = cancel.cancelled() => return Ok(()),
        };
        let event = match event {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "subscriber lagged, dropped notifications");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        };
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": event.method(),
            "params": event.params(),
        });
        // A failed write means the subscriber went away.
        write_line(&mut writer, &notification).await?;
    }
}

/// Answer one request-response method.
pub(crate) async fn dispatch(
    ctx: &ServerContext,
    method: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, JsonRpcError> {
    match method {
        "get_settings" => {
            let settings = ctx
                .store
                .load()
                .map_err(|e| JsonRpcError::new(SERVER_ERROR, e.to_string()))?;
            serde_json::to_value(settings).map_err(|e| JsonRpcError::new(SERVER_ERROR, e.to_string()))
        }
        "save_settings" => {
            let mut settings: Settings = serde_json::from_value(params.clone())
                .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("invalid settings: {e}")))?;
            settings.normalize_priority();
            ctx.store
                .save(&settings)
                .map_err(|e| JsonRpcError::new(SERVER_ERROR, e.to_string()))?;
            ctx.control.apply_settings(&settings.control);
            tracing::info!(channels = settings.channels.len(), "settings saved via API");
            Ok(serde_json::json!({ "saved": true }))
        }
        "list_live" => {
            let st = ctx.state.lock().await;
            Ok(live_channels_json(&st.live_channels))
        }
        "status" => {
            let control_state = ctx.control.state().await;
            let st = ctx.state.lock().await;
            Ok(build_status(&st, control_state.as_str()))
        }
        _ => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )),
    }
}

/// Live channels with their watch URL.
pub(crate) fn live_channels_json(live: &[LiveChannel]) -> serde_json::Value {
    let entries = live
        .iter()
        .map(|l| {
            let mut entry = serde_json::to_value(l).unwrap_or(serde_json::Value::Null);
            if let Some(obj) = entry.as_object_mut() {
                obj.insert("video_url".into(), serde_json::Value::String(l.video_url()));
            }
            entry
        })
        .collect();
    serde_json::Value::Array(entries)
}

pub(crate) fn build_status(state: &DaemonState, control_state: &str) -> serde_json::Value {
    serde_json::json!({
        "selected": state.poller.selected(),
        "last_selection_at": state.poller.last_selection().map(|(_, at)| at),
        "live_count": state.live_channels.len(),
        "analysis_status": state.analysis_status,
        "backend": state.backend,
        "control_state": control_state,
        "last_cycle_at": state.last_cycle_at,
    })
}
