//! Error types for the control-session client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control server host/port not configured")]
    NotConfigured,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}
