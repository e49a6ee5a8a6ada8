//! `livewatch status`, `livewatch live` and `livewatch health`.

use livewatch_analysis::{AnalysisClient, KeywordAnalyzer};
use livewatch_core::SettingsStore;

use crate::client::rpc_call;

pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let status = rpc_call(socket_path, "status", serde_json::Value::Null).await?;
    println!("{}", format_status(&status));
    Ok(())
}

pub async fn cmd_live(socket_path: &str) -> anyhow::Result<()> {
    let live = rpc_call(socket_path, "list_live", serde_json::Value::Null).await?;
    let output = format_live(&live);
    if output.is_empty() {
        println!("(no live channels)");
    } else {
        println!("{output}");
    }
    Ok(())
}

/// Probe the analysis backend configured in the settings file. Works
/// without a running daemon.
pub async fn cmd_health(store: &SettingsStore) -> anyhow::Result<()> {
    let settings = store.load()?;
    let client = AnalysisClient::new(&settings.analysis.base_url)?;
    match client.health().await {
        Ok(()) => println!("analysis backend {}: online", client.base_url()),
        Err(e) if e.is_backend_error() => {
            println!("analysis backend {}: error ({e})", client.base_url());
        }
        Err(e) => println!("analysis backend {}: offline ({e})", client.base_url()),
    }
    Ok(())
}

fn str_or<'a>(v: &'a serde_json::Value, default: &'a str) -> &'a str {
    v.as_str().unwrap_or(default)
}

/// Pure formatting of a `status` result.
pub(crate) fn format_status(status: &serde_json::Value) -> String {
    let selected = match status["selected"].as_object() {
        Some(s) => format!(
            "{} (video {}, action {})",
            s.get("channel_id").and_then(|v| v.as_str()).unwrap_or("?"),
            s.get("video_id").and_then(|v| v.as_str()).unwrap_or("?"),
            s.get("automation_action").and_then(|v| v.as_str()).unwrap_or("none"),
        ),
        None => "none".to_string(),
    };

    [
        format!("selected:   {selected}"),
        format!("live:       {}", status["live_count"].as_u64().unwrap_or(0)),
        format!("control:    {}", str_or(&status["control_state"], "unknown")),
        format!("backend:    {}", str_or(&status["backend"], "unknown")),
        format!("analysis:   {}", str_or(&status["analysis_status"], "-")),
        format!("last cycle: {}", str_or(&status["last_cycle_at"], "never")),
    ]
    .join("\n")
}

/// Pure formatting of a `list_live` result, one channel per line.
pub(crate) fn format_live(live: &serde_json::Value) -> String {
    let Some(arr) = live.as_array() else {
        return String::new();
    };
    arr.iter()
        .map(|c| {
            format!(
                "{}  {}  {}",
                str_or(&c["display_name"], "?"),
                str_or(&c["id"], "?"),
                str_or(&c["video_url"], ""),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
