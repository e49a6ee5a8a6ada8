//! UDS JSON-RPC client for CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;

async fn send_request(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<Lines<BufReader<OwnedReadHalf>>> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    Ok(BufReader::new(reader).lines())
}

fn into_result(line: Option<String>) -> anyhow::Result<serde_json::Value> {
    let line = line.ok_or_else(|| anyhow::anyhow!("daemon closed the connection"))?;
    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let mut lines = send_request(socket_path, method, params).await?;
    into_result(lines.next_line().await?)
}

/// Open a `subscribe` stream. Each following line is one notification.
pub(crate) async fn subscribe(socket_path: &str) -> anyhow::Result<Lines<BufReader<OwnedReadHalf>>> {
    let mut lines = send_request(socket_path, "subscribe", serde_json::Value::Null).await?;
    into_result(lines.next_line().await?)?;
    Ok(lines)
}
