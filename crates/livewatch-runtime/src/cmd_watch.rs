//! `livewatch watch`: live-refresh status view.
//!
//! Redraws on every interval tick and immediately whenever the daemon pushes
//! a notification.

use std::time::Duration;

use crate::client::{rpc_call, subscribe};
use crate::cmd_status::{format_live, format_status};

async fn render(socket_path: &str) {
    // Clear screen + cursor home
    print!("\x1b[2J\x1b[H");

    match rpc_call(socket_path, "status", serde_json::Value::Null).await {
        Ok(status) => {
            println!("{}", format_status(&status));
            println!();
            match rpc_call(socket_path, "list_live", serde_json::Value::Null).await {
                Ok(live) => {
                    let output = format_live(&live);
                    if output.is_empty() {
                        println!("(no live channels)");
                    } else {
                        println!("{output}");
                    }
                }
                Err(e) => println!("Cannot list live channels: {e}"),
            }
        }
        Err(e) => {
            println!("Cannot connect to daemon: {e}");
        }
    }

    println!("\nlivewatch watch (Ctrl-C to quit)");
}

fn refresh_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

/// Entry point for `livewatch watch`.
pub async fn cmd_watch(socket_path: &str, interval: u64) -> anyhow::Result<()> {
    let interval = refresh_interval(interval);
    let mut notifications = subscribe(socket_path).await.ok();

    loop {
        render(socket_path).await;

        let pushed = async {
            match notifications.as_mut() {
                Some(lines) => matches!(lines.next_line().await, Ok(Some(_))),
                None => std::future::pending().await,
            }
        };

        let mut lost = false;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            alive = pushed => { lost = !alive; }
            _ = tokio::signal::ctrl_c() => { break; }
        }
        if lost {
            // Daemon went away; fall back to interval refresh.
            notifications = None;
        }
    }

    Ok(())
}
