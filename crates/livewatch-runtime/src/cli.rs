//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use livewatch_core::AutomationAction;

#[derive(Parser)]
#[command(name = "livewatch", about = "watch channels for live streams and drive streaming automation")]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/livewatch/livewatchd.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    /// Settings file (default: $XDG_CONFIG_HOME/livewatch/settings.toml)
    #[arg(long, short = 'c', global = true, env = "LIVEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (poll loop + UDS server)
    Daemon(DaemonOpts),
    /// Show daemon status summary
    Status,
    /// List channels that are live right now
    Live,
    /// Live-refresh status view
    Watch(WatchOpts),
    /// Manage the configured channel list
    #[command(subcommand)]
    Channel(ChannelCommand),
    /// Check the analysis backend
    Health,
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// Seconds between poll cycles
    #[arg(long, default_value = "15")]
    pub poll_interval_secs: u64,

    /// Same-channel reselection window in seconds
    #[arg(long, default_value = "30")]
    pub debounce_secs: i64,

    /// Control-session keep-alive ping interval in seconds
    #[arg(long, default_value = "10")]
    pub keepalive_secs: u64,

    /// Control-session handshake timeout in seconds
    #[arg(long, default_value = "10")]
    pub handshake_timeout_secs: u64,

    /// Live-page request timeout in seconds
    #[arg(long, default_value = "10")]
    pub oracle_timeout_secs: u64,

    /// Seconds between analysis backend health checks
    #[arg(long, default_value = "30")]
    pub health_interval_secs: u64,
}

#[derive(clap::Args)]
pub struct WatchOpts {
    /// Refresh interval in seconds
    #[arg(long, short = 'n', default_value = "2")]
    pub interval: u64,
}

#[derive(Subcommand)]
pub enum ChannelCommand {
    /// Add a channel by id, @handle or handle
    Add(ChannelAddOpts),
    /// Remove a channel by id
    Remove { id: String },
    /// List configured channels
    List,
    /// Set the priority channel
    Priority { id: String },
}

#[derive(clap::Args)]
pub struct ChannelAddOpts {
    /// Channel id (UC…), @handle or handle
    pub name: String,

    /// Display name (default: the name as given)
    #[arg(long)]
    pub display_name: Option<String>,

    /// Automation while this channel is selected: none, stream or record
    #[arg(long, default_value = "none")]
    pub action: AutomationAction,

    /// Comma-separated keywords for analysis
    #[arg(long, default_value = "")]
    pub keywords: String,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/livewatch/livewatchd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/livewatch-{user}/livewatchd.sock")
}
