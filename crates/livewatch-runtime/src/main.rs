//! livewatch: live-channel watcher runtime binary.
//! Single process: poll loop, control-session client, analysis trigger and
//! the UDS API, plus CLI subcommands that talk to it.

use clap::Parser;
use livewatch_core::{SettingsStore, default_settings_path};

mod cli;
mod client;
mod cmd_channel;
mod cmd_status;
mod cmd_watch;
mod logging;
mod poll_loop;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
    let store = SettingsStore::new(args.config.unwrap_or_else(default_settings_path));

    match args.command {
        cli::Command::Daemon(opts) => {
            let verbose = store.load().map(|s| s.verbose_logging).unwrap_or(false);
            let log_switch = logging::init(verbose);

            tracing::info!("livewatch daemon starting");
            poll_loop::run_daemon(opts, &socket_path, store, log_switch).await?;
        }
        cli::Command::Status => {
            cmd_status::cmd_status(&socket_path).await?;
        }
        cli::Command::Live => {
            cmd_status::cmd_live(&socket_path).await?;
        }
        cli::Command::Watch(opts) => {
            cmd_watch::cmd_watch(&socket_path, opts.interval).await?;
        }
        cli::Command::Channel(command) => {
            cmd_channel::cmd_channel(&store, command).await?;
        }
        cli::Command::Health => {
            cmd_status::cmd_health(&store).await?;
        }
    }

    Ok(())
}
