//! Daemon logging: `EnvFilter` behind a reload layer so `verbose_logging`
//! takes effect on the next poll cycle without a restart.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, reload};

const CRATE_TARGETS: [&str; 5] = [
    "livewatch",
    "livewatch_core",
    "livewatch_source_live",
    "livewatch_control",
    "livewatch_analysis",
];

/// Filter source: LIVEWATCH_LOG, then RUST_LOG, then `info`. Verbose logging
/// raises the livewatch crates to debug on top of that.
pub fn log_filter(verbose: bool) -> String {
    let mut filter = std::env::var("LIVEWATCH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    if verbose {
        for target in CRATE_TARGETS {
            filter.push_str(&format!(",{target}=debug"));
        }
    }
    filter
}

/// Handle on the installed filter, tracking the verbose flag it was built from.
pub struct VerboseSwitch {
    handle: reload::Handle<EnvFilter, Registry>,
    verbose: AtomicBool,
}

impl VerboseSwitch {
    pub fn new(handle: reload::Handle<EnvFilter, Registry>, verbose: bool) -> Self {
        Self {
            handle,
            verbose: AtomicBool::new(verbose),
        }
    }

    /// Rebuild the filter when the flag changed. Returns whether it was swapped.
    pub fn apply(&self, verbose: bool) -> bool {
        if self.verbose.swap(verbose, Ordering::Relaxed) == verbose {
            return false;
        }
        match self.handle.reload(EnvFilter::new(log_filter(verbose))) {
            Ok(()) => {
                tracing::info!(verbose, "log filter updated");
                true
            }
            Err(e) => {
                tracing::warn!("cannot update log filter: {e}");
                false
            }
        }
    }

    pub fn current_filter(&self) -> Option<String> {
        self.handle.with_current(|f| f.to_string()).ok()
    }
}

/// Install the global subscriber for the daemon.
pub fn init(verbose: bool) -> VerboseSwitch {
    let (filter, handle) = reload::Layer::new(EnvFilter::new(log_filter(verbose)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    VerboseSwitch::new(handle, verbose)
}
