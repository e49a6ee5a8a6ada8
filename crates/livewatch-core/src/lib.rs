//! livewatch-core: data model, settings store and the pure channel
//! selection logic shared by every other livewatch crate.
//! No IO besides the settings file; everything here is synchronous.

pub mod error;
pub mod selection;
pub mod settings;
pub mod types;

pub use error::CoreError;
pub use selection::{CycleDecision, PollerState, SelectionOptions, decide, select_channel};
pub use settings::{SettingsStore, default_settings_path};
pub use types::{
    AnalysisSettings, AutomationAction, Channel, ControlSettings, LiveChannel, LiveStatus,
    SelectedStream, Settings, parse_keywords,
};
