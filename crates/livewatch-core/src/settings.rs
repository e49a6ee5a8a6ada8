//! TOML settings file.
//!
//! The daemon re-reads the file at the start of every poll cycle, so a save
//! from the CLI or the socket API is picked up on the next tick.

use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::types::Settings;

/// Default settings path: `$XDG_CONFIG_HOME/livewatch/settings.toml`,
/// falling back to `$HOME/.config/livewatch/settings.toml`.
pub fn default_settings_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("livewatch").join("settings.toml");
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("livewatch")
        .join("settings.toml")
}

/// Handle to the persisted settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings. A missing file yields defaults.
    pub fn load(&self) -> Result<Settings, CoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "settings file missing, using defaults");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(CoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        parse_settings(&text).map_err(|source| CoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Persist settings: write a sibling temp file, then rename over the target.
    pub fn save(&self, settings: &Settings) -> Result<(), CoreError> {
        let text = toml::to_string_pretty(settings)?;
        let io_err = |source| CoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, text).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Load, apply `f`, save. Returns the saved settings.
    pub fn update<F>(&self, f: F) -> Result<Settings, CoreError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.load()?;
        f(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

pub fn parse_settings(text: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AutomationAction, Channel};

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("nested").join("settings.toml"))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let settings = store.load().expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.control.port, Some(4455));
    }

    #[test]
    fn save_then_load_preserves_channels_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let settings = Settings {
            verbose_logging: true,
            priority_channel: Some("UC2".into()),
            cookies: "SID=abc".into(),
            channels: vec![
                Channel::new("UC1", "first").with_action(AutomationAction::StartStreaming),
                Channel::new("UC2", "second")
                    .with_keywords(vec!["rust".into(), "tokio".into()]),
            ],
            ..Settings::default()
        };
        store.save(&settings).expect("save");

        let loaded = store.load().expect("load");
        assert_eq!(loaded, settings);
        assert_eq!(loaded.channels[0].id, "UC1");
        assert_eq!(loaded.channels[1].keywords, vec!["rust", "tokio"]);
        assert!(!dir.path().join("nested").join("settings.toml.tmp").exists());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let text = r#"
verbose_logging = true

[[channels]]
id = "UC1"
display_name = "one"
automation_action = "no-obs"
"#;
        let settings = parse_settings(text).expect("parse");
        assert!(settings.verbose_logging);
        assert_eq!(settings.control.host, "localhost");
        assert_eq!(settings.control.port, Some(4455));
        assert_eq!(settings.analysis.base_url, "http://localhost:5001");
        assert_eq!(settings.channels[0].automation_action, AutomationAction::None);
        assert!(settings.channels[0].keywords.is_empty());
    }

    #[test]
    fn unset_control_port_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let mut settings = Settings::default();
        settings.control.port = None;
        store.save(&settings).expect("save");

        let loaded = store.load().expect("load");
        assert_eq!(loaded.control.port, None);
        assert!(!loaded.control.is_configured());
    }

    #[test]
    fn control_table_without_port_is_unconfigured() {
        let text = r#"
[control]
host = "studio.local"
password = "pw"
"#;
        let settings = parse_settings(text).expect("parse");
        assert_eq!(settings.control.port, None);
        assert!(!settings.control.is_configured());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "channels = 5").expect("write");
        let err = SettingsStore::new(&path).load().expect_err("should fail");
        assert!(matches!(err, CoreError::Parse { .. }), "got {err}");
    }

    #[test]
    fn update_applies_closure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        store
            .update(|s| s.channels.push(Channel::new("UC9", "nine")))
            .expect("update");
        let loaded = store.load().expect("load");
        assert_eq!(loaded.channels.len(), 1);
        assert_eq!(loaded.channels[0].display_name, "nine");
    }
}
