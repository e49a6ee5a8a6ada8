//! `livewatch channel add|remove|list|priority`: edit the settings file.
//!
//! The daemon re-reads settings every cycle, so no RPC is needed.

use std::time::Duration;

use livewatch_core::{Channel, Settings, SettingsStore, parse_keywords};
use livewatch_source_live::{HttpLiveOracle, is_channel_id, resolve_channel_id};

use crate::cli::{ChannelAddOpts, ChannelCommand};

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn cmd_channel(store: &SettingsStore, command: ChannelCommand) -> anyhow::Result<()> {
    match command {
        ChannelCommand::Add(opts) => {
            let id = resolve(&opts.name).await?;
            let channel = build_channel(id, &opts);
            let settings = add_channel(store, channel.clone())?;
            println!(
                "added {} ({}) with action {}; {} channel(s) configured",
                channel.display_name,
                channel.id,
                channel.automation_action,
                settings.channels.len()
            );
        }
        ChannelCommand::Remove { id } => {
            remove_channel(store, &id)?;
            println!("removed {id}");
        }
        ChannelCommand::List => {
            let settings = store.load()?;
            let output = format_channels(&settings);
            if output.is_empty() {
                println!("(no channels configured)");
            } else {
                println!("{output}");
            }
        }
        ChannelCommand::Priority { id } => {
            set_priority(store, &id)?;
            println!("priority channel set to {id}");
        }
    }
    Ok(())
}

async fn resolve(name: &str) -> anyhow::Result<String> {
    let name = name.trim();
    if is_channel_id(name) {
        return Ok(name.to_string());
    }
    let oracle = HttpLiveOracle::new(RESOLVE_TIMEOUT)?;
    resolve_channel_id(&oracle, name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("could not find a channel id for {name}"))
}

fn build_channel(id: String, opts: &ChannelAddOpts) -> Channel {
    let display_name = opts
        .display_name
        .clone()
        .unwrap_or_else(|| opts.name.trim().trim_start_matches('@').to_string());
    Channel::new(id, display_name)
        .with_action(opts.action)
        .with_keywords(parse_keywords(&opts.keywords))
}

pub(crate) fn add_channel(store: &SettingsStore, channel: Channel) -> anyhow::Result<Settings> {
    let mut settings = store.load()?;
    if settings.channel(&channel.id).is_some() {
        anyhow::bail!("channel {} is already configured", channel.id);
    }
    settings.channels.push(channel);
    settings.normalize_priority();
    store.save(&settings)?;
    Ok(settings)
}

pub(crate) fn remove_channel(store: &SettingsStore, id: &str) -> anyhow::Result<Settings> {
    let mut settings = store.load()?;
    let before = settings.channels.len();
    settings.channels.retain(|c| c.id != id);
    if settings.channels.len() == before {
        anyhow::bail!("channel {id} is not configured");
    }
    settings.normalize_priority();
    store.save(&settings)?;
    Ok(settings)
}

pub(crate) fn set_priority(store: &SettingsStore, id: &str) -> anyhow::Result<Settings> {
    let mut settings = store.load()?;
    if settings.channel(id).is_none() {
        anyhow::bail!("channel {id} is not configured");
    }
    settings.priority_channel = Some(id.to_string());
    store.save(&settings)?;
    Ok(settings)
}

pub(crate) fn format_channels(settings: &Settings) -> String {
    let priority = settings.effective_priority_channel();
    settings
        .channels
        .iter()
        .map(|c| {
            let marker = if Some(c.id.as_str()) == priority { "*" } else { " " };
            let keywords = if c.keywords.is_empty() {
                String::new()
            } else {
                format!("  [{}]", c.keywords.join(", "))
            };
            format!(
                "{marker} {}  {}  {}{keywords}",
                c.id, c.display_name, c.automation_action
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use livewatch_core::AutomationAction;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.toml"));
        (dir, store)
    }

    #[test]
    fn add_sets_first_channel_as_priority() {
        let (_dir, store) = store();
        add_channel(&store, Channel::new("UC1", "one")).unwrap();
        let settings = add_channel(&store, Channel::new("UC2", "two")).unwrap();
        assert_eq!(settings.priority_channel.as_deref(), Some("UC1"));
        assert_eq!(store.load().unwrap().channels.len(), 2);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let (_dir, store) = store();
        add_channel(&store, Channel::new("UC1", "one")).unwrap();
        assert!(add_channel(&store, Channel::new("UC1", "again")).is_err());
    }

    #[test]
    fn remove_moves_priority_to_remaining_channel() {
        let (_dir, store) = store();
        add_channel(&store, Channel::new("UC1", "one")).unwrap();
        add_channel(&store, Channel::new("UC2", "two")).unwrap();
        let settings = remove_channel(&store, "UC1").unwrap();
        assert_eq!(settings.priority_channel.as_deref(), Some("UC2"));
        assert!(remove_channel(&store, "UC1").is_err());
    }

    #[test]
    fn priority_must_be_configured() {
        let (_dir, store) = store();
        add_channel(&store, Channel::new("UC1", "one")).unwrap();
        add_channel(&store, Channel::new("UC2", "two")).unwrap();
        assert!(set_priority(&store, "UC9").is_err());
        let settings = set_priority(&store, "UC2").unwrap();
        assert_eq!(settings.priority_channel.as_deref(), Some("UC2"));
    }

    #[test]
    fn build_channel_defaults_display_name_to_handle() {
        let opts = ChannelAddOpts {
            name: "@somebody".into(),
            display_name: None,
            action: AutomationAction::StartStreaming,
            keywords: "goal, , penalty".into(),
        };
        let channel = build_channel("UC_x5XG1OV2P6uZZ5FSM9Ttw".into(), &opts);
        assert_eq!(channel.display_name, "somebody");
        assert_eq!(channel.keywords, ["goal", "penalty"]);
        assert_eq!(channel.automation_action, AutomationAction::StartStreaming);
    }

    #[tokio::test]
    async fn channel_id_resolves_without_network() {
        let id = resolve(" UC_x5XG1OV2P6uZZ5FSM9Ttw ").await.unwrap();
        assert_eq!(id, "UC_x5XG1OV2P6uZZ5FSM9Ttw");
    }

    #[test]
    fn list_marks_priority() {
        let settings = Settings {
            channels: vec![
                Channel::new("UC1", "one"),
                Channel::new("UC2", "two").with_keywords(vec!["a".into(), "b".into()]),
            ],
            priority_channel: Some("UC2".into()),
            ..Settings::default()
        };
        let out = format_channels(&settings);
        let lines: Vec<_> = out.lines().collect();
        assert!(lines[0].starts_with("  UC1"));
        assert!(lines[1].starts_with("* UC2"));
        assert!(lines[1].ends_with("[a, b]"));
    }
}
