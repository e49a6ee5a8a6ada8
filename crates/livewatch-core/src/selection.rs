//! Channel selection: which live channel (if any) drives automation.
//!
//! Pure logic. The runtime poll loop gathers live statuses, calls [`decide`],
//! executes the side effects of the returned [`CycleDecision`] and then
//! commits it with [`PollerState::apply`].

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::{Channel, LiveChannel, LiveStatus, SelectedStream};

/// Default poll interval between cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// A selection change for the same channel inside this window is not re-triggered.
pub const DEFAULT_DEBOUNCE_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionOptions {
    pub debounce: TimeDelta,
    /// Let a live priority channel win over configuration order.
    pub prefer_priority_channel: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            debounce: TimeDelta::seconds(DEFAULT_DEBOUNCE_SECS),
            prefer_priority_channel: false,
        }
    }
}

/// How a channel's live status moved between two cycles. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveTransition {
    WentLive,
    StillLive,
    /// Was live last cycle, not live (or unreachable) now.
    MayHaveEnded,
    Offline,
}

/// What one poll cycle should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleDecision {
    /// Nothing live and nothing selected.
    Idle,
    /// Nothing live: drop the selection and stop all automation.
    Clear { previous: SelectedStream },
    /// The candidate is already the selected stream.
    Unchanged { channel_id: String },
    /// The candidate was selected too recently to be re-triggered.
    Debounced { channel_id: String },
    /// A genuinely new selection.
    Select {
        stream: SelectedStream,
        channel: LiveChannel,
    },
}

/// Poller state carried across cycles.
#[derive(Debug, Clone, Default)]
pub struct PollerState {
    selected: Option<SelectedStream>,
    last_live: HashMap<String, LiveStatus>,
    /// Last selection change; survives a clear so a flapping channel is debounced.
    last_selection: Option<(String, DateTime<Utc>)>,
}

impl PollerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&SelectedStream> {
        self.selected.as_ref()
    }

    pub fn last_selection(&self) -> Option<(&str, DateTime<Utc>)> {
        self.last_selection
            .as_ref()
            .map(|(id, at)| (id.as_str(), *at))
    }

    pub fn clear_selection(&mut self) -> Option<SelectedStream> {
        self.selected.take()
    }

    /// Replace the selection. Always clears first so there is never more
    /// than one selected stream.
    pub fn set_selection(&mut self, stream: SelectedStream, now: DateTime<Utc>) {
        self.clear_selection();
        self.last_selection = Some((stream.channel_id.clone(), now));
        self.selected = Some(stream);
    }

    /// Record this cycle's status for a channel and report the transition.
    pub fn record_status(&mut self, channel_id: &str, status: &LiveStatus) -> LiveTransition {
        let was_live = self
            .last_live
            .get(channel_id)
            .is_some_and(|s| s.live_video().is_some());

        if status.live_video().is_some() {
            self.last_live
                .insert(channel_id.to_string(), status.clone());
            if was_live {
                LiveTransition::StillLive
            } else {
                LiveTransition::WentLive
            }
        } else {
            self.last_live.remove(channel_id);
            if was_live {
                LiveTransition::MayHaveEnded
            } else {
                LiveTransition::Offline
            }
        }
    }

    fn is_debounced(&self, channel_id: &str, now: DateTime<Utc>, window: TimeDelta) -> bool {
        match &self.last_selection {
            Some((id, at)) => id == channel_id && now - *at < window,
            None => false,
        }
    }

    /// Commit a decision returned by [`decide`].
    pub fn apply(&mut self, decision: &CycleDecision, now: DateTime<Utc>) {
        match decision {
            CycleDecision::Clear { .. } => {
                self.clear_selection();
            }
            CycleDecision::Select { stream, .. } => {
                self.set_selection(stream.clone(), now);
            }
            CycleDecision::Idle
            | CycleDecision::Unchanged { .. }
            | CycleDecision::Debounced { .. } => {}
        }
    }
}

/// Pick the channel that should drive automation.
///
/// First configured channel that is live wins; if none of the configured
/// channels matches, the first entry of the live list is used. The priority
/// channel only matters when `prefer_priority` is set.
pub fn select_channel<'a>(
    channels: &[Channel],
    live: &'a [LiveChannel],
    priority_channel: Option<&str>,
    prefer_priority: bool,
) -> Option<&'a LiveChannel> {
    if prefer_priority {
        if let Some(priority) = priority_channel {
            if let Some(hit) = live.iter().find(|l| l.channel.id == priority) {
                return Some(hit);
            }
        }
    }

    channels
        .iter()
        .find_map(|c| live.iter().find(|l| l.channel.id == c.id))
        .or_else(|| live.first())
}

/// Decide what this cycle should do given the live list and the current state.
pub fn decide(
    state: &PollerState,
    channels: &[Channel],
    live: &[LiveChannel],
    priority_channel: Option<&str>,
    now: DateTime<Utc>,
    opts: SelectionOptions,
) -> CycleDecision {
    let Some(candidate) =
        select_channel(channels, live, priority_channel, opts.prefer_priority_channel)
    else {
        return match state.selected() {
            Some(previous) => CycleDecision::Clear {
                previous: previous.clone(),
            },
            None => CycleDecision::Idle,
        };
    };

    let channel_id = candidate.channel.id.clone();

    if state.is_debounced(&channel_id, now, opts.debounce) {
        return CycleDecision::Debounced { channel_id };
    }

    if state
        .selected()
        .is_some_and(|s| s.channel_id == channel_id)
    {
        return CycleDecision::Unchanged { channel_id };
    }

    CycleDecision::Select {
        stream: SelectedStream::from(candidate),
        channel: candidate.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AutomationAction;
    use proptest::prelude::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid RFC3339")
            .with_timezone(&Utc)
    }

    fn t0() -> DateTime<Utc> {
        ts("2026-03-01T12:00:00Z")
    }

    fn channels() -> Vec<Channel> {
        vec![
            Channel::new("A", "alpha"),
            Channel::new("B", "bravo").with_action(AutomationAction::StartStreaming),
            Channel::new("C", "charlie").with_action(AutomationAction::StartRecording),
        ]
    }

    fn live(channels: &[Channel], id: &str, video: &str) -> LiveChannel {
        LiveChannel {
            channel: channels
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .unwrap_or_else(|| Channel::new(id, id)),
            video_id: video.to_string(),
        }
    }

    // ── selection rule ──────────────────────────────────────────────

    #[test]
    fn first_live_in_configuration_order_wins() {
        let chans = channels();
        let live_list = vec![live(&chans, "B", "v1"), live(&chans, "C", "v2")];

        for priority in [None, Some("A"), Some("B"), Some("C")] {
            let picked = select_channel(&chans, &live_list, priority, false).expect("selected");
            assert_eq!(picked.channel.id, "B", "priority {priority:?} must not matter");
            assert_eq!(picked.video_id, "v1");
        }
    }

    #[test]
    fn configuration_order_beats_live_list_order() {
        let chans = channels();
        let live_list = vec![live(&chans, "C", "v2"), live(&chans, "B", "v1")];
        let picked = select_channel(&chans, &live_list, None, false).expect("selected");
        assert_eq!(picked.channel.id, "B");
    }

    #[test]
    fn falls_back_to_first_live_entry_when_unconfigured() {
        let chans = channels();
        let live_list = vec![live(&chans, "X", "vx"), live(&chans, "Y", "vy")];
        let picked = select_channel(&chans, &live_list, None, false).expect("selected");
        assert_eq!(picked.channel.id, "X");
    }

    #[test]
    fn preferred_priority_channel_wins_when_live() {
        let chans = channels();
        let live_list = vec![live(&chans, "B", "v1"), live(&chans, "C", "v2")];
        let picked = select_channel(&chans, &live_list, Some("C"), true).expect("selected");
        assert_eq!(picked.channel.id, "C");

        // Priority not live: normal rule.
        let picked = select_channel(&chans, &live_list, Some("A"), true).expect("selected");
        assert_eq!(picked.channel.id, "B");
    }

    #[test]
    fn nothing_live_selects_nothing() {
        assert!(select_channel(&channels(), &[], Some("A"), true).is_none());
    }

    // ── decide ──────────────────────────────────────────────────────

    #[test]
    fn new_selection_then_unchanged() {
        let chans = channels();
        let live_list = vec![live(&chans, "B", "v1")];
        let mut state = PollerState::new();
        let opts = SelectionOptions::default();

        let d = decide(&state, &chans, &live_list, None, t0(), opts);
        let CycleDecision::Select { stream, channel } = &d else {
            panic!("expected Select, got {d:?}");
        };
        assert_eq!(stream.channel_id, "B");
        assert_eq!(stream.video_id, "v1");
        assert_eq!(stream.automation_action, AutomationAction::StartStreaming);
        assert_eq!(channel.channel.display_name, "bravo");
        state.apply(&d, t0());
        assert_eq!(state.selected().map(|s| s.channel_id.as_str()), Some("B"));

        // 60s later, still B → idempotent.
        let later = t0() + TimeDelta::seconds(60);
        let d = decide(&state, &chans, &live_list, None, later, opts);
        assert_eq!(d, CycleDecision::Unchanged { channel_id: "B".into() });
    }

    #[test]
    fn no_live_with_selection_clears_once() {
        let chans = channels();
        let mut state = PollerState::new();
        let opts = SelectionOptions::default();
        let d = decide(&state, &chans, &[live(&chans, "A", "v")], None, t0(), opts);
        state.apply(&d, t0());

        let now = t0() + TimeDelta::seconds(15);
        let d = decide(&state, &chans, &[], None, now, opts);
        let CycleDecision::Clear { previous } = &d else {
            panic!("expected Clear, got {d:?}");
        };
        assert_eq!(previous.channel_id, "A");
        state.apply(&d, now);
        assert!(state.selected().is_none());

        // Second empty cycle: nothing selected, nothing to stop.
        let d = decide(&state, &chans, &[], None, now + TimeDelta::seconds(15), opts);
        assert_eq!(d, CycleDecision::Idle);
    }

    #[test]
    fn flapping_channel_is_debounced_within_window() {
        let chans = channels();
        let live_list = vec![live(&chans, "B", "v1")];
        let mut state = PollerState::new();
        let opts = SelectionOptions::default();

        let d = decide(&state, &chans, &live_list, None, t0(), opts);
        state.apply(&d, t0());

        let t10 = t0() + TimeDelta::seconds(10);
        let d = decide(&state, &chans, &[], None, t10, opts);
        state.apply(&d, t10);
        assert!(state.selected().is_none());

        // Back within 30s of the last selection change → debounced.
        let t20 = t0() + TimeDelta::seconds(20);
        let d = decide(&state, &chans, &live_list, None, t20, opts);
        assert_eq!(d, CycleDecision::Debounced { channel_id: "B".into() });
        state.apply(&d, t20);
        assert!(state.selected().is_none(), "debounce must not record a selection");

        // After the window the same channel re-triggers.
        let t31 = t0() + TimeDelta::seconds(31);
        let d = decide(&state, &chans, &live_list, None, t31, opts);
        assert!(matches!(d, CycleDecision::Select { .. }), "got {d:?}");
    }

    #[test]
    fn debounce_is_per_channel() {
        let chans = channels();
        let mut state = PollerState::new();
        let opts = SelectionOptions::default();
        let d = decide(&state, &chans, &[live(&chans, "C", "v2")], None, t0(), opts);
        state.apply(&d, t0());

        // B goes live 5s later: different channel, switch immediately.
        let t5 = t0() + TimeDelta::seconds(5);
        let d = decide(&state, &chans, &[live(&chans, "B", "v1"), live(&chans, "C", "v2")], None, t5, opts);
        let CycleDecision::Select { stream, .. } = &d else {
            panic!("expected Select, got {d:?}");
        };
        assert_eq!(stream.channel_id, "B");
        state.apply(&d, t5);
        assert_eq!(state.selected().map(|s| s.channel_id.as_str()), Some("B"));
        assert_eq!(state.last_selection(), Some(("B", t5)));
    }

    // ── transitions ─────────────────────────────────────────────────

    #[test]
    fn record_status_reports_transitions_once() {
        let mut state = PollerState::new();
        assert_eq!(state.record_status("A", &LiveStatus::offline()), LiveTransition::Offline);
        assert_eq!(state.record_status("A", &LiveStatus::live("v")), LiveTransition::WentLive);
        assert_eq!(state.record_status("A", &LiveStatus::live("v")), LiveTransition::StillLive);
        assert_eq!(
            state.record_status("A", &LiveStatus::offline()),
            LiveTransition::MayHaveEnded
        );
        assert_eq!(state.record_status("A", &LiveStatus::offline()), LiveTransition::Offline);
    }

    // ── invariants ──────────────────────────────────────────────────

    proptest! {
        #[test]
        fn selection_is_at_most_one_and_always_live(
            live_mask in proptest::collection::vec(any::<bool>(), 0..8),
            priority in proptest::option::of(0usize..8),
            prefer in any::<bool>(),
        ) {
            let chans: Vec<Channel> = (0..live_mask.len())
                .map(|i| Channel::new(format!("UC{i}"), format!("ch{i}")))
                .collect();
            let live_list: Vec<LiveChannel> = chans
                .iter()
                .zip(&live_mask)
                .filter(|(_, is_live)| **is_live)
                .map(|(c, _)| LiveChannel { channel: c.clone(), video_id: format!("v-{}", c.id) })
                .collect();
            let priority_id = priority.map(|i| format!("UC{i}"));

            let mut state = PollerState::new();
            let d = decide(&state, &chans, &live_list, priority_id.as_deref(), t0(), SelectionOptions {
                prefer_priority_channel: prefer,
                ..SelectionOptions::default()
            });
            state.apply(&d, t0());

            match state.selected() {
                Some(sel) => prop_assert!(live_list.iter().any(|l| l.channel.id == sel.channel_id)),
                None => prop_assert!(live_list.is_empty()),
            }

            if !prefer {
                let first_live = chans
                    .iter()
                    .zip(&live_mask)
                    .find(|(_, l)| **l)
                    .map(|(c, _)| c.id.clone());
                prop_assert_eq!(state.selected().map(|s| s.channel_id.clone()), first_live);
            }
        }
    }
}
