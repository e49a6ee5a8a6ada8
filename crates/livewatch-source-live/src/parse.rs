//! Page parsing: live flag and canonical links.

use livewatch_core::LiveStatus;

/// Marker embedded in the player config of a page that is currently live.
pub const LIVE_FLAG: &str = r#""isLive":true"#;

const CANONICAL_WATCH_PREFIX: &str =
    r#"<link rel="canonical" href="https://www.youtube.com/watch?v="#;
const CANONICAL_CHANNEL_PREFIX: &str =
    r#"<link rel="canonical" href="https://www.youtube.com/channel/"#;

/// Read a channel's `/live` page.
///
/// The flag without a canonical watch link yields `is_live: true` with no
/// video id, which [`LiveStatus::live_video`] treats as not actionable.
pub fn parse_live_page(html: &str) -> LiveStatus {
    if !html.contains(LIVE_FLAG) {
        return LiveStatus::offline();
    }
    LiveStatus {
        is_live: true,
        video_id: extract_canonical_video_id(html),
    }
}

/// Video id from `<link rel="canonical" href="https://www.youtube.com/watch?v=ID">`.
pub fn extract_canonical_video_id(html: &str) -> Option<String> {
    extract_link_value(html, CANONICAL_WATCH_PREFIX)
}

/// Channel id from `<link rel="canonical" href="https://www.youtube.com/channel/UC…">`.
/// Only ids shaped like `UC` + 22 url-safe characters are accepted.
pub fn extract_canonical_channel_id(html: &str) -> Option<String> {
    extract_link_value(html, CANONICAL_CHANNEL_PREFIX).filter(|id| crate::is_channel_id(id))
}

/// Value between `prefix` and the closing `">` of the first matching tag.
fn extract_link_value(html: &str, prefix: &str) -> Option<String> {
    let mut rest = html;
    while let Some(start) = rest.find(prefix) {
        let tail = &rest[start + prefix.len()..];
        if let Some(end) = tail.find('"') {
            let value = &tail[..end];
            if !value.is_empty() && tail[end..].starts_with("\">") {
                return Some(value.to_string());
            }
        }
        rest = tail;
    }
    None
}
