//! livewatch-source-live: "is this channel live right now" oracle.
//! Fetches a channel's canonical live page and reads the live flag and
//! canonical watch link out of it. Every failure degrades to "not live".

pub mod error;
pub mod oracle;
pub mod parse;
pub mod resolve;

pub use error::OracleError;
pub use oracle::{HttpLiveOracle, LiveStatusOracle};
pub use parse::{extract_canonical_channel_id, extract_canonical_video_id, parse_live_page};
pub use resolve::{is_channel_id, resolve_channel_id};
