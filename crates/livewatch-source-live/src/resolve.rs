//! Channel id resolution from a handle or display name.

use crate::error::OracleError;
use crate::oracle::HttpLiveOracle;
use crate::parse::extract_canonical_channel_id;

/// `UC` followed by 22 url-safe base64 characters.
pub fn is_channel_id(s: &str) -> bool {
    s.len() == 24
        && s.starts_with("UC")
        && s[2..]
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Resolve `name` (a channel id, `@handle` or bare handle) to a channel id.
///
/// Ids are returned as-is without a request. Otherwise the handle page is
/// fetched and the canonical channel link read; `Ok(None)` means the page
/// had no usable link.
pub async fn resolve_channel_id(
    oracle: &HttpLiveOracle,
    name: &str,
) -> Result<Option<String>, OracleError> {
    let name = name.trim();
    if is_channel_id(name) {
        return Ok(Some(name.to_string()));
    }

    let handle = name.trim_start_matches('@');
    let url = format!("{}/@{handle}", oracle.base_url());
    tracing::debug!(handle, url = %url, "resolving channel id");

    let response = oracle.client().get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(OracleError::Status {
            status: status.as_u16(),
            url,
        });
    }
    let html = response.text().await?;
    Ok(extract_canonical_channel_id(&html))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_shape() {
        assert!(is_channel_id("UC_x5XG1OV2P6uZZ5FSM9Ttw"));
        assert!(is_channel_id("UCabcdefghij-lmnopqrstuv"));
        assert!(!is_channel_id("UC_x5XG1OV2P6uZZ5FSM9Tt"));
        assert!(!is_channel_id("XX_x5XG1OV2P6uZZ5FSM9Ttw"));
        assert!(!is_channel_id("UC_x5XG1OV2P6uZZ5FSM9T!w"));
        assert!(!is_channel_id("@somebody"));
    }

    #[tokio::test]
    async fn channel_id_input_needs_no_request() {
        // Base URL points nowhere; an id must short-circuit before any request.
        let oracle = HttpLiveOracle::new(std::time::Duration::from_millis(100))
            .expect("client")
            .with_base_url("http://127.0.0.1:9");
        let id = resolve_channel_id(&oracle, " UC_x5XG1OV2P6uZZ5FSM9Ttw ")
            .await
            .expect("resolve");
        assert_eq!(id.as_deref(), Some("UC_x5XG1OV2P6uZZ5FSM9Ttw"));
    }
}
