//! # Snapshot Codec
//!
//! Text encodings of a [`PersistedState`]:
//! - Durable: plain JSON, stored under a fixed key.
//! - Shareable: JSON wrapped in URL-safe base64 for the `state` query
//!   parameter.
//!
//! ## Validation
//!
//! Input size and the `version` field are checked before the full record
//! is deserialized. A version mismatch is reported as
//! [`FlexError::VersionMismatch`] so callers can fall back to defaults.

use super::snapshot::PersistedState;
use crate::FlexError;
use crate::primitives::{SHARE_PARAM, STATE_VERSION};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

// =============================================================================
// LIMITS
// =============================================================================

/// Largest snapshot text accepted by the decoders.
///
/// Checked before any parsing so a corrupted store cannot force a huge
/// allocation.
pub const MAX_SNAPSHOT_SIZE: usize = 256 * 1024 * 1024; // 256 MB

fn check_size(len: usize) -> Result<(), FlexError> {
    if len > MAX_SNAPSHOT_SIZE {
        return Err(FlexError::DeserializationError(format!(
            "Snapshot size {len} bytes exceeds maximum allowed {MAX_SNAPSHOT_SIZE} bytes"
        )));
    }
    Ok(())
}

/// Read only the `version` field.
fn peek_version(json: &[u8]) -> Result<u32, FlexError> {
    #[derive(serde::Deserialize)]
    struct Header {
        version: Option<u32>,
    }
    let header: Header = serde_json::from_slice(json)
        .map_err(|e| FlexError::DeserializationError(e.to_string()))?;
    header
        .version
        .ok_or_else(|| FlexError::DeserializationError("Missing version field".to_string()))
}

fn parse(json: &[u8]) -> Result<PersistedState, FlexError> {
    check_size(json.len())?;
    let found = peek_version(json)?;
    if found != STATE_VERSION {
        return Err(FlexError::VersionMismatch {
            found,
            expected: STATE_VERSION,
        });
    }
    serde_json::from_slice(json).map_err(|e| {
        FlexError::DeserializationError(format!("Failed to deserialize snapshot: {e}"))
    })
}

// =============================================================================
// DURABLE
// =============================================================================

pub fn encode_durable(state: &PersistedState) -> Result<String, FlexError> {
    serde_json::to_string(state).map_err(|e| FlexError::SerializationError(e.to_string()))
}

pub fn decode_durable(text: &str) -> Result<PersistedState, FlexError> {
    parse(text.as_bytes())
}

// =============================================================================
// SHAREABLE
// =============================================================================

/// Encode the shareable form of `state`. Content payloads are stripped
/// here regardless of what the caller passes.
pub fn encode_shareable(state: &PersistedState) -> Result<String, FlexError> {
    let json = serde_json::to_vec(&state.shareable())
        .map_err(|e| FlexError::SerializationError(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a shareable parameter. Padded standard base64 is accepted too.
pub fn decode_shareable(param: &str) -> Result<PersistedState, FlexError> {
    let param = param.trim();
    check_size(param.len())?;
    let json = URL_SAFE_NO_PAD
        .decode(param.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(param))
        .map_err(|e| FlexError::DecodeError(e.to_string()))?;
    parse(&json)
}

/// Pull the shareable parameter out of a full URL or a bare query string.
///
/// A value that contains no `state=` pair at all is returned unchanged.
#[must_use]
pub fn share_param_from(input: &str) -> Option<&str> {
    let input = input.trim();
    let Some((_, query)) = input.split_once('?') else {
        if input.contains('=') {
            return find_param(input);
        }
        return (!input.is_empty()).then_some(input);
    };
    let query = query.split('#').next().unwrap_or(query);
    find_param(query)
}

fn find_param(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == SHARE_PARAM && !value.is_empty()).then_some(value)
    })
}

/// The query string carrying `state`: `?state=<encoded>`.
#[must_use]
pub fn share_query(encoded: &str) -> String {
    format!("?{SHARE_PARAM}={encoded}")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HeadlessEngine;
    use crate::library::rgba_len;
    use crate::session::Session;

    fn snapshot() -> PersistedState {
        let mut s = Session::new(Box::new(HeadlessEngine::new()));
        s.add_image("pic", 3, 1, vec![9; rgba_len(3, 1)], false)
            .expect("image");
        PersistedState::capture(&s, 1_700_000_000_000)
    }

    #[test]
    fn durable_text_round_trips() {
        let state = snapshot();
        let text = encode_durable(&state).expect("encode");
        assert!(text.contains("\"timestamp\":1700000000000"));
        assert!(text.contains("\"contentLibrary\""));
        assert_eq!(decode_durable(&text).expect("decode"), state);
    }

    #[test]
    fn version_mismatch_is_reported() {
        let mut state = snapshot();
        state.version = STATE_VERSION + 1;
        let text = encode_durable(&state).expect("encode");
        assert!(matches!(
            decode_durable(&text),
            Err(FlexError::VersionMismatch { found, expected })
                if found == STATE_VERSION + 1 && expected == STATE_VERSION
        ));
    }

    #[test]
    fn garbage_is_a_deserialization_error() {
        assert!(matches!(
            decode_durable("{not json"),
            Err(FlexError::DeserializationError(_))
        ));
        assert!(matches!(
            decode_durable("{\"canvas\":{}}"),
            Err(FlexError::DeserializationError(_))
        ));
    }

    #[test]
    fn shareable_is_url_safe_and_stripped() {
        let state = snapshot();
        let encoded = encode_shareable(&state).expect("encode");
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        let decoded = decode_shareable(&encoded).expect("decode");
        assert_eq!(decoded, state.shareable());
        assert!(decoded.content_library.iter().all(|r| !r.has_payload()));
    }

    #[test]
    fn shareable_accepts_standard_base64() {
        let state = snapshot().shareable();
        let json = serde_json::to_vec(&state).expect("json");
        let padded = STANDARD.encode(json);
        assert_eq!(decode_shareable(&padded).expect("decode"), state);
        assert!(matches!(
            decode_shareable("%%%"),
            Err(FlexError::DecodeError(_))
        ));
    }

    #[test]
    fn share_param_extraction() {
        assert_eq!(
            share_param_from("https://host/app/?x=1&state=abc#top"),
            Some("abc")
        );
        assert_eq!(share_param_from("state=xyz"), Some("xyz"));
        assert_eq!(share_param_from("abc"), Some("abc"));
        assert_eq!(share_param_from("https://host/?x=1"), None);
        assert_eq!(share_param_from("  "), None);
        assert_eq!(share_query("abc"), "?state=abc");
    }
}
