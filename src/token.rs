//! Correlation tokens and their two embedding channels.
//!
//! A token is minted once per test case per run and embedded twice in the
//! outgoing message: as a custom header and as a trailing marker line in the
//! body. Intermediaries are free to strip non-standard headers, so neither
//! channel alone is trusted; the body marker is the fallback of last resort.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Header carrying the token on the fast search path.
pub const TOKEN_HEADER: &str = "X-Routecheck-Token";

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[TEST-ID: ([0-9a-f]{32})\]").unwrap());

/// A unique, unguessable correlation identifier: 128 bits, hex-encoded.
///
/// Unique within a run, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Mint a fresh token from 16 random bytes.
    pub fn mint() -> Self {
        use std::fmt::Write;

        let bytes: [u8; 16] = rand::random();
        let mut hex = String::with_capacity(32);
        for byte in bytes {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing marker line appended to the message body.
    pub fn marker_line(&self) -> String {
        format!("[TEST-ID: {}]", self.0)
    }

    /// Body text with the marker line appended after a blank line.
    pub fn append_marker(&self, body: &str) -> String {
        format!("{}\n\n{}", body.trim_end(), self.marker_line())
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract a token from message text via the body marker.
pub fn extract_marker(text: &str) -> Option<CorrelationToken> {
    MARKER_RE
        .captures(text)
        .map(|caps| CorrelationToken(caps[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn minted_tokens_are_32_hex_chars() {
        let token = CorrelationToken::mint();
        assert_eq!(token.as_str().len(), 32);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn minted_tokens_are_unique() {
        let tokens: HashSet<_> = (0..1000)
            .map(|_| CorrelationToken::mint().as_str().to_string())
            .collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn marker_round_trip() {
        let token = CorrelationToken::mint();
        let body = token.append_marker("Hello,\n\nplease process this.\n");
        assert_eq!(extract_marker(&body), Some(token));
    }

    #[test]
    fn append_marker_separates_with_blank_line() {
        let token = CorrelationToken::mint();
        let body = token.append_marker("content");
        assert!(body.starts_with("content\n\n[TEST-ID: "));
    }

    #[test]
    fn extract_marker_ignores_plain_text() {
        assert_eq!(extract_marker("no marker here"), None);
        assert_eq!(extract_marker("[TEST-ID: not-hex]"), None);
    }

    #[test]
    fn token_serde_is_transparent() {
        let token = CorrelationToken::mint();
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, format!("\"{token}\""));
        let parsed: CorrelationToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, token);
    }
}
