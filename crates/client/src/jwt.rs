//! Unverified JWT inspection
//!
//! Claims are decoded only to read the expiry and a display name. The server
//! remains authoritative for every authorization decision, so no signature
//! check happens here.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Name shown when a token carries neither `username` nor `sub`
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Claims read from an access token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject
    #[serde(default)]
    pub sub: Option<String>,
    /// Username claim set by the Cornucopia backend
    #[serde(default)]
    pub username: Option<String>,
    /// Expiry as unix seconds
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    /// Name to display for the token holder
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.sub.as_deref())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
    }

    /// Whether the claims are unexpired at `now_ms` (unix milliseconds)
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.exp
            .and_then(|exp| exp.checked_mul(1000))
            .is_some_and(|exp_ms| exp_ms > now_ms)
    }
}

/// Decode the payload segment of a JWT without verifying it.
///
/// Returns `None` for absent, malformed, or non-JSON input.
pub fn parse_jwt(token: Option<&str>) -> Option<Claims> {
    let payload = token?.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Check whether a token decodes and has not yet expired
pub fn is_token_valid(token: Option<&str>) -> bool {
    is_token_valid_at(token, chrono::Utc::now().timestamp_millis())
}

/// Same as [`is_token_valid`] against an explicit clock
pub fn is_token_valid_at(token: Option<&str>, now_ms: i64) -> bool {
    parse_jwt(token).is_some_and(|claims| claims.is_valid_at(now_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn test_parse_valid_token() {
        let token = encode(&json!({"username": "alice", "exp": 1_700_000_000}));
        let claims = parse_jwt(Some(&token)).unwrap();
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.display_name(), "alice");
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert_eq!(parse_jwt(None), None);
        assert_eq!(parse_jwt(Some("")), None);
        assert_eq!(parse_jwt(Some("not-a-jwt")), None);
        assert_eq!(parse_jwt(Some("a.%%%.c")), None);
        // Valid base64, but not JSON
        let garbage = format!("x.{}.y", URL_SAFE_NO_PAD.encode("hello"));
        assert_eq!(parse_jwt(Some(&garbage)), None);
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"bob"}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(parse_jwt(Some(&token)).unwrap().display_name(), "bob");
    }

    #[test]
    fn test_expiry_boundaries() {
        let now_ms = 1_700_000_000_000;
        let past = encode(&json!({"sub": "a", "exp": 1_699_999_999}));
        let exact = encode(&json!({"sub": "a", "exp": 1_700_000_000}));
        let future = encode(&json!({"sub": "a", "exp": 1_700_000_001}));

        assert!(!is_token_valid_at(Some(&past), now_ms));
        assert!(!is_token_valid_at(Some(&exact), now_ms));
        assert!(is_token_valid_at(Some(&future), now_ms));
    }

    #[test]
    fn test_missing_exp_is_invalid() {
        let token = encode(&json!({"username": "alice"}));
        assert!(!is_token_valid_at(Some(&token), 0));
        assert!(!is_token_valid(None));
    }

    #[test]
    fn test_wall_clock_validity() {
        let now = chrono::Utc::now().timestamp();
        let fresh = encode(&json!({"exp": now + 900}));
        let stale = encode(&json!({"exp": now - 900}));
        assert!(is_token_valid(Some(&fresh)));
        assert!(!is_token_valid(Some(&stale)));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let claims = Claims { sub: Some("carol".into()), username: None, exp: None };
        assert_eq!(claims.display_name(), "carol");
        let claims = Claims { sub: None, username: None, exp: None };
        assert_eq!(claims.display_name(), DEFAULT_DISPLAY_NAME);
    }
}
