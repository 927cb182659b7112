//! The persisted OAuth token blob.

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicTokenResponse;
use oauth2::TokenResponse;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tokens expiring within this window are refreshed ahead of time.
const EXPIRY_LEEWAY_SECS: i64 = 300;

/// OAuth2 tokens with expiration tracking.
///
/// Provider fields this layer does not model land in `extra` and are written
/// back verbatim, so the on-disk blob stays a faithful copy of what the
/// provider returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    /// Access token for API requests.
    pub access_token: String,
    /// Refresh token for obtaining new access tokens. Absent when the
    /// provider was asked for `online` access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token type, `Bearer` for Google.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Space-separated scopes granted by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
    /// Unmodelled provider fields, persisted verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Tokens {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now() + Duration::seconds(EXPIRY_LEEWAY_SECS)
    }

    /// Convert an oauth2 exchange result into a persistable blob.
    ///
    /// Refresh responses may omit the refresh token; the previous one is
    /// carried over so the blob stays usable for the next refresh.
    pub fn from_token_response(
        response: &BasicTokenResponse,
        previous_refresh_token: Option<&str>,
    ) -> Self {
        let refresh_token = response
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| previous_refresh_token.map(str::to_string));

        let expires_in = response
            .expires_in()
            .unwrap_or_else(|| std::time::Duration::from_secs(3600));
        let expires_at =
            Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1));

        let scope = response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token,
            token_type: default_token_type(),
            scope,
            expires_at,
            extra: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_expiring_at(expires_at: DateTime<Utc>) -> Tokens {
        Tokens {
            access_token: "test".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_type: "Bearer".to_string(),
            scope: None,
            expires_at,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_tokens_expiration() {
        assert!(tokens_expiring_at(Utc::now() - Duration::hours(1)).is_expired());
        assert!(!tokens_expiring_at(Utc::now() + Duration::hours(1)).is_expired());
    }

    #[test]
    fn test_tokens_near_expiration() {
        // Expiring in 4 minutes falls inside the 5 minute leeway.
        assert!(tokens_expiring_at(Utc::now() + Duration::minutes(4)).is_expired());
    }

    #[test]
    fn test_tokens_serialization_preserves_unknown_fields() {
        let json = r#"{
            "access_token": "ya29.abc",
            "refresh_token": "1//xyz",
            "token_type": "Bearer",
            "expires_at": "2030-01-01T00:00:00Z",
            "id_token": "opaque.jwt.value"
        }"#;

        let tokens: Tokens = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.access_token, "ya29.abc");
        assert_eq!(
            tokens.extra.get("id_token").and_then(|v| v.as_str()),
            Some("opaque.jwt.value")
        );

        let out = serde_json::to_string(&tokens).unwrap();
        assert!(out.contains("opaque.jwt.value"));
    }

    #[test]
    fn test_tokens_default_token_type() {
        let json = r#"{
            "access_token": "ya29.abc",
            "expires_at": "2030-01-01T00:00:00Z"
        }"#;

        let tokens: Tokens = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert!(tokens.refresh_token.is_none());
    }
}
