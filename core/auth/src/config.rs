//! OAuth client configuration: the vendor secrets file and connection options.

use serde::Deserialize;
use std::path::Path;

use gworks_common::{Error, Result};

/// OAuth2 authorization endpoint used when the secrets file omits it.
const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint used when the secrets file omits it.
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Redirect used when the secrets file lists none (desktop-app loopback).
pub(crate) const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Commonly requested Google Workspace scopes.
pub mod scopes {
    /// Full Google Drive access.
    pub const DRIVE: &str = "https://www.googleapis.com/auth/drive";
    /// Google Calendar access.
    pub const CALENDAR: &str = "https://www.googleapis.com/auth/calendar";
    /// Apps Script project execution.
    pub const SCRIPT_PROJECTS: &str = "https://www.googleapis.com/auth/script.projects";
}

/// One OAuth client entry from a `client_secret.json` file.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    /// Client ID of the OAuth client.
    pub client_id: String,
    /// Client secret of the OAuth client.
    pub client_secret: String,
    /// Authorization endpoint.
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Token endpoint.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// Registered redirect URIs; the first one is used.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// The vendor-defined `client_secret.json` envelope.
///
/// Google wraps the client entry in either an `installed` (desktop) or `web`
/// key depending on the application type.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    #[serde(default)]
    installed: Option<OAuthClientConfig>,
    #[serde(default)]
    web: Option<OAuthClientConfig>,
}

impl ClientSecrets {
    /// Load a `client_secret.json` file from disk.
    ///
    /// # Errors
    /// - File read failure
    /// - Malformed JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| {
            Error::Serialization(format!(
                "Malformed client secrets file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Unwrap the envelope into the single client entry it carries.
    ///
    /// # Errors
    /// - Neither `installed` nor `web` entry present
    pub fn into_client(self) -> Result<OAuthClientConfig> {
        self.installed.or(self.web).ok_or_else(|| {
            Error::InvalidInput(
                "Client secrets file has neither an 'installed' nor a 'web' entry".to_string(),
            )
        })
    }
}

/// Options applied when a connection is configured.
///
/// Fixed at configuration time; scopes are not renegotiated mid-session.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Application name, sent as the HTTP user agent.
    pub application_name: String,
    /// Permission scopes requested at consent time.
    pub scopes: Vec<String>,
    /// Account the application requests delegated access for, applied as a
    /// login hint on the authorization URL.
    pub subject: Option<String>,
    /// `offline` (default) keeps the refresh token reusable; `online` does not.
    pub access_type: String,
    /// Consent prompt behaviour.
    pub prompt: Option<String>,
}

impl ConnectionConfig {
    /// Create a configuration with the defaults the facades expect:
    /// Drive scope, offline access, account-selection consent prompt.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            scopes: vec![scopes::DRIVE.to_string()],
            subject: None,
            access_type: "offline".to_string(),
            prompt: Some("select_account consent".to_string()),
        }
    }

    /// Replace the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Request delegated access for a specific account.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Override the access type (`offline` or `online`).
    pub fn with_access_type(mut self, access_type: impl Into<String>) -> Self {
        self.access_type = access_type.into();
        self
    }

    /// Override or disable the consent prompt.
    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed_envelope() {
        let json = r#"{
            "installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "shhh",
                "redirect_uris": ["http://localhost:8080/callback"]
            }
        }"#;

        let secrets: ClientSecrets = serde_json::from_str(json).unwrap();
        let client = secrets.into_client().unwrap();

        assert_eq!(client.client_id, "id.apps.googleusercontent.com");
        assert_eq!(client.auth_uri, GOOGLE_AUTH_URI);
        assert_eq!(client.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(
            client.redirect_uris,
            vec!["http://localhost:8080/callback".to_string()]
        );
    }

    #[test]
    fn test_parse_web_envelope() {
        let json = r#"{
            "web": {
                "client_id": "web-id",
                "client_secret": "web-secret",
                "auth_uri": "https://example.test/auth",
                "token_uri": "https://example.test/token"
            }
        }"#;

        let client: OAuthClientConfig = serde_json::from_str::<ClientSecrets>(json)
            .unwrap()
            .into_client()
            .unwrap();

        assert_eq!(client.client_id, "web-id");
        assert_eq!(client.auth_uri, "https://example.test/auth");
    }

    #[test]
    fn test_empty_envelope_is_rejected() {
        let secrets: ClientSecrets = serde_json::from_str("{}").unwrap();
        assert!(secrets.into_client().is_err());
    }

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::new("gworks-test");

        assert_eq!(config.scopes, vec![scopes::DRIVE.to_string()]);
        assert_eq!(config.access_type, "offline");
        assert_eq!(config.prompt.as_deref(), Some("select_account consent"));
        assert!(config.subject.is_none());
    }

    #[test]
    fn test_connection_config_builders() {
        let config = ConnectionConfig::new("gworks-test")
            .with_scopes(vec![scopes::CALENDAR.to_string()])
            .with_subject("user@example.com")
            .with_access_type("online")
            .with_prompt(None);

        assert_eq!(config.scopes, vec![scopes::CALENDAR.to_string()]);
        assert_eq!(config.subject.as_deref(), Some("user@example.com"));
        assert_eq!(config.access_type, "online");
        assert!(config.prompt.is_none());
    }
}
