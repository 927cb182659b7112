//! The shared authenticated connection and its token refresh gate.

use std::path::Path;

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, Scope, TokenUrl,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use gworks_common::{Error, Result};

use crate::config::{ConnectionConfig, OAuthClientConfig, DEFAULT_REDIRECT_URI};
use crate::store::CredentialStore;
use crate::tokens::Tokens;

type OAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Outcome of a token check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// A usable access token is installed on the connection.
    Valid,
    /// No credentials exist yet; the user must visit the authorization URL.
    AuthRequired { auth_url: String },
}

/// A configured OAuth connection shared by all resource facades.
///
/// Owns the OAuth client, one HTTP client reused for every API call, the
/// credential store and the currently installed token blob. Facades hold an
/// `Arc<Connection>` and never own credential state themselves.
pub struct Connection {
    oauth: OAuthClient,
    http: reqwest::Client,
    config: ConnectionConfig,
    store: CredentialStore,
    tokens: RwLock<Option<Tokens>>,
}

impl Connection {
    /// Build a connection from an unwrapped OAuth client entry.
    ///
    /// # Errors
    /// - Malformed endpoint or redirect URLs in the client entry
    pub fn connect(
        config: ConnectionConfig,
        client: OAuthClientConfig,
        store: CredentialStore,
    ) -> Result<Self> {
        let redirect_uri = client
            .redirect_uris
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        let oauth = BasicClient::new(ClientId::new(client.client_id))
            .set_client_secret(ClientSecret::new(client.client_secret))
            .set_auth_uri(
                AuthUrl::new(client.auth_uri)
                    .map_err(|e| Error::InvalidInput(format!("Invalid auth URI: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(client.token_uri)
                    .map_err(|e| Error::InvalidInput(format!("Invalid token URI: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri)
                    .map_err(|e| Error::InvalidInput(format!("Invalid redirect URI: {}", e)))?,
            );

        let http = reqwest::Client::builder()
            .user_agent(config.application_name.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            oauth,
            http,
            config,
            store,
            tokens: RwLock::new(None),
        })
    }

    /// Convenience constructor reading the vendor secrets file directly.
    pub fn from_secrets_file(
        config: ConnectionConfig,
        secrets_path: impl AsRef<Path>,
        store: CredentialStore,
    ) -> Result<Self> {
        let client = crate::config::ClientSecrets::load(secrets_path)?.into_client()?;
        Self::connect(config, client, store)
    }

    /// The HTTP client shared with the resource facades.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The connection options this connection was configured with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The credential store backing this connection.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Build the authorization URL for first-time consent.
    ///
    /// Returns the URL and the CSRF state embedded in it.
    pub fn authorization_url(&self) -> (String, String) {
        let mut request = self.oauth.authorize_url(CsrfToken::new_random);

        for scope in &self.config.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        request = request.add_extra_param("access_type", self.config.access_type.clone());
        if let Some(prompt) = &self.config.prompt {
            request = request.add_extra_param("prompt", prompt.clone());
        }
        if let Some(subject) = &self.config.subject {
            request = request.add_extra_param("login_hint", subject.clone());
        }

        let (url, csrf_token) = request.url();
        (url.to_string(), csrf_token.secret().clone())
    }

    /// Exchange an authorization code, persist and install the new blob.
    ///
    /// # Errors
    /// - Invalid or expired authorization code
    /// - Network errors
    pub async fn exchange_code(&self, code: &str) -> Result<Tokens> {
        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        let tokens = Tokens::from_token_response(&response, None);
        self.store.save(&tokens)?;
        *self.tokens.write().await = Some(tokens.clone());
        info!("Authorization complete, credentials stored");
        Ok(tokens)
    }

    /// Check the credential cache and make sure a valid token is installed.
    ///
    /// - No credential file: returns [`TokenStatus::AuthRequired`] carrying
    ///   the authorization URL, without blocking on user interaction or
    ///   writing anything.
    /// - Expired blob: exchanges the stored refresh token and overwrites the
    ///   credential file in full.
    /// - Valid blob: returns without any network call.
    ///
    /// # Errors
    /// - Malformed credential file
    /// - Expired blob without a refresh token, or a rejected refresh
    pub async fn ensure_valid_token(&self) -> Result<TokenStatus> {
        let Some(stored) = self.store.load()? else {
            let (auth_url, _) = self.authorization_url();
            debug!("No stored credentials, authorization required");
            return Ok(TokenStatus::AuthRequired { auth_url });
        };

        if !stored.is_expired() {
            *self.tokens.write().await = Some(stored);
            return Ok(TokenStatus::Valid);
        }

        let refresh_token = stored.refresh_token.clone().ok_or_else(|| {
            Error::Authentication(
                "Stored credentials are expired and carry no refresh token".to_string(),
            )
        })?;

        let fresh = self.refresh_with(&refresh_token).await?;
        *self.tokens.write().await = Some(fresh);
        Ok(TokenStatus::Valid)
    }

    /// Get a valid access token for an API request, refreshing if necessary.
    ///
    /// # Errors
    /// - No stored credentials (authorization flow never completed)
    /// - Token refresh failed
    pub async fn bearer_token(&self) -> Result<String> {
        {
            let tokens = self.tokens.read().await;
            if let Some(tokens) = tokens.as_ref() {
                if !tokens.is_expired() {
                    return Ok(tokens.access_token.clone());
                }
            }
        }

        let mut guard = self.tokens.write().await;

        // Another task may have refreshed while we waited for the write lock,
        // and a first caller may not have gone through the gate at all.
        if guard.is_none() {
            *guard = self.store.load()?;
        }

        let current = guard.as_ref().ok_or_else(|| {
            Error::Authentication(
                "Not authorized: no stored credentials, run the authorization flow first"
                    .to_string(),
            )
        })?;

        if !current.is_expired() {
            return Ok(current.access_token.clone());
        }

        let refresh_token = current.refresh_token.clone().ok_or_else(|| {
            Error::Authentication(
                "Stored credentials are expired and carry no refresh token".to_string(),
            )
        })?;

        let fresh = self.refresh_with(&refresh_token).await?;
        let access_token = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(access_token)
    }

    /// The currently installed token blob, if any.
    pub async fn tokens(&self) -> Option<Tokens> {
        self.tokens.read().await.clone()
    }

    /// Install a token blob without touching the store.
    pub async fn install_tokens(&self, tokens: Tokens) {
        *self.tokens.write().await = Some(tokens);
    }

    /// Exchange the refresh token and persist the resulting blob in full.
    async fn refresh_with(&self, refresh_token: &str) -> Result<Tokens> {
        info!("Refreshing expired access token");

        let response = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        let tokens = Tokens::from_token_response(&response, Some(refresh_token));
        self.store.save(&tokens)?;
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn client_config(token_uri: &str) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            auth_uri: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_uri: token_uri.to_string(),
            redirect_uris: vec!["http://localhost:8080/callback".to_string()],
        }
    }

    fn connection(dir: &TempDir, token_uri: &str) -> Connection {
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        Connection::connect(
            ConnectionConfig::new("gworks-test"),
            client_config(token_uri),
            store,
        )
        .unwrap()
    }

    fn stored_tokens(expires_at: chrono::DateTime<Utc>, refresh: Option<&str>) -> Tokens {
        Tokens {
            access_token: "ya29.stored".to_string(),
            refresh_token: refresh.map(str::to_string),
            token_type: "Bearer".to_string(),
            scope: None,
            expires_at,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_authorization_url_carries_configured_params() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        let config = ConnectionConfig::new("gworks-test").with_subject("user@example.com");
        let conn = Connection::connect(
            config,
            client_config("https://oauth2.googleapis.com/token"),
            store,
        )
        .unwrap();

        let (url, csrf) = conn.authorization_url();

        assert!(url.contains("accounts.google.com"));
        assert!(url.contains("client_id=test-client"));
        assert!(url.contains("scope="));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("login_hint=user%40example.com"));
        assert!(!csrf.is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_require_authorization() {
        let dir = TempDir::new().unwrap();
        let conn = connection(&dir, "https://oauth2.googleapis.com/token");

        match conn.ensure_valid_token().await.unwrap() {
            TokenStatus::AuthRequired { auth_url } => {
                assert!(!auth_url.is_empty());
                assert!(auth_url.contains("client_id=test-client"));
            }
            other => panic!("expected AuthRequired, got {:?}", other),
        }

        // The check must not create the credential file.
        assert!(!conn.store().exists());
    }

    #[tokio::test]
    async fn test_valid_credentials_skip_the_network() {
        let mut server = mockito::Server::new_async().await;
        let token_endpoint = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let conn = connection(&dir, &format!("{}/token", server.url()));
        conn.store()
            .save(&stored_tokens(Utc::now() + Duration::hours(1), Some("1//r")))
            .unwrap();

        assert_eq!(conn.ensure_valid_token().await.unwrap(), TokenStatus::Valid);
        assert_eq!(conn.bearer_token().await.unwrap(), "ya29.stored");

        token_endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_credentials_are_refreshed_and_rewritten() {
        let mut server = mockito::Server::new_async().await;
        let token_endpoint = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.fresh","token_type":"Bearer","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let conn = connection(&dir, &format!("{}/token", server.url()));
        conn.store()
            .save(&stored_tokens(
                Utc::now() - Duration::hours(1),
                Some("1//refresh"),
            ))
            .unwrap();

        assert_eq!(conn.ensure_valid_token().await.unwrap(), TokenStatus::Valid);
        assert_eq!(conn.bearer_token().await.unwrap(), "ya29.fresh");

        // The credential file was overwritten in full, and the refresh token
        // (absent from the refresh response) carried over.
        let rewritten = conn.store().load().unwrap().unwrap();
        assert_eq!(rewritten.access_token, "ya29.fresh");
        assert_eq!(rewritten.refresh_token.as_deref(), Some("1//refresh"));

        token_endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_refresh_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant","error_description":"Token revoked"}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let conn = connection(&dir, &format!("{}/token", server.url()));
        conn.store()
            .save(&stored_tokens(
                Utc::now() - Duration::hours(1),
                Some("1//revoked"),
            ))
            .unwrap();

        match conn.ensure_valid_token().await {
            Err(Error::Authentication(msg)) => assert!(msg.contains("refresh failed")),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_is_an_error() {
        let dir = TempDir::new().unwrap();
        let conn = connection(&dir, "https://oauth2.googleapis.com/token");
        conn.store()
            .save(&stored_tokens(Utc::now() - Duration::hours(1), None))
            .unwrap();

        match conn.ensure_valid_token().await {
            Err(Error::Authentication(msg)) => assert!(msg.contains("no refresh token")),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_credentials_propagate() {
        let dir = TempDir::new().unwrap();
        let conn = connection(&dir, "https://oauth2.googleapis.com/token");
        std::fs::write(conn.store().path(), "{not json").unwrap();

        match conn.ensure_valid_token().await {
            Err(Error::Serialization(_)) => {}
            other => panic!("expected serialization error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bearer_token_without_credentials_is_an_error() {
        let dir = TempDir::new().unwrap();
        let conn = connection(&dir, "https://oauth2.googleapis.com/token");

        match conn.bearer_token().await {
            Err(Error::Authentication(msg)) => assert!(msg.contains("Not authorized")),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }
}
