//! OAuth2 authentication for the Google Workspace facades.
//!
//! This crate covers the credential side of every facade:
//! - parsing the vendor `client_secret.json` configuration file
//! - building an authorization URL for first-time consent
//! - exchanging authorization codes and refresh tokens
//! - caching the token blob on disk and refreshing it lazily on expiry
//!
//! Facades share one [`Connection`] (usually behind an `Arc`) and call
//! [`Connection::bearer_token`] per request; callers gate user-facing flows
//! with [`Connection::ensure_valid_token`].

pub mod config;
pub mod connection;
pub mod store;
pub mod tokens;

pub use config::{scopes, ClientSecrets, ConnectionConfig, OAuthClientConfig};
pub use connection::{Connection, TokenStatus};
pub use store::CredentialStore;
pub use tokens::Tokens;
