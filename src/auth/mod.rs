//! Authorization code grant, the loopback callback listener and the
//! self-refreshing token source.

mod callback;
mod flow;
mod oauth;
mod token_source;

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

pub use callback::{CALLBACK_PATH, CallbackTransport};
pub use flow::AuthorizationFlow;
pub use oauth::OAuthClient;
pub use token_source::{AutoRefreshingTokenSource, TokenRefresher};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("state mismatch in authorization callback")]
    StateMismatch,
    #[error("no code in authorization callback{}", .0.as_ref().map(|r| format!(" (provider said: {r})")).unwrap_or_default())]
    MissingCode(Option<String>),
    #[error("authorization timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("cannot listen for the authorization callback on {addr}: {source}")]
    Listener {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("callback listener failed: {0}")]
    CallbackServer(String),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("invalid OAuth configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
