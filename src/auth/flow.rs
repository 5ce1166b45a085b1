use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::callback::{CallbackServer, CallbackTransport};
use super::{AuthError, OAuthClient};
use crate::console;
use crate::models::Credential;
use crate::store::CredentialStore;

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const STATE_LEN: usize = 32;

/// Drives one redirect-based authorization from consent URL to persisted
/// credential.
pub struct AuthorizationFlow {
    oauth: Arc<OAuthClient>,
    store: Arc<dyn CredentialStore>,
    bind_addr: SocketAddr,
    transport: CallbackTransport,
    timeout: Duration,
    fixed_state: Option<String>,
}

impl AuthorizationFlow {
    pub fn new(
        oauth: Arc<OAuthClient>,
        store: Arc<dyn CredentialStore>,
        bind_addr: SocketAddr,
        transport: CallbackTransport,
    ) -> Self {
        Self {
            oauth,
            store,
            bind_addr,
            transport,
            timeout: DEFAULT_CALLBACK_TIMEOUT,
            fixed_state: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a fixed CSRF state instead of a fresh random one per run.
    #[cfg(test)]
    pub fn with_fixed_state(mut self, state: impl Into<String>) -> Self {
        self.fixed_state = Some(state.into());
        self
    }

    pub async fn authenticate(&self) -> Result<Credential, AuthError> {
        let pending = self.start().await?;

        console::line("Authorize ezspotify by visiting this URL:");
        console::line(pending.authorize_url());
        info!(
            "Waiting up to {}s for the redirect on {}",
            self.timeout.as_secs(),
            pending.local_addr()
        );

        let code = pending.wait().await?;
        info!("Authorization code received, exchanging for a token");

        let credential = self.oauth.exchange_code(&code).await?;
        if let Err(e) = self.store.save(&credential) {
            warn!("Failed to persist credential: {e}");
        }
        Ok(credential)
    }

    /// Bind the callback listener and start serving it in the background.
    pub async fn start(&self) -> Result<PendingAuthorization, AuthError> {
        let state = self.fixed_state.clone().unwrap_or_else(generate_state);
        let authorize_url = self.oauth.authorize_url(&state)?;

        let server = CallbackServer::bind(self.bind_addr, self.transport.clone()).await?;
        let local_addr = server.local_addr()?;
        info!("Listening for authorization callback on {local_addr}");

        let (result_tx, result_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.serve(state.clone(), result_tx, shutdown.clone()));

        Ok(PendingAuthorization {
            state,
            authorize_url,
            local_addr,
            timeout: self.timeout,
            result_rx,
            shutdown,
            task,
        })
    }
}

/// A flow waiting on its redirect. Dropping it without `wait` still stops the
/// listener.
pub struct PendingAuthorization {
    state: String,
    authorize_url: String,
    local_addr: SocketAddr,
    timeout: Duration,
    result_rx: oneshot::Receiver<Result<String, AuthError>>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl PendingAuthorization {
    #[cfg(test)]
    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Race the redirect against the timeout, then shut the listener down.
    pub async fn wait(mut self) -> Result<String, AuthError> {
        let outcome = tokio::select! {
            received = &mut self.result_rx => match received {
                Ok(verdict) => verdict,
                Err(_) => Err(AuthError::CallbackServer("listener exited early".to_string())),
            },
            _ = tokio::time::sleep(self.timeout) => Err(AuthError::Timeout(self.timeout)),
        };

        self.shutdown.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            warn!("Callback listener did not stop in time, aborting it");
            self.task.abort();
        }

        outcome
    }
}

impl Drop for PendingAuthorization {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}
