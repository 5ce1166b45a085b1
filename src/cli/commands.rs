use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{AuthorizationFlow, AutoRefreshingTokenSource, CallbackTransport, OAuthClient};
use crate::config::{Config, ShortcutTable};
use crate::console;
use crate::dispatch::ActionDispatcher;
use crate::input::{InputMultiplexer, TerminalKeys, mediakeys};
use crate::models::{Credential, PlaybackState};
use crate::spotify::{PlaybackApi, PlaybackError, SpotifyClient};
use crate::store::{CredentialStore, FileCredentialStore};

pub struct App {
    pub config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn store(&self) -> Arc<FileCredentialStore> {
        Arc::new(FileCredentialStore::new(self.config.token_path()))
    }

    fn oauth_client(&self) -> Result<Arc<OAuthClient>> {
        let credentials = self.config.client_credentials()?;
        Ok(Arc::new(OAuthClient::new(
            credentials.client_id,
            credentials.client_secret,
            self.config.redirect_uri(),
        )))
    }

    fn authorization_flow(
        &self,
        oauth: Arc<OAuthClient>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<AuthorizationFlow> {
        let auth = &self.config.auth;
        let transport = CallbackTransport::tls_from_pem(&auth.cert_file, &auth.key_file)
            .context("Cannot serve the authorization callback over TLS")?;
        Ok(
            AuthorizationFlow::new(oauth, store, self.config.bind_addr(), transport)
                .with_timeout(self.config.callback_timeout()),
        )
    }

    /// Load the saved credential, authorizing from scratch when there is none,
    /// and wrap it in a client that refreshes on demand.
    async fn connect(&self) -> Result<Arc<SpotifyClient>> {
        self.config.ensure_dirs()?;
        let oauth = self.oauth_client()?;
        let store = self.store();

        let credential = load_or_authorize(store.as_ref(), || {
            self.authorization_flow(oauth.clone(), store.clone())
        })
        .await?;

        let tokens = Arc::new(AutoRefreshingTokenSource::new(credential, oauth, store));
        Ok(Arc::new(SpotifyClient::new(tokens)))
    }

    // Command implementations

    pub async fn run(&self) -> Result<()> {
        let shortcuts = self.config.shortcut_table()?;
        let api = self.connect().await?;
        let dispatcher = Arc::new(ActionDispatcher::new(api));

        console::blank();
        console::line("Spotify Controller Ready!");
        print_legend(&shortcuts);
        console::blank();

        let keys = TerminalKeys::new().context("Failed to initialize keyboard")?;

        let cancel = CancellationToken::new();
        let (hook_tx, hook_rx) = mpsc::channel(mediakeys::EVENT_BUFFER);
        let media_keys = tokio::spawn(mediakeys::listen(hook_tx, cancel.clone()));

        InputMultiplexer::new(dispatcher, shortcuts, cancel.clone())
            .run(keys, hook_rx)
            .await;

        cancel.cancel();
        if let Err(e) = media_keys.await {
            warn!("Media key listener failed: {e}");
        }

        console::blank();
        console::line("Exiting...");
        Ok(())
    }

    pub async fn login(&self) -> Result<()> {
        self.config.ensure_dirs()?;
        let oauth = self.oauth_client()?;
        let store = self.store();

        self.authorization_flow(oauth, store.clone())?
            .authenticate()
            .await
            .context("Authentication failed")?;

        println!("Logged in. Credential saved to {}", store.path().display());
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        let store = self.store();
        store
            .clear()
            .with_context(|| format!("Failed to remove {}", store.path().display()))?;
        println!("Logged out.");
        Ok(())
    }

    pub async fn status(&self) -> Result<()> {
        let api = self.connect().await?;

        match api.playback_state().await {
            Ok(state) => print_status(&state),
            Err(PlaybackError::NoActiveDevice) => println!("No active device."),
            Err(e) => return Err(e).context("Failed to read playback state"),
        }

        Ok(())
    }

    pub fn shortcuts(&self) -> Result<()> {
        let shortcuts = self.config.shortcut_table()?;
        println!("Available shortcuts:");
        for line in shortcuts.legend() {
            println!("{line}");
        }
        Ok(())
    }
}

/// Credential-store failures of any kind fall back to a fresh authorization.
pub(crate) async fn load_or_authorize<F>(
    store: &dyn CredentialStore,
    make_flow: F,
) -> Result<Credential>
where
    F: FnOnce() -> Result<AuthorizationFlow>,
{
    match store.load() {
        Ok(credential) => Ok(credential),
        Err(e) => {
            info!("No usable credential ({e})");
            console::line("No valid token found, starting OAuth flow...");
            let credential = make_flow()?
                .authenticate()
                .await
                .context("Authentication failed")?;
            Ok(credential)
        }
    }
}

fn print_legend(shortcuts: &ShortcutTable) {
    console::line("Available shortcuts:");
    for line in shortcuts.legend() {
        console::line(line);
    }
}

fn print_status(state: &PlaybackState) {
    let status = if state.is_playing { "Playing" } else { "Paused" };
    println!("Status: {status}");
    println!("Volume: {}%", state.volume_percent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryCredentialStore, free_loopback_addr, send_callback};
    use anyhow::anyhow;
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn token_endpoint(expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "refresh"
            })))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    fn plain_flow(
        server: &MockServer,
        store: Arc<dyn CredentialStore>,
        addr: SocketAddr,
    ) -> Result<AuthorizationFlow> {
        let oauth = OAuthClient::new("id", "secret", format!("http://{addr}/callback"))
            .with_token_endpoint(format!("{}/api/token", server.uri()));
        Ok(
            AuthorizationFlow::new(Arc::new(oauth), store, addr, CallbackTransport::Plain)
                .with_fixed_state("fixed"),
        )
    }

    #[tokio::test]
    async fn test_fresh_install_authorizes_and_persists() {
        let server = token_endpoint(1).await;
        let store = Arc::new(MemoryCredentialStore::default());
        let addr = free_loopback_addr();

        let (credential, _) = tokio::join!(
            load_or_authorize(store.as_ref(), || plain_flow(&server, store.clone(), addr)),
            send_callback(addr, "state=fixed&code=grant"),
        );

        assert_eq!(credential.unwrap().access_token, "fresh");
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().unwrap().access_token, "fresh");
    }

    #[tokio::test]
    async fn test_corrupt_record_is_treated_like_missing() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token.json");
        std::fs::write(&token_path, "{ not json").unwrap();
        let store = Arc::new(FileCredentialStore::new(&token_path));
        let server = token_endpoint(1).await;
        let addr = free_loopback_addr();

        let (credential, _) = tokio::join!(
            load_or_authorize(store.as_ref(), || plain_flow(&server, store.clone(), addr)),
            send_callback(addr, "state=fixed&code=grant"),
        );

        assert_eq!(credential.unwrap().access_token, "fresh");
        assert_eq!(store.load().unwrap().access_token, "fresh");
    }

    #[tokio::test]
    async fn test_saved_credential_skips_the_flow() {
        let saved = Credential::new("saved", "refresh", 3600);
        let store = MemoryCredentialStore::with(saved.clone());

        let credential = load_or_authorize(&store, || Err(anyhow!("flow must not run")))
            .await
            .unwrap();

        assert_eq!(credential, saved);
    }

    #[tokio::test]
    async fn test_flow_failure_is_fatal() {
        let store = MemoryCredentialStore::default();

        let err = load_or_authorize(&store, || Err(anyhow!("no certificate")))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no certificate"));
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_logout_without_credential_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.path = dir.path().to_path_buf();

        App::new(config).logout().unwrap();
    }

    #[tokio::test]
    async fn test_status_requires_client_credentials() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.path = dir.path().to_path_buf();

        let err = App::new(config).status().await.unwrap_err();
        assert!(err.to_string().contains("EZSPOTIFY_CLIENT_ID"));
    }
}
