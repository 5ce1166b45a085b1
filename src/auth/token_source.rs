use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::AuthError;
use crate::models::Credential;
use crate::store::CredentialStore;

/// Exchanges an expired credential for a fresh one.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError>;
}

/// Hands out a currently valid credential, refreshing it when it has expired
/// and writing whatever it hands out back to the store.
pub struct AutoRefreshingTokenSource {
    current: Mutex<Credential>,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn CredentialStore>,
}

impl AutoRefreshingTokenSource {
    pub fn new(
        credential: Credential,
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            current: Mutex::new(credential),
            refresher,
            store,
        }
    }

    pub async fn token(&self) -> Result<Credential, AuthError> {
        // Held across the refresh and the save, so concurrent callers wait for
        // one exchange and the store never goes back to an older credential.
        let mut current = self.current.lock().await;
        if current.is_expired() {
            debug!("Access token expired at {}, refreshing", current.expiry);
            *current = self.refresher.refresh(&current).await?;
            info!("Access token refreshed, valid until {}", current.expiry);
        }

        if let Err(e) = self.store.save(&current) {
            warn!("Failed to persist credential: {e}");
        }
        Ok(current.clone())
    }
}
