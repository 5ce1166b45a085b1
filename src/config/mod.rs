mod shortcuts;

pub use shortcuts::{
    MEDIA_NEXT, MEDIA_PLAY_PAUSE, MEDIA_PREVIOUS, QUIT_KEY, ShortcutConfig, ShortcutTable,
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::CALLBACK_PATH;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub shortcuts: ShortcutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: home.join(".ezspotify"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub port: u16,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub callback_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            port: 9120,
            cert_file: PathBuf::from("cert.pem"),
            key_file: PathBuf::from("key.pem"),
            callback_timeout_secs: 300,
        }
    }
}

/// Application credentials registered with the provider.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ezspotify")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file {}", config_path.display())
            })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.storage.path
    }

    pub fn token_path(&self) -> PathBuf {
        self.storage.path.join("token.json")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.data_dir()).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                self.data_dir().display()
            )
        })?;
        Ok(())
    }

    pub fn client_credentials(&self) -> Result<ClientCredentials> {
        let client_id = non_empty(self.auth.client_id.as_deref());
        let client_secret = non_empty(self.auth.client_secret.as_deref());
        match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(ClientCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            }),
            _ => bail!("EZSPOTIFY_CLIENT_ID and EZSPOTIFY_CLIENT_SECRET must be set"),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.auth.port))
    }

    pub fn redirect_uri(&self) -> String {
        format!("https://127.0.0.1:{}{CALLBACK_PATH}", self.auth.port)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.callback_timeout_secs)
    }

    pub fn shortcut_table(&self) -> Result<ShortcutTable> {
        ShortcutTable::from_config(&self.shortcuts).context("Invalid shortcut configuration")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
