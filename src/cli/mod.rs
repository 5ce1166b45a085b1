use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::config::Config;

mod commands;
pub use commands::*;

#[derive(Parser)]
#[command(name = "ezspotify")]
#[command(about = "Control Spotify playback from the keyboard and media keys")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authorize with Spotify and save the credential
    Login,

    /// Remove the saved credential
    Logout,

    /// Show what the active device is doing
    Status,

    /// Print the keyboard shortcuts
    Shortcuts,
}

/// Values that override the config file. Each can come from the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct Settings {
    /// Config file to read instead of the default location
    #[arg(long, env = "EZSPOTIFY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the saved credential
    #[arg(long, env = "EZSPOTIFY_STORAGE_DIR", global = true)]
    pub storage_dir: Option<PathBuf>,

    #[arg(long, env = "EZSPOTIFY_CLIENT_ID", hide_env_values = true, global = true)]
    pub client_id: Option<String>,

    #[arg(long, env = "EZSPOTIFY_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub client_secret: Option<String>,

    /// Port for the local authorization callback
    #[arg(long, env = "EZSPOTIFY_LOCAL_PORT", global = true)]
    pub port: Option<u16>,

    #[arg(long, env = "EZSPOTIFY_CERT_FILE", global = true)]
    pub cert_file: Option<PathBuf>,

    #[arg(long, env = "EZSPOTIFY_KEY_FILE", global = true)]
    pub key_file: Option<PathBuf>,

    #[arg(long, env = "EZSPOTIFY_KEY_PLAY_PAUSE", global = true)]
    pub key_play_pause: Option<String>,

    #[arg(long, env = "EZSPOTIFY_KEY_NEXT", global = true)]
    pub key_next: Option<String>,

    #[arg(long, env = "EZSPOTIFY_KEY_PREV", global = true)]
    pub key_prev: Option<String>,

    #[arg(long, env = "EZSPOTIFY_KEY_VOLUME_UP", global = true)]
    pub key_volume_up: Option<String>,

    #[arg(long, env = "EZSPOTIFY_KEY_VOLUME_DOWN", global = true)]
    pub key_volume_down: Option<String>,

    #[arg(long, env = "EZSPOTIFY_KEY_MUTE", global = true)]
    pub key_mute: Option<String>,
}

impl Settings {
    /// Read the config file, then lay these settings over it.
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(self, config: &mut Config) {
        fn set<T>(target: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *target = value;
            }
        }

        set(&mut config.storage.path, self.storage_dir);
        if self.client_id.is_some() {
            config.auth.client_id = self.client_id;
        }
        if self.client_secret.is_some() {
            config.auth.client_secret = self.client_secret;
        }
        set(&mut config.auth.port, self.port);
        set(&mut config.auth.cert_file, self.cert_file);
        set(&mut config.auth.key_file, self.key_file);

        let shortcuts = &mut config.shortcuts;
        set(&mut shortcuts.play_pause, self.key_play_pause);
        set(&mut shortcuts.next, self.key_next);
        set(&mut shortcuts.prev, self.key_prev);
        set(&mut shortcuts.volume_up, self.key_volume_up);
        set(&mut shortcuts.volume_down, self.key_volume_down);
        set(&mut shortcuts.mute, self.key_mute);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_settings_override_config() {
        let mut config = Config::default();
        let settings = Settings {
            port: Some(8888),
            client_id: Some("id".to_string()),
            key_mute: Some("x".to_string()),
            ..Default::default()
        };

        settings.apply(&mut config);

        assert_eq!(config.auth.port, 8888);
        assert_eq!(config.auth.client_id.as_deref(), Some("id"));
        assert_eq!(config.auth.client_secret, None);
        assert_eq!(config.shortcuts.mute, "x");
        assert_eq!(config.shortcuts.next, "n");
    }

    #[test]
    fn test_unset_settings_keep_file_values() {
        let mut config = Config::default();
        config.auth.client_id = Some("from-file".to_string());
        config.auth.port = 7000;

        Settings::default().apply(&mut config);

        assert_eq!(config.auth.client_id.as_deref(), Some("from-file"));
        assert_eq!(config.auth.port, 7000);
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["ezspotify", "shortcuts", "--key-next", "j"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Shortcuts)));
        assert_eq!(cli.settings.key_next.as_deref(), Some("j"));

        let cli = Cli::try_parse_from(["ezspotify"]).unwrap();
        assert!(cli.command.is_none());
    }
}
