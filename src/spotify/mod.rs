use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::auth::{AuthError, AutoRefreshingTokenSource};
use crate::models::PlaybackState;

pub const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no active device")]
    NoActiveDevice,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected player response: {0}")]
    Decode(String),
    #[error("Spotify returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<reqwest::Error> for PlaybackError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Pause,
    Next,
    Previous,
}

impl TransportCommand {
    fn method(&self) -> Method {
        match self {
            TransportCommand::Play | TransportCommand::Pause => Method::PUT,
            TransportCommand::Next | TransportCommand::Previous => Method::POST,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            TransportCommand::Play => "/me/player/play",
            TransportCommand::Pause => "/me/player/pause",
            TransportCommand::Next => "/me/player/next",
            TransportCommand::Previous => "/me/player/previous",
        }
    }
}

/// The remote player operations the dispatcher builds on.
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    async fn playback_state(&self) -> Result<PlaybackState, PlaybackError>;
    async fn transport(&self, command: TransportCommand) -> Result<(), PlaybackError>;
    async fn set_volume(&self, percent: u8) -> Result<(), PlaybackError>;
}

/// Web API client authorised through the shared token source.
pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<AutoRefreshingTokenSource>,
}

impl SpotifyClient {
    pub fn new(tokens: Arc<AutoRefreshingTokenSource>) -> Self {
        Self {
            http: crate::http::client(),
            base_url: API_BASE.to_string(),
            tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, PlaybackError> {
        let credential = self.tokens.token().await?;
        let url = format!("{}{path}", self.base_url);
        debug!("{method} {url}");

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&credential.access_token)
            .query(query);
        if method != Method::GET {
            // The player endpoints reject body-less PUT/POST without a length.
            request = request.header(reqwest::header::CONTENT_LENGTH, 0);
        }

        let resp = request.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(api_error(resp).await)
    }
}

#[async_trait]
impl PlaybackApi for SpotifyClient {
    async fn playback_state(&self) -> Result<PlaybackState, PlaybackError> {
        let resp = self.request(Method::GET, "/me/player", &[]).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Err(PlaybackError::NoActiveDevice);
        }

        let body = resp.bytes().await?;
        let player: PlayerResponse =
            serde_json::from_slice(&body).map_err(|e| PlaybackError::Decode(e.to_string()))?;
        let volume = player
            .device
            .and_then(|d| d.volume_percent)
            .unwrap_or(0)
            .min(100) as u8;
        Ok(PlaybackState {
            is_playing: player.is_playing,
            volume_percent: volume,
        })
    }

    async fn transport(&self, command: TransportCommand) -> Result<(), PlaybackError> {
        self.request(command.method(), command.path(), &[]).await?;
        Ok(())
    }

    async fn set_volume(&self, percent: u8) -> Result<(), PlaybackError> {
        let percent = percent.min(100);
        self.request(
            Method::PUT,
            "/me/player/volume",
            &[("volume_percent", percent.to_string())],
        )
        .await?;
        Ok(())
    }
}

async fn api_error(resp: reqwest::Response) -> PlaybackError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(ApiErrorResponse { error }) if error.reason.as_deref() == Some("NO_ACTIVE_DEVICE") => {
            PlaybackError::NoActiveDevice
        }
        Ok(ApiErrorResponse { error }) => PlaybackError::Api {
            status: status.as_u16(),
            message: error.message,
        },
        Err(_) => PlaybackError::Api {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        },
    }
}

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    #[serde(default)]
    is_playing: bool,
    device: Option<DeviceResponse>,
}

#[derive(Debug, Deserialize)]
struct DeviceResponse {
    volume_percent: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    reason: Option<String>,
}
