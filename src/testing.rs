//! Shared fakes for unit tests.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Credential, PlaybackState};
use crate::spotify::{PlaybackApi, PlaybackError, TransportCommand};
use crate::store::{CredentialStore, StoreError};

#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<Credential>>,
    saves: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn with(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Credential, StoreError> {
        self.credential
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| StoreError::NotFound("memory".into()))
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.credential.lock().unwrap() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.credential.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    GetState,
    Transport(TransportCommand),
    SetVolume(u8),
}

/// In-memory player that applies writes to its own state.
#[derive(Default)]
pub struct FakePlayer {
    state: Mutex<Option<PlaybackState>>,
    calls: Mutex<Vec<Call>>,
    read_delay: Option<Duration>,
}

impl FakePlayer {
    pub fn with_state(state: PlaybackState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Default::default()
        }
    }

    /// No active device: state reads fail.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn volume(&self) -> Option<u8> {
        self.state.lock().unwrap().map(|s| s.volume_percent)
    }

    pub fn is_playing(&self) -> Option<bool> {
        self.state.lock().unwrap().map(|s| s.is_playing)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlaybackApi for FakePlayer {
    async fn playback_state(&self) -> Result<PlaybackState, PlaybackError> {
        self.record(Call::GetState);
        let state = *self.state.lock().unwrap();
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        state.ok_or(PlaybackError::NoActiveDevice)
    }

    async fn transport(&self, command: TransportCommand) -> Result<(), PlaybackError> {
        self.record(Call::Transport(command));
        if let Some(state) = self.state.lock().unwrap().as_mut() {
            match command {
                TransportCommand::Play => state.is_playing = true,
                TransportCommand::Pause => state.is_playing = false,
                TransportCommand::Next | TransportCommand::Previous => {}
            }
        }
        Ok(())
    }

    async fn set_volume(&self, percent: u8) -> Result<(), PlaybackError> {
        self.record(Call::SetVolume(percent));
        if let Some(state) = self.state.lock().unwrap().as_mut() {
            state.volume_percent = percent;
        }
        Ok(())
    }
}

/// A loopback address with a port that was free a moment ago.
pub fn free_loopback_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Play the browser's part: retry until the listener is up, then hit `/callback`.
pub async fn send_callback(addr: SocketAddr, query: &'static str) {
    let url = format!("http://{addr}/callback?{query}");
    for _ in 0..200 {
        if reqwest::get(&url).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("callback listener never came up on {addr}");
}
