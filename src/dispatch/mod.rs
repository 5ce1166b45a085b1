use std::sync::Arc;

use tracing::debug;

use crate::models::Action;
use crate::spotify::{PlaybackApi, PlaybackError, TransportCommand};

pub const VOLUME_STEP: i16 = 10;

/// Runs one [`Action`] against the remote player.
///
/// Toggle and volume steps read the player first and then write; nothing
/// guards the gap between the two, so callers must not run actions
/// concurrently if they care about the result.
pub struct ActionDispatcher {
    api: Arc<dyn PlaybackApi>,
}

impl ActionDispatcher {
    pub fn new(api: Arc<dyn PlaybackApi>) -> Self {
        Self { api }
    }

    pub async fn execute(&self, action: Action) -> Result<(), PlaybackError> {
        match action {
            Action::TogglePlayback => {
                let state = self.api.playback_state().await?;
                let command = if state.is_playing {
                    TransportCommand::Pause
                } else {
                    TransportCommand::Play
                };
                debug!("Toggling playback: {command:?}");
                self.api.transport(command).await
            }
            Action::Next => self.api.transport(TransportCommand::Next).await,
            Action::Previous => self.api.transport(TransportCommand::Previous).await,
            Action::VolumeUp => self.adjust_volume(VOLUME_STEP).await,
            Action::VolumeDown => self.adjust_volume(-VOLUME_STEP).await,
            // No memory of the previous level: unmuting is a volume step.
            Action::Mute => self.api.set_volume(0).await,
        }
    }

    async fn adjust_volume(&self, delta: i16) -> Result<(), PlaybackError> {
        let state = self.api.playback_state().await?;
        let volume = step_volume(state.volume_percent, delta);
        debug!("Volume {} -> {volume}", state.volume_percent);
        self.api.set_volume(volume).await
    }
}

pub fn step_volume(current: u8, delta: i16) -> u8 {
    (i16::from(current) + delta).clamp(0, 100) as u8
}
