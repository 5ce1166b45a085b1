use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Action, ShortcutBinding, Trigger};

/// Always quits the interactive loop; no binding may claim it.
pub const QUIT_KEY: char = 'q';

pub const MEDIA_PLAY_PAUSE: u32 = 179;
pub const MEDIA_NEXT: u32 = 176;
pub const MEDIA_PREVIOUS: u32 = 177;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortcutError {
    #[error("shortcut for {0} is empty")]
    Empty(Action),
    #[error("key '{key}' is bound to both {first} and {second}")]
    Duplicate {
        key: char,
        first: Action,
        second: Action,
    },
    #[error("key '{key}' is reserved for quitting and cannot be bound to {action}")]
    Reserved { key: char, action: Action },
}

/// Raw shortcut values as configured. Only the first character of each is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutConfig {
    pub play_pause: String,
    pub next: String,
    pub prev: String,
    pub volume_up: String,
    pub volume_down: String,
    pub mute: String,
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            play_pause: " ".to_string(),
            next: "n".to_string(),
            prev: "p".to_string(),
            volume_up: "+".to_string(),
            volume_down: "-".to_string(),
            mute: "m".to_string(),
        }
    }
}

impl ShortcutConfig {
    fn entries(&self) -> [(Action, &str); 6] {
        [
            (Action::TogglePlayback, self.play_pause.as_str()),
            (Action::Next, self.next.as_str()),
            (Action::Previous, self.prev.as_str()),
            (Action::VolumeUp, self.volume_up.as_str()),
            (Action::VolumeDown, self.volume_down.as_str()),
            (Action::Mute, self.mute.as_str()),
        ]
    }
}

/// Immutable lookup from keyboard characters and media-key codes to actions.
#[derive(Debug, Clone)]
pub struct ShortcutTable {
    bindings: Vec<ShortcutBinding>,
    keys: HashMap<char, Action>,
    media: HashMap<u32, Action>,
}

impl ShortcutTable {
    pub fn from_config(config: &ShortcutConfig) -> Result<Self, ShortcutError> {
        let mut bindings = Vec::new();
        let mut keys = HashMap::new();

        for (action, value) in config.entries() {
            let key = value.chars().next().ok_or(ShortcutError::Empty(action))?;
            if key == QUIT_KEY {
                return Err(ShortcutError::Reserved { key, action });
            }
            if let Some(&first) = keys.get(&key) {
                return Err(ShortcutError::Duplicate {
                    key,
                    first,
                    second: action,
                });
            }
            keys.insert(key, action);
            bindings.push(ShortcutBinding::new(Trigger::Key(key), action));
        }

        let media = [
            (MEDIA_PLAY_PAUSE, Action::TogglePlayback),
            (MEDIA_NEXT, Action::Next),
            (MEDIA_PREVIOUS, Action::Previous),
        ];
        for (code, action) in media {
            bindings.push(ShortcutBinding::new(Trigger::MediaKey(code), action));
        }

        Ok(Self {
            bindings,
            keys,
            media: media.into_iter().collect(),
        })
    }

    pub fn lookup_key(&self, key: char) -> Option<Action> {
        self.keys.get(&key).copied()
    }

    pub fn lookup_media(&self, raw_code: u32) -> Option<Action> {
        self.media.get(&raw_code).copied()
    }

    /// Lines printed when the controller starts.
    pub fn legend(&self) -> Vec<String> {
        let (keys, media): (Vec<_>, Vec<_>) = self
            .bindings
            .iter()
            .partition(|b| matches!(b.trigger, Trigger::Key(_)));

        let mut lines: Vec<String> = keys
            .iter()
            .map(|b| format!("  {} - {}", b.trigger, b.display_name))
            .collect();
        lines.push(format!("  {} - Quit", Trigger::Key(QUIT_KEY)));

        let media: Vec<_> = media.iter().map(|b| b.action.display_name()).collect();
        lines.push(format!(
            "  Media keys ({}) are also supported",
            media.join(", ")
        ));
        lines
    }
}
