use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Leeway applied when deciding whether an access token is still usable.
pub const EXPIRY_SKEW_SECS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expiry: Utc::now() + Duration::seconds(expires_in_secs),
            token_type: default_token_type(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// The fixed set of remote operations a shortcut can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    TogglePlayback,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    Mute,
}

impl Action {
    pub fn display_name(&self) -> &'static str {
        match self {
            Action::TogglePlayback => "Play/Pause",
            Action::Next => "Next Track",
            Action::Previous => "Previous Track",
            Action::VolumeUp => "Volume Up",
            Action::VolumeDown => "Volume Down",
            Action::Mute => "Mute",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// What fires a binding. Keyboard characters and hardware codes never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Key(char),
    MediaKey(u32),
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Key(' ') => write!(f, "[Space]"),
            Trigger::Key(c) => write!(f, "[{c}]"),
            Trigger::MediaKey(code) => write!(f, "[media {code}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutBinding {
    pub trigger: Trigger,
    pub display_name: String,
    pub action: Action,
}

impl ShortcutBinding {
    pub fn new(trigger: Trigger, action: Action) -> Self {
        Self {
            trigger,
            display_name: action.display_name().to_string(),
            action,
        }
    }
}

/// Snapshot of the remote player as reported by `GET /me/player`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub volume_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Pressed,
    Released,
}

/// A raw event from the global hardware key source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookEvent {
    pub kind: KeyEventKind,
    pub raw_code: u32,
}

impl HookEvent {
    pub fn pressed(raw_code: u32) -> Self {
        Self {
            kind: KeyEventKind::Pressed,
            raw_code,
        }
    }

    pub fn released(raw_code: u32) -> Self {
        Self {
            kind: KeyEventKind::Released,
            raw_code,
        }
    }
}
