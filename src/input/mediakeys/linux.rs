//! MPRIS endpoint on the session bus. Desktop media-key daemons route
//! Play/Pause, Next and Previous to the active MPRIS player, so claiming a
//! player name is how a terminal program receives those keys on Linux.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zbus::{connection, interface};

use crate::config::{MEDIA_NEXT, MEDIA_PLAY_PAUSE, MEDIA_PREVIOUS};
use crate::models::HookEvent;

pub const BUS_NAME: &str = "org.mpris.MediaPlayer2.ezspotify";
pub const OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";

pub async fn serve(events: mpsc::Sender<HookEvent>, cancel: CancellationToken) -> zbus::Result<()> {
    let _connection = connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, Root)?
        .serve_at(OBJECT_PATH, Player { events })?
        .build()
        .await?;
    info!("Listening for media keys as {BUS_NAME}");

    cancel.cancelled().await;
    Ok(())
}

struct Root;

#[interface(name = "org.mpris.MediaPlayer2")]
impl Root {
    fn raise(&self) {}

    fn quit(&self) {}

    #[zbus(property)]
    fn can_quit(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn can_raise(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn has_track_list(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn identity(&self) -> String {
        "ezspotify".to_string()
    }

    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Vec<String> {
        Vec::new()
    }

    #[zbus(property)]
    fn supported_mime_types(&self) -> Vec<String> {
        Vec::new()
    }
}

struct Player {
    events: mpsc::Sender<HookEvent>,
}

impl Player {
    /// A bus call is a full key press: down then up.
    fn press(&self, raw_code: u32) {
        for event in [HookEvent::pressed(raw_code), HookEvent::released(raw_code)] {
            if let Err(e) = self.events.try_send(event) {
                debug!("Dropping media key event: {e}");
            }
        }
    }
}

#[interface(name = "org.mpris.MediaPlayer2.Player")]
impl Player {
    fn play_pause(&self) {
        self.press(MEDIA_PLAY_PAUSE);
    }

    fn next(&self) {
        self.press(MEDIA_NEXT);
    }

    fn previous(&self) {
        self.press(MEDIA_PREVIOUS);
    }

    // Only the toggle is mapped to a key.
    fn play(&self) {}

    fn pause(&self) {}

    fn stop(&self) {}

    #[zbus(property)]
    fn playback_status(&self) -> String {
        "Playing".to_string()
    }

    #[zbus(property)]
    fn can_control(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_play(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_pause(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_go_next(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_go_previous(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_seek(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyEventKind;

    #[test]
    fn test_press_emits_down_then_up() {
        let (tx, mut rx) = mpsc::channel(4);
        let player = Player { events: tx };

        player.press(MEDIA_NEXT);

        let down = rx.try_recv().unwrap();
        let up = rx.try_recv().unwrap();
        assert_eq!((down.kind, down.raw_code), (KeyEventKind::Pressed, 176));
        assert_eq!((up.kind, up.raw_code), (KeyEventKind::Released, 176));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_press_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let player = Player { events: tx };

        player.press(MEDIA_PLAY_PAUSE);

        assert_eq!(rx.try_recv().unwrap(), HookEvent::pressed(179));
        assert!(rx.try_recv().is_err());
    }
}
