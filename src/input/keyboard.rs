use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{Queued, Source};
use crate::config::{QUIT_KEY, ShortcutTable};

pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Escape,
    Interrupt,
    Other,
}

/// A blocking source of keypresses.
pub trait KeySource: Send + 'static {
    /// Wait up to `timeout` for one key. `Ok(None)` means nothing arrived.
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<KeyInput>>;
}

/// The controlling terminal, held in raw mode for as long as this value lives.
pub struct TerminalKeys {
    _private: (),
}

impl TerminalKeys {
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal: {e}");
        }
    }
}

impl KeySource for TerminalKeys {
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<KeyInput>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        let Event::Key(key) = event::read()? else {
            return Ok(Some(KeyInput::Other));
        };
        if key.kind != KeyEventKind::Press {
            return Ok(Some(KeyInput::Other));
        }

        let input = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                KeyInput::Interrupt
            }
            KeyCode::Char(c) => KeyInput::Char(c),
            KeyCode::Esc => KeyInput::Escape,
            _ => KeyInput::Other,
        };
        Ok(Some(input))
    }
}

/// Interactive producer. Runs on a blocking thread until a quit key is read,
/// `cancel` fires, or the queue closes. A quit key cancels `cancel`.
pub fn read_keys<K: KeySource>(
    mut keys: K,
    shortcuts: &ShortcutTable,
    queue: &mpsc::Sender<Queued>,
    cancel: &CancellationToken,
) {
    while !cancel.is_cancelled() {
        let input = match keys.next_key(POLL_INTERVAL) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(e) => {
                error!("Error reading key: {e}");
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }
        };

        match input {
            KeyInput::Char(QUIT_KEY) | KeyInput::Escape | KeyInput::Interrupt => {
                debug!("Quit requested from keyboard");
                cancel.cancel();
                break;
            }
            KeyInput::Char(c) => match shortcuts.lookup_key(c) {
                Some(action) => {
                    if queue
                        .blocking_send(Queued {
                            action,
                            source: Source::Keyboard,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                None => debug!("No shortcut for {c:?}"),
            },
            KeyInput::Other => {}
        }
    }
}
