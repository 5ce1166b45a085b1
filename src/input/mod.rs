//! Merges keyboard and media-key input into one serialized action queue.

mod keyboard;
pub mod mediakeys;

pub use keyboard::{KeySource, TerminalKeys};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::ShortcutTable;
use crate::console;
use crate::dispatch::ActionDispatcher;
use crate::models::{Action, HookEvent, KeyEventKind};

const QUEUE_CAPACITY: usize = 32;
/// How long queued and in-flight actions may keep running after quit.
const QUIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Keyboard,
    MediaKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Queued {
    pub action: Action,
    pub source: Source,
}

pub struct InputMultiplexer {
    dispatcher: Arc<ActionDispatcher>,
    shortcuts: Arc<ShortcutTable>,
    cancel: CancellationToken,
}

impl InputMultiplexer {
    pub fn new(
        dispatcher: Arc<ActionDispatcher>,
        shortcuts: ShortcutTable,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            shortcuts: Arc::new(shortcuts),
            cancel,
        }
    }

    /// Run until the keyboard asks to quit or the token is cancelled. Every
    /// task started here has finished by the time this returns.
    pub async fn run<K: KeySource>(self, keys: K, hook_events: mpsc::Receiver<HookEvent>) {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);

        let consumer = tokio::spawn(consume(
            queue_rx,
            self.dispatcher.clone(),
            self.cancel.clone(),
        ));
        let hooks = tokio::spawn(forward_hook_events(
            hook_events,
            self.shortcuts.clone(),
            queue_tx.clone(),
            self.cancel.clone(),
        ));
        let keyboard = {
            let shortcuts = self.shortcuts.clone();
            let cancel = self.cancel.clone();
            tokio::task::spawn_blocking(move || {
                keyboard::read_keys(keys, &shortcuts, &queue_tx, &cancel)
            })
        };

        if let Err(e) = keyboard.await {
            error!("Keyboard reader failed: {e}");
        }
        self.cancel.cancel();

        if let Err(e) = hooks.await {
            error!("Media key producer failed: {e}");
        }
        if let Err(e) = consumer.await {
            error!("Dispatch loop failed: {e}");
        }
        debug!("Input multiplexer stopped");
    }
}

/// Hook producer: keeps key-down events with a known media code.
async fn forward_hook_events(
    mut events: mpsc::Receiver<HookEvent>,
    shortcuts: Arc<ShortcutTable>,
    queue: mpsc::Sender<Queued>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    debug!("Media key source closed");
                    break;
                }
            },
        };

        if event.kind != KeyEventKind::Pressed {
            continue;
        }
        let Some(action) = shortcuts.lookup_media(event.raw_code) else {
            debug!("Ignoring media key code {}", event.raw_code);
            continue;
        };
        let queued = Queued {
            action,
            source: Source::MediaKey,
        };
        if queue.send(queued).await.is_err() {
            break;
        }
    }
}

/// The single consumer. Actions already queued when `cancel` fires still run,
/// but anything unfinished `QUIT_GRACE` after that is abandoned.
async fn consume(
    mut queue: mpsc::Receiver<Queued>,
    dispatcher: Arc<ActionDispatcher>,
    cancel: CancellationToken,
) {
    let grace_over = async {
        cancel.cancelled().await;
        tokio::time::sleep(QUIT_GRACE).await;
    };
    tokio::pin!(grace_over);

    loop {
        let queued = tokio::select! {
            biased;
            queued = queue.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        let name = queued.action.display_name();
        match queued.source {
            Source::Keyboard => console::line(format!("Executing: {name}")),
            Source::MediaKey => console::line(format!("Media key: {name}")),
        }
        tokio::select! {
            result = dispatcher.execute(queued.action) => {
                if let Err(e) = result {
                    warn!("{name} failed: {e}");
                    console::line(format!("Error executing {name}: {e}"));
                }
            }
            _ = &mut grace_over => {
                warn!("Abandoning {name} on quit");
                break;
            }
        }
    }
}
