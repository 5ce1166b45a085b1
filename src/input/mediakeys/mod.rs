//! Platform sources of global media-key events.

#[cfg(target_os = "linux")]
mod linux;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
#[cfg(not(target_os = "linux"))]
use tracing::info;
#[cfg(target_os = "linux")]
use tracing::warn;

use crate::models::HookEvent;

pub const EVENT_BUFFER: usize = 16;

/// Feed media-key events into `events` until `cancel` fires. When the
/// platform offers no source this just waits for cancellation.
pub async fn listen(events: mpsc::Sender<HookEvent>, cancel: CancellationToken) {
    #[cfg(target_os = "linux")]
    {
        if let Err(e) = linux::serve(events, cancel.clone()).await {
            warn!("Media keys unavailable: {e}");
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        drop(events);
        info!("Media keys are not supported on this platform");
    }

    cancel.cancelled().await;
}
