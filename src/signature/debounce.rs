//! Debounced canvas resize

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::StrokePad;

/// Quiet period before a resize is applied
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
struct CanvasSize {
    css_width: f32,
    css_height: f32,
    ratio: f32,
}

/// Applies only the last of a burst of resize events, `wait` after it.
///
/// Dropping the debouncer flushes a pending resize and ends the task.
pub struct ResizeDebouncer {
    tx: mpsc::UnboundedSender<CanvasSize>,
}

impl ResizeDebouncer {
    pub fn spawn(pad: Arc<Mutex<StrokePad>>, wait: Duration) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<CanvasSize>();

        let handle = tokio::spawn(async move {
            while let Some(mut latest) = rx.recv().await {
                let closed = loop {
                    match tokio::time::timeout(wait, rx.recv()).await {
                        Ok(Some(size)) => latest = size,
                        Ok(None) => break true,
                        Err(_) => break false,
                    }
                };

                debug!(
                    "Applying canvas resize {}x{} @{}",
                    latest.css_width, latest.css_height, latest.ratio
                );
                if let Ok(mut pad) = pad.lock() {
                    pad.resize(latest.css_width, latest.css_height, latest.ratio);
                }

                if closed {
                    break;
                }
            }
        });

        (Self { tx }, handle)
    }

    /// Report a window resize
    pub fn notify(&self, css_width: f32, css_height: f32, device_pixel_ratio: f32) {
        let _ = self.tx.send(CanvasSize {
            css_width,
            css_height,
            ratio: device_pixel_ratio,
        });
    }
}
