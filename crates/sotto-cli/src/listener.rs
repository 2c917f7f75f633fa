//! Native input listener boundary.
//!
//! The listener delivers primitive input events into a channel; gesture
//! disambiguation happens downstream in [`crate::gesture`]. The production
//! implementation wraps `rdev::listen` on a dedicated thread with a startup
//! handshake: an error within the handshake window fails `start`, silence
//! means the grab is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use sotto_core::{Error, Result};

/// Primitive event from the input boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyPress(rdev::Key),
    KeyRelease(rdev::Key),
    /// A pointer click on the controller's UI surface (e.g. tray icon)
    Click,
    /// The native listener died; the supervisor decides on a restart
    ListenerError(String),
}

pub trait InputListener: Send + 'static {
    /// Begin delivering events into `tx`. A startup failure is returned
    /// directly; a later crash arrives as [`InputEvent::ListenerError`].
    fn start(&mut self, tx: UnboundedSender<InputEvent>) -> Result<()>;

    /// Stop delivering events. The backing thread may outlive this call.
    fn stop(&mut self);
}

const STARTUP_HANDSHAKE_MS: u64 = 500;

/// Global keyboard listener over `rdev::listen`.
pub struct RdevListener {
    active: Arc<AtomicBool>,
}

impl RdevListener {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for RdevListener {
    fn default() -> Self {
        Self::new()
    }
}

impl InputListener for RdevListener {
    fn start(&mut self, tx: UnboundedSender<InputEvent>) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        let (startup_tx, startup_rx) = std::sync::mpsc::channel::<String>();

        let event_tx = tx.clone();
        std::thread::spawn(move || {
            let callback_active = Arc::clone(&active);
            let callback = move |event: rdev::Event| {
                if !callback_active.load(Ordering::SeqCst) {
                    return;
                }
                let mapped = match event.event_type {
                    rdev::EventType::KeyPress(key) => Some(InputEvent::KeyPress(key)),
                    rdev::EventType::KeyRelease(key) => Some(InputEvent::KeyRelease(key)),
                    _ => None,
                };
                if let Some(mapped) = mapped {
                    let _ = event_tx.send(mapped);
                }
            };

            // listen() blocks this thread for the lifetime of the grab
            if let Err(e) = rdev::listen(callback) {
                let reason = format!("{e:?}");
                active.store(false, Ordering::SeqCst);
                let _ = startup_tx.send(reason.clone());
                let _ = tx.send(InputEvent::ListenerError(reason));
            }
        });

        // An error inside the handshake window means startup failed;
        // no message means the grab is up and blocking.
        match startup_rx.recv_timeout(Duration::from_millis(STARTUP_HANDSHAKE_MS)) {
            Ok(reason) => Err(Error::ListenerCrashed(reason)),
            Err(_) => Ok(()),
        }
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
