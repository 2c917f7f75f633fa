//! Gesture detection over primitive input events.
//!
//! Three modes sharing the same listener stream:
//!
//! **Hold-down**: key-down starts recording immediately (optimistic start);
//! a release before the short-tap threshold cancels the capture, a later
//! release stops and transcribes.
//!
//! **Double-tap**: two quick presses inside the window start a locked
//! recording; the toggle fires on the second key-down. Once recording, a
//! single tap stops.
//!
//! **Both**: runs the two detectors concurrently with cross-talk
//! suppression (see [`combined`]).
//!
//! All detectors reject modifier+letter combos (e.g. Shift+A is typing,
//! not a gesture) and apply a short cooldown after firing.

mod combined;
mod double_tap;
mod hold;
mod pointer;

pub use combined::CombinedDetector;
pub use double_tap::DoubleTapDetector;
pub use hold::HoldDetector;
pub use pointer::{ClickArbiter, ClickDecision};

use rdev::Key;
use std::time::Duration;

use crate::listener::InputEvent;
use sotto_core::GestureMode;

/// Threshold separating a short (cancelled) tap from a deliberate hold.
pub const SHORT_TAP_MS: u64 = 150;

/// Max duration a tap may be held before it stops counting as a tap.
pub const TAP_MAX_HOLD_MS: u64 = 200;

/// Max gap between the first key-up and the second key-down of a double-tap.
pub const DOUBLE_TAP_WINDOW_MS: u64 = 400;

/// Delay a single click is buffered before it fires.
pub const CLICK_DELAY_MS: u64 = 250;

/// Backoff before the single automatic listener restart.
pub const LISTENER_RESTART_DELAY_MS: u64 = 2000;

/// Cooldown after a detector fires, suppressing bounce re-triggers.
const COOLDOWN_MS: u64 = 50;

/// High-level intent emitted toward the session controller. Ephemeral,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureIntent {
    StartHold,
    StopHold,
    ToggleDoubleTap,
    CancelShortTap,
}

/// Check if a key is any modifier key.
fn is_modifier(key: Key) -> bool {
    matches!(
        key,
        Key::ShiftLeft
            | Key::ShiftRight
            | Key::Alt
            | Key::AltGr
            | Key::ControlLeft
            | Key::ControlRight
            | Key::MetaLeft
            | Key::MetaRight
    )
}

/// Map a hotkey name from settings to an rdev key.
pub fn hotkey_to_key(hotkey: &str) -> Option<Key> {
    match hotkey {
        "alt_l" => Some(Key::Alt),
        "alt_r" | "alt_gr" => Some(Key::AltGr),
        "shift_l" => Some(Key::ShiftLeft),
        "shift_r" => Some(Key::ShiftRight),
        "ctrl_l" => Some(Key::ControlLeft),
        "ctrl_r" => Some(Key::ControlRight),
        "cmd_l" | "meta_l" => Some(Key::MetaLeft),
        "cmd_r" | "meta_r" => Some(Key::MetaRight),
        "caps_lock" => Some(Key::CapsLock),
        "space" => Some(Key::Space),
        "f1" => Some(Key::F1),
        "f2" => Some(Key::F2),
        "f3" => Some(Key::F3),
        "f4" => Some(Key::F4),
        "f5" => Some(Key::F5),
        "f6" => Some(Key::F6),
        "f7" => Some(Key::F7),
        "f8" => Some(Key::F8),
        "f9" => Some(Key::F9),
        "f10" => Some(Key::F10),
        "f11" => Some(Key::F11),
        "f12" => Some(Key::F12),
        _ => None,
    }
}

/// Mode-dispatching facade owned by the session controller.
pub enum GestureDetector {
    HoldDown(HoldDetector),
    DoubleTap(DoubleTapDetector),
    Both(CombinedDetector),
}

impl GestureDetector {
    pub fn new(mode: GestureMode, target: Option<Key>, short_tap: Duration) -> Self {
        match mode {
            GestureMode::HoldDown => Self::HoldDown(HoldDetector::new(target, short_tap)),
            GestureMode::DoubleTap => Self::DoubleTap(DoubleTapDetector::new(target)),
            GestureMode::Both => Self::Both(CombinedDetector::new(target, short_tap)),
        }
    }

    pub fn handle_event(&mut self, event: &InputEvent) -> Vec<GestureIntent> {
        match self {
            Self::HoldDown(d) => d.handle_event(event).into_iter().collect(),
            Self::DoubleTap(d) => d.handle_event(event).into_iter().collect(),
            Self::Both(d) => d.handle_event(event),
        }
    }

    /// Synchronize the session's recording state into the detectors.
    pub fn set_recording(&mut self, recording: bool) {
        match self {
            Self::HoldDown(_) => {}
            Self::DoubleTap(d) => d.set_recording(recording),
            Self::Both(d) => d.set_recording(recording),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::HoldDown(d) => d.reset(),
            Self::DoubleTap(d) => d.reset(),
            Self::Both(d) => d.reset(),
        }
    }
}
