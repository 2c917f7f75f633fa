//! Combined mode: hold-down and double-tap on the same trigger key.
//!
//! Both detectors see the event stream, with three cross-talk rules:
//!
//! 1. While a locked (toggle-started) recording is active, hold events are
//!    suppressed so the stopping tap is not read as a new hold.
//! 2. While the double-tap detector is in its second phase, the hold
//!    detector is starved so the second press cannot re-trigger an eager
//!    hold start on top of the toggle.
//! 3. Recording-state sync into the double-tap detector is paused while a
//!    hold-press is active, so the first key-up of what becomes a
//!    double-tap is not misread as a single-tap stop.

use std::time::Duration;

use super::{DoubleTapDetector, GestureIntent, HoldDetector};
use crate::listener::InputEvent;

pub struct CombinedDetector {
    hold: HoldDetector,
    dtap: DoubleTapDetector,
}

impl CombinedDetector {
    pub fn new(target: Option<rdev::Key>, short_tap: Duration) -> Self {
        Self {
            hold: HoldDetector::new(target, short_tap),
            dtap: DoubleTapDetector::new(target),
        }
    }

    pub fn handle_event(&mut self, event: &InputEvent) -> Vec<GestureIntent> {
        // Rule 1: a locked recording is stopped by a tap, never by the hold path
        if self.dtap.is_recording() {
            self.hold.reset();
            return self.dtap.handle_event(event).into_iter().collect();
        }

        // Rule 2: starve the hold detector during the second tap phase
        let hold_intent = if self.dtap.in_second_phase() {
            None
        } else {
            self.hold.handle_event(event)
        };
        let dtap_intent = self.dtap.handle_event(event);

        hold_intent.into_iter().chain(dtap_intent).collect()
    }

    pub fn set_recording(&mut self, recording: bool) {
        // Rule 3: a hold-initiated recording is not synced into the
        // double-tap detector while the key is still down
        if !self.hold.is_held() {
            self.dtap.set_recording(recording);
        }
    }

    pub fn reset(&mut self) {
        self.hold.reset();
        self.dtap.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdev::Key;
    use tokio::time::advance;

    const KEY: Key = Key::ShiftLeft;

    fn detector() -> CombinedDetector {
        CombinedDetector::new(Some(KEY), Duration::from_millis(150))
    }

    fn press() -> InputEvent {
        InputEvent::KeyPress(KEY)
    }

    fn release() -> InputEvent {
        InputEvent::KeyRelease(KEY)
    }

    #[tokio::test(start_paused = true)]
    async fn long_hold_starts_and_stops() {
        let mut d = detector();

        assert_eq!(d.handle_event(&press()), vec![GestureIntent::StartHold]);
        // Recording started by the hold; sync pauses while held
        d.set_recording(true);

        advance(Duration::from_millis(400)).await;
        assert_eq!(d.handle_event(&release()), vec![GestureIntent::StopHold]);
        d.set_recording(false);
    }

    #[tokio::test(start_paused = true)]
    async fn double_tap_costs_one_cancelled_start() {
        let mut d = detector();

        // First press: eager hold start
        assert_eq!(d.handle_event(&press()), vec![GestureIntent::StartHold]);
        d.set_recording(true); // paused, hold is held

        // Quick release: the optimistic capture is discarded
        advance(Duration::from_millis(10)).await;
        assert_eq!(
            d.handle_event(&release()),
            vec![GestureIntent::CancelShortTap]
        );
        d.set_recording(false);

        // Second press inside the window: the toggle fires alone, the hold
        // detector is starved
        advance(Duration::from_millis(190)).await;
        assert_eq!(
            d.handle_event(&press()),
            vec![GestureIntent::ToggleDoubleTap]
        );
        d.set_recording(true);

        // Second release drains without firing anything
        advance(Duration::from_millis(10)).await;
        assert_eq!(d.handle_event(&release()), vec![]);
    }

    #[tokio::test(start_paused = true)]
    async fn locked_recording_stopped_by_single_tap_only() {
        let mut d = detector();

        // Locked recording in progress (started by double-tap)
        d.set_recording(true);

        // The stopping tap must not produce hold intents
        advance(Duration::from_millis(500)).await;
        assert_eq!(d.handle_event(&press()), vec![]);
        advance(Duration::from_millis(40)).await;
        assert_eq!(
            d.handle_event(&release()),
            vec![GestureIntent::ToggleDoubleTap]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_key_up_not_misread_as_stop() {
        let mut d = detector();

        // First press of what becomes a double-tap
        assert_eq!(d.handle_event(&press()), vec![GestureIntent::StartHold]);
        // Controller confirms recording while the key is still down; the
        // pause keeps the double-tap detector in "not recording"
        d.set_recording(true);

        advance(Duration::from_millis(10)).await;
        let intents = d.handle_event(&release());
        // Cancel only; no single-tap stop toggle
        assert_eq!(intents, vec![GestureIntent::CancelShortTap]);
    }

    #[tokio::test(start_paused = true)]
    async fn short_tap_alone_cancels_and_nothing_follows() {
        let mut d = detector();

        assert_eq!(d.handle_event(&press()), vec![GestureIntent::StartHold]);
        d.set_recording(true);
        advance(Duration::from_millis(80)).await;
        assert_eq!(
            d.handle_event(&release()),
            vec![GestureIntent::CancelShortTap]
        );
        d.set_recording(false);

        // No second tap: the window lapses quietly
        advance(Duration::from_millis(600)).await;
        assert_eq!(d.handle_event(&press()), vec![GestureIntent::StartHold]);
    }
}
