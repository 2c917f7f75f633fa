//! Double-tap detection.
//!
//! Start: Idle → FirstDown → AwaitSecondDown → fire on the second key-down.
//! Stop: while recording, a single tap fires on its release.
//! A lone key-down with no follow-up inside the window never starts
//! recording, which keeps accidental presses from triggering a capture.

use std::time::Duration;
use tokio::time::Instant;

use super::{is_modifier, GestureIntent, COOLDOWN_MS, DOUBLE_TAP_WINDOW_MS, TAP_MAX_HOLD_MS};
use crate::listener::InputEvent;

#[derive(Debug, Clone, Copy, PartialEq)]
enum TapState {
    Idle,
    /// First press seen, waiting for its release
    FirstDown { at: Instant },
    /// First tap complete, waiting for the second press inside the window
    AwaitSecondDown { at: Instant },
    /// Fired on the second press; swallow its release
    DrainSecondUp,
}

pub struct DoubleTapDetector {
    state: TapState,
    target: Option<rdev::Key>,
    recording: bool,
    last_fired_at: Option<Instant>,
    tap_max: Duration,
    window: Duration,
}

impl DoubleTapDetector {
    pub fn new(target: Option<rdev::Key>) -> Self {
        Self {
            state: TapState::Idle,
            target,
            recording: false,
            last_fired_at: None,
            tap_max: Duration::from_millis(TAP_MAX_HOLD_MS),
            window: Duration::from_millis(DOUBLE_TAP_WINDOW_MS),
        }
    }

    /// Told by the controller whether a recording is active. When recording,
    /// a single tap fires (to stop); when idle, a double-tap is required.
    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// True while the detector is between the first tap and the completion
    /// of the second, used by combined mode to starve the hold detector.
    pub fn in_second_phase(&self) -> bool {
        match self.state {
            TapState::AwaitSecondDown { at } => at.elapsed() <= self.window,
            TapState::DrainSecondUp => true,
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.state = TapState::Idle;
    }

    fn in_cooldown(&self) -> bool {
        self.last_fired_at
            .map(|t| t.elapsed() < Duration::from_millis(COOLDOWN_MS))
            .unwrap_or(false)
    }

    fn fire(&mut self) -> Option<GestureIntent> {
        self.last_fired_at = Some(Instant::now());
        Some(GestureIntent::ToggleDoubleTap)
    }

    pub fn handle_event(&mut self, event: &InputEvent) -> Option<GestureIntent> {
        let target = self.target?;

        match self.state {
            TapState::Idle => {
                if let InputEvent::KeyPress(key) = event {
                    if *key == target && !self.in_cooldown() {
                        self.state = TapState::FirstDown { at: Instant::now() };
                    }
                }
                None
            }

            TapState::FirstDown { at } => match event {
                InputEvent::KeyRelease(key) if *key == target => {
                    if at.elapsed() > self.tap_max {
                        // Held too long, not a tap
                        self.state = TapState::Idle;
                        return None;
                    }
                    if self.recording {
                        // Single tap stops an active recording
                        self.state = TapState::Idle;
                        return self.fire();
                    }
                    self.state = TapState::AwaitSecondDown { at: Instant::now() };
                    None
                }
                // Key repeat; reject once the press outlives a tap
                InputEvent::KeyPress(key) if *key == target => {
                    if at.elapsed() > self.tap_max {
                        self.state = TapState::Idle;
                    }
                    None
                }
                // Typing a combo
                InputEvent::KeyPress(key) if !is_modifier(*key) => {
                    self.state = TapState::Idle;
                    None
                }
                _ => {
                    if at.elapsed() > self.tap_max {
                        self.state = TapState::Idle;
                    }
                    None
                }
            },

            TapState::AwaitSecondDown { at } => {
                if at.elapsed() > self.window {
                    self.state = TapState::Idle;
                    return None;
                }
                match event {
                    InputEvent::KeyPress(key) if *key == target => {
                        // Second press inside the window: recording starts now
                        self.state = TapState::DrainSecondUp;
                        self.fire()
                    }
                    InputEvent::KeyPress(_) => {
                        self.state = TapState::Idle;
                        None
                    }
                    _ => None,
                }
            }

            TapState::DrainSecondUp => match event {
                InputEvent::KeyRelease(key) if *key == target => {
                    self.state = TapState::Idle;
                    None
                }
                InputEvent::KeyPress(key) if *key == target => None,
                InputEvent::KeyPress(_) => {
                    self.state = TapState::Idle;
                    None
                }
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdev::Key;
    use tokio::time::advance;

    fn detector(key: Key) -> DoubleTapDetector {
        DoubleTapDetector::new(Some(key))
    }

    fn press(key: Key) -> InputEvent {
        InputEvent::KeyPress(key)
    }

    fn release(key: Key) -> InputEvent {
        InputEvent::KeyRelease(key)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_on_second_down_inside_window() {
        let mut d = detector(Key::ShiftLeft);

        // down@0, up@10, down@200, window 400
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
        advance(Duration::from_millis(10)).await;
        assert_eq!(d.handle_event(&release(Key::ShiftLeft)), None);
        advance(Duration::from_millis(190)).await;
        assert_eq!(
            d.handle_event(&press(Key::ShiftLeft)),
            Some(GestureIntent::ToggleDoubleTap)
        );

        // The second release is swallowed
        advance(Duration::from_millis(10)).await;
        assert_eq!(d.handle_event(&release(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn lone_press_never_starts() {
        let mut d = detector(Key::ShiftLeft);

        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
        advance(Duration::from_millis(10)).await;
        assert_eq!(d.handle_event(&release(Key::ShiftLeft)), None);

        // Nothing follows within the window; a much later tap starts a
        // fresh sequence instead of completing the old one
        advance(Duration::from_millis(1000)).await;
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_gap_rejects() {
        let mut d = detector(Key::ShiftLeft);

        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(10)).await;
        d.handle_event(&release(Key::ShiftLeft));

        // 450 ms gap exceeds the 400 ms window
        advance(Duration::from_millis(450)).await;
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tap_held_too_long_rejects() {
        let mut d = detector(Key::ShiftLeft);

        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(350)).await;
        assert_eq!(d.handle_event(&release(Key::ShiftLeft)), None);

        // Not armed: a following press starts over
        advance(Duration::from_millis(50)).await;
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn single_tap_stops_when_recording() {
        let mut d = detector(Key::ShiftLeft);
        d.set_recording(true);

        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
        advance(Duration::from_millis(50)).await;
        assert_eq!(
            d.handle_event(&release(Key::ShiftLeft)),
            Some(GestureIntent::ToggleDoubleTap)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn long_press_does_not_stop_recording() {
        let mut d = detector(Key::ShiftLeft);
        d.set_recording(true);

        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(350)).await;
        assert_eq!(d.handle_event(&release(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn combo_press_rejects_sequence() {
        let mut d = detector(Key::ShiftLeft);

        d.handle_event(&press(Key::ShiftLeft));
        assert_eq!(d.handle_event(&press(Key::KeyA)), None);

        // Sequence was abandoned; release and a tap do not complete anything
        d.handle_event(&release(Key::ShiftLeft));
        advance(Duration::from_millis(20)).await;
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn other_key_between_taps_rejects() {
        let mut d = detector(Key::ShiftLeft);

        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(10)).await;
        d.handle_event(&release(Key::ShiftLeft));

        advance(Duration::from_millis(50)).await;
        d.handle_event(&press(Key::KeyA));

        // Second target press no longer completes a double-tap
        advance(Duration::from_millis(20)).await;
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_suppresses_immediate_refire() {
        let mut d = detector(Key::ShiftLeft);

        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(10)).await;
        d.handle_event(&release(Key::ShiftLeft));
        advance(Duration::from_millis(50)).await;
        assert!(d.handle_event(&press(Key::ShiftLeft)).is_some());
        advance(Duration::from_millis(10)).await;
        d.handle_event(&release(Key::ShiftLeft));

        // Another press right away is inside the cooldown
        advance(Duration::from_millis(10)).await;
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_double_tap_start_single_tap_stop() {
        let mut d = detector(Key::ShiftLeft);

        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(10)).await;
        d.handle_event(&release(Key::ShiftLeft));
        advance(Duration::from_millis(100)).await;
        assert!(d.handle_event(&press(Key::ShiftLeft)).is_some());
        advance(Duration::from_millis(10)).await;
        d.handle_event(&release(Key::ShiftLeft));

        d.set_recording(true);
        advance(Duration::from_millis(500)).await;

        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(40)).await;
        assert_eq!(
            d.handle_event(&release(Key::ShiftLeft)),
            Some(GestureIntent::ToggleDoubleTap)
        );
    }
}
