//! Hold-down detection with eager start.
//!
//! Key-down fires `StartHold` before the press length is known, so recording
//! begins with no perceived latency. The release classifies the press: under
//! the short-tap threshold it was an accidental tap and the capture is
//! cancelled, otherwise it is a deliberate hold-to-record stop.

use std::time::Duration;
use tokio::time::Instant;

use super::{is_modifier, GestureIntent, COOLDOWN_MS};
use crate::listener::InputEvent;

#[derive(Debug, Clone, Copy, PartialEq)]
enum HoldState {
    Idle,
    Held { pressed_at: Instant },
}

pub struct HoldDetector {
    state: HoldState,
    target: Option<rdev::Key>,
    short_tap: Duration,
    last_stopped_at: Option<Instant>,
}

impl HoldDetector {
    pub fn new(target: Option<rdev::Key>, short_tap: Duration) -> Self {
        Self {
            state: HoldState::Idle,
            target,
            short_tap,
            last_stopped_at: None,
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self.state, HoldState::Held { .. })
    }

    pub fn reset(&mut self) {
        self.state = HoldState::Idle;
    }

    fn in_cooldown(&self) -> bool {
        self.last_stopped_at
            .map(|t| t.elapsed() < Duration::from_millis(COOLDOWN_MS))
            .unwrap_or(false)
    }

    pub fn handle_event(&mut self, event: &InputEvent) -> Option<GestureIntent> {
        let target = self.target?;

        match self.state {
            HoldState::Idle => match event {
                InputEvent::KeyPress(key) if *key == target && !self.in_cooldown() => {
                    self.state = HoldState::Held {
                        pressed_at: Instant::now(),
                    };
                    Some(GestureIntent::StartHold)
                }
                _ => None,
            },

            HoldState::Held { pressed_at } => match event {
                InputEvent::KeyRelease(key) if *key == target => self.end_hold(pressed_at),
                // Key repeat while held
                InputEvent::KeyPress(key) if *key == target => None,
                // User is typing a combo like Shift+A
                InputEvent::KeyPress(key) if !is_modifier(*key) => self.end_hold(pressed_at),
                _ => None,
            },
        }
    }

    fn end_hold(&mut self, pressed_at: Instant) -> Option<GestureIntent> {
        self.state = HoldState::Idle;
        self.last_stopped_at = Some(Instant::now());
        if pressed_at.elapsed() < self.short_tap {
            Some(GestureIntent::CancelShortTap)
        } else {
            Some(GestureIntent::StopHold)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdev::Key;
    use tokio::time::advance;

    fn detector(key: Key) -> HoldDetector {
        HoldDetector::new(Some(key), Duration::from_millis(150))
    }

    fn press(key: Key) -> InputEvent {
        InputEvent::KeyPress(key)
    }

    fn release(key: Key) -> InputEvent {
        InputEvent::KeyRelease(key)
    }

    #[tokio::test(start_paused = true)]
    async fn press_starts_immediately_and_long_release_stops() {
        let mut d = detector(Key::ShiftLeft);

        assert_eq!(
            d.handle_event(&press(Key::ShiftLeft)),
            Some(GestureIntent::StartHold)
        );
        assert!(d.is_held());

        advance(Duration::from_millis(200)).await;
        assert_eq!(
            d.handle_event(&release(Key::ShiftLeft)),
            Some(GestureIntent::StopHold)
        );
        assert!(!d.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn short_tap_cancels() {
        let mut d = detector(Key::ShiftLeft);

        assert_eq!(
            d.handle_event(&press(Key::ShiftLeft)),
            Some(GestureIntent::StartHold)
        );
        // 80 ms is under the 150 ms threshold
        advance(Duration::from_millis(80)).await;
        assert_eq!(
            d.handle_event(&release(Key::ShiftLeft)),
            Some(GestureIntent::CancelShortTap)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exact_threshold_counts_as_hold() {
        let mut d = detector(Key::ShiftLeft);
        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(150)).await;
        assert_eq!(
            d.handle_event(&release(Key::ShiftLeft)),
            Some(GestureIntent::StopHold)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_key_ignored() {
        let mut d = detector(Key::ShiftLeft);
        assert_eq!(d.handle_event(&press(Key::Alt)), None);
        assert!(!d.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn no_target_never_fires() {
        let mut d = HoldDetector::new(None, Duration::from_millis(150));
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
        assert_eq!(d.handle_event(&release(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn key_repeat_ignored_while_held() {
        let mut d = detector(Key::ShiftLeft);
        d.handle_event(&press(Key::ShiftLeft));
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);
        assert!(d.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn typing_combo_ends_the_hold() {
        let mut d = detector(Key::ShiftLeft);
        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(300)).await;
        // Shift+A: the press was typing, not a gesture
        assert_eq!(
            d.handle_event(&press(Key::KeyA)),
            Some(GestureIntent::StopHold)
        );
        assert!(!d.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn quick_combo_cancels() {
        let mut d = detector(Key::ShiftLeft);
        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(30)).await;
        assert_eq!(
            d.handle_event(&press(Key::KeyA)),
            Some(GestureIntent::CancelShortTap)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn release_without_press_ignored() {
        let mut d = detector(Key::ShiftLeft);
        assert_eq!(d.handle_event(&release(Key::ShiftLeft)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_immediate_restart() {
        let mut d = detector(Key::ShiftLeft);
        d.handle_event(&press(Key::ShiftLeft));
        advance(Duration::from_millis(200)).await;
        d.handle_event(&release(Key::ShiftLeft));

        // Bounce within the cooldown
        advance(Duration::from_millis(10)).await;
        assert_eq!(d.handle_event(&press(Key::ShiftLeft)), None);

        advance(Duration::from_millis(100)).await;
        assert_eq!(
            d.handle_event(&press(Key::ShiftLeft)),
            Some(GestureIntent::StartHold)
        );
    }
}
