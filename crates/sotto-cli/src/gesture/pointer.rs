//! Pointer click disambiguation.
//!
//! A single click is buffered behind a fixed delay; a second click arriving
//! before the delay elapses upgrades to a double-click and cancels the
//! pending single. The caller owns the actual timer: `on_click` returns a
//! generation to schedule, and a firing timer is only honored if its
//! generation is still the pending one, so stale timers are discarded
//! rather than raced.

use std::time::Duration;
use tokio::time::Instant;

use super::CLICK_DELAY_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickDecision {
    /// Buffer a single click; schedule a timer carrying this generation.
    Scheduled(u64),
    /// Second click inside the delay: takes precedence over the pending single.
    DoubleClick,
}

pub struct ClickArbiter {
    pending: Option<(u64, Instant)>,
    next_generation: u64,
    delay: Duration,
}

impl ClickArbiter {
    pub fn new() -> Self {
        Self {
            pending: None,
            next_generation: 0,
            delay: Duration::from_millis(CLICK_DELAY_MS),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// A click arrived.
    pub fn on_click(&mut self) -> ClickDecision {
        let now = Instant::now();
        if let Some((_, clicked_at)) = self.pending {
            if now.duration_since(clicked_at) < self.delay {
                self.pending = None;
                return ClickDecision::DoubleClick;
            }
        }
        self.next_generation += 1;
        self.pending = Some((self.next_generation, now));
        ClickDecision::Scheduled(self.next_generation)
    }

    /// The timer for `generation` fired. True when the buffered single click
    /// should now be delivered; false when it was superseded.
    pub fn on_timer(&mut self, generation: u64) -> bool {
        match self.pending {
            Some((pending_generation, _)) if pending_generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for ClickArbiter {
    fn default() -> Self {
        Self::new()
    }
}
