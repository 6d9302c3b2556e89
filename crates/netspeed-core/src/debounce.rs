// ── Hide-threshold debounce ──
//
// Blanking the indicator only after the speed has stayed below the
// threshold for a whole window keeps bursty traffic from making it
// flicker. Coming back above the threshold un-blanks immediately.

use std::time::Duration;

use tokio::time::Instant;

/// Continuous time below threshold before the indicator is suppressed.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub struct SuppressionPolicy {
    window: Duration,
    below_since: Option<Instant>,
    suppressed: bool,
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

impl SuppressionPolicy {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            below_since: None,
            suppressed: false,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Feed one observed speed. Returns `true` if `suppressed` flipped.
    pub fn observe(&mut self, speed: u64, threshold: u64, now: Instant) -> bool {
        if speed >= threshold {
            self.below_since = None;
            let changed = self.suppressed;
            self.suppressed = false;
            return changed;
        }
        let since = *self.below_since.get_or_insert(now);
        if self.suppressed || now.saturating_duration_since(since) < self.window {
            return false;
        }
        self.suppressed = true;
        true
    }

    /// Forget a pending window without touching the current
    /// suppression state.
    pub fn reset_window(&mut self) {
        self.below_since = None;
    }
}
