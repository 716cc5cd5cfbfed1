//! Sliding count of failed ticks.

use std::collections::VecDeque;

/// State change caused by recording one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTransition {
    /// Alarm state unchanged.
    Steady,
    /// Failures reached the threshold; raise an alert.
    EnteredAlarm,
    /// Failures dropped back below the threshold.
    Recovered,
}

/// Failures over the last `window` ticks, alarming at `threshold`.
///
/// Window size and threshold are fixed at construction.
#[derive(Debug, Clone)]
pub struct FailureWindow {
    window: usize,
    threshold: usize,
    recent: VecDeque<bool>,
    failures: usize,
    alarmed: bool,
}

impl FailureWindow {
    /// Both arguments are clamped to at least 1, and `threshold` to at most `window`.
    pub fn new(window: usize, threshold: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            threshold: threshold.clamp(1, window),
            recent: VecDeque::with_capacity(window),
            failures: 0,
            alarmed: false,
        }
    }

    /// Record one tick outcome.
    pub fn record(&mut self, failed: bool) -> WindowTransition {
        if self.recent.len() == self.window && self.recent.pop_front() == Some(true) {
            self.failures -= 1;
        }
        self.recent.push_back(failed);
        if failed {
            self.failures += 1;
        }

        let breached = self.failures >= self.threshold;
        match (self.alarmed, breached) {
            (false, true) => {
                self.alarmed = true;
                WindowTransition::EnteredAlarm
            }
            (true, false) => {
                self.alarmed = false;
                WindowTransition::Recovered
            }
            _ => WindowTransition::Steady,
        }
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_alarmed(&self) -> bool {
        self.alarmed
    }
}
