use chrono::Utc;
use std::time::{Duration, Instant};

use crate::models::{CheckResult, Report};

/// Builds the report for one cycle. `None` when every check passed.
pub fn aggregate(results: &[CheckResult]) -> Option<Report> {
    let failure_lines: Vec<String> = results.iter().filter_map(CheckResult::failure_line).collect();
    if failure_lines.is_empty() {
        return None;
    }
    Some(Report {
        generated_at: Utc::now(),
        failure_lines,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Send,
    Suppress { remaining: Duration },
}

/// Keeps notifications at least `min_interval` apart.
#[derive(Debug)]
pub struct NotificationGate {
    min_interval: Duration,
    last_notify: Option<Instant>,
}

impl NotificationGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_notify: None,
        }
    }

    pub fn last_notify(&self) -> Option<Instant> {
        self.last_notify
    }

    pub fn decide(&self, now: Instant) -> GateDecision {
        let Some(last) = self.last_notify else {
            return GateDecision::Send;
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.min_interval {
            GateDecision::Suppress {
                remaining: self.min_interval - elapsed,
            }
        } else {
            GateDecision::Send
        }
    }

    /// Call after a notification was actually delivered.
    pub fn record(&mut self, now: Instant) {
        self.last_notify = Some(now);
    }
}
