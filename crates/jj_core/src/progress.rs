use std::time::Duration;

/// Percent shown by the bar's first tick, before any estimate exists.
pub const INITIAL_PERCENT: u8 = 1;
/// Highest percent the estimator may report; 100 means "done" and is only
/// reached when the watcher confirms completion.
pub const MAX_RUNNING_PERCENT: u8 = 99;

/// A forward step of the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressDelta {
    pub percent: u8,
    /// Number of single-percent ticks needed to reach `percent`.
    pub ticks: u8,
}

/// Synthetic completion estimate from elapsed time and the duration of the
/// job's last successful build.
///
/// The estimate never decreases and never exceeds [`MAX_RUNNING_PERCENT`].
/// Without a reference duration it stays at [`INITIAL_PERCENT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEstimator {
    reference: Option<Duration>,
    last: u8,
}

impl ProgressEstimator {
    pub fn new(reference: Option<Duration>) -> Self {
        Self {
            reference: reference.filter(|d| !d.is_zero()),
            last: INITIAL_PERCENT,
        }
    }

    pub fn percent(&self) -> u8 {
        self.last
    }

    /// Recompute the estimate; returns a delta only when it moved forward.
    pub fn observe(&mut self, elapsed: Duration) -> Option<ProgressDelta> {
        let reference = self.reference?;
        let raw = elapsed.as_millis().saturating_mul(100) / reference.as_millis().max(1);
        let percent = raw.min(u128::from(MAX_RUNNING_PERCENT)) as u8;
        if percent <= self.last {
            return None;
        }
        let delta = ProgressDelta {
            percent,
            ticks: percent - self.last,
        };
        self.last = percent;
        Some(delta)
    }
}
