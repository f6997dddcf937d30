//! Bounded history of actual startup durations.

use std::collections::VecDeque;
use std::time::Duration;

/// Number of samples kept per server; the oldest is evicted first.
pub const MAX_HISTORY_ENTRIES: usize = 20;

/// Recent startup durations of one server, oldest first, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupHistory {
    samples: VecDeque<u64>,
}

impl StartupHistory {
    /// Build from stored samples, dropping non-positive values and keeping
    /// only the newest [`MAX_HISTORY_ENTRIES`].
    #[must_use]
    pub fn from_millis(samples: impl IntoIterator<Item = u64>) -> Self {
        let mut history = Self::default();
        for millis in samples {
            history.push_millis(millis);
        }
        history
    }

    /// Record an actual startup duration. Zero durations are ignored.
    ///
    /// Returns whether the sample was kept.
    pub fn record(&mut self, duration: Duration) -> bool {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.push_millis(millis)
    }

    fn push_millis(&mut self, millis: u64) -> bool {
        if millis == 0 {
            return false;
        }
        self.samples.push_back(millis);
        while self.samples.len() > MAX_HISTORY_ENTRIES {
            self.samples.pop_front();
        }
        true
    }

    /// Samples in milliseconds, oldest first.
    pub fn millis(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Recency-weighted expected duration, `None` without samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn weighted_average(&self) -> Option<Duration> {
        let samples: Vec<f64> = self.samples.iter().map(|&ms| ms as f64).collect();
        weighted_average(&samples).map(|ms| Duration::from_secs_f64(ms / 1_000.0))
    }
}

/// Linearly recency-weighted mean of `samples` (oldest first).
///
/// The i-th of N samples weighs `(i + 1) / N`, so the newest sample
/// counts N times as much as the oldest.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn weighted_average(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let (sum, weights) = samples
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, weights), (i, sample)| {
            let weight = (i as f64 + 1.0) / n;
            (sum + sample * weight, weights + weight)
        });
    Some(sum / weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_weight_recent_samples_more_than_old_ones() {
        let estimate = weighted_average(&[10.0, 20.0, 30.0]).unwrap();
        assert!((estimate - 140.0 / 6.0).abs() < 1e-9);
        assert!(estimate > 20.0);
    }

    #[test]
    fn should_return_none_without_samples() {
        assert!(weighted_average(&[]).is_none());
        assert!(StartupHistory::default().weighted_average().is_none());
    }

    #[test]
    fn should_compute_weighted_duration_from_history() {
        let history = StartupHistory::from_millis([10_000, 20_000, 30_000]);
        let estimate = history.weighted_average().unwrap();
        assert!((estimate.as_secs_f64() - 23.333).abs() < 0.001);
    }

    #[test]
    fn should_evict_oldest_sample_beyond_capacity() {
        let mut history = StartupHistory::default();
        for secs in 1..=25 {
            history.record(Duration::from_secs(secs));
        }
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history.millis().next(), Some(6_000));
        assert_eq!(history.millis().last(), Some(25_000));
    }

    #[test]
    fn should_ignore_zero_durations() {
        let mut history = StartupHistory::default();
        assert!(!history.record(Duration::ZERO));
        assert!(history.is_empty());
        let loaded = StartupHistory::from_millis([0, 5, 0]);
        assert_eq!(loaded.len(), 1);
    }
}
