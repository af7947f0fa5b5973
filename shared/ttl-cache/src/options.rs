use std::time::Duration;

/// Construction options for [`crate::Cache`]
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum number of live entries; values below 1 are raised to 1
    pub capacity: usize,
    /// How long the sweeper sleeps when no entry has a deadline
    pub cleanup_interval: Duration,
    /// Spawn the background sweeper (requires a tokio runtime)
    pub sweeper: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            capacity: 1024,
            cleanup_interval: Duration::from_secs(60),
            sweeper: true,
        }
    }
}

impl CacheOptions {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn without_sweeper(mut self) -> Self {
        self.sweeper = false;
        self
    }

    pub(crate) fn effective_capacity(&self) -> usize {
        self.capacity.max(1)
    }

    pub(crate) fn effective_interval(&self) -> Duration {
        if self.cleanup_interval.is_zero() {
            Self::default().cleanup_interval
        } else {
            self.cleanup_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_fall_back_to_sane_defaults() {
        let opts = CacheOptions::with_capacity(0).cleanup_interval(Duration::ZERO);
        assert_eq!(opts.effective_capacity(), 1);
        assert_eq!(opts.effective_interval(), Duration::from_secs(60));
    }
}
