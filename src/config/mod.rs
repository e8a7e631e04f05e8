//! Run configuration for batch execution
//!
//! Options are merged over a base configuration one at a time. An option
//! whose value is out of range is skipped, so the resolved configuration is
//! always usable and invalid input never produces an error.

use serde::{Deserialize, Serialize};

/// Smallest input length that may be split across workers
pub const MIN_CONCURRENCY_THRESHOLD: usize = 2;

/// A single tuning option for a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOption {
    /// Number of items per batch. Ignored unless at least 1.
    BatchSize(usize),

    /// Inputs shorter than this run as one call on the calling task.
    /// Ignored unless at least 2.
    MinSizeForConcurrency(usize),

    /// Maximum number of batches in flight at once. Ignored unless at least 1.
    MaxThreads(usize),
}

impl BatchOption {
    /// Merge this option into `config`, leaving it untouched when the value is invalid
    pub fn apply(self, mut config: BatchConfig) -> BatchConfig {
        match self {
            BatchOption::BatchSize(size) if size >= 1 => config.batch_size = size,
            BatchOption::MinSizeForConcurrency(min) if min >= MIN_CONCURRENCY_THRESHOLD => {
                config.min_size_for_concurrency = min
            }
            BatchOption::MaxThreads(threads) if threads > 0 => config.max_threads = threads,
            _ => {}
        }
        config
    }
}

/// Resolved configuration of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of input items per batch
    pub batch_size: usize,

    /// Input length below which no batching or concurrency is used
    pub min_size_for_concurrency: usize,

    /// Upper bound on concurrently running batches
    pub max_threads: usize,
}

impl BatchConfig {
    /// Base configuration with an explicit parallelism for `max_threads`
    pub fn base(parallelism: usize) -> Self {
        Self {
            batch_size: 1,
            min_size_for_concurrency: MIN_CONCURRENCY_THRESHOLD,
            max_threads: parallelism.max(1),
        }
    }

    /// Merge `options` in order over the default configuration
    pub fn resolve<I>(options: I) -> Self
    where
        I: IntoIterator<Item = BatchOption>,
    {
        Self::default().merge(options)
    }

    /// Merge `options` in order over this configuration
    pub fn merge<I>(self, options: I) -> Self
    where
        I: IntoIterator<Item = BatchOption>,
    {
        options.into_iter().fold(self, |config, option| option.apply(config))
    }

    /// Merge a single option
    pub fn with(self, option: BatchOption) -> Self {
        option.apply(self)
    }

    /// Re-validate a configuration that was built field by field
    /// (deserialized, or constructed with struct syntax)
    pub fn sanitized(self) -> Self {
        Self::default().merge(self)
    }

    /// The fields of this configuration expressed as options
    pub fn options(&self) -> [BatchOption; 3] {
        [
            BatchOption::BatchSize(self.batch_size),
            BatchOption::MinSizeForConcurrency(self.min_size_for_concurrency),
            BatchOption::MaxThreads(self.max_threads),
        ]
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::base(num_cpus::get())
    }
}

impl IntoIterator for BatchConfig {
    type Item = BatchOption;
    type IntoIter = std::array::IntoIter<BatchOption, 3>;

    fn into_iter(self) -> Self::IntoIter {
        self.options().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BatchConfig {
        BatchConfig::base(8)
    }

    #[test]
    fn test_base_configuration() {
        let config = base();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.min_size_for_concurrency, 2);
        assert_eq!(config.max_threads, 8);
    }

    #[test]
    fn test_default_uses_available_cpus() {
        let config = BatchConfig::default();
        assert_eq!(config.max_threads, num_cpus::get());
        assert!(config.max_threads >= 1);
    }

    #[test]
    fn test_valid_options_are_merged() {
        let config = base().merge([
            BatchOption::BatchSize(3),
            BatchOption::MinSizeForConcurrency(5),
            BatchOption::MaxThreads(2),
        ]);

        assert_eq!(config, BatchConfig { batch_size: 3, min_size_for_concurrency: 5, max_threads: 2 });
    }

    #[test]
    fn test_invalid_options_are_ignored() {
        let config = base().merge([
            BatchOption::BatchSize(0),
            BatchOption::MinSizeForConcurrency(0),
            BatchOption::MinSizeForConcurrency(1),
            BatchOption::MaxThreads(0),
        ]);

        assert_eq!(config, base());
    }

    #[test]
    fn test_invalid_option_keeps_previous_value() {
        let config = base().merge([BatchOption::BatchSize(4), BatchOption::BatchSize(0)]);
        assert_eq!(config.batch_size, 4);
    }

    #[test]
    fn test_last_option_wins() {
        let config = base()
            .with(BatchOption::MaxThreads(3))
            .with(BatchOption::MaxThreads(6));
        assert_eq!(config.max_threads, 6);
    }

    #[test]
    fn test_boundary_values() {
        assert_eq!(base().with(BatchOption::BatchSize(1)).batch_size, 1);
        assert_eq!(base().with(BatchOption::MinSizeForConcurrency(2)).min_size_for_concurrency, 2);
        assert_eq!(base().with(BatchOption::MaxThreads(1)).max_threads, 1);
    }

    #[test]
    fn test_zero_parallelism_base_is_clamped() {
        assert_eq!(BatchConfig::base(0).max_threads, 1);
    }

    #[test]
    fn test_sanitized_drops_out_of_range_fields() {
        let config = BatchConfig { batch_size: 0, min_size_for_concurrency: 1, max_threads: 4 };
        let sanitized = config.sanitized();

        assert_eq!(sanitized.batch_size, 1);
        assert_eq!(sanitized.min_size_for_concurrency, 2);
        assert_eq!(sanitized.max_threads, 4);
    }
}
