//! Per-thread configuration of the rewriting engine.
//!
//! All algebra values are immutable and built on a single thread, so the
//! configuration lives in a thread-local slot rather than being threaded
//! through every constructor.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

/// Configuration for expression construction.
///
/// Deserialized values pass through the builder setters, so limits read from
/// a file are clamped like programmatic ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct AlgebraConfig {
    /// Memoise the results of `create`-style constructors.
    pub use_cache: bool,
    /// Maximum number of entries per constructor cache. A full cache is
    /// cleared before the next insertion.
    pub cache_capacity: usize,
    /// Maximum number of rule applications during one pairwise rewrite sweep.
    pub max_rewrite_steps: usize,
}

impl Default for AlgebraConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_capacity: 4096,
            max_rewrite_steps: 10_000,
        }
    }
}

impl AlgebraConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable constructor memoisation.
    #[must_use]
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set the per-constructor cache capacity.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    /// Set the rewrite step limit.
    #[must_use]
    pub fn with_max_rewrite_steps(mut self, steps: usize) -> Self {
        self.max_rewrite_steps = steps.max(1);
        self
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct ConfigFile {
    use_cache: bool,
    cache_capacity: usize,
    max_rewrite_steps: usize,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let AlgebraConfig {
            use_cache,
            cache_capacity,
            max_rewrite_steps,
        } = AlgebraConfig::default();
        Self {
            use_cache,
            cache_capacity,
            max_rewrite_steps,
        }
    }
}

impl From<ConfigFile> for AlgebraConfig {
    fn from(file: ConfigFile) -> Self {
        AlgebraConfig::new()
            .with_cache(file.use_cache)
            .with_cache_capacity(file.cache_capacity)
            .with_max_rewrite_steps(file.max_rewrite_steps)
    }
}

thread_local! {
    static CONFIG: Cell<AlgebraConfig> = Cell::new(AlgebraConfig::default());
}

/// The configuration active on the current thread.
pub fn current() -> AlgebraConfig {
    CONFIG.with(Cell::get)
}

/// Install a configuration on the current thread.
pub fn set_config(config: AlgebraConfig) {
    CONFIG.with(|c| c.set(config));
}

/// Run `f` with `config` installed, restoring the previous configuration
/// afterwards.
pub fn with_config<R>(config: AlgebraConfig, f: impl FnOnce() -> R) -> R {
    let previous = CONFIG.with(|c| c.replace(config));
    let result = f();
    CONFIG.with(|c| c.set(previous));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = AlgebraConfig::new()
            .with_cache(false)
            .with_cache_capacity(0)
            .with_max_rewrite_steps(50);
        assert!(!config.use_cache);
        assert_eq!(config.cache_capacity, 1);
        assert_eq!(config.max_rewrite_steps, 50);
    }

    #[test]
    fn test_with_config_restores() {
        let before = current();
        let inner = with_config(AlgebraConfig::new().with_cache(false), current);
        assert!(!inner.use_cache);
        assert_eq!(current(), before);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: AlgebraConfig = serde_json::from_str(r#"{"use_cache": false}"#).unwrap();
        assert!(!config.use_cache);
        assert_eq!(config.cache_capacity, AlgebraConfig::default().cache_capacity);
    }

    #[test]
    fn test_deserialize_clamps_limits() {
        let config: AlgebraConfig =
            serde_json::from_str(r#"{"cache_capacity": 0, "max_rewrite_steps": 0}"#).unwrap();
        assert_eq!(config.cache_capacity, 1);
        assert_eq!(config.max_rewrite_steps, 1);
        assert!(config.use_cache);
    }
}
