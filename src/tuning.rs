//! Auto-tuning module
//!
//! Detects hardware capabilities and sizes the action dispatcher when the
//! configuration leaves it at 0. Application handlers share the machine
//! with the replication substrate, so the pool takes a quarter of the
//! cores.

use sysinfo::System;

/// Tuned values based on hardware detection
#[derive(Debug, Clone)]
pub struct TunedConfig {
    /// Action dispatcher worker threads
    pub pool_size: usize,
    /// Detected CPU cores
    pub detected_cores: usize,
}

impl Default for TunedConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            detected_cores: 4,
        }
    }
}

/// Detect the number of available CPU cores
pub fn detect_cpu_cores() -> usize {
    let sys = System::new_all();
    sys.cpus().len().max(1)
}

/// Dispatcher pool size for `cores` CPU cores: 25%, min 1, max 8
pub fn pool_size_for(cores: usize) -> usize {
    (cores / 4).clamp(1, 8)
}

/// Auto-tune based on detected hardware
pub fn auto_tune() -> TunedConfig {
    let cores = detect_cpu_cores();

    let config = TunedConfig {
        pool_size: pool_size_for(cores),
        detected_cores: cores,
    };

    tracing::info!(
        cores = cores,
        pool_size = config.pool_size,
        "Auto-tuned dispatcher pool based on hardware"
    );

    config
}

/// Get a human-readable summary of the tuned configuration
pub fn tuning_summary(config: &TunedConfig) -> String {
    format!(
        "Detected: {} cores\n\
         Dispatcher: {} worker threads",
        config.detected_cores, config.pool_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_bounds() {
        assert_eq!(pool_size_for(1), 1);
        assert_eq!(pool_size_for(8), 2);
        assert_eq!(pool_size_for(64), 8);
    }

    #[test]
    fn test_auto_tune_returns_sensible_values() {
        let config = auto_tune();
        assert!(config.pool_size >= 1);
        assert!(config.pool_size <= 8);
        assert!(config.detected_cores >= 1);
        let summary = tuning_summary(&config);
        assert!(summary.contains(&format!("{} cores", config.detected_cores)));
        assert!(summary.contains(&format!("{} worker threads", config.pool_size)));
    }
}
