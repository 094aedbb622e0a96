//! Tuning knobs for districting and search.
//!
//! ```
//! use stowage_logic::config::{validate_config, StowageConfig};
//!
//! let config = StowageConfig::default();
//! assert!(validate_config(&config).is_empty());
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-map configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StowageConfig {
    /// Regions with more cells than this are split into districts.
    pub district_threshold: usize,
    /// Maximum cells per district.
    pub district_size: usize,
    /// Sampling used by approximate searches.
    pub sampling: SamplingConfig,
    /// Accuracy used when a caller does not choose one.
    pub high_accuracy: bool,
    /// Seed for the sampling RNG (None = entropy).
    pub seed: Option<u64>,
    /// Recompute capacity from ground truth after every mutation. Slow.
    pub verify_after_mutation: bool,
}

impl Default for StowageConfig {
    fn default() -> Self {
        Self {
            district_threshold: 1000,
            district_size: 250,
            sampling: SamplingConfig::default(),
            high_accuracy: false,
            seed: None,
            verify_after_mutation: false,
        }
    }
}

/// Bounded random sampling for approximate searches.
///
/// An approximate search may stop scanning a region once it holds a
/// candidate and has examined `cell_count * f` cells, where `f` is drawn
/// uniformly from `[fraction_min, fraction_max]` per region, and never fewer
/// than `min_cells`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub fraction_min: f64,
    pub fraction_max: f64,
    pub min_cells: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            fraction_min: 0.005,
            fraction_max: 0.018,
            min_cells: 8,
        }
    }
}

impl SamplingConfig {
    /// Cells to examine in a region of `cell_count` cells.
    pub fn sample_limit(&self, cell_count: usize, rng: &mut impl Rng) -> usize {
        let fraction = if self.fraction_max > self.fraction_min {
            rng.gen_range(self.fraction_min..=self.fraction_max)
        } else {
            self.fraction_min
        };
        let sampled = (cell_count as f64 * fraction).floor() as usize;
        sampled.max(self.min_cells)
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("district size must be at least 1")]
    ZeroDistrictSize,
    #[error("district threshold {threshold} is smaller than district size {size}")]
    ThresholdBelowDistrictSize { threshold: usize, size: usize },
    #[error("sampling fraction {0} is outside (0, 1]")]
    FractionOutOfRange(f64),
    #[error("sampling range is inverted: min {min} > max {max}")]
    FractionRangeInverted { min: f64, max: f64 },
    #[error("minimum sample must be at least 1 cell")]
    ZeroMinSample,
}

/// Validate a configuration, returning all errors found.
pub fn validate_config(config: &StowageConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    if config.district_size == 0 {
        errors.push(ConfigError::ZeroDistrictSize);
    }
    if config.district_threshold < config.district_size {
        errors.push(ConfigError::ThresholdBelowDistrictSize {
            threshold: config.district_threshold,
            size: config.district_size,
        });
    }

    let sampling = &config.sampling;
    for fraction in [sampling.fraction_min, sampling.fraction_max] {
        if !(fraction > 0.0 && fraction <= 1.0) {
            errors.push(ConfigError::FractionOutOfRange(fraction));
        }
    }
    if sampling.fraction_min > sampling.fraction_max {
        errors.push(ConfigError::FractionRangeInverted {
            min: sampling.fraction_min,
            max: sampling.fraction_max,
        });
    }
    if sampling.min_cells == 0 {
        errors.push(ConfigError::ZeroMinSample);
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&StowageConfig::default()).is_empty());
    }

    #[test]
    fn test_zero_district_size() {
        let config = StowageConfig {
            district_size: 0,
            ..StowageConfig::default()
        };
        assert!(validate_config(&config).contains(&ConfigError::ZeroDistrictSize));
    }

    #[test]
    fn test_threshold_below_size() {
        let config = StowageConfig {
            district_threshold: 10,
            district_size: 20,
            ..StowageConfig::default()
        };
        assert!(validate_config(&config).contains(&ConfigError::ThresholdBelowDistrictSize {
            threshold: 10,
            size: 20
        }));
    }

    #[test]
    fn test_bad_sampling_reports_all_errors() {
        let config = StowageConfig {
            sampling: SamplingConfig {
                fraction_min: 0.5,
                fraction_max: 0.0,
                min_cells: 0,
            },
            ..StowageConfig::default()
        };
        let errors = validate_config(&config);
        assert!(errors.contains(&ConfigError::FractionOutOfRange(0.0)));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::FractionRangeInverted { .. })));
        assert!(errors.contains(&ConfigError::ZeroMinSample));
    }

    #[test]
    fn test_sample_limit_bounds() {
        let sampling = SamplingConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let limit = sampling.sample_limit(2000, &mut rng);
            assert!((10..=36).contains(&limit), "limit {limit} out of range");
        }
    }

    #[test]
    fn test_sample_limit_floor_on_tiny_regions() {
        let sampling = SamplingConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(sampling.sample_limit(3, &mut rng), 8);
    }

    #[test]
    fn test_fixed_fraction() {
        let sampling = SamplingConfig {
            fraction_min: 0.005,
            fraction_max: 0.005,
            min_cells: 1,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sampling.sample_limit(2000, &mut rng), 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StowageConfig =
            serde_json::from_str(r#"{"district_size": 100, "seed": 3}"#).unwrap();
        assert_eq!(config.district_size, 100);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.district_threshold, 1000);
    }
}
