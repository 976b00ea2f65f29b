// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use thiserror::Error;

/// Seed used when `SPIRAL_METRICS_SEED` is absent.
pub const DEFAULT_BASE_SEED: u64 = 1234;

/// Errors raised while parsing runtime overrides.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidCount { var: &'static str, value: String },
    #[error("{var} must be an unsigned integer, got '{value}'")]
    InvalidSeed { var: &'static str, value: String },
}

/// Evaluation runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of worker threads used for per-factor fan-out.
    pub workers: usize,
    /// Base seed used to derive per-component seeds.
    pub base_seed: u64,
    /// If true every fan-out runs on a single worker.
    pub sequential: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            base_seed: DEFAULT_BASE_SEED,
            sequential: false,
        }
    }
}

impl RuntimeConfig {
    /// Builds a configuration snapshot from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let workers = match lookup("SPIRAL_METRICS_WORKERS") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => value,
                _ => {
                    return Err(ConfigError::InvalidCount {
                        var: "SPIRAL_METRICS_WORKERS",
                        value: raw,
                    })
                }
            },
            None => default_workers(),
        };

        let base_seed = match lookup("SPIRAL_METRICS_SEED") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidSeed {
                    var: "SPIRAL_METRICS_SEED",
                    value: raw.clone(),
                })?,
            None => DEFAULT_BASE_SEED,
        };

        let sequential = lookup("SPIRAL_METRICS_SEQUENTIAL")
            .map(|v| matches!(v.as_str(), "1" | "true" | "True" | "on" | "ON"))
            .unwrap_or(false);

        Ok(Self {
            workers,
            base_seed,
            sequential,
        })
    }

    /// Worker count after applying the sequential override.
    pub fn effective_workers(&self) -> usize {
        if self.sequential {
            1
        } else {
            self.workers.max(1)
        }
    }
}

/// Available cores minus one, leaving a core for the coordinating thread.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Returns the lazily initialised runtime configuration.
///
/// Malformed overrides fall back to defaults; use [`RuntimeConfig::from_env`]
/// directly to surface the parse error.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(|| RuntimeConfig::from_env().unwrap_or_default())
}

/// Installs `cfg` unless a configuration was already resolved.
pub fn configure(cfg: RuntimeConfig) -> &'static RuntimeConfig {
    CONFIG.get_or_init(|| cfg)
}

/// Derives a stable seed for a component label from an explicit seed.
pub fn derive_seed<L: Hash>(seed: u64, label: L) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    label.hash(&mut hasher);
    hasher.finish()
}

/// Returns a RNG seeded from `seed` and a component label.
pub fn rng_for<L: Hash>(seed: u64, label: L) -> StdRng {
    StdRng::seed_from_u64(derive_seed(seed, label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_leave_one_core_free() {
        let cfg = RuntimeConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.base_seed, DEFAULT_BASE_SEED);
        assert_eq!(cfg.workers, default_workers());
        assert!(cfg.workers >= 1);
        assert!(!cfg.sequential);
    }

    #[test]
    fn explicit_overrides_are_parsed() {
        let cfg = RuntimeConfig::from_lookup(lookup_from(&[
            ("SPIRAL_METRICS_WORKERS", "6"),
            ("SPIRAL_METRICS_SEED", "99"),
            ("SPIRAL_METRICS_SEQUENTIAL", "on"),
        ]))
        .unwrap();
        assert_eq!(cfg.workers, 6);
        assert_eq!(cfg.base_seed, 99);
        assert!(cfg.sequential);
        assert_eq!(cfg.effective_workers(), 1);
    }

    #[test]
    fn zero_workers_are_rejected() {
        let err = RuntimeConfig::from_lookup(lookup_from(&[("SPIRAL_METRICS_WORKERS", "0")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidCount {
                var: "SPIRAL_METRICS_WORKERS",
                value: "0".to_string(),
            }
        );
    }

    #[test]
    fn malformed_seed_is_rejected() {
        let err = RuntimeConfig::from_lookup(lookup_from(&[("SPIRAL_METRICS_SEED", "abc")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSeed { .. }));
    }

    #[test]
    fn derived_seeds_are_stable_per_label() {
        let alpha_first = derive_seed(7, "alpha");
        let alpha_second = derive_seed(7, "alpha");
        let beta = derive_seed(7, "beta");
        assert_eq!(alpha_first, alpha_second);
        assert_ne!(alpha_first, beta);

        let a: u64 = rng_for(7, ("factor", 2usize)).gen();
        let b: u64 = rng_for(7, ("factor", 2usize)).gen();
        assert_eq!(a, b);
    }
}
