// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Bounded fan-out of independent per-factor jobs.
//!
//! Each job receives its factor index, reads only its own slice of the
//! inputs and returns its own output. Results are written into a pre-sized
//! slot vector by index, so completion order never matters. A job that
//! errors or panics poisons only its own slot; the caller receives the
//! lowest failed index after every failure has been logged.

use crate::{MetricsError, Result};
use rayon::prelude::*;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;
use tracing::{debug, error};

static SHARED: OnceLock<std::result::Result<FactorPool, String>> = OnceLock::new();

/// Thread pool dedicated to per-factor metric jobs.
#[derive(Debug)]
pub struct FactorPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl FactorPool {
    /// Builds a pool with exactly `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(MetricsError::InvalidArgument(
                "worker count must be > 0".to_string(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("spiral-factor-{idx}"))
            .build()
            .map_err(|err| MetricsError::Pool(err.to_string()))?;
        Ok(Self { pool, workers })
    }

    /// Builds a pool sized from the runtime configuration.
    pub fn from_config() -> Result<Self> {
        Self::new(spiral_config::config().effective_workers())
    }

    /// Process-wide pool, built on first use.
    pub fn shared() -> Result<&'static FactorPool> {
        SHARED
            .get_or_init(|| FactorPool::from_config().map_err(|err| err.to_string()))
            .as_ref()
            .map_err(|reason| MetricsError::Pool(reason.clone()))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `job(index)` for `index in 0..jobs` and returns results ordered
    /// by index.
    pub fn run<T, F>(&self, jobs: usize, job: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let outcomes: Vec<(usize, std::result::Result<T, String>)> = self.pool.install(|| {
            (0..jobs)
                .into_par_iter()
                .map(|index| {
                    let outcome = match catch_unwind(AssertUnwindSafe(|| job(index))) {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => Err(failure_reason(err)),
                        Err(payload) => Err(format!(
                            "worker panicked: {}",
                            panic_message(payload.as_ref())
                        )),
                    };
                    (index, outcome)
                })
                .collect()
        });

        let mut slots: Vec<Option<T>> = (0..jobs).map(|_| None).collect();
        let mut failures: Vec<(usize, String)> = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(value) => slots[index] = Some(value),
                Err(reason) => {
                    error!(factor = index, %reason, "factor job failed");
                    failures.push((index, reason));
                }
            }
        }

        if let Some((factor, reason)) = failures.into_iter().min_by_key(|(index, _)| *index) {
            return Err(MetricsError::Factor { factor, reason });
        }

        debug!(jobs, workers = self.workers, "factor fan-out complete");
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| MetricsError::Factor {
                    factor: index,
                    reason: "job produced no result".to_string(),
                })
            })
            .collect()
    }
}

fn failure_reason(err: MetricsError) -> String {
    match err {
        MetricsError::Factor { reason, .. } => reason,
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
