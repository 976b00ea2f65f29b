// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-level configuration shared by the SpiralTorch evaluation crates.
//!
//! [`runtime`] resolves worker counts and seed derivation from the
//! environment, [`tracing`] installs the global subscriber.

pub mod runtime;
pub mod tracing;

pub use runtime::{config, configure, derive_seed, rng_for, RuntimeConfig};
