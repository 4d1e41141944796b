// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Default wall-clock limit for one resolution episode (30 seconds)
pub const DEFAULT_EPISODE_TIMEOUT_MS: u64 = 30_000;
/// Minimum allowed episode timeout (10 milliseconds)
pub const MIN_EPISODE_TIMEOUT_MS: u64 = 10;
/// Default number of episodes a cyclical rule set may run before giving up
pub const DEFAULT_MAX_ITERATIONS: usize = 16;
/// Maximum allowed episode count - guards against unbounded reiteration
pub const MAX_ITERATIONS_LIMIT: usize = 1_024;
