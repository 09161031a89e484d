// Speed Guard Synthetic Load
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Body of the hidden `burn` subcommand. Spins one core on integer mixing
// until the deadline, then returns so the process exits on its own.

use std::time::{Duration, Instant};

/// Argument that marks a process as a Speed Guard load worker.
pub const LOAD_MARKER: &str = "speed-guard-load";

const ROUNDS_PER_CHECK: u32 = 50_000;

/// Burn CPU for `duration`. Returns how many mixing batches ran.
pub fn burn_for(duration: Duration) -> u64 {
    let deadline = Instant::now() + duration;
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut batches = 0u64;

    while Instant::now() < deadline {
        for _ in 0..ROUNDS_PER_CHECK {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            state ^= state >> 33;
        }
        std::hint::black_box(state);
        batches += 1;
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burn_stops_at_deadline() {
        let started = Instant::now();
        let batches = burn_for(Duration::from_millis(50));
        let elapsed = started.elapsed();
        assert!(batches > 0);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2), "burn overran: {:?}", elapsed);
    }

    #[test]
    fn test_zero_duration_returns_immediately() {
        assert_eq!(burn_for(Duration::ZERO), 0);
    }
}
