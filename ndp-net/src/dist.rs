// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable jitter sampling for the network model (§4.4: "jitter is the
//! only stochastic element and is injected via a pluggable `DistGenerator`").

use core::time::Duration;
use rand::{distributions::Uniform, prelude::Distribution, Rng};

/// Samples a delay. Implementations own whatever RNG state they need;
/// `Network` calls `sample` once per packet on the relevant path.
pub trait DistGenerator: Send + Sync {
    fn sample(&self) -> Duration;
}

/// A constant delay, useful for deterministic tests.
#[derive(Clone, Copy, Debug)]
pub struct Fixed(pub Duration);

impl DistGenerator for Fixed {
    fn sample(&self) -> Duration {
        self.0
    }
}

/// A delay sampled uniformly from `[low, high)`.
#[derive(Clone, Debug)]
pub struct UniformDelay {
    dist: Uniform<u64>,
}

impl UniformDelay {
    pub fn new(low: Duration, high: Duration) -> Self {
        assert!(low <= high, "UniformDelay requires low <= high");
        Self {
            dist: Uniform::new_inclusive(low.as_nanos() as u64, high.as_nanos() as u64),
        }
    }
}

impl DistGenerator for UniformDelay {
    fn sample(&self) -> Duration {
        let mut rng = rand::thread_rng();
        Duration::from_nanos(self.dist.sample(&mut rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_always_returns_the_same_delay() {
        let d = Fixed(Duration::from_micros(5));
        assert_eq!(d.sample(), Duration::from_micros(5));
        assert_eq!(d.sample(), Duration::from_micros(5));
    }

    #[test]
    fn uniform_delay_stays_within_bounds() {
        let d = UniformDelay::new(Duration::from_nanos(10), Duration::from_nanos(20));
        for _ in 0..100 {
            let sample = d.sample();
            assert!(sample >= Duration::from_nanos(10));
            assert!(sample <= Duration::from_nanos(20));
        }
    }
}
