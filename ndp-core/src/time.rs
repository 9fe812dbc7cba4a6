// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A small `Clock` abstraction so `PktGen`'s pacer (§4.3) and `EgressPipe`'s
//! packetisation delay (§4.2) can be driven by either a real tokio runtime
//! or, under `cfg(test)`, a paused one — without the pacing/coalescing math
//! itself depending on which.
//!
//! This is a deliberately simpler seam than the grounding codebase's
//! `time::Clock`/`Sleep` trait-object pair: rather than returning a
//! rearmable sleep handle, `Clock::sleep` hands back a boxed future each
//! call, which is adequate for the one-shot delays this protocol needs
//! (packetisation and pacing backoffs are each awaited to completion, never
//! rearmed mid-flight).

use core::{future::Future, pin::Pin, time::Duration};
use std::time::Instant;

/// A source of the current time and of delay futures.
///
/// `now()` MUST be monotonic for a given `Clock` instance; the pacing
/// invariant in §4.3 depends on it.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Returns a future that resolves after `duration` has elapsed.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// The production [`Clock`], backed by the tokio runtime's timer wheel.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test-only [`Clock`] atop tokio's paused, manually-advanced timer.
///
/// Pair with `#[tokio::test(start_paused = true)]` and
/// `tokio::time::advance(..)` in the calling test so delays resolve
/// deterministically instead of consuming real wall-clock time.
#[cfg(any(test, feature = "testing"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct PausedClock;

#[cfg(any(test, feature = "testing"))]
impl Clock for PausedClock {
    #[inline]
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    #[inline]
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}
