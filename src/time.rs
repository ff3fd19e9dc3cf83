//! Subframe time keeping.
//!
//! The MAC measures time in subframes of [`SUBFRAME_DURATION_NS`]
//! nanoseconds. The counter is advisory, not hard real-time: the engine
//! sleeps one subframe and increments, and every timeout in the system
//! (IP timeout, spectrum-sensing window, metric periodicity) is expressed
//! as a number of subframes against this counter.

use core::sync::atomic::{AtomicU64, Ordering};

use embedded_hal_async::delay::DelayNs;

use crate::consts::SUBFRAME_DURATION_NS;

/// A monotonically increasing subframe counter.
///
/// Shared by reference between the engine (the only writer) and anything
/// that stamps or ages entries against subframe time.
#[derive(Debug, Default)]
pub struct SubframeClock {
    ticks: AtomicU64,
}

impl SubframeClock {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// The current subframe number.
    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Advance the counter by one subframe and return the new value.
    pub fn advance(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Extension over [`DelayNs`] for subframe-granular sleeps.
pub trait DelayNsExt: DelayNs + Clone {
    /// Sleep for the given number of subframes.
    async fn delay_subframes(&mut self, subframes: u32) {
        let mut remaining = subframes as u64 * SUBFRAME_DURATION_NS as u64;

        while remaining > u32::MAX as u64 {
            self.delay_ns(u32::MAX).await;
            remaining -= u32::MAX as u64;
        }

        self.delay_ns(remaining as u32).await;
    }
}

impl<T: DelayNs + Clone> DelayNsExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotone() {
        let clock = SubframeClock::new();
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
        assert_eq!(clock.now(), 2);
    }
}
