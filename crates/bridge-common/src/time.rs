//! Monotonic time helpers.
//!
//! The link engine itself never reads a clock: every scheduling decision
//! is driven by a `dt_ms` handed to `tick()` by the caller (see
//! `bridge_link::timer`). `Clock`/`Instant` exist only so a host-side
//! caller (the tester binary) has one, teacher-shaped way to turn a real
//! monotonic clock into those deltas between polls.

use core::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Instant {
    nanos: u64,
}

impl Instant {
    pub const fn new(nanos: u64) -> Self {
        Instant { nanos }
    }

    pub const fn nanos(self) -> u64 {
        self.nanos
    }
}

pub enum TimeDirection {
    Forward(Duration),
    Backward(Duration),
}

/// A monotonic clock. Implemented by the host tester over
/// `CLOCK_MONOTONIC`; the `no_std` core never implements or calls this.
pub trait Clock {
    /// Opaque clock reading, kept generic so a target whose hardware
    /// timer wraps at 32 bits isn't forced through a widening `u64`
    /// reading it doesn't have.
    type TInstant: Copy;

    fn current_instant(&self) -> Self::TInstant;

    /// Signed difference `newer - older`, accounting for a clock that
    /// may have wrapped between the two readings.
    fn diff(&self, newer: Self::TInstant, older: Self::TInstant) -> TimeDirection;

    /// Milliseconds elapsed since `since`, saturating at 0 if `since` is
    /// in the future (the clock went backward).
    fn elapsed_ms_since(&self, since: Self::TInstant) -> u32 {
        match self.diff(self.current_instant(), since) {
            TimeDirection::Forward(d) => d.as_millis().min(u32::MAX as u128) as u32,
            TimeDirection::Backward(_) => 0,
        }
    }
}
