//! Timer service (spec §4.5): a fixed set of named one-shot timers driven
//! by a monotonic `tick(dt_ms)` delta, no heap, no trait-object callbacks.
//! `tick` returns the set of timers that fired this call; the caller
//! (the link engine) matches on that set rather than timers invoking
//! closures, keeping control flow centralized and allocation-free.

/// `dt` is capped at this many milliseconds per `tick()` call, so a large
/// jump (e.g. after a debugger halt) can't fire every timer at once.
pub const MAX_TICK_DT_MS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerId {
    AckTimeout = 0,
    RxDedupe = 1,
    BaudrateChange = 2,
    StartupStabilization = 3,
}

const TIMER_COUNT: usize = 4;
const ALL_TIMERS: [TimerId; TIMER_COUNT] = [
    TimerId::AckTimeout,
    TimerId::RxDedupe,
    TimerId::BaudrateChange,
    TimerId::StartupStabilization,
];

#[derive(Clone, Copy, Default)]
struct TimerSlot {
    /// Milliseconds remaining; `None` means the timer is not armed.
    remaining_ms: Option<u32>,
}

/// Up to `TIMER_COUNT` timer ids that fired during one `tick()` call.
#[derive(Default)]
pub struct FiredTimers {
    ids: [Option<TimerId>; TIMER_COUNT],
    len: usize,
}

impl FiredTimers {
    fn push(&mut self, id: TimerId) {
        self.ids[self.len] = Some(id);
        self.len += 1;
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.ids[..self.len].iter().any(|&x| x == Some(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = TimerId> + '_ {
        self.ids[..self.len].iter().filter_map(|&x| x)
    }
}

pub struct TimerService {
    slots: [TimerSlot; TIMER_COUNT],
}

impl TimerService {
    pub const fn new() -> Self {
        TimerService {
            slots: [TimerSlot { remaining_ms: None }; TIMER_COUNT],
        }
    }

    fn slot(&mut self, id: TimerId) -> &mut TimerSlot {
        &mut self.slots[id as usize]
    }

    pub fn arm(&mut self, id: TimerId, period_ms: u32) {
        self.slot(id).remaining_ms = Some(period_ms);
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.slot(id).remaining_ms = None;
    }

    pub fn cancel_all(&mut self) {
        for id in ALL_TIMERS {
            self.cancel(id);
        }
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.slots[id as usize].remaining_ms.is_some()
    }

    /// Advances every armed timer by `dt_ms` (clamped to
    /// `MAX_TICK_DT_MS`) and returns which ones expired. No timer
    /// preempts another: all expiries for this tick are collected before
    /// the caller reacts to any of them.
    #[must_use]
    pub fn tick(&mut self, dt_ms: u32) -> FiredTimers {
        let dt_ms = dt_ms.min(MAX_TICK_DT_MS);
        let mut fired = FiredTimers::default();

        for id in ALL_TIMERS {
            let slot = self.slot(id);
            if let Some(remaining) = slot.remaining_ms {
                if dt_ms >= remaining {
                    slot.remaining_ms = None;
                    fired.push(id);
                } else {
                    slot.remaining_ms = Some(remaining - dt_ms);
                }
            }
        }

        fired
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_fires_exactly_at_deadline() {
        let mut svc = TimerService::new();
        svc.arm(TimerId::AckTimeout, 75);
        assert!(!svc.tick(50).contains(TimerId::AckTimeout));
        assert!(svc.tick(25).contains(TimerId::AckTimeout));
        // Firing disarms it.
        assert!(!svc.is_armed(TimerId::AckTimeout));
    }

    #[test]
    fn dt_is_capped_to_avoid_starvation() {
        let mut svc = TimerService::new();
        svc.arm(TimerId::AckTimeout, MAX_TICK_DT_MS + 500);
        let fired = svc.tick(MAX_TICK_DT_MS + 500);
        assert!(!fired.contains(TimerId::AckTimeout));
    }

    #[test]
    fn cancel_prevents_firing() {
        let mut svc = TimerService::new();
        svc.arm(TimerId::RxDedupe, 10);
        svc.cancel(TimerId::RxDedupe);
        assert!(!svc.tick(100).contains(TimerId::RxDedupe));
    }

    #[test]
    fn independent_timers_can_fire_in_the_same_tick() {
        let mut svc = TimerService::new();
        svc.arm(TimerId::AckTimeout, 10);
        svc.arm(TimerId::StartupStabilization, 10);
        let fired = svc.tick(10);
        assert!(fired.contains(TimerId::AckTimeout));
        assert!(fired.contains(TimerId::StartupStabilization));
    }
}
