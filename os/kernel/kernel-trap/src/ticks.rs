use kernel_sync::SpinLock;

/// Global timer tick count.
///
/// Only one core advances it (see [`trap`](crate::trap)); sleepers read it
/// under the same lock.
pub struct TickCounter {
    ticks: SpinLock<u64>,
}

impl TickCounter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ticks: SpinLock::named("time", 0),
        }
    }

    /// Count one tick; returns the new count.
    pub fn advance(&self) -> u64 {
        self.ticks.with_lock(|t| {
            *t += 1;
            *t
        })
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        *self.ticks.lock()
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}
