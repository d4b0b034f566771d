/// 时间服务 - nano-of-day clocks
///
/// Every deadline in the engine (`timeout_at_nano_of_day`, throttle windows,
/// matching order delay) is expressed in nanoseconds since local midnight.
///
/// - `SystemTimer`: anchored to the wall clock once at construction, then
///   advanced with `Instant` so it never goes backwards
/// - `ManualTimer`: driven explicitly, for tests and replay

use crate::shared::types::{NanoOfDay, NANOS_PER_DAY};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic nanosecond-of-day clock consumed by the executor and engines
pub trait TimerService: Send + Sync {
    fn nano_of_day(&self) -> NanoOfDay;
}

/// Wall-anchored monotonic clock
pub struct SystemTimer {
    anchor_nano_of_day: NanoOfDay,
    anchor: Instant,
}

impl SystemTimer {
    pub fn new() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self {
            anchor_nano_of_day: (since_epoch % NANOS_PER_DAY as u128) as NanoOfDay,
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for SystemTimer {
    #[inline]
    fn nano_of_day(&self) -> NanoOfDay {
        // 跨越午夜后继续递增，保证单调
        self.anchor_nano_of_day + self.anchor.elapsed().as_nanos() as NanoOfDay
    }
}

/// Explicitly driven clock
#[derive(Debug, Default)]
pub struct ManualTimer {
    now: AtomicI64,
}

impl ManualTimer {
    pub fn starting_at(now: NanoOfDay) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: NanoOfDay) {
        self.now.store(now, Ordering::Release);
    }

    pub fn advance(&self, nanos: i64) -> NanoOfDay {
        self.now.fetch_add(nanos, Ordering::AcqRel) + nanos
    }
}

impl TimerService for ManualTimer {
    #[inline]
    fn nano_of_day(&self) -> NanoOfDay {
        self.now.load(Ordering::Acquire)
    }
}
