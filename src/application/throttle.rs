/// 滑动窗口限流 - Sliding-window throttle trackers
///
/// A tracker remembers when each slot in the trailing window was taken. A
/// slot taken at `t` is free again once `t + window <= now`, so at most
/// `capacity` slots are ever held inside any half-open window `(now - window, now]`,
/// including bursts that land exactly on a boundary.
///
/// Requests may need several slots; acquisition is all-or-nothing.

use crate::shared::config::ThrottleConfig;
use crate::shared::error::EngineError;
use crate::shared::types::NanoOfDay;
use std::collections::VecDeque;

pub trait ThrottleTracker: Send {
    /// Takes `slots` permits at `now` if all of them are available
    fn try_acquire(&mut self, slots: u32, now: NanoOfDay) -> bool;

    /// Permits free at `now`
    fn available(&mut self, now: NanoOfDay) -> u32;

    fn capacity(&self) -> u32;

    /// Earliest time at which another slot is released, if any is held
    fn next_release_at(&self) -> Option<NanoOfDay>;
}

#[derive(Debug, Clone)]
pub struct SlidingWindowThrottleTracker {
    window_ns: i64,
    capacity: u32,
    /// 每个已占用slot的获取时间（按时间升序）
    taken_at: VecDeque<NanoOfDay>,
}

impl SlidingWindowThrottleTracker {
    pub fn new(window_ns: i64, capacity: u32) -> Self {
        Self {
            window_ns,
            capacity,
            taken_at: VecDeque::with_capacity(capacity as usize),
        }
    }

    pub fn window_ns(&self) -> i64 {
        self.window_ns
    }

    fn evict(&mut self, now: NanoOfDay) {
        while let Some(&front) = self.taken_at.front() {
            if front + self.window_ns <= now {
                self.taken_at.pop_front();
            } else {
                break;
            }
        }
    }
}

impl ThrottleTracker for SlidingWindowThrottleTracker {
    fn try_acquire(&mut self, slots: u32, now: NanoOfDay) -> bool {
        self.evict(now);
        if self.taken_at.len() + slots as usize > self.capacity as usize {
            return false;
        }
        self.taken_at.extend(std::iter::repeat(now).take(slots as usize));
        true
    }

    fn available(&mut self, now: NanoOfDay) -> u32 {
        self.evict(now);
        self.capacity.saturating_sub(self.taken_at.len() as u32)
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn next_release_at(&self) -> Option<NanoOfDay> {
        self.taken_at.front().map(|t| t + self.window_ns)
    }
}

/// Independent throttle pools, addressed by `assigned_throttle_tracker_index`
pub struct ThrottleTrackers {
    trackers: Vec<Box<dyn ThrottleTracker>>,
}

impl ThrottleTrackers {
    pub fn new(trackers: Vec<Box<dyn ThrottleTracker>>) -> Self {
        Self { trackers }
    }

    /// One sliding-window tracker per config entry; a single default pool if none are given
    pub fn from_config(configs: &[ThrottleConfig]) -> Self {
        let trackers: Vec<Box<dyn ThrottleTracker>> = if configs.is_empty() {
            let default = ThrottleConfig::default();
            vec![Box::new(SlidingWindowThrottleTracker::new(default.window_ns, default.capacity))]
        } else {
            configs
                .iter()
                .map(|c| Box::new(SlidingWindowThrottleTracker::new(c.window_ns, c.capacity)) as Box<dyn ThrottleTracker>)
                .collect()
        };
        Self { trackers }
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut dyn ThrottleTracker, EngineError> {
        match self.trackers.get_mut(index) {
            Some(tracker) => Ok(tracker.as_mut()),
            None => Err(EngineError::UnknownThrottleTracker(index)),
        }
    }

    /// Fails requests that could never be admitted by their pool
    pub fn check_admissible(&self, index: usize, slots: u32) -> Result<(), EngineError> {
        let tracker = self
            .trackers
            .get(index)
            .ok_or(EngineError::UnknownThrottleTracker(index))?;
        if slots > tracker.capacity() {
            return Err(EngineError::ThrottleExceedsCapacity {
                required: slots,
                capacity: tracker.capacity(),
            });
        }
        Ok(())
    }
}
