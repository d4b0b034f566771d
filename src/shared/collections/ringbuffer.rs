/// 多生产者单消费者环形缓冲区（MPSC RingBuffer）
///
/// Hand-off queue between caller threads and one consumer thread:
/// - capacity fixed at construction, must be a power of two (index = seq & mask)
/// - slots are pre-filled with `T::default()` and reused; producers write the
///   payload into the slot in place, so publishing never allocates
/// - publish order is the order in which producers claim a sequence; the
///   consumer observes slots strictly in that order
/// - a full ring makes `publish_with` spin/yield until the consumer frees a
///   slot (backpressure, no unbounded queueing)
///
/// ```text
///   producers ──claim seq (CAS tail)──▶ [slot seq&mask] ──▶ consumer (head)
/// ```
///
/// Each slot carries a sequence stamp: `pos` means free for the producer that
/// claims `pos`, `pos + 1` means published and readable by the consumer.

use crate::shared::error::EngineError;
use crossbeam::utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<T>,
}

struct Ring<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    /// 下一个可申请的序号（生产者共享）
    tail: CachePadded<AtomicUsize>,
    /// 下一个待消费的序号（仅消费者写）
    head: CachePadded<AtomicUsize>,
}

// 安全性：slot 的访问由 stamp 协议串行化，同一时刻只有一个线程持有 &mut T
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

/// Creates a ring and returns its publishing and consuming halves
///
/// Fails fast with `InvalidRingBufferSize` unless `capacity` is a power of two
/// and at least 2.
pub fn ring_buffer<T: Default>(capacity: usize) -> Result<(Publisher<T>, Consumer<T>), EngineError> {
    if capacity < 2 || !capacity.is_power_of_two() {
        return Err(EngineError::InvalidRingBufferSize(capacity));
    }

    let slots = (0..capacity)
        .map(|i| Slot {
            stamp: AtomicUsize::new(i),
            value: UnsafeCell::new(T::default()),
        })
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let ring = Arc::new(Ring {
        slots,
        mask: capacity - 1,
        tail: CachePadded::new(AtomicUsize::new(0)),
        head: CachePadded::new(AtomicUsize::new(0)),
    });

    Ok((Publisher { ring: Arc::clone(&ring) }, Consumer { ring }))
}

/// Cloneable producer half; any number of threads may publish
pub struct Publisher<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
        }
    }
}

impl<T> Publisher<T> {
    /// Claims the next slot and lets `fill` write the payload into it
    ///
    /// Returns the publish sequence, or hands `fill` back if the ring is full.
    pub fn try_publish_with<F>(&self, fill: F) -> Result<u64, F>
    where
        F: FnOnce(&mut T),
    {
        let ring = &*self.ring;
        let backoff = Backoff::new();
        let mut pos = ring.tail.load(Ordering::Relaxed);

        loop {
            let slot = &ring.slots[pos & ring.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);
            let lag = (stamp as isize).wrapping_sub(pos as isize);

            if lag == 0 {
                match ring.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // 安全性：CAS 成功后该 slot 由本生产者独占，直到 stamp 更新
                        unsafe { fill(&mut *slot.value.get()) };
                        slot.stamp.store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(pos as u64);
                    }
                    Err(current) => pos = current,
                }
            } else if lag < 0 {
                // slot 尚未被消费者释放：环已满
                return Err(fill);
            } else {
                backoff.spin();
                pos = ring.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Like `try_publish_with` but waits while the ring is full
    pub fn publish_with<F>(&self, fill: F) -> u64
    where
        F: FnOnce(&mut T),
    {
        let backoff = Backoff::new();
        let mut fill = fill;
        loop {
            match self.try_publish_with(fill) {
                Ok(seq) => return seq,
                Err(returned) => {
                    fill = returned;
                    if backoff.is_completed() {
                        thread::yield_now();
                    } else {
                        backoff.snooze();
                    }
                }
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }
}

/// Single consumer half; not cloneable
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Consumer<T> {
    /// Processes the next published slot in place, if any
    ///
    /// The slot is handed back to producers once `process` returns, so the
    /// reference must not be retained.
    pub fn try_consume_with<R, F>(&mut self, process: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let ring = &*self.ring;
        let pos = ring.head.load(Ordering::Relaxed);
        let slot = &ring.slots[pos & ring.mask];

        if slot.stamp.load(Ordering::Acquire) != pos.wrapping_add(1) {
            return None;
        }

        // 安全性：stamp == pos + 1 表示生产者已完成写入，且只有唯一消费者
        let result = unsafe { process(&mut *slot.value.get()) };
        slot.stamp
            .store(pos.wrapping_add(ring.mask).wrapping_add(1), Ordering::Release);
        ring.head.store(pos.wrapping_add(1), Ordering::Relaxed);
        Some(result)
    }

    /// Number of published but not yet consumed slots (approximate under contention)
    pub fn backlog(&self) -> usize {
        let tail = self.ring.tail.load(Ordering::Relaxed);
        let head = self.ring.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head)
    }

    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }
}
