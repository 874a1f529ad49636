//! Lock-free SPSC overwrite-oldest ring for interrupt-driven capture.
//!
//! # Overview
//! - Single producer, single consumer, each claimed through a handle.
//! - Producer never blocks: a push on a full ring evicts exactly the oldest record and hands it
//!   back to the caller.
//! - Consumer drains strictly in insertion order with `pop_front`.
//! - Capacity is a power of two fixed at construction; storage is allocated once, never resized.
//!
//! # Memory ordering
//! `head` (oldest live index) and `tail` (next write index) are free-running counters masked into
//! the slot array. Only the producer stores `tail`, publishing a written slot with `Release`.
//! `head` is shared: the consumer advances it after copying a slot out, the producer advances it
//! when it evicts, and both do so with an `AcqRel` compare-and-swap. A consumer whose CAS fails has
//! raced an eviction; the copy it took may be torn and is discarded without being interpreted.
//!
//! # Bounded work
//! `push` retries its eviction CAS at most once: the CAS only fails when the consumer has just
//! popped, after which the ring is no longer full. `pop_front` retries only when an eviction
//! overtook it, so every retry is paid for by producer progress.

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr;

use crate::sync::{AtomicBool, AtomicUsize, Ordering};

fn unsafe_cell_slice<T>(len: usize) -> Box<[UnsafeCell<MaybeUninit<T>>]> {
    (0..len).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect()
}

/// Fixed-capacity overwrite-oldest FIFO shared by one producer and one consumer.
pub struct RingBuffer<T: Copy> {
    head: AtomicUsize,
    tail: AtomicUsize,
    mask: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    producer_claimed: AtomicBool,
    consumer_claimed: AtomicBool,
}

unsafe impl<T: Copy + Send> Sync for RingBuffer<T> {}

impl<T: Copy> RingBuffer<T> {
    /// Allocate a ring holding `capacity` records.
    ///
    /// Returns `None` unless `capacity` is a non-zero power of two.
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        if !capacity.is_power_of_two() {
            return None;
        }
        Some(Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            mask: capacity - 1,
            slots: unsafe_cell_slice::<T>(capacity),
            producer_claimed: AtomicBool::new(false),
            consumer_claimed: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Number of buffered records. Racing operations may make the value stale immediately.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim the producer handle. `None` while another producer is active.
    pub fn try_producer(&self) -> Option<RingProducer<'_, T>> {
        self.producer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RingProducer { ring: self })
    }

    /// Claim the consumer handle. `None` while another consumer is active.
    pub fn try_consumer(&self) -> Option<RingConsumer<'_, T>> {
        self.consumer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RingConsumer { ring: self })
    }

    #[inline(always)]
    fn slot(&self, index: usize) -> *mut MaybeUninit<T> {
        self.slots[index & self.mask].get()
    }

    #[inline]
    fn push_inner(&self, value: T) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let mut evicted = None;

        loop {
            let head = self.head.load(Ordering::Acquire);
            if tail.wrapping_sub(head) <= self.mask {
                break;
            }
            // Full. Only this side writes slots, so the oldest slot is stable while we copy it.
            let oldest = unsafe { (*self.slot(head)).assume_init_read() };
            if self
                .head
                .compare_exchange(head, head.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                evicted = Some(oldest);
                break;
            }
        }

        unsafe { (*self.slot(tail)).as_mut_ptr().write(value) };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        evicted
    }

    #[inline]
    fn pop_inner(&self) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            if head == tail {
                return None;
            }

            // Copied as MaybeUninit: if an eviction races this read the bytes may be torn, and they
            // are only assumed initialised once the CAS proves the slot was still ours.
            let copy = unsafe { ptr::read_volatile(self.slot(head)) };

            if self
                .head
                .compare_exchange(head, head.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(unsafe { copy.assume_init() });
            }
        }
    }
}

/// Write side of a [`RingBuffer`].
pub struct RingProducer<'a, T: Copy> {
    ring: &'a RingBuffer<T>,
}

impl<'a, T: Copy> RingProducer<'a, T> {
    /// Insert unconditionally, returning the record evicted to make room, if any.
    #[inline]
    pub fn push(&self, value: T) -> Option<T> {
        self.ring.push_inner(value)
    }
}

impl<T: Copy> Drop for RingProducer<'_, T> {
    fn drop(&mut self) {
        self.ring.producer_claimed.store(false, Ordering::Release);
    }
}

/// Read side of a [`RingBuffer`].
pub struct RingConsumer<'a, T: Copy> {
    ring: &'a RingBuffer<T>,
}

impl<'a, T: Copy> RingConsumer<'a, T> {
    /// Remove and return the oldest record.
    #[inline]
    pub fn pop_front(&mut self) -> Option<T> {
        self.ring.pop_inner()
    }

    #[inline]
    pub fn ring(&self) -> &'a RingBuffer<T> {
        self.ring
    }
}

impl<T: Copy> Drop for RingConsumer<'_, T> {
    fn drop(&mut self) {
        self.ring.consumer_claimed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    fn drain(ring: &RingBuffer<u32>) -> Vec<u32> {
        let mut consumer = ring.try_consumer().unwrap();
        core::iter::from_fn(|| consumer.pop_front()).collect()
    }

    #[test]
    fn rejects_non_power_of_two_capacity() {
        assert!(RingBuffer::<u32>::with_capacity(0).is_none());
        assert!(RingBuffer::<u32>::with_capacity(6).is_none());
        assert_eq!(RingBuffer::<u32>::with_capacity(8).unwrap().capacity(), 8);
    }

    #[test]
    fn pop_front_empty_returns_none() {
        let ring = RingBuffer::<u32>::with_capacity(4).unwrap();
        let mut consumer = ring.try_consumer().unwrap();
        assert_eq!(consumer.pop_front(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn pops_in_insertion_order() {
        let ring = RingBuffer::<u32>::with_capacity(8).unwrap();
        let producer = ring.try_producer().unwrap();

        assert_eq!(producer.push(10), None);
        assert_eq!(producer.push(11), None);
        assert_eq!(producer.push(12), None);
        assert_eq!(ring.len(), 3);

        assert_eq!(drain(&ring), [10, 11, 12]);
        assert!(ring.is_empty());
    }

    #[test]
    fn full_push_evicts_exactly_the_oldest() {
        let ring = RingBuffer::<u32>::with_capacity(4).unwrap();
        let producer = ring.try_producer().unwrap();

        for seq in 1..=4 {
            assert_eq!(producer.push(seq), None);
        }
        assert_eq!(producer.push(5), Some(1));
        assert_eq!(ring.len(), 4);

        assert_eq!(drain(&ring), [2, 3, 4, 5]);
    }

    #[test]
    fn interleaved_pop_makes_room_without_eviction() {
        let ring = RingBuffer::<u32>::with_capacity(2).unwrap();
        let producer = ring.try_producer().unwrap();
        let mut consumer = ring.try_consumer().unwrap();

        producer.push(1);
        producer.push(2);
        assert_eq!(consumer.pop_front(), Some(1));
        assert_eq!(producer.push(3), None);
        assert_eq!(producer.push(4), Some(2));
        assert_eq!(consumer.pop_front(), Some(3));
        assert_eq!(consumer.pop_front(), Some(4));
        assert_eq!(consumer.pop_front(), None);
    }

    #[test]
    fn handles_are_exclusive_until_dropped() {
        let ring = RingBuffer::<u32>::with_capacity(4).unwrap();

        let producer = ring.try_producer().unwrap();
        assert!(ring.try_producer().is_none());
        drop(producer);
        assert!(ring.try_producer().is_some());

        let consumer = ring.try_consumer().unwrap();
        assert!(ring.try_consumer().is_none());
        drop(consumer);
        assert!(ring.try_consumer().is_some());
    }

    #[test]
    fn concurrent_drain_sees_increasing_values() {
        const PUSHES: u64 = 200_000;
        let ring = RingBuffer::<u64>::with_capacity(64).unwrap();

        let (seen, evicted) = std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                let producer = ring.try_producer().unwrap();
                let mut evicted = 0u64;
                for value in 0..PUSHES {
                    if producer.push(value).is_some() {
                        evicted += 1;
                    }
                }
                evicted
            });

            let mut consumer = ring.try_consumer().unwrap();
            let mut seen = Vec::new();
            loop {
                match consumer.pop_front() {
                    Some(v) => seen.push(v),
                    None if writer.is_finished() && ring.is_empty() => break,
                    None => std::hint::spin_loop(),
                }
            }
            (seen, writer.join().unwrap())
        });

        assert!(seen.windows(2).all(|w| w[0] < w[1]), "values out of order");
        assert_eq!(seen.len() as u64 + evicted, PUSHES);
        assert_eq!(seen.last().copied(), Some(PUSHES - 1));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u32),
        Pop,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u32>().prop_map(Op::Push), Just(Op::Pop)]
    }

    proptest! {
        /// Any single-threaded interleaving behaves like a bounded deque that drops its front.
        #[test]
        fn prop_matches_bounded_deque(
            shift in 0u32..5,
            ops in prop::collection::vec(op_strategy(), 0..200),
        ) {
            let capacity = 1usize << shift;
            let ring = RingBuffer::<u32>::with_capacity(capacity).unwrap();
            let producer = ring.try_producer().unwrap();
            let mut consumer = ring.try_consumer().unwrap();
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    Op::Push(v) => {
                        let expected = if model.len() == capacity {
                            model.pop_front()
                        } else {
                            None
                        };
                        model.push_back(v);
                        prop_assert_eq!(producer.push(v), expected);
                    }
                    Op::Pop => prop_assert_eq!(consumer.pop_front(), model.pop_front()),
                }
                prop_assert!(ring.len() <= ring.capacity());
                prop_assert_eq!(ring.len(), model.len());
            }
        }
    }
}
