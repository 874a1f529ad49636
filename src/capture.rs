//! Capture session state and the edge-triggered producer.
//!
//! A [`CaptureState`] owns everything the capture path mutates: the ring, the running sequence
//! counter, and the last observed timestamp. The producer and the exporter borrow it through
//! single-claim handles, so the two contexts never share anything except this one instance.

use tracing::info;

use crate::clock::TimestampSource;
use crate::error::{CaptureError, Resource};
use crate::event::{FIRST_DELTA, PulseEvent};
use crate::export::RecordExporter;
use crate::ring::{RingBuffer, RingProducer};
use crate::sync::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Owned state of one capture session.
pub struct CaptureState<C: TimestampSource> {
    clock: C,
    ring: RingBuffer<PulseEvent>,
    next_sequence: AtomicI64,
    last_timestamp: AtomicI64,
    evicted: AtomicU64,
    closed: AtomicBool,
}

impl<C: TimestampSource> CaptureState<C> {
    /// Start a session with a ring of `capacity` records (a non-zero power of two).
    pub fn new(capacity: usize, clock: C) -> Result<Self, CaptureError> {
        let ring =
            RingBuffer::with_capacity(capacity).ok_or(CaptureError::InvalidCapacity(capacity))?;
        Ok(Self {
            clock,
            ring,
            next_sequence: AtomicI64::new(0),
            last_timestamp: AtomicI64::new(0),
            evicted: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Claim the trigger line. Only one producer may be active.
    pub fn try_producer(&self) -> Result<EventProducer<'_, C>, CaptureError> {
        let ring = self
            .ring
            .try_producer()
            .ok_or(CaptureError::ResourceUnavailable(Resource::TriggerLine))?;
        Ok(EventProducer { state: self, ring })
    }

    /// Claim the capture channel. Only one exporter may be active.
    pub fn try_exporter(&self) -> Result<RecordExporter<'_>, CaptureError> {
        let consumer = self
            .ring
            .try_consumer()
            .ok_or(CaptureError::ResourceUnavailable(Resource::CaptureChannel))?;
        Ok(RecordExporter::new(consumer, &self.closed))
    }

    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Events produced since the session started, including evicted ones.
    #[inline]
    pub fn produced(&self) -> u64 {
        self.next_sequence.load(Ordering::Acquire) as u64
    }

    /// Records lost unread: evicted because the ring was full, or produced after `close`.
    #[inline]
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Acquire)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// End the session. The exporter drains what is left, then reports
    /// [`CaptureError::ChannelClosed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(
                produced = self.produced(),
                evicted = self.evicted(),
                buffered = self.len(),
                "capture channel closed"
            );
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<C: TimestampSource> Drop for CaptureState<C> {
    fn drop(&mut self) {
        info!(
            produced = self.produced(),
            evicted = self.evicted(),
            unread = self.len(),
            "capture session torn down"
        );
    }
}

/// Records one [`PulseEvent`] per detected edge.
///
/// Runs in the asynchronous trigger context: constant time, no allocation, no locks, no logging,
/// and no failure. Overload is absorbed by evicting the oldest buffered record.
pub struct EventProducer<'a, C: TimestampSource> {
    state: &'a CaptureState<C>,
    ring: RingProducer<'a, PulseEvent>,
}

impl<'a, C: TimestampSource> EventProducer<'a, C> {
    /// Record an edge stamped with the session clock.
    #[inline]
    pub fn on_edge(&self) -> PulseEvent {
        self.on_edge_at(self.state.clock.now())
    }

    /// Record an edge whose timestamp was taken by the signal source.
    ///
    /// The delta is measured against the previous *produced* event, whether or not that event is
    /// still buffered. Once the session is closed the event is still returned but not buffered.
    pub fn on_edge_at(&self, timestamp: i64) -> PulseEvent {
        let state = self.state;
        let sequence = state.next_sequence.load(Ordering::Relaxed);
        let delta = if sequence == 0 {
            FIRST_DELTA
        } else {
            timestamp.wrapping_sub(state.last_timestamp.load(Ordering::Relaxed))
        };
        let event = PulseEvent {
            sequence,
            timestamp,
            delta,
        };

        // After close the record is discarded and counted as lost, never buffered.
        if state.closed.load(Ordering::Acquire) || self.ring.push(event).is_some() {
            state.evicted.fetch_add(1, Ordering::Relaxed);
        }

        state.next_sequence.store(sequence.wrapping_add(1), Ordering::Release);
        state.last_timestamp.store(timestamp, Ordering::Release);
        event
    }
}
