//! Record-aligned read interface over the capture ring.

use tracing::trace;

use crate::error::CaptureError;
use crate::event::{PulseEvent, RECORD_SIZE};
use crate::ring::RingConsumer;
use crate::sync::{AtomicBool, Ordering};

/// Drains buffered records, oldest first, into caller-supplied byte buffers.
///
/// Every successful read returns a whole number of [`RECORD_SIZE`] records. An empty ring yields
/// `Ok(0)` ("nothing right now"); the read never waits for data.
pub struct RecordExporter<'a> {
    consumer: RingConsumer<'a, PulseEvent>,
    closed: &'a AtomicBool,
    finished: bool,
}

impl<'a> RecordExporter<'a> {
    pub(crate) fn new(consumer: RingConsumer<'a, PulseEvent>, closed: &'a AtomicBool) -> Self {
        Self {
            consumer,
            closed,
            finished: false,
        }
    }

    /// Fill `buf` with up to `buf.len() / RECORD_SIZE` records.
    ///
    /// Bytes past the last whole record are left untouched. Once the session is closed and the
    /// ring is empty this returns [`CaptureError::ChannelClosed`], and keeps returning it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        if self.finished {
            return Err(CaptureError::ChannelClosed);
        }
        // Sampled before draining so records pushed ahead of `close` are still delivered.
        let closed = self.closed.load(Ordering::Acquire);

        let mut written = 0;
        for chunk in buf.chunks_exact_mut(RECORD_SIZE) {
            match self.consumer.pop_front() {
                Some(event) => {
                    event.encode_into(chunk);
                    written += RECORD_SIZE;
                }
                None => break,
            }
        }

        if written == 0 && closed && self.consumer.ring().is_empty() {
            self.finished = true;
            return Err(CaptureError::ChannelClosed);
        }
        if written > 0 {
            trace!(requested = buf.len(), returned = written, "capture read");
        }
        Ok(written)
    }

    /// Records currently waiting to be read.
    #[inline]
    pub fn pending(&self) -> usize {
        self.consumer.ring().len()
    }
}
