//! Pulse records and their fixed-width wire layout.
//!
//! A record is three `i64` values in host byte order: `sequence`, `timestamp`, `delta`. There is
//! no header, framing, or checksum; a read always carries a whole number of records.

/// Serialized size of one [`PulseEvent`].
pub const RECORD_SIZE: usize = 24;

/// `delta` of the first event in a session. Deltas from a monotonic clock are never negative.
pub const FIRST_DELTA: i64 = -1;

/// One detected edge on the monitored line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PulseEvent {
    pub sequence: i64,
    /// Monotonic clock reading, nanoseconds.
    pub timestamp: i64,
    /// `timestamp` minus the previous produced event's timestamp, or [`FIRST_DELTA`].
    pub delta: i64,
}

impl PulseEvent {
    /// First event of its session. Keyed on the sequence number: a source that supplies its own
    /// timestamps can produce a real delta equal to [`FIRST_DELTA`].
    #[inline]
    pub fn is_first(&self) -> bool {
        self.sequence == 0
    }

    #[inline]
    pub fn to_ne_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        self.encode_into(&mut out);
        out
    }

    /// Write this record into the first [`RECORD_SIZE`] bytes of `out`.
    ///
    /// # Panics
    /// If `out` is shorter than [`RECORD_SIZE`].
    #[inline]
    pub fn encode_into(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.sequence.to_ne_bytes());
        out[8..16].copy_from_slice(&self.timestamp.to_ne_bytes());
        out[16..24].copy_from_slice(&self.delta.to_ne_bytes());
    }

    #[inline]
    pub fn from_ne_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let field = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            i64::from_ne_bytes(raw)
        };
        Self {
            sequence: field(0),
            timestamp: field(8),
            delta: field(16),
        }
    }
}

/// Decode every whole record in `bytes`, oldest first. A trailing partial record is ignored.
pub fn decode_records(bytes: &[u8]) -> impl Iterator<Item = PulseEvent> + '_ {
    bytes.chunks_exact(RECORD_SIZE).map(|chunk| {
        let mut record = [0u8; RECORD_SIZE];
        record.copy_from_slice(chunk);
        PulseEvent::from_ne_bytes(&record)
    })
}

#[cfg(test)]
mod tests {
    use super::{FIRST_DELTA, PulseEvent, RECORD_SIZE, decode_records};
    use proptest::prelude::*;
    use std::vec::Vec;

    #[test]
    fn layout_is_three_native_i64_in_order() {
        let ev = PulseEvent {
            sequence: 7,
            timestamp: 1_000_000_123,
            delta: -1,
        };
        let bytes = ev.to_ne_bytes();
        assert_eq!(&bytes[0..8], &7i64.to_ne_bytes());
        assert_eq!(&bytes[8..16], &1_000_000_123i64.to_ne_bytes());
        assert_eq!(&bytes[16..24], &(-1i64).to_ne_bytes());
    }

    #[test]
    fn first_is_decided_by_sequence_not_delta() {
        let first = PulseEvent {
            sequence: 0,
            timestamp: 500,
            delta: FIRST_DELTA,
        };
        let backwards = PulseEvent {
            sequence: 3,
            timestamp: 499,
            delta: FIRST_DELTA,
        };
        assert!(first.is_first());
        assert!(!backwards.is_first());
    }

    #[test]
    fn decode_preserves_order_and_values() {
        let events: Vec<PulseEvent> = (0..5)
            .map(|i| PulseEvent {
                sequence: i,
                timestamp: 1_000 * i + 42,
                delta: if i == 0 { FIRST_DELTA } else { 1_000 },
            })
            .collect();

        let mut wire = Vec::new();
        for ev in &events {
            wire.extend_from_slice(&ev.to_ne_bytes());
        }
        assert_eq!(wire.len(), events.len() * RECORD_SIZE);

        let decoded: Vec<PulseEvent> = decode_records(&wire).collect();
        assert_eq!(decoded, events);
    }

    #[test]
    fn decode_ignores_trailing_fragment() {
        let ev = PulseEvent {
            sequence: 1,
            timestamp: 2,
            delta: 3,
        };
        let mut wire = ev.to_ne_bytes().to_vec();
        wire.extend_from_slice(&[0xAA; 10]);
        assert_eq!(decode_records(&wire).collect::<Vec<_>>(), [ev]);
    }

    fn event_strategy() -> impl Strategy<Value = PulseEvent> {
        (any::<i64>(), any::<i64>(), any::<i64>()).prop_map(|(sequence, timestamp, delta)| {
            PulseEvent {
                sequence,
                timestamp,
                delta,
            }
        })
    }

    proptest! {
        /// Encoding any sequence of events and decoding the bytes yields the same sequence.
        #[test]
        fn prop_encode_decode_preserves_sequence(
            events in prop::collection::vec(event_strategy(), 0..64),
        ) {
            let mut wire = vec![0u8; events.len() * RECORD_SIZE];
            for (ev, chunk) in events.iter().zip(wire.chunks_exact_mut(RECORD_SIZE)) {
                ev.encode_into(chunk);
            }
            let decoded: Vec<PulseEvent> = decode_records(&wire).collect();
            prop_assert_eq!(decoded, events);
        }
    }
}
