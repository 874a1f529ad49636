//! Pulse capture for edge-triggered meter lines, plus the forwarder that ships it.
//!
//! # Highlights
//! - Lock-free SPSC overwrite-oldest ring: the capture path never blocks, allocates, or fails.
//! - Per-edge records with sequence number, monotonic timestamp, and inter-arrival delta.
//! - Record-aligned byte export: reads never split a 24-byte record.
//! - `std`: TOML configuration and a batching JSON/HTTPS forwarder.
//!
//! # Quick start
//! ```
//! use ph_pulse::{CaptureState, ManualClock, RECORD_SIZE, decode_records};
//!
//! let state = CaptureState::new(64, ManualClock::new(1_000)).unwrap();
//! let producer = state.try_producer().unwrap();
//! let mut exporter = state.try_exporter().unwrap();
//!
//! producer.on_edge();
//! state.clock().advance(250);
//! producer.on_edge();
//!
//! let mut buf = [0u8; RECORD_SIZE * 8];
//! let n = exporter.read(&mut buf).unwrap();
//! let events: Vec<_> = decode_records(&buf[..n]).collect();
//! assert_eq!(events.len(), 2);
//! assert_eq!(events[1].delta, 250);
//! ```
//!
//! # No-std
//! Without the default `std` feature the capture core (`ring`, `event`, `clock`, `capture`,
//! `export`) builds as `#![no_std]` + `alloc`. Storage is allocated once when the session starts.
//!
//! # Safety and concurrency
//! Exactly one producer and one consumer may be active. Handles are claimed with
//! `try_producer`/`try_exporter`; a second claim fails with
//! [`CaptureError::ResourceUnavailable`] until the first handle is dropped.
//!
//! # Semantics
//! - Sequence numbers start at `0` and increase by one per produced event.
//! - The first event's delta is [`FIRST_DELTA`]; later deltas are measured against the previous
//!   produced event even if it was evicted unread.
//! - A push on a full ring evicts exactly the oldest record; [`CaptureState::evicted`] counts them.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod capture;
pub mod clock;
pub mod error;
pub mod event;
pub mod export;
pub mod ring;
mod sync;

#[cfg(feature = "std")]
pub mod app;
#[cfg(feature = "std")]
pub mod config;
#[cfg(feature = "std")]
pub mod forwarder;

pub use capture::{CaptureState, EventProducer};
#[cfg(feature = "std")]
pub use clock::MonotonicClock;
pub use clock::{ManualClock, TimestampSource};
pub use error::{CaptureError, Resource};
pub use event::{FIRST_DELTA, PulseEvent, RECORD_SIZE, decode_records};
pub use export::RecordExporter;
pub use ring::{RingBuffer, RingConsumer, RingProducer};

#[cfg(feature = "std")]
pub use config::{CaptureConfig, ConfigError, ForwarderConfig, PulseConfig};
#[cfg(feature = "std")]
pub use forwarder::{
    BatchForwarder, DeviceSource, ForwardError, ForwardStats, HttpSink, RecordSource, Step,
    TelemetrySink,
};

#[cfg(all(test, not(feature = "std")))]
extern crate std;
