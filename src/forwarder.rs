//! Batching forwarder: capture channel in, JSON over HTTPS out.
//!
//! Delivery is at-most-once. Records are consumed when they are read from the channel; a batch
//! the sink rejects is logged and dropped, never retried.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::config::ForwarderConfig;
use crate::error::CaptureError;
use crate::event::{PulseEvent, RECORD_SIZE, decode_records};
use crate::export::RecordExporter;

/// Forwarder failures.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The sink rejected the batch or could not be reached.
    #[error("sink delivery failed: {0}")]
    SinkDeliveryFailure(String),

    #[error("capture device read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("batch encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sink setup failed: {0}")]
    Setup(String),
}

impl ForwardError {
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, ForwardError::Capture(CaptureError::ChannelClosed))
    }
}

/// A byte channel of whole capture records.
pub trait RecordSource {
    /// Fill `buf` with whole records and return the byte count. `Ok(0)` means nothing is
    /// available right now.
    fn read_records(&mut self, buf: &mut [u8]) -> Result<usize, ForwardError>;
}

impl RecordSource for RecordExporter<'_> {
    fn read_records(&mut self, buf: &mut [u8]) -> Result<usize, ForwardError> {
        Ok(self.read(buf)?)
    }
}

/// Record source over any reader, such as a capture character device.
///
/// Bytes past the last whole record of a read are held back and prepended to the next one, so
/// callers only ever see record-aligned data.
pub struct DeviceSource<R> {
    reader: R,
    carry: Vec<u8>,
}

impl<R: Read> DeviceSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            carry: Vec::with_capacity(RECORD_SIZE),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> RecordSource for DeviceSource<R> {
    fn read_records(&mut self, buf: &mut [u8]) -> Result<usize, ForwardError> {
        let whole = buf.len() / RECORD_SIZE * RECORD_SIZE;
        if whole == 0 {
            return Ok(0);
        }

        let carried = self.carry.len();
        buf[..carried].copy_from_slice(&self.carry);
        self.carry.clear();

        let n = match self.reader.read(&mut buf[carried..whole]) {
            Ok(n) => n,
            Err(err) if matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => 0,
            Err(err) => return Err(err.into()),
        };

        let filled = carried + n;
        let aligned = filled / RECORD_SIZE * RECORD_SIZE;
        self.carry.extend_from_slice(&buf[aligned..filled]);
        Ok(aligned)
    }
}

/// Destination for encoded batches.
pub trait TelemetrySink {
    fn deliver(&mut self, body: &[u8]) -> Result<(), ForwardError>;
}

/// Blocking HTTPS sink that POSTs each batch with the configured credential header.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: String,
    credential_header: HeaderName,
    credential: HeaderValue,
}

impl HttpSink {
    pub fn new(config: &ForwarderConfig) -> Result<Self, ForwardError> {
        if config.insecure_skip_tls_verify {
            warn!(
                endpoint = %config.endpoint_url,
                "TLS certificate verification is DISABLED for the telemetry sink"
            );
        }
        let client = Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .build()
            .map_err(|err| ForwardError::Setup(format!("http client build failed: {err}")))?;

        let credential_header = HeaderName::from_bytes(config.credential_header.as_bytes())
            .map_err(|err| ForwardError::Setup(format!("invalid credential header: {err}")))?;
        let mut credential = HeaderValue::from_str(&config.credential)
            .map_err(|err| ForwardError::Setup(format!("invalid credential value: {err}")))?;
        credential.set_sensitive(true);

        Ok(Self {
            client,
            endpoint: config.endpoint_url.clone(),
            credential_header,
            credential,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TelemetrySink for HttpSink {
    fn deliver(&mut self, body: &[u8]) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(self.credential_header.clone(), self.credential.clone())
            .body(body.to_vec())
            .send()
            .map_err(|err| ForwardError::SinkDeliveryFailure(format!("post failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ForwardError::SinkDeliveryFailure(format!(
                "sink returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct EventBatch<'a> {
    event: &'a [WireEvent],
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    pulse_number: i64,
    time: i64,
    delta: i64,
}

impl From<PulseEvent> for WireEvent {
    fn from(event: PulseEvent) -> Self {
        Self {
            pulse_number: event.sequence,
            time: event.timestamp,
            delta: event.delta,
        }
    }
}

/// Outcome of one forwarder pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The channel had nothing to read.
    Idle,
    /// A batch of this many records reached the sink.
    Delivered(usize),
    /// A batch of this many records was read and lost to a delivery failure.
    Dropped(usize),
}

/// Running totals of a forwarder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub batches_delivered: u64,
    pub batches_failed: u64,
    pub records_delivered: u64,
    pub records_dropped: u64,
}

/// Reads up to `batch_max_records` records per pass and posts them as one JSON batch.
///
/// Single-threaded: at most one request is in flight, and a slow sink only stalls this loop.
pub struct BatchForwarder<S, K> {
    source: S,
    sink: K,
    buf: Vec<u8>,
    batch: Vec<WireEvent>,
    poll_interval: Duration,
    stats: ForwardStats,
}

impl<S: RecordSource, K: TelemetrySink> BatchForwarder<S, K> {
    pub fn new(source: S, sink: K, batch_max_records: usize, poll_interval: Duration) -> Self {
        let batch_max_records = batch_max_records.max(1);
        Self {
            source,
            sink,
            buf: vec![0; batch_max_records * RECORD_SIZE],
            batch: Vec::with_capacity(batch_max_records),
            poll_interval,
            stats: ForwardStats::default(),
        }
    }

    /// Read one batch and try to deliver it.
    ///
    /// Sink failures are absorbed (logged, counted, batch dropped). Errors are returned only for
    /// the source: [`CaptureError::ChannelClosed`] or a device read failure.
    pub fn step(&mut self) -> Result<Step, ForwardError> {
        let n = self.source.read_records(&mut self.buf)?;
        if n == 0 {
            return Ok(Step::Idle);
        }

        self.batch.clear();
        self.batch.extend(decode_records(&self.buf[..n]).map(WireEvent::from));
        let count = self.batch.len();
        // {"event":[{"pulseNumber":..,"time":..,"delta":..}, ..]}
        let body = serde_json::to_vec(&EventBatch { event: &self.batch })?;

        match self.sink.deliver(&body) {
            Ok(()) => {
                self.stats.batches_delivered += 1;
                self.stats.records_delivered += count as u64;
                debug!(records = count, bytes = body.len(), "batch delivered");
                Ok(Step::Delivered(count))
            }
            Err(err) => {
                self.stats.batches_failed += 1;
                self.stats.records_dropped += count as u64;
                warn!(records = count, error = %err, "batch dropped");
                Ok(Step::Dropped(count))
            }
        }
    }

    /// Forward until the channel closes or `stop` is raised.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<ForwardStats, ForwardError> {
        while !stop.load(Ordering::Acquire) {
            match self.step() {
                Ok(Step::Idle) => {
                    trace!(wait_ms = self.poll_interval.as_millis() as u64, "capture channel idle");
                    std::thread::sleep(self.poll_interval);
                }
                Ok(_) => {}
                Err(err) if err.is_channel_closed() => {
                    info!("capture channel closed, forwarder stopping");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        info!(
            batches_delivered = self.stats.batches_delivered,
            batches_failed = self.stats.batches_failed,
            records_delivered = self.stats.records_delivered,
            records_dropped = self.stats.records_dropped,
            "forwarder finished"
        );
        Ok(self.stats)
    }

    pub fn stats(&self) -> ForwardStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }
}
