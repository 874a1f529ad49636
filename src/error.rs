use thiserror::Error;

/// Failures surfaced by the capture core.
///
/// A full buffer is not among them: it is absorbed by evicting the oldest record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The trigger line or the capture channel is already claimed by another handle.
    #[error("{0} is already claimed")]
    ResourceUnavailable(Resource),

    /// The ring capacity is not a non-zero power of two.
    #[error("buffer capacity {0} is not a non-zero power of two")]
    InvalidCapacity(usize),

    /// The capture session ended and every buffered record has been read.
    #[error("capture channel closed")]
    ChannelClosed,
}

/// Single-claim resources of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    TriggerLine,
    CaptureChannel,
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Resource::TriggerLine => "trigger line",
            Resource::CaptureChannel => "capture channel",
        })
    }
}
