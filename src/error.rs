use crate::checksum::ChecksumKind;
use crate::stream::StreamState;
use crate::transport::TransportError;
use thiserror::Error;

/// The primary error type for the `labjack-u6` library.
#[derive(Error, Debug)]
pub enum U6Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Checksum could not be calculated: {len} bytes given, at least {min} required")]
    ChecksumInputTooShort { len: usize, min: usize },

    #[error("The U6 detected a bad checksum in the last command")]
    ChecksumRejectedByDevice,

    #[error("Invalid {0} checksum")]
    InvalidChecksum(ChecksumKind),

    #[error("Invalid response header: byte {offset} is {actual:#04x}, expected {expected:#04x}")]
    InvalidResponseHeader { offset: usize, expected: u8, actual: u8 },

    #[error("Response too short: expected {expected} bytes, got {actual}")]
    ResponseTooShort { expected: usize, actual: usize },

    #[error("U6 error code {code}{}", .frame.map(|f| format!(" on frame {f}")).unwrap_or_default())]
    DeviceErrorCode { code: u8, frame: Option<u8> },

    #[error("Feedback response underrun: device declared {declared} bytes, commands consumed {consumed}")]
    ResponseUnderrun { declared: usize, consumed: usize },

    #[error("Feedback response overrun: device declared {declared} bytes, commands consumed {consumed}")]
    ResponseOverrun { declared: usize, consumed: usize },

    #[error("Feedback frame of {size} bytes exceeds the {max}-byte limit")]
    FeedbackTooLarge { size: usize, max: usize },

    #[error("Send incomplete: wrote {actual} of {expected} bytes")]
    SendIncomplete { expected: usize, actual: usize },

    #[error("Invalid gain index {0}")]
    InvalidGainIndex(u8),

    #[error("Invalid stream configuration: {0}")]
    InvalidStreamConfig(String),

    #[error("Command has not received a response yet")]
    NoResponse,

    #[error("Operation not allowed while the stream is {0}")]
    InvalidStreamState(StreamState),

    #[error("Stream task failed: {0}")]
    StreamTask(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, U6Error>;
