//! Byte transport the protocol engine runs over.
//!
//! The U6 exposes three bulk pipes: commands go out on one, their responses
//! come back on a second, and stream data arrives on a third. Everything
//! above this module only sees [`Transport`].

mod mock;
mod usb;

pub use self::mock::MockTransport;
pub use self::usb::{NusbTransport, TransportConfig};

use std::future::Future;
use strum_macros::Display;
use thiserror::Error;

/// Logical pipes of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Pipe {
    /// Commands, host to device.
    ControlOut,
    /// Command responses, device to host.
    ControlIn,
    /// Stream data, device to host.
    StreamIn,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer error: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    #[error("Timeout during USB operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Cannot {operation} on {pipe}")]
    WrongDirection { pipe: Pipe, operation: &'static str },

    #[error("Stream pipe is not open")]
    StreamNotOpen,

    #[error("Transport closed")]
    Closed,
}

/// A duplex byte transport over the device's three pipes.
///
/// Implementations must tolerate a read on [`Pipe::StreamIn`] running
/// concurrently with a command exchange on the control pipes.
pub trait Transport: Send + Sync + 'static {
    /// Writes one transfer, returning the number of bytes accepted.
    fn write(&self, pipe: Pipe, data: &[u8]) -> impl Future<Output = Result<usize, TransportError>> + Send;

    /// Reads one transfer into `buf`, returning the number of bytes received.
    fn read(&self, pipe: Pipe, buf: &mut [u8]) -> impl Future<Output = Result<usize, TransportError>> + Send;

    /// Prepares the stream pipe for packets of `packet_size` bytes.
    fn open_stream(&self, packet_size: usize) -> impl Future<Output = Result<(), TransportError>> + Send {
        let _ = packet_size;
        async { Ok(()) }
    }

    /// Releases the stream pipe.
    fn close_stream(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        async { Ok(()) }
    }
}
