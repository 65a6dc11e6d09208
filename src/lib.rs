pub mod calibration;
pub mod checksum;
pub mod command;
pub mod constants;
pub mod device;
pub mod device_info;
pub mod error;
pub mod feedback;
pub mod response;
pub mod stream;
pub mod transport;

// Re-export the session and the types most callers need
pub use calibration::CalibrationInfo;
pub use command::{
    Ain24, BitDirWrite, BitDirection, BitState, BitStateRead, BitStateWrite, DigitalIoBit, FeedbackCommand, GainIndex,
    PortDirWrite,
};
pub use device::U6;
pub use device_info::{DeviceDesc, DeviceType};
pub use error::{Result, U6Error};
pub use stream::{ChannelConfig, ChannelData, Stream, StreamConfig, StreamResponse, StreamState};
pub use transport::{MockTransport, NusbTransport, Pipe, Transport, TransportConfig, TransportError};
