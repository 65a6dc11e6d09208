// Protocol constants for the LabJack U6

/// LabJack USB vendor ID
pub const VID: u16 = 0x0CD5;

/// Product ID shared by the U6 and U6-Pro
pub const PID: u16 = 0x0006;

/// Bulk OUT endpoint carrying every command
pub const ENDPOINT_OUT: u8 = 0x01;

/// Bulk IN endpoint carrying command responses
pub const ENDPOINT_IN: u8 = 0x82;

/// Bulk IN endpoint carrying stream data
pub const ENDPOINT_STREAM_IN: u8 = 0x83;

/// Command byte of every extended command frame
pub const EXTENDED_COMMAND: u8 = 0xF8;

/// Command byte of stream data packets
pub const STREAM_DATA_COMMAND: u8 = 0xF9;

/// Extended command number of stream data packets
pub const STREAM_DATA_TAG: u8 = 0xC0;

/// Extended command number of ConfigU6
pub const CONFIG_U6_TAG: u8 = 0x08;

/// Extended command number of ReadMem (calibration blocks)
pub const READ_MEM_TAG: u8 = 0x2D;

/// Extended command number of StreamConfig
pub const STREAM_CONFIG_TAG: u8 = 0x11;

/// Extended command number of Feedback
pub const FEEDBACK_TAG: u8 = 0x00;

/// Two-byte handshakes for starting and stopping a stream
pub const STREAM_START_COMMAND: [u8; 2] = [0xA8, 0xA8];
pub const STREAM_STOP_COMMAND: [u8; 2] = [0xB0, 0xB0];

/// First response byte of the start/stop handshakes
pub const STREAM_START_RESPONSE: u8 = 0xA9;
pub const STREAM_STOP_RESPONSE: u8 = 0xB1;

/// Echoed when the device rejects a command checksum
pub const BAD_CHECKSUM_MARKER: [u8; 2] = [0xB8, 0xB8];

/// Length of the extended frame header (checksum8, command, words, tag, checksum16)
pub const EXTENDED_HEADER_SIZE: usize = 6;

/// Offset of the device error code in extended responses
pub const ERROR_CODE_OFFSET: usize = 6;

/// ConfigU6 request and response sizes
pub const CONFIG_U6_COMMAND_SIZE: usize = 26;
pub const CONFIG_U6_RESPONSE_SIZE: usize = 38;

/// ReadMem request and response sizes
pub const READ_MEM_COMMAND_SIZE: usize = 8;
pub const READ_MEM_RESPONSE_SIZE: usize = 40;

/// Number of calibration memory blocks and constants per block
pub const CALIBRATION_BLOCKS: usize = 10;
pub const CONSTANTS_PER_BLOCK: usize = 4;

/// Feedback frame: 7-byte request header, 9-byte response header
pub const FEEDBACK_HEADER_SIZE: usize = 7;
pub const FEEDBACK_RESPONSE_HEADER_SIZE: usize = 9;

/// Largest feedback request or response the device accepts
pub const MAX_FEEDBACK_FRAME_SIZE: usize = 64;

/// StreamConfig frame sizes
pub const STREAM_CONFIG_HEADER_SIZE: usize = 14;
pub const STREAM_CONFIG_RESPONSE_SIZE: usize = 8;

/// Stream handshake response size
pub const STREAM_HANDSHAKE_RESPONSE_SIZE: usize = 4;

/// Stream packets carry 14 bytes of framing around the samples
pub const STREAM_PACKET_OVERHEAD: usize = 14;

/// Offset of the first sample in a stream packet
pub const STREAM_SAMPLES_OFFSET: usize = 12;

/// Limits on stream configuration
pub const MAX_SAMPLES_PER_PACKET: u8 = 25;
pub const MAX_STREAM_CHANNELS: usize = 25;
pub const MAX_STREAM_RESOLUTION_INDEX: u8 = 8;

/// Capacity of the queue between the decode task and the caller
pub const STREAM_QUEUE_CAPACITY: usize = 100;

/// Device error codes with protocol meaning
pub const ERROR_STREAM_NOT_RUNNING: u8 = 52;
pub const ERROR_STREAM_OVERFLOW: u8 = 59;
pub const ERROR_STREAM_AUTO_RECOVERY: u8 = 60;
