//! Frame builders shared by the integration tests

// Not every test file uses every builder
#![allow(dead_code)]

pub use labjack_u6::checksum::{extended_checksum, normal_checksum8};
pub use labjack_u6::{CalibrationInfo, MockTransport, U6};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Serial number reported by [`config_response`].
pub const SERIAL: u32 = 360_012_345;

/// Routes library logs to the test output; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env_lossy();
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer().with_target(false))
        .try_init();
}

/// Builds an extended response: checksums filled, word count derived from the length.
pub fn extended_response(command: u8, tag: u8, body: &[u8]) -> Vec<u8> {
    let mut frame = vec![0, command, 0, tag, 0, 0];
    frame.extend_from_slice(body);
    if frame.len() % 2 != 0 {
        frame.push(0);
    }
    frame[2] = ((frame.len() - 6) / 2) as u8;
    extended_checksum(&mut frame).unwrap();
    frame
}

/// ConfigU6 response for a device with the given version byte.
pub fn config_response(version_info: u8) -> Vec<u8> {
    let mut body = vec![0u8; 32];
    // error, reserved x2, firmware 1.43, bootloader 4.00, hardware 2.00
    body[3..9].copy_from_slice(&[43, 1, 0, 4, 0, 2]);
    body[9..13].copy_from_slice(&SERIAL.to_le_bytes());
    body[13..15].copy_from_slice(&6u16.to_le_bytes());
    body[15] = 1;
    body[31] = version_info;
    extended_response(0xF8, 0x08, &body)
}

/// Encodes a value the way calibration memory stores it.
pub fn fixed_point(value: f64) -> [u8; 8] {
    let whole = value.floor();
    let fraction = ((value - whole) * 4_294_967_296.0) as u32;
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&fraction.to_le_bytes());
    bytes[4..].copy_from_slice(&(whole as i32).to_le_bytes());
    bytes
}

/// ReadMem response carrying four constants.
pub fn calibration_block_response(constants: &[f64]) -> Vec<u8> {
    let mut body = vec![0u8; 2];
    for &c in constants {
        body.extend_from_slice(&fixed_point(c));
    }
    extended_response(0xF8, 0x2D, &body)
}

/// Scripts the ten calibration blocks with the nominal constants.
pub fn push_calibration(mock: &MockTransport) {
    let nominal = CalibrationInfo::default();
    for block in nominal.constants().chunks(4) {
        mock.push_response(calibration_block_response(block));
    }
}

/// Opens a session over a mock scripted with the init and calibration exchange.
pub async fn open_session(version_info: u8) -> (U6<MockTransport>, MockTransport) {
    init_tracing();
    let mock = MockTransport::new();
    mock.push_response(config_response(version_info));
    push_calibration(&mock);
    let u6 = U6::open(mock.clone()).await.unwrap();
    (u6, mock)
}

/// Feedback response with the given echo and command data.
pub fn feedback_response(echo: u8, data: &[u8]) -> Vec<u8> {
    let mut body = vec![0, 0, echo];
    body.extend_from_slice(data);
    extended_response(0xF8, 0x00, &body)
}

/// Start/stop handshake response.
pub fn handshake_response(command: u8, code: u8) -> Vec<u8> {
    let mut response = vec![0, command, code, 0];
    response[0] = normal_checksum8(&response[1..]);
    response
}

/// StreamConfig acknowledgement.
pub fn stream_config_response(code: u8) -> Vec<u8> {
    extended_response(0xF8, 0x11, &[code, 0])
}

/// Stream data packet.
pub fn stream_packet(samples: &[u16], packet_id: u8, status: u8) -> Vec<u8> {
    let mut body = vec![0, 0, 0, 0, packet_id, status];
    for s in samples {
        body.extend_from_slice(&s.to_le_bytes());
    }
    // backlog, trailing byte
    body.extend_from_slice(&[0, 0]);
    let mut frame = extended_response(0xF9, 0xC0, &body);
    frame[2] = 4 + samples.len() as u8;
    extended_checksum(&mut frame).unwrap();
    frame
}
