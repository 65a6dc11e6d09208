//! Feedback multiplexer.
//!
//! Several commands share one extended frame. The request header is seven
//! bytes (the seventh an echo byte), the response header nine: error code,
//! index of the failing command, and the echo.

use crate::checksum::{extended_checksum, verify_extended8, verify_extended16};
use crate::command::{FeedbackCommand, FeedbackIo};
use crate::constants::{
    ERROR_CODE_OFFSET, EXTENDED_COMMAND, EXTENDED_HEADER_SIZE, FEEDBACK_HEADER_SIZE, FEEDBACK_RESPONSE_HEADER_SIZE,
    FEEDBACK_TAG, MAX_FEEDBACK_FRAME_SIZE,
};
use crate::error::{Result, U6Error};
use bytes::{BufMut, BytesMut};

const ECHO_OFFSET: usize = 6;
const ERROR_FRAME_OFFSET: usize = 7;
const RESPONSE_ECHO_OFFSET: usize = 8;

fn round_up_even(n: usize) -> usize {
    n + n % 2
}

/// Total length of the response the device sends for `commands`.
pub fn response_len(commands: &[FeedbackCommand]) -> usize {
    let data: usize = commands.iter().map(FeedbackIo::response_size).sum();
    round_up_even(FEEDBACK_RESPONSE_HEADER_SIZE + data)
}

/// Builds the framed request for `commands`.
pub fn encode_request(commands: &[FeedbackCommand], echo: u8) -> Result<Vec<u8>> {
    let mut header = [0u8; FEEDBACK_HEADER_SIZE];
    header[1] = EXTENDED_COMMAND;
    header[3] = FEEDBACK_TAG;
    header[ECHO_OFFSET] = echo;

    let mut frame = BytesMut::with_capacity(MAX_FEEDBACK_FRAME_SIZE);
    frame.put_slice(&header);
    for command in commands {
        command.encode(&mut frame);
    }
    if (frame.len() - EXTENDED_HEADER_SIZE) % 2 != 0 {
        frame.put_u8(0);
    }

    let response_len = response_len(commands);
    if frame.len() > MAX_FEEDBACK_FRAME_SIZE || response_len > MAX_FEEDBACK_FRAME_SIZE {
        return Err(U6Error::FeedbackTooLarge {
            size: frame.len().max(response_len),
            max: MAX_FEEDBACK_FRAME_SIZE,
        });
    }

    frame[2] = ((frame.len() - EXTENDED_HEADER_SIZE) / 2) as u8;
    extended_checksum(&mut frame)?;
    Ok(frame.to_vec())
}

/// Validates a feedback response and hands each command its slice.
pub fn decode_response(commands: &mut [FeedbackCommand], response: &[u8], echo: u8) -> Result<()> {
    let expected_len = response_len(commands);
    if response.len() < FEEDBACK_RESPONSE_HEADER_SIZE {
        return Err(U6Error::ResponseTooShort {
            expected: expected_len,
            actual: response.len(),
        });
    }

    verify_extended16(response)?;
    expect_byte(response, 1, EXTENDED_COMMAND)?;
    expect_byte(response, 3, FEEDBACK_TAG)?;
    let code = response[ERROR_CODE_OFFSET];
    if code != 0 {
        return Err(U6Error::DeviceErrorCode {
            code,
            frame: Some(response[ERROR_FRAME_OFFSET]),
        });
    }
    verify_extended8(response)?;
    expect_byte(response, RESPONSE_ECHO_OFFSET, echo)?;

    // The word count covers everything from the error byte on, so the data
    // section is what remains after the three status bytes.
    let declared = (response[2] as usize * 2).saturating_sub(FEEDBACK_RESPONSE_HEADER_SIZE - EXTENDED_HEADER_SIZE);
    let consumed = expected_len - FEEDBACK_RESPONSE_HEADER_SIZE;
    let unpadded: usize = commands.iter().map(FeedbackIo::response_size).sum();
    if declared < unpadded {
        return Err(U6Error::ResponseUnderrun {
            declared,
            consumed: unpadded,
        });
    }
    if declared > consumed {
        return Err(U6Error::ResponseOverrun {
            declared,
            consumed: unpadded,
        });
    }
    if response.len() < expected_len {
        return Err(U6Error::ResponseTooShort {
            expected: expected_len,
            actual: response.len(),
        });
    }

    let mut offset = FEEDBACK_RESPONSE_HEADER_SIZE;
    for command in commands.iter_mut() {
        let size = command.response_size();
        command.decode(&response[offset..offset + size])?;
        offset += size;
    }
    Ok(())
}

fn expect_byte(response: &[u8], offset: usize, expected: u8) -> Result<()> {
    let actual = response[offset];
    if actual != expected {
        return Err(U6Error::InvalidResponseHeader {
            offset,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumKind;
    use crate::command::{Ain24, BitDirWrite, BitDirection, BitState, BitStateRead, BitStateWrite, DigitalIoBit};

    fn response_frame(echo: u8, data: &[u8]) -> Vec<u8> {
        let mut frame = vec![0, EXTENDED_COMMAND, 0, FEEDBACK_TAG, 0, 0, 0, 0, echo];
        frame.extend_from_slice(data);
        if frame.len() % 2 != 0 {
            frame.push(0);
        }
        frame[2] = ((frame.len() - EXTENDED_HEADER_SIZE) / 2) as u8;
        extended_checksum(&mut frame).unwrap();
        frame
    }

    #[test]
    fn test_encode_single_ain24() {
        let commands = [FeedbackCommand::from(Ain24::new(0).with_resolution(8))];
        let frame = encode_request(&commands, 1).unwrap();
        assert_eq!(hex::encode(&frame), "07f803000b00010200080000");
    }

    #[test]
    fn test_encode_pads_odd_payload() {
        let commands = [
            FeedbackCommand::from(BitStateWrite::new(DigitalIoBit::FIO2, BitState::High)),
            FeedbackCommand::from(BitStateRead::new(DigitalIoBit::FIO2)),
        ];
        let frame = encode_request(&commands, 0x22).unwrap();
        // echo + two 2-byte commands = 5 payload bytes, padded to 6
        assert_eq!(frame.len(), 12);
        assert_eq!(frame[2], 3);
        assert_eq!(&frame[6..], &[0x22, 11, 0x82, 10, 2, 0]);

        let commands = [FeedbackCommand::from(Ain24::new(1)), FeedbackCommand::from(Ain24::new(2))];
        let frame = encode_request(&commands, 0).unwrap();
        // echo + 8 bytes = 9, padded to 10
        assert_eq!(frame.len(), 16);
        assert_eq!(frame[2], 5);
    }

    #[test]
    fn test_encode_rejects_oversized_batch() {
        let commands: Vec<FeedbackCommand> = (0..20).map(|ch| Ain24::new(ch).into()).collect();
        assert!(matches!(
            encode_request(&commands, 0),
            Err(U6Error::FeedbackTooLarge { max: 64, .. })
        ));
    }

    #[test]
    fn test_decode_walks_commands_in_order() {
        let mut commands = [
            FeedbackCommand::from(Ain24::new(0).with_resolution(1)),
            FeedbackCommand::from(BitStateWrite::new(DigitalIoBit::FIO0, BitState::Low)),
            FeedbackCommand::from(BitStateRead::new(DigitalIoBit::FIO1)),
            FeedbackCommand::from(BitDirWrite::new(DigitalIoBit::FIO2, BitDirection::Output)),
        ];
        let response = response_frame(9, &[0x00, 0xF3, 0x82, 0x01, 0x82]);
        assert_eq!(response.len(), response_len(&commands));

        decode_response(&mut commands, &response, 9).unwrap();

        let FeedbackCommand::Ain24(ain) = &commands[0] else {
            panic!("unexpected variant");
        };
        assert_eq!(ain.raw(), Some(0x82F300));
        let FeedbackCommand::BitStateRead(read) = &commands[2] else {
            panic!("unexpected variant");
        };
        assert!(read.state().unwrap());
        let FeedbackCommand::BitDirWrite(dir) = &commands[3] else {
            panic!("unexpected variant");
        };
        assert_eq!(dir.echo(), Some(0x82));
    }

    #[test]
    fn test_decode_device_error_reports_frame() {
        let mut commands = [FeedbackCommand::from(Ain24::new(0))];
        let mut response = response_frame(1, &[0, 0, 0]);
        response[6] = 40;
        response[7] = 0;
        extended_checksum(&mut response).unwrap();
        assert!(matches!(
            decode_response(&mut commands, &response, 1),
            Err(U6Error::DeviceErrorCode { code: 40, frame: Some(0) })
        ));
    }

    #[test]
    fn test_decode_checksum_failures() {
        let mut commands = [FeedbackCommand::from(Ain24::new(0))];
        let mut response = response_frame(1, &[1, 2, 3]);
        response[10] ^= 0xFF;
        assert!(matches!(
            decode_response(&mut commands, &response, 1),
            Err(U6Error::InvalidChecksum(ChecksumKind::Extended16))
        ));

        let mut response = response_frame(1, &[1, 2, 3]);
        response[0] = response[0].wrapping_add(1);
        assert!(matches!(
            decode_response(&mut commands, &response, 1),
            Err(U6Error::InvalidChecksum(ChecksumKind::Extended8))
        ));
    }

    #[test]
    fn test_decode_header_and_echo_mismatch() {
        let mut commands = [FeedbackCommand::from(BitStateRead::new(DigitalIoBit::FIO0))];
        let mut response = response_frame(1, &[0]);
        response[3] = 0x11;
        extended_checksum(&mut response).unwrap();
        assert!(matches!(
            decode_response(&mut commands, &response, 1),
            Err(U6Error::InvalidResponseHeader { offset: 3, .. })
        ));

        let response = response_frame(2, &[0]);
        assert!(matches!(
            decode_response(&mut commands, &response, 1),
            Err(U6Error::InvalidResponseHeader {
                offset: 8,
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_decode_accounting_mismatch() {
        // device answered for one AIN24 but two were sent
        let mut commands = [FeedbackCommand::from(Ain24::new(0)), FeedbackCommand::from(Ain24::new(1))];
        let mut response = response_frame(1, &[1, 2, 3]);
        response.resize(response_len(&commands), 0);
        assert!(matches!(
            decode_response(&mut commands, &response, 1),
            Err(U6Error::ResponseUnderrun {
                declared: 3,
                consumed: 6
            })
        ));

        // device answered with more data than the commands consume
        let mut commands = [FeedbackCommand::from(BitStateRead::new(DigitalIoBit::FIO0))];
        let response = response_frame(1, &[1, 2, 3, 4]);
        assert!(matches!(
            decode_response(&mut commands, &response, 1),
            Err(U6Error::ResponseOverrun {
                declared: 5,
                consumed: 1
            })
        ));
    }

    #[test]
    fn test_decode_short_read() {
        let mut commands = [FeedbackCommand::from(Ain24::new(0))];
        assert!(matches!(
            decode_response(&mut commands, &[0xF8; 5], 0),
            Err(U6Error::ResponseTooShort { expected: 12, actual: 5 })
        ));
    }
}
