//! Validation shared by the extended command responses.

use crate::checksum::{verify_extended8, verify_extended16};
use crate::constants::{BAD_CHECKSUM_MARKER, ERROR_CODE_OFFSET};
use crate::error::{Result, U6Error};

/// Shortest frame that still carries an error code.
const MIN_RESPONSE_SIZE: usize = 7;

/// Checks an extended response against its expected length and the first
/// three header bytes (command, word count, extended command number).
pub fn validate_response(response: &[u8], expected_len: usize, header: [u8; 3]) -> Result<()> {
    if response.len() < MIN_RESPONSE_SIZE {
        return Err(U6Error::ResponseTooShort {
            expected: expected_len,
            actual: response.len(),
        });
    }
    if response[..2] == BAD_CHECKSUM_MARKER {
        return Err(U6Error::ChecksumRejectedByDevice);
    }
    for (i, &expected) in header.iter().enumerate() {
        let actual = response[i + 1];
        if actual != expected {
            return Err(U6Error::InvalidResponseHeader {
                offset: i + 1,
                expected,
                actual,
            });
        }
    }
    let code = response[ERROR_CODE_OFFSET];
    if code != 0 {
        return Err(U6Error::DeviceErrorCode { code, frame: None });
    }
    verify_extended16(response)?;
    verify_extended8(response)?;
    if response.len() < expected_len {
        return Err(U6Error::ResponseTooShort {
            expected: expected_len,
            actual: response.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{ChecksumKind, extended_checksum};

    const HEADER: [u8; 3] = [0xF8, 0x01, 0x11];

    fn frame() -> Vec<u8> {
        let mut frame = vec![0, 0xF8, 0x01, 0x11, 0, 0, 0, 0];
        extended_checksum(&mut frame).unwrap();
        frame
    }

    #[test]
    fn test_valid_response() {
        assert!(validate_response(&frame(), 8, HEADER).is_ok());
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            validate_response(&[0xF8; 6], 8, HEADER),
            Err(U6Error::ResponseTooShort { expected: 8, actual: 6 })
        ));
    }

    #[test]
    fn test_bad_checksum_marker() {
        let response = [0xB8, 0xB8, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            validate_response(&response, 8, HEADER),
            Err(U6Error::ChecksumRejectedByDevice)
        ));
    }

    #[test]
    fn test_header_mismatch() {
        let mut response = frame();
        response[3] = 0x2D;
        assert!(matches!(
            validate_response(&response, 8, HEADER),
            Err(U6Error::InvalidResponseHeader {
                offset: 3,
                expected: 0x11,
                actual: 0x2D
            })
        ));
    }

    #[test]
    fn test_device_error_precedes_checksum() {
        let mut response = frame();
        response[6] = 48;
        assert!(matches!(
            validate_response(&response, 8, HEADER),
            Err(U6Error::DeviceErrorCode { code: 48, frame: None })
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut response = frame();
        response[7] = 1;
        assert!(matches!(
            validate_response(&response, 8, HEADER),
            Err(U6Error::InvalidChecksum(ChecksumKind::Extended16))
        ));

        let mut response = frame();
        response[0] ^= 0x10;
        assert!(matches!(
            validate_response(&response, 8, HEADER),
            Err(U6Error::InvalidChecksum(ChecksumKind::Extended8))
        ));
    }
}
