//! Checksums used by U6 command and response frames.
//!
//! Two layouts share the wire. Normal commands carry a single folded 8-bit
//! sum in byte 0. Extended commands (command byte `0xF8`/`0xF9`) carry a
//! 16-bit sum of the payload (`bytes[6..]`) in bytes 4-5 and an 8-bit sum of
//! the header (`bytes[1..6]`) in byte 0.

use crate::error::{Result, U6Error};
use strum_macros::Display;

/// Which checksum layer of a frame failed to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChecksumKind {
    #[strum(to_string = "8-bit")]
    Normal8,
    #[strum(to_string = "extended 16-bit")]
    Extended16,
    #[strum(to_string = "extended 8-bit")]
    Extended8,
}

const EXTENDED_CHECKSUM16_MIN_LEN: usize = 7;
const EXTENDED_CHECKSUM8_MIN_LEN: usize = 6;

/// Command-type field value marking an extended command.
const EXTENDED_COMMAND_TYPE: u8 = 15;

fn fold(mut a: u32) -> u8 {
    a = (a & 0xFF) + (a >> 8);
    a = (a & 0xFF) + (a >> 8);
    a as u8
}

/// Folded 8-bit sum of every byte given.
pub fn normal_checksum8(bytes: &[u8]) -> u8 {
    let a = bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    fold(a as u32)
}

/// 16-bit sum of the payload bytes `bytes[6..]`.
pub fn extended_checksum16(bytes: &[u8]) -> Result<u16> {
    if bytes.len() < EXTENDED_CHECKSUM16_MIN_LEN {
        return Err(U6Error::ChecksumInputTooShort {
            len: bytes.len(),
            min: EXTENDED_CHECKSUM16_MIN_LEN,
        });
    }
    Ok(bytes[6..]
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16)))
}

/// Folded 8-bit sum of the header bytes `bytes[1..6]`.
pub fn extended_checksum8(bytes: &[u8]) -> Result<u8> {
    if bytes.len() < EXTENDED_CHECKSUM8_MIN_LEN {
        return Err(U6Error::ChecksumInputTooShort {
            len: bytes.len(),
            min: EXTENDED_CHECKSUM8_MIN_LEN,
        });
    }
    let a = bytes[1..6].iter().map(|&b| b as u32).sum();
    Ok(fold(a))
}

/// Writes both extended checksums into the frame in place.
///
/// The 16-bit sum must be written before the 8-bit one, since the latter
/// covers bytes 4-5.
pub fn extended_checksum(bytes: &mut [u8]) -> Result<()> {
    let a = extended_checksum16(bytes)?;
    bytes[4..6].copy_from_slice(&a.to_le_bytes());
    bytes[0] = extended_checksum8(bytes)?;
    Ok(())
}

/// Sets the checksum appropriate to the command type encoded in byte 1.
pub fn set_checksum(bytes: &mut [u8]) -> Result<()> {
    if bytes.len() < EXTENDED_CHECKSUM8_MIN_LEN {
        return Err(U6Error::ChecksumInputTooShort {
            len: bytes.len(),
            min: EXTENDED_CHECKSUM8_MIN_LEN,
        });
    }
    if is_extended(bytes[1]) {
        extended_checksum(bytes)
    } else {
        bytes[0] = normal_checksum8(&bytes[1..]);
        Ok(())
    }
}

/// Returns true when the command byte selects the extended frame layout.
pub fn is_extended(command: u8) -> bool {
    (command & 0x78) >> 3 == EXTENDED_COMMAND_TYPE
}

/// Checks both extended checksum layers of a received frame.
pub fn verify_extended(bytes: &[u8]) -> Result<()> {
    verify_extended16(bytes)?;
    verify_extended8(bytes)
}

pub(crate) fn verify_extended16(bytes: &[u8]) -> Result<()> {
    let a = extended_checksum16(bytes)?;
    if a.to_le_bytes() != [bytes[4], bytes[5]] {
        return Err(U6Error::InvalidChecksum(ChecksumKind::Extended16));
    }
    Ok(())
}

pub(crate) fn verify_extended8(bytes: &[u8]) -> Result<()> {
    if extended_checksum8(bytes)? != bytes[0] {
        return Err(U6Error::InvalidChecksum(ChecksumKind::Extended8));
    }
    Ok(())
}

/// Checks the normal checksum in byte 0 against the rest of the frame.
pub fn verify_normal(bytes: &[u8]) -> Result<()> {
    match bytes.split_first() {
        Some((&checksum, rest)) if normal_checksum8(rest) == checksum => Ok(()),
        Some(_) => Err(U6Error::InvalidChecksum(ChecksumKind::Normal8)),
        None => Err(U6Error::ChecksumInputTooShort { len: 0, min: 1 }),
    }
}
