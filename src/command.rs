//! Feedback commands.
//!
//! Each command knows its own request encoding, how many response bytes it
//! expects back, and how to decode them. [`FeedbackCommand`] is the closed set
//! the multiplexer accepts.

use crate::calibration::CalibrationInfo;
use crate::error::{Result, U6Error};
use bytes::{Buf, BufMut, BytesMut};
use modular_bitfield::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::sync::Arc;
use strum_macros::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Feedback opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Ain24 = 2,
    BitStateRead = 10,
    BitStateWrite = 11,
    BitDirWrite = 13,
    PortDirWrite = 29,
}

/// Packed resolution and gain byte of AIN24.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionGain {
    pub resolution_index: B4,
    pub gain_index: B4,
}

/// Packed settling factor and differential flag of AIN24.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettlingOptions {
    pub settling_factor: B7,
    pub differential: bool,
}

/// Packed bit number and flag used by the single-bit commands.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitOption {
    pub bit: B7,
    pub flag: bool,
}

impl BitOption {
    fn pack(bit: DigitalIoBit, flag: bool) -> u8 {
        BitOption::new().with_bit(u8::from(bit)).with_flag(flag).into_bytes()[0]
    }
}

/// Analog input gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum GainIndex {
    #[default]
    #[strum(to_string = "x1")]
    X1 = 0,
    #[strum(to_string = "x10")]
    X10 = 1,
    #[strum(to_string = "x100")]
    X100 = 2,
    #[strum(to_string = "x1000")]
    X1000 = 3,
}

/// Digital I/O lines. FIO lines are 0-7, EIO 8-15 and CIO 16-19.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum DigitalIoBit {
    FIO0 = 0,
    FIO1 = 1,
    FIO2 = 2,
    FIO3 = 3,
    FIO4 = 4,
    FIO5 = 5,
    FIO6 = 6,
    FIO7 = 7,
    EIO0 = 8,
    EIO1 = 9,
    EIO2 = 10,
    EIO3 = 11,
    EIO4 = 12,
    EIO5 = 13,
    EIO6 = 14,
    EIO7 = 15,
    CIO0 = 16,
    CIO1 = 17,
    CIO2 = 18,
    CIO3 = 19,
}

impl DigitalIoBit {
    /// Port index (0 = FIO, 1 = EIO, 2 = CIO) and bit mask within the port.
    fn port_mask(self) -> (usize, u8) {
        let n = u8::from(self);
        ((n / 8) as usize, 1 << (n % 8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BitDirection {
    #[default]
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BitState {
    #[default]
    Low,
    High,
}

/// Encode/decode capability shared by every feedback command.
pub trait FeedbackIo {
    /// Appends the request bytes of this command.
    fn encode(&self, buf: &mut BytesMut);

    /// Number of response bytes this command consumes; 0 for write-only commands.
    fn response_size(&self) -> usize;

    /// Decodes exactly [`response_size`](Self::response_size) bytes.
    fn decode(&mut self, response: &[u8]) -> Result<()>;

    /// Hands the command the calibration used to convert its readings.
    fn attach_calibration(&mut self, calibration: &Arc<CalibrationInfo>) {
        let _ = calibration;
    }
}

fn check_len(response: &[u8], expected: usize) -> Result<()> {
    if response.len() < expected {
        return Err(U6Error::ResponseTooShort {
            expected,
            actual: response.len(),
        });
    }
    Ok(())
}

/// Reads one analog input as a 24-bit code.
#[derive(Debug, Clone, PartialEq)]
pub struct Ain24 {
    pub channel: u8,
    pub resolution_index: u8,
    pub gain: GainIndex,
    pub settling_factor: u8,
    pub differential: bool,
    raw: Option<u32>,
    calibration: Option<Arc<CalibrationInfo>>,
}

impl Ain24 {
    const RESPONSE_SIZE: usize = 3;

    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            resolution_index: 0,
            gain: GainIndex::X1,
            settling_factor: 0,
            differential: false,
            raw: None,
            calibration: None,
        }
    }

    pub fn with_resolution(mut self, resolution_index: u8) -> Self {
        self.resolution_index = resolution_index;
        self
    }

    pub fn with_gain(mut self, gain: GainIndex) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_settling(mut self, settling_factor: u8) -> Self {
        self.settling_factor = settling_factor;
        self
    }

    pub fn differential(mut self) -> Self {
        self.differential = true;
        self
    }

    /// The 24-bit code from the last response.
    pub fn raw(&self) -> Option<u32> {
        self.raw
    }

    /// Calibrated reading in volts. Falls back to nominal constants when no
    /// calibration was attached.
    pub fn voltage(&self) -> Result<f64> {
        let raw = self.raw.ok_or(U6Error::NoResponse)?;
        let gain = u8::from(self.gain);
        match &self.calibration {
            Some(cal) => cal.calibrated_ain(self.resolution_index, gain, true, raw),
            None => CalibrationInfo::default().calibrated_ain(self.resolution_index, gain, true, raw),
        }
    }
}

impl FeedbackIo for Ain24 {
    fn encode(&self, buf: &mut BytesMut) {
        let resolution_gain = ResolutionGain::new()
            .with_resolution_index(self.resolution_index & 0x0F)
            .with_gain_index(u8::from(self.gain));
        let settling = SettlingOptions::new()
            .with_settling_factor(self.settling_factor & 0x7F)
            .with_differential(self.differential);
        buf.put_u8(Opcode::Ain24.into());
        buf.put_u8(self.channel);
        buf.put_slice(&resolution_gain.into_bytes());
        buf.put_slice(&settling.into_bytes());
    }

    fn response_size(&self) -> usize {
        Self::RESPONSE_SIZE
    }

    fn decode(&mut self, mut response: &[u8]) -> Result<()> {
        check_len(response, Self::RESPONSE_SIZE)?;
        self.raw = Some(response.get_uint_le(Self::RESPONSE_SIZE) as u32);
        Ok(())
    }

    fn attach_calibration(&mut self, calibration: &Arc<CalibrationInfo>) {
        self.calibration = Some(Arc::clone(calibration));
    }
}

/// Reads the state of one digital line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitStateRead {
    pub bit: DigitalIoBit,
    state: Option<bool>,
}

impl BitStateRead {
    pub fn new(bit: DigitalIoBit) -> Self {
        Self { bit, state: None }
    }

    /// True when the line read high.
    pub fn state(&self) -> Result<bool> {
        self.state.ok_or(U6Error::NoResponse)
    }
}

impl FeedbackIo for BitStateRead {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Opcode::BitStateRead.into());
        buf.put_u8(self.bit.into());
    }

    fn response_size(&self) -> usize {
        1
    }

    fn decode(&mut self, response: &[u8]) -> Result<()> {
        check_len(response, 1)?;
        self.state = Some(response[0] == 1);
        Ok(())
    }
}

/// Sets one digital line as input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitDirWrite {
    pub bit: DigitalIoBit,
    pub direction: BitDirection,
    echo: Option<u8>,
}

impl BitDirWrite {
    pub fn new(bit: DigitalIoBit, direction: BitDirection) -> Self {
        Self {
            bit,
            direction,
            echo: None,
        }
    }

    /// Byte the device returned for this command.
    pub fn echo(&self) -> Option<u8> {
        self.echo
    }
}

impl FeedbackIo for BitDirWrite {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Opcode::BitDirWrite.into());
        buf.put_u8(BitOption::pack(self.bit, self.direction == BitDirection::Output));
    }

    fn response_size(&self) -> usize {
        1
    }

    fn decode(&mut self, response: &[u8]) -> Result<()> {
        check_len(response, 1)?;
        self.echo = Some(response[0]);
        Ok(())
    }
}

/// Drives one digital line low or high.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitStateWrite {
    pub bit: DigitalIoBit,
    pub state: BitState,
}

impl BitStateWrite {
    pub fn new(bit: DigitalIoBit, state: BitState) -> Self {
        Self { bit, state }
    }
}

impl FeedbackIo for BitStateWrite {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Opcode::BitStateWrite.into());
        buf.put_u8(BitOption::pack(self.bit, self.state == BitState::High));
    }

    fn response_size(&self) -> usize {
        0
    }

    fn decode(&mut self, _response: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Sets the direction of several lines across the FIO, EIO and CIO ports.
///
/// Only lines whose bit is set in the write mask are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortDirWrite {
    pub write_mask: [u8; 3],
    pub direction: [u8; 3],
}

impl PortDirWrite {
    pub fn new(write_mask: [u8; 3], direction: [u8; 3]) -> Self {
        Self { write_mask, direction }
    }

    /// Adds one line to the write mask with the given direction.
    pub fn set(mut self, bit: DigitalIoBit, direction: BitDirection) -> Self {
        let (port, mask) = bit.port_mask();
        self.write_mask[port] |= mask;
        match direction {
            BitDirection::Output => self.direction[port] |= mask,
            BitDirection::Input => self.direction[port] &= !mask,
        }
        self
    }
}

impl FeedbackIo for PortDirWrite {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Opcode::PortDirWrite.into());
        buf.put_slice(&self.write_mask);
        buf.put_slice(&self.direction);
    }

    fn response_size(&self) -> usize {
        0
    }

    fn decode(&mut self, _response: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Every command the feedback multiplexer accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackCommand {
    Ain24(Ain24),
    BitStateRead(BitStateRead),
    BitDirWrite(BitDirWrite),
    BitStateWrite(BitStateWrite),
    PortDirWrite(PortDirWrite),
}

impl FeedbackCommand {
    fn inner(&self) -> &dyn FeedbackIo {
        match self {
            FeedbackCommand::Ain24(c) => c,
            FeedbackCommand::BitStateRead(c) => c,
            FeedbackCommand::BitDirWrite(c) => c,
            FeedbackCommand::BitStateWrite(c) => c,
            FeedbackCommand::PortDirWrite(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FeedbackIo {
        match self {
            FeedbackCommand::Ain24(c) => c,
            FeedbackCommand::BitStateRead(c) => c,
            FeedbackCommand::BitDirWrite(c) => c,
            FeedbackCommand::BitStateWrite(c) => c,
            FeedbackCommand::PortDirWrite(c) => c,
        }
    }
}

impl FeedbackIo for FeedbackCommand {
    fn encode(&self, buf: &mut BytesMut) {
        self.inner().encode(buf)
    }

    fn response_size(&self) -> usize {
        self.inner().response_size()
    }

    fn decode(&mut self, response: &[u8]) -> Result<()> {
        self.inner_mut().decode(response)
    }

    fn attach_calibration(&mut self, calibration: &Arc<CalibrationInfo>) {
        self.inner_mut().attach_calibration(calibration)
    }
}

macro_rules! impl_from_command {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for FeedbackCommand {
                fn from(command: $variant) -> Self {
                    FeedbackCommand::$variant(command)
                }
            }
        )*
    };
}

impl_from_command!(Ain24, BitStateRead, BitDirWrite, BitStateWrite, PortDirWrite);
