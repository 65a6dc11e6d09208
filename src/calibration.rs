//! Calibration constants and analog conversion.
//!
//! Constant layout (indices 24-39 repeat 0-15 for the high-resolution ADC):
//!
//! | index | meaning                              |
//! |-------|--------------------------------------|
//! | 0-7   | AIN slope/offset pairs, gain 0-3     |
//! | 8-15  | AIN negative slope/center, gain 0-3  |
//! | 16-19 | DAC0/DAC1 slope and offset           |
//! | 20-21 | current outputs 0 and 1              |
//! | 22-23 | temperature slope and offset         |

use crate::constants::{CALIBRATION_BLOCKS, CONSTANTS_PER_BLOCK};
use crate::error::{Result, U6Error};
use byteorder::{ByteOrder, LittleEndian};
use std::sync::Arc;

pub const NUM_CALIBRATION_CONSTANTS: usize = 40;

/// Offset of the high-resolution AIN block.
const HIGH_RES_OFFSET: usize = 24;

/// Resolution indices above this select the high-resolution constants.
const MAX_BASE_RESOLUTION_INDEX: u8 = 8;

const MAX_GAIN_INDEX: u8 = 4;

/// Product ID the U6 reports in its calibration memory.
pub const U6_PRODUCT_ID: u8 = 6;

/// Nominal constants used until the device's own are read.
#[rustfmt::skip]
const NOMINAL_CONSTANTS: [f64; NUM_CALIBRATION_CONSTANTS] = [
    0.00031580578, -10.5869565220,
    0.000031580578, -1.05869565220,
    0.0000031580578, -0.105869565220,
    0.00000031580578, -0.0105869565220,
    -0.000315805800, 33523.0,
    -0.0000315805800, 33523.0,
    -0.00000315805800, 33523.0,
    -0.000000315805800, 33523.0,
    13200.0, 0.0,
    13200.0, 0.0,
    0.00001, 0.0002,
    -92.379, 465.129,
    0.00031580578, -10.5869565220,
    0.000031580578, -1.05869565220,
    0.0000031580578, -0.105869565220,
    0.00000031580578, -0.0105869565220,
    -0.000315805800, 33523.0,
    -0.0000315805800, 33523.0,
    -0.00000315805800, 33523.0,
    -0.000000315805800, 33523.0,
];

/// Calibration of one device. Frozen once built and shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationInfo {
    product_id: u8,
    high_resolution: bool,
    constants: [f64; NUM_CALIBRATION_CONSTANTS],
}

impl Default for CalibrationInfo {
    fn default() -> Self {
        Self {
            product_id: U6_PRODUCT_ID,
            high_resolution: false,
            constants: NOMINAL_CONSTANTS,
        }
    }
}

impl CalibrationInfo {
    pub fn new(product_id: u8, high_resolution: bool, constants: [f64; NUM_CALIBRATION_CONSTANTS]) -> Self {
        Self {
            product_id,
            high_resolution,
            constants,
        }
    }

    pub fn product_id(&self) -> u8 {
        self.product_id
    }

    /// True for devices with the high-resolution ADC (U6-Pro).
    pub fn high_resolution(&self) -> bool {
        self.high_resolution
    }

    pub fn constants(&self) -> &[f64; NUM_CALIBRATION_CONSTANTS] {
        &self.constants
    }

    /// Converts a raw ADC code into volts.
    ///
    /// `high_resolution` marks 24-bit codes (AIN24 feedback), which are scaled
    /// down to 16 bits before the lookup. The conversion is piecewise around
    /// the calibrated center point of the selected gain range.
    pub fn calibrated_ain(&self, resolution_index: u8, gain_index: u8, high_resolution: bool, raw: u32) -> Result<f64> {
        if gain_index > MAX_GAIN_INDEX {
            return Err(U6Error::InvalidGainIndex(gain_index));
        }

        let mut value = raw as f64;
        if high_resolution {
            value /= 256.0;
        }

        let adjust = if resolution_index > MAX_BASE_RESOLUTION_INDEX {
            HIGH_RES_OFFSET
        } else {
            0
        };
        let base = adjust + gain_index as usize * 2;
        let constant = |i: usize| {
            self.constants
                .get(base + i)
                .copied()
                .ok_or(U6Error::InvalidGainIndex(gain_index))
        };

        let center = constant(9)?;
        if value < center {
            Ok((center - value) * constant(8)?)
        } else {
            Ok((value - center) * constant(0)?)
        }
    }
}

/// Decodes an 8-byte fixed-point calibration value.
///
/// The low four bytes are an unsigned fraction of 2^32, the high four a
/// signed whole part, both little-endian.
pub fn fixed_point_to_f64(bytes: &[u8; 8]) -> f64 {
    let fraction = LittleEndian::read_u32(&bytes[0..4]);
    let whole = LittleEndian::read_i32(&bytes[4..8]);
    whole as f64 + fraction as f64 / 4_294_967_296.0
}

/// Collects calibration memory blocks before freezing them.
#[derive(Debug)]
pub struct CalibrationBuilder {
    product_id: u8,
    high_resolution: bool,
    constants: [f64; NUM_CALIBRATION_CONSTANTS],
}

impl CalibrationBuilder {
    pub fn new(high_resolution: bool) -> Self {
        Self {
            product_id: U6_PRODUCT_ID,
            high_resolution,
            constants: [0.0; NUM_CALIBRATION_CONSTANTS],
        }
    }

    /// Stores the four constants of memory block `block` (0-9).
    pub fn set_block(&mut self, block: usize, data: &[u8; 32]) {
        debug_assert!(block < CALIBRATION_BLOCKS);
        let offset = block * CONSTANTS_PER_BLOCK;
        for (i, chunk) in data.chunks_exact(8).enumerate() {
            let mut field = [0u8; 8];
            field.copy_from_slice(chunk);
            self.constants[offset + i] = fixed_point_to_f64(&field);
        }
    }

    pub fn build(self) -> Arc<CalibrationInfo> {
        Arc::new(CalibrationInfo::new(
            self.product_id,
            self.high_resolution,
            self.constants,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_positive() {
        let data = [0, 0, 148, 38, 54, 131, 0, 0];
        assert_eq!(fixed_point_to_f64(&data), 33590.15069580078);
    }

    #[test]
    fn test_fixed_point_negative() {
        let data = [190, 139, 221, 228, 255, 255, 255, 255];
        assert!((fixed_point_to_f64(&data) - -0.10599447833374143).abs() < 1e-15);
    }

    #[test]
    fn test_invalid_gain_index() {
        let cal = CalibrationInfo::default();
        assert!(matches!(
            cal.calibrated_ain(1, 5, false, 0),
            Err(U6Error::InvalidGainIndex(5))
        ));
        // Gain index 4 is accepted but runs past the high-resolution block
        assert!(cal.calibrated_ain(1, 4, false, 0).is_ok());
        assert!(cal.calibrated_ain(9, 4, false, 0).is_err());
    }

    #[test]
    fn test_conversion_is_monotonic_around_center() {
        let cal = CalibrationInfo::default();
        let center = cal.constants()[9] as u32;

        let mut previous = f64::NEG_INFINITY;
        for raw in (0..=u16::MAX as u32).step_by(257) {
            let volts = cal.calibrated_ain(1, 0, false, raw).unwrap();
            assert!(volts >= previous, "not monotonic at raw {raw}");
            previous = volts;
        }

        assert!(cal.calibrated_ain(1, 0, false, center - 1).unwrap() < 0.0);
        assert_eq!(cal.calibrated_ain(1, 0, false, center).unwrap(), 0.0);
        assert!(cal.calibrated_ain(1, 0, false, center + 1).unwrap() > 0.0);
    }

    #[test]
    fn test_high_resolution_code_is_scaled() {
        let cal = CalibrationInfo::default();
        let low = cal.calibrated_ain(8, 1, false, 40_000).unwrap();
        let high = cal.calibrated_ain(8, 1, true, 40_000 * 256).unwrap();
        assert!((low - high).abs() < 1e-12);
    }

    #[test]
    fn test_builder_places_blocks() {
        let mut builder = CalibrationBuilder::new(true);
        let mut block = [0u8; 32];
        // second constant of the block: whole part 2
        block[12] = 2;
        builder.set_block(3, &block);
        let cal = builder.build();
        assert!(cal.high_resolution());
        assert_eq!(cal.product_id(), U6_PRODUCT_ID);
        assert_eq!(cal.constants()[13], 2.0);
        assert_eq!(cal.constants()[12], 0.0);
    }
}
