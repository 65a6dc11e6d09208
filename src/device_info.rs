use crate::checksum::extended_checksum;
use crate::constants::{CONFIG_U6_COMMAND_SIZE, CONFIG_U6_RESPONSE_SIZE, CONFIG_U6_TAG, EXTENDED_COMMAND};
use crate::error::{Result, U6Error};
use crate::response::validate_response;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Header of the ConfigU6 response: 16 words follow the checksum.
pub const CONFIG_U6_RESPONSE_HEADER: [u8; 3] = [EXTENDED_COMMAND, 0x10, CONFIG_U6_TAG];

/// Bit of the version byte set on devices with the high-resolution ADC.
const HIGH_RESOLUTION_FLAG: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum DeviceType {
    #[strum(to_string = "U6")]
    U6 = 4,
    #[strum(to_string = "U6-Pro")]
    U6Pro = 12,
    #[num_enum(catch_all)]
    #[strum(to_string = "Unknown")]
    Unknown(u8),
}

/// ConfigU6 response as laid out on the wire.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ConfigResponseRaw {
    pub checksum8: u8,
    pub command: u8,
    pub words: u8,
    pub extended_command: u8,
    pub checksum16: U16,
    pub error_code: u8,
    reserved0: [u8; 2],
    pub firmware_version: [u8; 2], // minor, major
    pub bootloader_version: [u8; 2],
    pub hardware_version: [u8; 2],
    pub serial_number: U32,
    pub product_id: U16,
    pub local_id: u8,
    reserved1: [u8; 15],
    pub version_info: u8,
}

/// Identity of a connected U6, read once during session setup.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceDesc {
    pub firmware_version: String,
    pub bootloader_version: String,
    pub hardware_version: String,
    pub serial_number: u32,
    pub product_id: u16,
    pub local_id: u8,
    pub version_info: u8,
    pub device_type: DeviceType,
}

fn format_version([minor, major]: [u8; 2]) -> String {
    format!("{major}.{minor:02}")
}

impl From<&ConfigResponseRaw> for DeviceDesc {
    fn from(raw: &ConfigResponseRaw) -> Self {
        Self {
            firmware_version: format_version(raw.firmware_version),
            bootloader_version: format_version(raw.bootloader_version),
            hardware_version: format_version(raw.hardware_version),
            serial_number: raw.serial_number.get(),
            product_id: raw.product_id.get(),
            local_id: raw.local_id,
            version_info: raw.version_info,
            device_type: DeviceType::from_primitive(raw.version_info),
        }
    }
}

impl DeviceDesc {
    /// Validates and parses a ConfigU6 response.
    pub fn from_config_response(response: &[u8]) -> Result<Self> {
        validate_response(response, CONFIG_U6_RESPONSE_SIZE, CONFIG_U6_RESPONSE_HEADER)?;
        let raw = ConfigResponseRaw::ref_from_bytes(&response[..CONFIG_U6_RESPONSE_SIZE]).map_err(|_| {
            U6Error::ResponseTooShort {
                expected: CONFIG_U6_RESPONSE_SIZE,
                actual: response.len(),
            }
        })?;
        Ok(Self::from(raw))
    }

    /// True for devices with the high-resolution ADC.
    pub fn high_resolution(&self) -> bool {
        self.version_info & HIGH_RESOLUTION_FLAG != 0
    }
}

impl fmt::Display for DeviceDesc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} serial {} (firmware {}, bootloader {}, hardware {}, local ID {})",
            self.device_type,
            self.serial_number,
            self.firmware_version,
            self.bootloader_version,
            self.hardware_version,
            self.local_id
        )
    }
}

/// ConfigU6 request that reads the configuration without writing anything.
pub fn config_read_command() -> Result<[u8; CONFIG_U6_COMMAND_SIZE]> {
    let mut command = [0u8; CONFIG_U6_COMMAND_SIZE];
    command[1] = EXTENDED_COMMAND;
    command[2] = ((CONFIG_U6_COMMAND_SIZE - 6) / 2) as u8;
    command[3] = CONFIG_U6_TAG;
    extended_checksum(&mut command)?;
    Ok(command)
}
