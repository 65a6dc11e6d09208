use super::config::{ChannelConfig, StreamConfig};
use crate::calibration::CalibrationInfo;
use crate::checksum::{verify_extended8, verify_extended16};
use crate::constants::{
    ERROR_STREAM_AUTO_RECOVERY, ERROR_STREAM_OVERFLOW, STREAM_DATA_COMMAND, STREAM_DATA_TAG, STREAM_SAMPLES_OFFSET,
};
use crate::error::{Result, U6Error};
use bytes::Buf;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

const PACKET_ID_OFFSET: usize = 10;
const STATUS_OFFSET: usize = 11;
const DROPPED_SCANS_OFFSET: usize = 6;

/// One sample of one channel.
#[derive(Debug, Clone)]
pub struct ChannelData {
    pub raw: u16,
    /// Position of the channel in the scan list.
    pub channel_index: usize,
    pub scan_number: u64,
    pub packet_number: u8,
    config: Arc<StreamConfig>,
    calibration: Arc<CalibrationInfo>,
}

impl ChannelData {
    pub fn channel(&self) -> Option<&ChannelConfig> {
        self.config.channels.get(self.channel_index)
    }

    /// The sample converted to volts.
    pub fn calibrated_ain(&self) -> Result<f64> {
        let gain = self
            .channel()
            .map(|c| u8::from(c.gain))
            .ok_or(U6Error::InvalidGainIndex(u8::MAX))?;
        self.calibration
            .calibrated_ain(self.config.resolution_index, gain, false, self.raw as u32)
    }
}

/// One decoded stream packet, or the error that replaced it.
#[derive(Debug)]
pub struct StreamResponse {
    pub timestamp: DateTime<Utc>,
    /// Host-side count of good packets, 1 to 255 and around again. Error
    /// entries repeat the number of the last good packet, 0 before the first.
    pub packet_number: u8,
    /// Packet counter reported by the device.
    pub packet_id: Option<u8>,
    /// Non-zero status byte reported by the device.
    pub status: Option<u8>,
    pub error: Option<U6Error>,
    /// Packets waiting in the device buffer when this one was sent.
    pub backlog: Option<u8>,
    /// Scans lost while the device recovered from an overflow.
    pub dropped_scans: u16,
    pub data: Vec<ChannelData>,
}

impl StreamResponse {
    fn new(packet_number: u8) -> Self {
        Self {
            timestamp: Utc::now(),
            packet_number,
            packet_id: None,
            status: None,
            error: None,
            backlog: None,
            dropped_scans: 0,
            data: Vec::new(),
        }
    }

    fn with_error(mut self, error: U6Error) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The device buffer overflowed; samples may be missing.
    pub fn overflow(&self) -> bool {
        self.status == Some(ERROR_STREAM_OVERFLOW)
    }

    pub fn auto_recovery(&self) -> bool {
        self.status == Some(ERROR_STREAM_AUTO_RECOVERY)
    }
}

/// Turns raw stream packets into [`StreamResponse`]s.
///
/// Channel and scan counters carry over from one packet to the next, since a
/// packet need not hold a whole number of scans.
#[derive(Debug)]
pub struct PacketDecoder {
    config: Arc<StreamConfig>,
    calibration: Arc<CalibrationInfo>,
    packet_number: u8,
    channel_index: usize,
    scan_number: u64,
}

impl PacketDecoder {
    pub fn new(config: Arc<StreamConfig>, calibration: Arc<CalibrationInfo>) -> Self {
        Self {
            config,
            calibration,
            packet_number: 0,
            channel_index: 0,
            scan_number: 0,
        }
    }

    pub fn packet_size(&self) -> usize {
        self.config.packet_size()
    }

    /// Number the next good packet will take.
    fn next_packet_number(&self) -> u8 {
        if self.packet_number >= u8::MAX { 1 } else { self.packet_number + 1 }
    }

    /// Advances the round-robin channel position, returning the one just used.
    fn next_position(&mut self) -> (usize, u64) {
        let position = (self.channel_index, self.scan_number);
        self.channel_index += 1;
        if self.channel_index >= self.config.num_channels() {
            self.channel_index = 0;
            self.scan_number += 1;
        }
        position
    }

    /// Entry for a failed read.
    pub fn error(&self, error: U6Error) -> StreamResponse {
        StreamResponse::new(self.packet_number).with_error(error)
    }

    /// Decodes one packet. Only a good packet advances the packet counter.
    pub fn decode(&mut self, packet: &[u8]) -> StreamResponse {
        let mut response = StreamResponse::new(self.next_packet_number());
        match self.decode_into(packet, &mut response) {
            Ok(()) => {
                self.packet_number = response.packet_number;
                response
            }
            Err(e) => {
                response.packet_number = self.packet_number;
                response.with_error(e)
            }
        }
    }

    fn decode_into(&mut self, packet: &[u8], response: &mut StreamResponse) -> Result<()> {
        let size = self.packet_size();
        if packet.len() < size {
            return Err(U6Error::ResponseTooShort {
                expected: size,
                actual: packet.len(),
            });
        }
        let packet = &packet[..size];

        verify_extended16(packet)?;
        verify_extended8(packet)?;
        let samples = self.config.samples_per_packet as usize;
        for (offset, expected) in [(1, STREAM_DATA_COMMAND), (2, 4 + samples as u8), (3, STREAM_DATA_TAG)] {
            if packet[offset] != expected {
                return Err(U6Error::InvalidResponseHeader {
                    offset,
                    expected,
                    actual: packet[offset],
                });
            }
        }

        response.packet_id = Some(packet[PACKET_ID_OFFSET]);
        response.backlog = Some(packet[STREAM_SAMPLES_OFFSET + 2 * samples]);
        match packet[STATUS_OFFSET] {
            0 => {}
            ERROR_STREAM_OVERFLOW => {
                response.status = Some(ERROR_STREAM_OVERFLOW);
                warn!(packet = response.packet_number, "Stream buffer overflow");
            }
            ERROR_STREAM_AUTO_RECOVERY => {
                response.status = Some(ERROR_STREAM_AUTO_RECOVERY);
                response.dropped_scans = (&packet[DROPPED_SCANS_OFFSET..]).get_u16_le();
                warn!(
                    packet = response.packet_number,
                    dropped_scans = response.dropped_scans,
                    "Stream auto-recovery"
                );
            }
            code => {
                response.status = Some(code);
                return Err(U6Error::DeviceErrorCode { code, frame: None });
            }
        }

        let mut payload = &packet[STREAM_SAMPLES_OFFSET..STREAM_SAMPLES_OFFSET + 2 * samples];
        response.data.reserve(samples);
        while payload.has_remaining() {
            let raw = payload.get_u16_le();
            let (channel_index, scan_number) = self.next_position();
            response.data.push(ChannelData {
                raw,
                channel_index,
                scan_number,
                packet_number: response.packet_number,
                config: Arc::clone(&self.config),
                calibration: Arc::clone(&self.calibration),
            });
        }
        Ok(())
    }
}
