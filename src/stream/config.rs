use crate::checksum::set_checksum;
use crate::command::GainIndex;
use crate::constants::{
    EXTENDED_COMMAND, MAX_SAMPLES_PER_PACKET, MAX_STREAM_CHANNELS, MAX_STREAM_RESOLUTION_INDEX,
    STREAM_CONFIG_HEADER_SIZE, STREAM_CONFIG_TAG, STREAM_PACKET_OVERHEAD,
};
use crate::error::{Result, U6Error};
use bytes::{BufMut, BytesMut};
use modular_bitfield::prelude::*;
use strum_macros::Display;
use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scans below this rate use the divide-by-256 clock.
const SLOW_SCAN_THRESHOLD_HZ: u32 = 1000;
const DIVIDED_CLOCK_HZ: u32 = 15_625;
const BASE_CLOCK_HZ: u32 = 4_000_000;

/// The scan-config byte of StreamConfig.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanConfigByte {
    #[skip]
    unused0: B1,
    pub divide_by_256: bool,
    #[skip]
    unused1: B1,
    pub clock_48mhz: bool,
    #[skip]
    unused2: B4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClockSpeed {
    #[default]
    #[strum(to_string = "4 MHz")]
    Mhz4,
    #[strum(to_string = "48 MHz")]
    Mhz48,
}

/// Stream scan clock. The scan period is `scan_interval` ticks of the
/// selected clock, optionally divided by 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanClock {
    pub speed: ClockSpeed,
    pub divide_by_256: bool,
    pub scan_interval: u16,
}

impl Default for ScanClock {
    fn default() -> Self {
        // 1 kHz
        Self {
            speed: ClockSpeed::Mhz4,
            divide_by_256: false,
            scan_interval: 4000,
        }
    }
}

impl ScanClock {
    /// Derives the clock for a target scan rate.
    pub fn for_frequency(hz: u32) -> Result<Self> {
        let (divide_by_256, interval) = if hz < SLOW_SCAN_THRESHOLD_HZ {
            (true, DIVIDED_CLOCK_HZ / hz.max(1))
        } else {
            (false, BASE_CLOCK_HZ / hz)
        };
        let scan_interval = u16::try_from(interval)
            .ok()
            .filter(|&i| i > 0)
            .ok_or_else(|| U6Error::InvalidStreamConfig(format!("scan frequency {hz} Hz is out of range")))?;
        Ok(Self {
            speed: ClockSpeed::Mhz4,
            divide_by_256,
            scan_interval,
        })
    }

    fn config_byte(&self) -> u8 {
        ScanConfigByte::new()
            .with_divide_by_256(self.divide_by_256)
            .with_clock_48mhz(self.speed == ClockSpeed::Mhz48)
            .into_bytes()[0]
    }
}

/// One channel of the scan list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelConfig {
    pub channel: u8,
    pub gain: GainIndex,
    pub differential: bool,
}

impl ChannelConfig {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            gain: GainIndex::X1,
            differential: false,
        }
    }

    pub fn with_gain(mut self, gain: GainIndex) -> Self {
        self.gain = gain;
        self
    }

    pub fn differential(mut self) -> Self {
        self.differential = true;
        self
    }

    fn options(&self) -> u8 {
        (u8::from(self.differential) << 7) | (u8::from(self.gain) << 4)
    }
}

/// Stream settings. Call [`normalize`](Self::normalize) (done by the session
/// when a stream is created) before encoding.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamConfig {
    pub resolution_index: u8,
    pub samples_per_packet: u8,
    pub settling_factor: u8,
    /// Target scans per second; `None` or 0 keeps `clock` as given.
    pub scan_frequency: Option<u32>,
    pub clock: ScanClock,
    pub channels: Vec<ChannelConfig>,
}

impl StreamConfig {
    pub fn new(channels: Vec<ChannelConfig>) -> Self {
        Self {
            resolution_index: 1,
            samples_per_packet: MAX_SAMPLES_PER_PACKET,
            settling_factor: 0,
            scan_frequency: None,
            clock: ScanClock::default(),
            channels,
        }
    }

    pub fn with_resolution(mut self, resolution_index: u8) -> Self {
        self.resolution_index = resolution_index;
        self
    }

    pub fn with_samples_per_packet(mut self, samples_per_packet: u8) -> Self {
        self.samples_per_packet = samples_per_packet;
        self
    }

    pub fn with_settling_factor(mut self, settling_factor: u8) -> Self {
        self.settling_factor = settling_factor;
        self
    }

    pub fn with_scan_frequency(mut self, hz: u32) -> Self {
        self.scan_frequency = Some(hz);
        self
    }

    pub fn with_clock(mut self, clock: ScanClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Size of one stream data packet.
    pub fn packet_size(&self) -> usize {
        STREAM_PACKET_OVERHEAD + 2 * self.samples_per_packet as usize
    }

    /// Validates the settings and derives the scan clock from the target
    /// frequency, if one is set.
    pub fn normalize(mut self) -> Result<Self> {
        if self.channels.is_empty() || self.channels.len() > MAX_STREAM_CHANNELS {
            return Err(U6Error::InvalidStreamConfig(format!(
                "{} channels given, 1 to {MAX_STREAM_CHANNELS} supported",
                self.channels.len()
            )));
        }
        if !(1..=MAX_STREAM_RESOLUTION_INDEX).contains(&self.resolution_index) {
            return Err(U6Error::InvalidStreamConfig(format!(
                "resolution index {} outside 1..={MAX_STREAM_RESOLUTION_INDEX}",
                self.resolution_index
            )));
        }

        let clamped = self.samples_per_packet.clamp(1, MAX_SAMPLES_PER_PACKET);
        if clamped != self.samples_per_packet {
            warn!(
                requested = self.samples_per_packet,
                used = clamped,
                "Samples per packet out of range, clamped"
            );
            self.samples_per_packet = clamped;
        }

        match self.scan_frequency {
            Some(0) => self.scan_frequency = None,
            Some(hz) => self.clock = ScanClock::for_frequency(hz)?,
            None => {}
        }
        if self.clock.scan_interval == 0 {
            return Err(U6Error::InvalidStreamConfig("scan interval must be at least 1".to_string()));
        }
        Ok(self)
    }

    /// StreamConfig command frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let n = self.channels.len();
        let mut frame = BytesMut::with_capacity(STREAM_CONFIG_HEADER_SIZE + 2 * n);
        frame.put_slice(&[0, EXTENDED_COMMAND, (n + 4) as u8, STREAM_CONFIG_TAG, 0, 0]);
        frame.put_u8(n as u8);
        frame.put_u8(self.resolution_index);
        frame.put_u8(self.samples_per_packet);
        frame.put_u8(0);
        frame.put_u8(self.settling_factor);
        frame.put_u8(self.clock.config_byte());
        frame.put_u16_le(self.clock.scan_interval);
        for channel in &self.channels {
            frame.put_u8(channel.channel);
            frame.put_u8(channel.options());
        }
        set_checksum(&mut frame)?;
        Ok(frame.to_vec())
    }
}
