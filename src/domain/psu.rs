#![allow(dead_code)]
use std::time::Duration;

use crate::error::FirmwareError;

use super::history::{HistoryRing, Metric};
use super::supervised::{ComponentId, EventKind, SupervisedState};

/// Header bytes opening every PSU response (spec.md §4.5).
const HEADER: [u8; 2] = [0x49, 0x34];
const FRAME_LEN: usize = 22;

/// `power1`/`power2` plus the CRC that covers them.
const POWER_REGION: std::ops::Range<usize> = 2..6;
const POWER_CRC_OFFSET: usize = 6;
/// `data_tag`/`state`/`reserved`/`ac`/`t1`/`t2`/`t3`/7 reserved, plus the CRC
/// that covers them.
const DATA_REGION: std::ops::Range<usize> = 7..21;
const DATA_CRC_OFFSET: usize = 21;

/// Both CRCs are a plain sum of the region's bytes mod 256 — no polynomial,
/// unlike the inverter's BCD checksum (spec.md §4.5).
fn crc8(region: &[u8]) -> u8 {
    region.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Number of current channels the 2-bit MUX selects between; channel 3 is
/// turbo (100 %), channel 0 disables output entirely (spec.md §4.5).
pub const CURRENT_CHANNEL_TURBO: u8 = 3;
pub const CURRENT_CHANNEL_NORMAL: u8 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct PsuReading {
    pub power1_w: u16,
    pub power2_w: u16,
    pub state_byte: u8,
    pub ac_voltage_dv: u8,
    pub temperature1_c: u8,
    pub temperature2_c: u8,
    pub temperature3_c: u8,
}

/// Decode a 22-byte `0x49 0x34` PSU frame: `header(2) + power1:u16 LE +
/// power2:u16 LE + power_crc:u8 + data_tag:u8 + state:u8 + reserved:u8 +
/// ac:u8 + t1:u8 + t2:u8 + t3:u8 + 7 reserved + data_crc:u8` (spec.md §4.5).
pub fn parse_frame(frame: &[u8]) -> Result<PsuReading, FirmwareError> {
    if frame.len() != FRAME_LEN {
        return Err(FirmwareError::Parse {
            offset: 0,
            reason: format!("expected {FRAME_LEN} bytes, got {}", frame.len()),
        });
    }
    if frame[0] != HEADER[0] || frame[1] != HEADER[1] {
        return Err(FirmwareError::BadResponse("missing 0x49 0x34 header".into()));
    }

    let power_crc = crc8(&frame[POWER_REGION]);
    if frame[POWER_CRC_OFFSET] != power_crc {
        return Err(FirmwareError::BadResponse(format!(
            "power crc mismatch: frame has {:#04x}, computed {:#04x}",
            frame[POWER_CRC_OFFSET], power_crc
        )));
    }
    let data_crc = crc8(&frame[DATA_REGION]);
    if frame[DATA_CRC_OFFSET] != data_crc {
        return Err(FirmwareError::BadResponse(format!(
            "data crc mismatch: frame has {:#04x}, computed {:#04x}",
            frame[DATA_CRC_OFFSET], data_crc
        )));
    }

    let power1_w = u16::from_le_bytes([frame[2], frame[3]]);
    let power2_w = u16::from_le_bytes([frame[4], frame[5]]);
    let state_byte = frame[8];
    let ac_voltage_dv = frame[10];
    let temperature1_c = frame[11];
    let temperature2_c = frame[12];
    let temperature3_c = frame[13];

    Ok(PsuReading {
        power1_w,
        power2_w,
        state_byte,
        ac_voltage_dv,
        temperature1_c,
        temperature2_c,
        temperature3_c,
    })
}

/// The supervised PSU state: latest reading, its telemetry rings, and the
/// current-channel selection (spec.md §4.5, §4.7).
pub struct PsuState {
    pub base: SupervisedState,
    latest: PsuReading,
    fan_rpm: f32,
    turbo: bool,
    current_channel: u8,
}

impl PsuState {
    pub fn new() -> Self {
        let mut base = SupervisedState::new(
            ComponentId::Psu,
            Duration::from_secs(2),
            Duration::from_secs(10),
        );
        base.history
            .insert(Metric::PsuVoltage, HistoryRing::new(Metric::PsuVoltage));
        base.history.insert(
            Metric::PsuTemperature,
            HistoryRing::new(Metric::PsuTemperature),
        );

        Self {
            base,
            latest: PsuReading::default(),
            fan_rpm: 0.0,
            turbo: false,
            current_channel: CURRENT_CHANNEL_NORMAL,
        }
    }

    /// Fed by the fan tachometer sampling loop; not part of the polled
    /// protocol frame (spec.md §4.12).
    pub fn set_fan_rpm(&mut self, rpm: f32) {
        self.fan_rpm = rpm;
    }

    pub fn fan_rpm(&self) -> f32 {
        self.fan_rpm
    }

    pub fn turbo(&self) -> bool {
        self.turbo
    }

    pub fn current_channel(&self) -> u8 {
        self.current_channel
    }

    /// Short-press control: toggle turbo. Turbo selects channel 3; normal
    /// mode selects channel 2 (spec.md §4.5).
    pub fn toggle_turbo(&mut self) -> bool {
        self.turbo = !self.turbo;
        self.current_channel = if self.turbo {
            CURRENT_CHANNEL_TURBO
        } else {
            CURRENT_CHANNEL_NORMAL
        };
        self.base.notify(|| Vec::new());
        self.turbo
    }

    /// `0x12 psu.set_current` writes the channel directly, independent of
    /// the turbo toggle (spec.md §4.10).
    pub fn set_current_channel(&mut self, channel: u8) {
        self.current_channel = channel.min(CURRENT_CHANNEL_TURBO);
        self.base.notify(|| Vec::new());
    }

    /// `bms.CHANGE` while ACTIVE: if any cell is at or above
    /// `reduce_current_voltage` and the channel is above 0, step it down by
    /// one — graceful top-balancing rather than an abrupt cutoff
    /// (spec.md §4.5).
    pub fn check_cell_threshold(&mut self, cell_voltages_mv: &[Option<u16>], reduce_current_voltage: f32) {
        if !self.base.active {
            return;
        }
        let any_above = cell_voltages_mv
            .iter()
            .flatten()
            .any(|&mv| (mv as f32 / 1000.0) >= reduce_current_voltage);
        if any_above && self.current_channel > 0 {
            self.current_channel -= 1;
            self.base.notify(|| Vec::new());
        }
    }

    pub fn apply(&mut self, reading: PsuReading) {
        self.latest = reading;

        self.base
            .history
            .get_mut(&Metric::PsuVoltage)
            .unwrap()
            .push(reading.ac_voltage_dv as u16);
        self.base
            .history
            .get_mut(&Metric::PsuTemperature)
            .unwrap()
            .push(reading.temperature1_c as u16);

        self.base.notify(|| Vec::new());
    }

    pub fn latest(&self) -> &PsuReading {
        &self.latest
    }

    /// `psu.on()`: brings the PSU up. The coordination fabric (spec.md §4.8)
    /// is responsible for turning the inverter off and enabling BMS charge
    /// in response to the `ON` event this fires.
    pub fn on(&mut self) {
        self.base.on();
    }

    pub fn off(&mut self) {
        self.base.off();
    }

    pub fn trigger_change(&mut self) {
        self.base.trigger(EventKind::Change);
    }
}

impl Default for PsuState {
    fn default() -> Self {
        Self::new()
    }
}
