#![allow(dead_code)]
use std::time::{Duration, Instant};

use crate::error::FirmwareError;

use super::history::{HistoryRing, Metric};
use super::supervised::{ComponentId, ErrorBit, EventKind, SupervisedState};

/// Frame delimiters for the inverter's BCD-packed response (spec.md §4.4).
const FRAME_START: u8 = 0xAE;
const FRAME_END: u8 = 0xEE;
const FRAME_LEN: usize = 17;

/// Bit 6 of the device error byte is the fan-rotation flag; a custom fan is
/// used that the device cannot measure, so this bit is always masked off
/// before checking for an external error (spec.md §4.4).
const FAN_ROTATION_FLAG_MASK: u8 = !(1 << 6);

/// How long after energizing the gate the device is given to settle before
/// the first status read is issued (spec.md §4.4).
const SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Decode one BCD digit pair (two nibbles, each 0-9) into its integer value.
fn bcd_to_u8(byte: u8) -> Result<u8, FirmwareError> {
    let hi = byte >> 4;
    let lo = byte & 0x0F;
    if hi > 9 || lo > 9 {
        return Err(FirmwareError::Parse {
            offset: 0,
            reason: format!("byte {byte:#04x} is not valid BCD"),
        });
    }
    Ok(hi * 10 + lo)
}

fn bcd_pair_to_u16(hi_byte: u8, lo_byte: u8) -> Result<u16, FirmwareError> {
    let hi = bcd_to_u8(hi_byte)? as u16;
    let lo = bcd_to_u8(lo_byte)? as u16;
    Ok(hi * 100 + lo)
}

/// Sum of payload bytes mod 256, then mod 100 (spec.md §4.4) — unlike the
/// PSU's plain `sum mod 256`, the inverter checksum folds a second time.
fn checksum(frame: &[u8]) -> u8 {
    let sum = frame[1..FRAME_LEN - 2]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum % 100
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InverterReading {
    pub ac_voltage_dv: u16,
    pub output_power_w: u16,
    pub dc_input_dv: u16,
    pub temperature_c: u8,
    pub fault_code: u8,
    pub battery_level: u8,
}

/// Decode a 17-byte `0xAE ... 0xEE` inverter frame.
///
/// Layout: `[0xAE][ac_hi][ac_lo][power_hi][power_lo][temp][dc_hi][dc_lo]
/// [fault][battery_level][reserved x5][checksum][0xEE]`. AC voltage, output
/// power and DC input are BCD-packed pairs; temperature, fault and battery
/// level are raw bytes.
pub fn parse_frame(frame: &[u8]) -> Result<InverterReading, FirmwareError> {
    if frame.len() != FRAME_LEN {
        return Err(FirmwareError::Parse {
            offset: 0,
            reason: format!("expected {FRAME_LEN} bytes, got {}", frame.len()),
        });
    }
    if frame[0] != FRAME_START || frame[FRAME_LEN - 1] != FRAME_END {
        return Err(FirmwareError::BadResponse(
            "missing 0xAE/0xEE frame delimiters".into(),
        ));
    }
    let expected = checksum(frame);
    if frame[FRAME_LEN - 2] != expected {
        return Err(FirmwareError::BadResponse(format!(
            "checksum mismatch: frame has {:#04x}, computed {:#04x}",
            frame[FRAME_LEN - 2],
            expected
        )));
    }

    let ac_voltage_dv = bcd_pair_to_u16(frame[1], frame[2])?;
    let output_power_w = bcd_pair_to_u16(frame[3], frame[4])?;
    let temperature_c = frame[5];
    let dc_input_dv = bcd_pair_to_u16(frame[6], frame[7])?;
    let fault_code = frame[8] & FAN_ROTATION_FLAG_MASK;
    let battery_level = frame[9];

    Ok(InverterReading {
        ac_voltage_dv,
        output_power_w,
        dc_input_dv,
        temperature_c,
        fault_code,
        battery_level,
    })
}

/// The inverter's power state machine (spec.md §4.4): OFF has the gate
/// de-energized and the UART closed; BOOTSTRAPPING has just energized the
/// gate and is waiting out [`SETTLE_DELAY`] before any status read is
/// issued; ACTIVE polls normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Off,
    Bootstrapping,
    Active,
}

/// The supervised inverter state: power state machine, latest reading, and
/// the fan RPM it publishes (spec.md §4.4, §4.7).
pub struct InverterState {
    pub base: SupervisedState,
    power_state: PowerState,
    settle_until: Option<Instant>,
    latest: InverterReading,
    fan_rpm: f32,
}

impl InverterState {
    pub fn new() -> Self {
        let mut base = SupervisedState::new(
            ComponentId::Inverter,
            Duration::from_secs(2),
            Duration::from_secs(10),
        );
        base.history.insert(
            Metric::InverterPower,
            HistoryRing::new(Metric::InverterPower),
        );
        base.history.insert(
            Metric::InverterTemperature,
            HistoryRing::new(Metric::InverterTemperature),
        );

        Self {
            base,
            power_state: PowerState::Off,
            settle_until: None,
            latest: InverterReading::default(),
            fan_rpm: 0.0,
        }
    }

    pub fn power_state(&self) -> PowerState {
        self.power_state
    }

    /// Whether the device should be polled this tick — only once BOOTSTRAPPING
    /// has settled into ACTIVE (spec.md §4.4).
    pub fn should_poll(&self) -> bool {
        self.power_state == PowerState::Active
    }

    /// Fed by the fan tachometer sampling loop; not part of the polled
    /// protocol frame (spec.md §4.12).
    pub fn set_fan_rpm(&mut self, rpm: f32) {
        self.fan_rpm = rpm;
    }

    pub fn fan_rpm(&self) -> f32 {
        self.fan_rpm
    }

    /// OFF → BOOTSTRAPPING: energizes the power gate and starts the settle
    /// timer. A no-op if already bootstrapping or active (spec.md §4.4).
    pub fn on(&mut self) {
        if self.power_state != PowerState::Off {
            return;
        }
        self.power_state = PowerState::Bootstrapping;
        self.settle_until = Some(Instant::now() + SETTLE_DELAY);
        self.base.on();
    }

    /// ACTIVE/BOOTSTRAPPING → OFF: de-energizes the gate and clears all
    /// nullable state fields (spec.md §4.4).
    pub fn off(&mut self) {
        if self.power_state == PowerState::Off {
            return;
        }
        self.power_state = PowerState::Off;
        self.settle_until = None;
        self.latest = InverterReading::default();
        self.base.off();
    }

    /// Advance the settle timer. Call once per loop tick; transitions
    /// BOOTSTRAPPING to ACTIVE once [`SETTLE_DELAY`] has elapsed.
    pub fn tick_bootstrap(&mut self) {
        if self.power_state == PowerState::Bootstrapping {
            if let Some(deadline) = self.settle_until {
                if Instant::now() >= deadline {
                    self.power_state = PowerState::Active;
                    self.settle_until = None;
                }
            }
        }
    }

    pub fn apply(&mut self, reading: InverterReading) {
        self.latest = reading;

        self.base
            .history
            .get_mut(&Metric::InverterPower)
            .unwrap()
            .push(reading.output_power_w);
        self.base
            .history
            .get_mut(&Metric::InverterTemperature)
            .unwrap()
            .push(reading.temperature_c as u16);

        if reading.fault_code != 0 {
            self.base.set_error(ErrorBit::External);
        } else {
            self.base.reset_error(ErrorBit::External);
        }

        self.base.notify(|| Vec::new());
    }

    pub fn latest(&self) -> &InverterReading {
        &self.latest
    }

    pub fn trigger_change(&mut self) {
        self.base.trigger(EventKind::Change);
    }

    /// Force BOOTSTRAPPING straight to ACTIVE without waiting out
    /// [`SETTLE_DELAY`]. Used by coordination-fabric tests that need a
    /// polling-ready inverter without sleeping the test thread for real.
    #[cfg(test)]
    pub(crate) fn force_settle(&mut self) {
        if self.power_state == PowerState::Bootstrapping {
            self.power_state = PowerState::Active;
            self.settle_until = None;
        }
    }
}

impl Default for InverterState {
    fn default() -> Self {
        Self::new()
    }
}
