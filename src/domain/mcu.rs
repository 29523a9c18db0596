#![allow(dead_code)]
use std::time::Duration;

use super::supervised::{pack_version, ComponentId, SupervisedState};

/// Self-consumption is accumulated once every this many ticks of the MCU's
/// supervision loop, not every tick (spec.md §4.3, §4.6).
pub const MCU_POWER_FREQUENCY: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    pub fn packed(self) -> u8 {
        pack_version(self.major, self.minor, self.patch)
    }
}

/// A read-only view onto the BMS state the MCU supervision loop needs to
/// drive self-consumption accounting, without holding a reference to
/// `BmsState` itself (spec.md §4.3, §4.6; mirrors the `BmsDraw` seam used to
/// wire this trait from `controller::mod`).
#[cfg_attr(test, mockall::automock)]
pub trait DrawSource: Send + Sync {
    fn is_discharging(&self) -> bool;
    fn pack_voltage_v(&self) -> f32;
    fn is_active(&self) -> bool;
}

/// Supervises the onboard microcontroller: firmware version reporting and
/// the self-consumption (Ah) accounting that debits the pack's coulomb
/// count for the box's own housekeeping load (spec.md §4.6).
pub struct McuState {
    pub base: SupervisedState,
    pub version: FirmwareVersion,
    tick: u32,
    self_consumption_ah: f32,
    tick_period: Duration,
    mcu_power_w: f32,
    usb_power_w: f32,
    bms_power_w: f32,
}

impl McuState {
    pub fn new(
        version: FirmwareVersion,
        tick_period: Duration,
        mcu_power_w: f32,
        usb_power_w: f32,
        bms_power_w: f32,
    ) -> Self {
        Self {
            base: SupervisedState::new(
                ComponentId::Mcu,
                Duration::from_secs(1),
                Duration::from_secs(30),
            ),
            version,
            tick: 0,
            self_consumption_ah: 0.0,
            tick_period,
            mcu_power_w,
            usb_power_w,
            bms_power_w,
        }
    }

    pub fn self_consumption_ah(&self) -> f32 {
        self.self_consumption_ah
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Advance one supervision tick. Every [`MCU_POWER_FREQUENCY`]th tick,
    /// integrates the controller's own housekeeping load over the elapsed
    /// period: while the pack is discharging, that load is already inside
    /// the pack's reported current, so it is *subtracted* back out of the
    /// accumulator; while idle or charging, it is invisible to the pack and
    /// must be *added* (spec.md §4.3).
    pub fn tick(&mut self, draw: &dyn DrawSource) {
        self.tick = self.tick.wrapping_add(1);
        if self.tick % MCU_POWER_FREQUENCY != 0 {
            return;
        }

        let voltage_v = draw.pack_voltage_v();
        if voltage_v <= 0.0 {
            return;
        }
        let hours = (self.tick_period.as_secs_f32() * MCU_POWER_FREQUENCY as f32) / 3600.0;

        if draw.is_discharging() {
            let controller_w = self.mcu_power_w
                + self.usb_power_w
                + if draw.is_active() { self.bms_power_w } else { 0.0 };
            let controller_ma = controller_w / voltage_v * 1000.0;
            self.self_consumption_ah =
                (self.self_consumption_ah - (controller_ma / 1000.0) * hours).max(0.0);
        } else {
            let total_w = self.mcu_power_w + self.usb_power_w + self.bms_power_w;
            let total_ma = total_w / voltage_v * 1000.0;
            self.self_consumption_ah += (total_ma / 1000.0) * hours;
        }

        self.base.notify(|| Vec::new());
    }

    pub fn reset_self_consumption(&mut self) {
        self.self_consumption_ah = 0.0;
    }
}
