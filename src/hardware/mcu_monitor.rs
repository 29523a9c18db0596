#![allow(dead_code)]
use crate::domain::mcu::{DrawSource, McuState};

pub struct McuMonitor<S: DrawSource> {
    source: S,
}

impl<S: DrawSource> McuMonitor<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn poll(&self, state: &mut McuState) {
        state.tick(&self.source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mcu::{FirmwareVersion, MCU_POWER_FREQUENCY};
    use std::time::Duration;

    struct FixedDraw {
        discharging: bool,
        voltage_v: f32,
        active: bool,
    }

    impl DrawSource for FixedDraw {
        fn is_discharging(&self) -> bool {
            self.discharging
        }
        fn pack_voltage_v(&self) -> f32 {
            self.voltage_v
        }
        fn is_active(&self) -> bool {
            self.active
        }
    }

    #[test]
    fn monitor_forwards_draw_into_state() {
        let monitor = McuMonitor::new(FixedDraw {
            discharging: false,
            voltage_v: 13.0,
            active: true,
        });
        let mut state = McuState::new(
            FirmwareVersion {
                major: 1,
                minor: 0,
                patch: 0,
            },
            Duration::from_secs(1),
            0.5,
            0.3,
            0.1,
        );
        for _ in 0..MCU_POWER_FREQUENCY {
            monitor.poll(&mut state);
        }
        assert!(state.self_consumption_ah() > 0.0);
    }
}
