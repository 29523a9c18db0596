#![allow(dead_code)]
use std::sync::Arc;

use super::gpio::DigitalOutput;

/// Drives the PSU's 2-bit current-channel MUX: the low bit goes to pin A,
/// the high bit to pin B, selecting one of four channels (0-3); channel 3
/// is turbo (spec.md §4.5).
pub struct PsuCurrentMux {
    pin_a: Arc<dyn DigitalOutput>,
    pin_b: Arc<dyn DigitalOutput>,
}

impl PsuCurrentMux {
    pub fn new(pin_a: Arc<dyn DigitalOutput>, pin_b: Arc<dyn DigitalOutput>) -> Self {
        Self { pin_a, pin_b }
    }

    pub fn apply(&self, channel: u8) {
        self.pin_a.set(channel & 0b01 != 0);
        self.pin_b.set(channel & 0b10 != 0);
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::hardware::gpio::sim::SimulatedPin;
    use crate::hardware::gpio::DigitalInput;

    /// spec.md §8 scenario S6: channel 2 ends with pin A=0, pin B=1.
    #[test]
    fn channel_two_sets_pin_a_low_pin_b_high() {
        let pin_a = Arc::new(SimulatedPin::new(true));
        let pin_b = Arc::new(SimulatedPin::new(false));
        let mux = PsuCurrentMux::new(pin_a.clone(), pin_b.clone());
        mux.apply(2);
        assert!(!pin_a.read());
        assert!(pin_b.read());
    }

    #[test]
    fn channel_three_sets_both_pins_high() {
        let pin_a = Arc::new(SimulatedPin::new(false));
        let pin_b = Arc::new(SimulatedPin::new(false));
        let mux = PsuCurrentMux::new(pin_a.clone(), pin_b.clone());
        mux.apply(3);
        assert!(pin_a.read());
        assert!(pin_b.read());
    }
}
