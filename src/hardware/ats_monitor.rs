#![allow(dead_code)]
use std::sync::Arc;

use crate::domain::ats::AtsState;

use super::gpio::DigitalInput;

/// Ties the ATS supervised state to its two physical contact pins
/// (normally-closed, normally-open).
pub struct AtsMonitor {
    nc_pin: Arc<dyn DigitalInput>,
    no_pin: Arc<dyn DigitalInput>,
}

impl AtsMonitor {
    pub fn new(nc_pin: Arc<dyn DigitalInput>, no_pin: Arc<dyn DigitalInput>) -> Self {
        Self { nc_pin, no_pin }
    }

    pub fn poll(&self, state: &mut AtsState) {
        state.apply(self.nc_pin.read(), self.no_pin.read());
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::domain::ats::AtsMode;
    use crate::hardware::gpio::sim::SimulatedPin;

    #[test]
    fn poll_feeds_both_pins_into_state() {
        let nc = Arc::new(SimulatedPin::new(true));
        let no = Arc::new(SimulatedPin::new(false));
        let monitor = AtsMonitor::new(nc.clone(), no.clone());
        let mut state = AtsState::new();
        monitor.poll(&mut state);
        assert_eq!(state.mode(), AtsMode::Grid);

        nc.force(false);
        no.force(true);
        monitor.poll(&mut state);
        assert_eq!(state.mode(), AtsMode::Battery);
    }
}
