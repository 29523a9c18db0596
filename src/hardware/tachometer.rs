#![allow(dead_code)]
use std::time::{Duration, Instant};

/// Edge-counting fan tachometer: integrates pulses over a sampling window
/// and converts the count into RPM (spec.md §4.12).
pub struct Tachometer {
    pulses_per_revolution: u32,
    edge_count: u32,
    last_level: bool,
    window_start: Instant,
}

impl Tachometer {
    pub fn new(pulses_per_revolution: u32) -> Self {
        Self {
            pulses_per_revolution: pulses_per_revolution.max(1),
            edge_count: 0,
            last_level: false,
            window_start: Instant::now(),
        }
    }

    /// Feed one raw pin sample. Counts rising edges only.
    pub fn sample(&mut self, level: bool) {
        if level && !self.last_level {
            self.edge_count += 1;
        }
        self.last_level = level;
    }

    /// Compute RPM from the edges accumulated since the last call, then
    /// reset the window.
    pub fn take_rpm(&mut self, now: Instant) -> f32 {
        let elapsed = now.duration_since(self.window_start);
        let rpm = if elapsed > Duration::ZERO {
            let revolutions = self.edge_count as f32 / self.pulses_per_revolution as f32;
            revolutions * (60.0 / elapsed.as_secs_f32())
        } else {
            0.0
        };
        self.edge_count = 0;
        self.window_start = now;
        rpm
    }
}
