#![allow(dead_code)]
use std::time::Duration;

use super::supervised::{ComponentId, EventKind, SupervisedState};

/// The transfer switch reports its position through two normally-closed /
/// normally-open contacts rather than a single mains-present signal; the
/// mode is read off instantaneously with no debounce (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtsMode {
    /// Neither or both contacts are asserted — an indeterminate or
    /// mid-transfer reading.
    None,
    Grid,
    Battery,
}

/// Derive the tri-state mode from the two raw contact readings
/// `(nc, no)`: `(true, false)` is GRID, `(false, true)` is BATTERY, anything
/// else is NONE (spec.md §4.6).
fn mode_from_pins(nc: bool, no: bool) -> AtsMode {
    match (nc, no) {
        (true, false) => AtsMode::Grid,
        (false, true) => AtsMode::Battery,
        _ => AtsMode::None,
    }
}

/// Automatic transfer switch state: derives [`AtsMode`] from two contact
/// pins on every poll, with no debounce layer (spec.md §4.6).
pub struct AtsState {
    pub base: SupervisedState,
    mode: AtsMode,
    enabled: bool,
}

impl AtsState {
    pub fn new() -> Self {
        Self {
            base: SupervisedState::new(
                ComponentId::Ats,
                Duration::from_secs(1),
                Duration::from_secs(30),
            ),
            mode: AtsMode::None,
            enabled: true,
        }
    }

    /// Whether the ATS monitor is allowed to act (gated by the `AtsEnabled`
    /// profile key).
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn mode(&self) -> AtsMode {
        self.mode
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn on_mains(&self) -> bool {
        self.mode == AtsMode::Grid
    }

    /// Feed one pair of raw contact readings `(nc, no)`. Fires ON when the
    /// mode becomes GRID, OFF when it becomes BATTERY, and CHANGE on any
    /// transition including into/out of NONE (spec.md §4.6).
    pub fn apply(&mut self, nc: bool, no: bool) {
        if !self.enabled {
            return;
        }

        let new_mode = mode_from_pins(nc, no);
        if new_mode == self.mode {
            return;
        }
        self.mode = new_mode;

        match new_mode {
            AtsMode::Grid => self.base.trigger(EventKind::On),
            AtsMode::Battery => self.base.trigger(EventKind::Off),
            AtsMode::None => {}
        }
        self.base.notify(|| Vec::new());
    }
}

impl Default for AtsState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(true, false, AtsMode::Grid)]
    #[case(false, true, AtsMode::Battery)]
    #[case(true, true, AtsMode::None)]
    #[case(false, false, AtsMode::None)]
    fn mode_from_pins_matches_every_combination(
        #[case] nc: bool,
        #[case] no: bool,
        #[case] expected: AtsMode,
    ) {
        assert_eq!(mode_from_pins(nc, no), expected);
    }

    #[test]
    fn nc_high_no_low_is_grid() {
        let mut ats = AtsState::new();
        ats.apply(true, false);
        assert_eq!(ats.mode(), AtsMode::Grid);
        assert!(ats.on_mains());
    }

    #[test]
    fn nc_low_no_high_is_battery() {
        let mut ats = AtsState::new();
        ats.apply(false, true);
        assert_eq!(ats.mode(), AtsMode::Battery);
        assert!(!ats.on_mains());
    }

    #[test]
    fn both_or_neither_pin_asserted_is_none() {
        let mut ats = AtsState::new();
        ats.apply(true, true);
        assert_eq!(ats.mode(), AtsMode::None);
        ats.apply(true, false);
        ats.apply(false, false);
        assert_eq!(ats.mode(), AtsMode::None);
    }

    #[test]
    fn mode_is_derived_instantaneously_with_no_debounce() {
        let mut ats = AtsState::new();
        ats.apply(true, false);
        assert_eq!(ats.mode(), AtsMode::Grid);
        ats.apply(false, true);
        assert_eq!(ats.mode(), AtsMode::Battery);
    }

    #[test]
    fn disabled_monitor_ignores_input() {
        let mut ats = AtsState::new();
        ats.set_enabled(false);
        ats.apply(true, false);
        assert_eq!(ats.mode(), AtsMode::None);
    }

    #[test]
    fn repeated_identical_reading_does_not_refire_change() {
        let mut ats = AtsState::new();
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c2 = count.clone();
        ats.base.add_callback(
            EventKind::Change,
            Box::new(move || {
                c2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        );
        ats.apply(true, false);
        ats.apply(true, false);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
