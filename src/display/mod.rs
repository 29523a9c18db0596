#![allow(dead_code)]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::ats::AtsState;
use crate::domain::bms::BmsState;
use crate::domain::inverter::InverterState;
use crate::domain::supervised::{ComponentId, ErrorBit, EventKind, SupervisedState};

/// What the front-panel display renders. The idle screen shows just the
/// clock-equivalent standby glyph; the active screen shows the live
/// readings a user cares about while the box is under load (spec.md §7).
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Idle,
    Active {
        soc_percent: u8,
        output_power_w: u16,
        on_mains: bool,
    },
    Error { codes: Vec<String> },
}

/// Two-character component prefix used by the two-digit device-prefixed
/// error codes (spec.md §7): `<prefix><bit:02>`, e.g. `BM02`.
fn component_prefix(component: ComponentId) -> &'static str {
    match component {
        ComponentId::Bms => "BM",
        ComponentId::Psu => "PS",
        ComponentId::Inverter => "IV",
        ComponentId::Ats => "AT",
        ComponentId::Profile => "PR",
        ComponentId::Mcu => "MC",
    }
}

/// Format every set bit in `errors` as a `<prefix><bit:02>` code.
pub fn format_error_codes(component: ComponentId, errors: u16) -> Vec<String> {
    let prefix = component_prefix(component);
    (0..16)
        .filter(|bit| errors & (1 << bit) != 0)
        .map(|bit| format!("{prefix}{bit:02}"))
        .collect()
}

/// A flag a [`SupervisedState`] CHANGE callback can flip to mark the
/// display dirty, without the state holding a reference to the display
/// itself (same non-owning-sink pattern as the wireless transport).
#[derive(Clone, Default)]
pub struct DirtyFlag(Arc<AtomicBool>);

impl DirtyFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Register a dirty-flag callback on a supervised state's CHANGE event.
pub fn bind_dirty_flag(state: &mut SupervisedState, flag: DirtyFlag) {
    state.add_callback(EventKind::Change, Box::new(move || flag.mark()));
}

/// Renders the current [`Screen`] from the live domain states. Does not
/// own any state itself; it's recomputed on demand whenever a bound
/// [`DirtyFlag`] has been marked.
pub struct DisplayBinding;

impl DisplayBinding {
    pub fn render(bms: &BmsState, inverter: &InverterState, ats: &AtsState) -> Screen {
        let mut codes = Vec::new();
        codes.extend(format_error_codes(ComponentId::Bms, bms.base.internal_errors));
        codes.extend(format_error_codes(
            ComponentId::Inverter,
            inverter.base.internal_errors,
        ));
        if !codes.is_empty() {
            return Screen::Error { codes };
        }

        if !ats.on_mains() && !inverter.base.active {
            return Screen::Idle;
        }

        Screen::Active {
            soc_percent: bms.latest().soc.unwrap_or(0),
            output_power_w: inverter.latest().output_power_w,
            on_mains: ats.on_mains(),
        }
    }
}
