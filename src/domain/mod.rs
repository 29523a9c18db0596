pub mod ats;
pub mod bms;
pub mod history;
pub mod inverter;
pub mod mcu;
pub mod profile;
pub mod psu;
pub mod supervised;

pub use ats::AtsState;
pub use bms::BmsState;
pub use history::{HistoryRing, Metric};
pub use inverter::InverterState;
pub use mcu::McuState;
pub use profile::{ProfileKey, ProfileState, ProfileValue};
pub use psu::PsuState;
pub use supervised::{ComponentId, ErrorBit, EventKind, SupervisedState, SystemEvent};
