pub mod ats_monitor;
pub mod bms_client;
pub mod button;
pub mod gpio;
pub mod inverter_client;
pub mod mcu_monitor;
pub mod psu_client;
pub mod psu_mux;
pub mod tachometer;
pub mod uart;

pub use ats_monitor::AtsMonitor;
pub use bms_client::BmsClient;
pub use button::{ButtonDebouncer, ButtonEvent};
pub use gpio::{DigitalInput, DigitalOutput};
pub use inverter_client::InverterClient;
pub use mcu_monitor::McuMonitor;
pub use psu_client::PsuClient;
pub use psu_mux::PsuCurrentMux;
pub use tachometer::Tachometer;
pub use uart::UartPort;
