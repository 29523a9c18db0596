use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use powerbox_core::config::AppConfig;
use powerbox_core::controller::command_queue::CommandQueue;
use powerbox_core::controller::System;
use powerbox_core::hardware::gpio::sim::SimulatedPin;
use powerbox_core::hardware::uart::sim::SimulatedUart;
use powerbox_core::hardware::{AtsMonitor, BmsClient, InverterClient, PsuClient, PsuCurrentMux};
use powerbox_core::telemetry::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    let _tracing_guard = init_tracing(&config.telemetry);
    info!(device = %config.wireless.device_name, "starting powerbox firmware core");
    if let Ok(rendered) = config.to_toml_string() {
        debug!(config = %rendered, "resolved configuration");
    }

    let system = Arc::new(System::new(config.clone()).await?);

    // The `sim` feature backs every peripheral bus with an in-memory UART
    // and GPIO pin; a hardware build wires real serial ports in here instead.
    let bms_client = Arc::new(BmsClient::new(
        Arc::new(SimulatedUart::new(Vec::new())),
        Duration::from_millis(config.uart.timeout_ms),
    ));
    let inverter_client = Arc::new(InverterClient::new(
        Arc::new(SimulatedUart::new(Vec::new())),
        Duration::from_millis(config.uart.timeout_ms),
    ));
    let psu_client = Arc::new(PsuClient::new(
        Arc::new(SimulatedUart::new(Vec::new())),
        Duration::from_millis(config.uart.timeout_ms),
    ));
    let ats_monitor = Arc::new(AtsMonitor::new(
        Arc::new(SimulatedPin::new(true)),
        Arc::new(SimulatedPin::new(false)),
    ));
    let psu_current_mux = Arc::new(PsuCurrentMux::new(
        Arc::new(SimulatedPin::new(false)),
        Arc::new(SimulatedPin::new(false)),
    ));
    let inverter_fan_pin = Arc::new(SimulatedPin::new(false));
    let psu_fan_pin = Arc::new(SimulatedPin::new(false));
    let power_button_pin = Arc::new(SimulatedPin::new(false));

    let (commands_tx, commands) = CommandQueue::new(32);

    let handles = system.spawn_all(
        bms_client,
        inverter_client,
        psu_client,
        ats_monitor,
        psu_current_mux,
        inverter_fan_pin,
        psu_fan_pin,
        power_button_pin,
        commands_tx,
        commands,
    );

    shutdown_signal().await;
    system.request_shutdown();
    for handle in handles {
        let _ = handle.await;
    }

    info!("shutdown complete");
    Ok(())
}
