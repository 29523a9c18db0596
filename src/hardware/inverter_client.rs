#![allow(dead_code)]
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::inverter::{parse_frame, InverterReading};
use crate::error::FirmwareError;

use super::uart::UartPort;

const POLL_COMMAND: [u8; 6] = [0xAE, 0x01, 0x01, 0x03, 0x05, 0xEE];
const FRAME_LEN: usize = 17;

/// Protocol client for the inverter: writes the poll command, reads back
/// the 17-byte BCD frame, and decodes it (spec.md §4.3).
pub struct InverterClient {
    port: Arc<dyn UartPort>,
    timeout: Duration,
}

impl InverterClient {
    pub fn new(port: Arc<dyn UartPort>, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub async fn poll(&self) -> Result<InverterReading, FirmwareError> {
        self.port.write(&POLL_COMMAND).await?;
        let frame = self.port.read_exact(FRAME_LEN, self.timeout).await?;
        debug!(bytes = frame.len(), "inverter frame received");
        parse_frame(&frame)
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::hardware::uart::sim::SimulatedUart;

    fn valid_frame() -> Vec<u8> {
        // ac=230V(BCD 23,00), power=100W(BCD 01,00), temp=20, dc=0, fault=0, battery=0
        let mut f = vec![
            0xAEu8, 0x23, 0x00, 0x01, 0x00, 20, 0x00, 0x00, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0xEE,
        ];
        let sum = f[1..FRAME_LEN - 2]
            .iter()
            .fold(0u8, |a, b| a.wrapping_add(*b))
            % 100;
        f[FRAME_LEN - 2] = sum;
        f
    }

    #[tokio::test]
    async fn polls_and_decodes_a_valid_frame() {
        let uart = Arc::new(SimulatedUart::new(valid_frame()));
        let client = InverterClient::new(uart, Duration::from_millis(50));
        let reading = client.poll().await.unwrap();
        assert_eq!(reading.output_power_w, 100);
    }
}
