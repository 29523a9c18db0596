#![allow(dead_code)]
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::bms::{parse_frame, BmsReading};
use crate::error::FirmwareError;

use super::uart::UartPort;

/// Command byte the BMS expects before it emits its TLV status frame.
const POLL_COMMAND: [u8; 1] = [0x01];
const RESPONSE_LEN: usize = 98;

/// Protocol client for the battery management system: writes the poll
/// command, reads back the response frame, and decodes it (spec.md §4.2).
pub struct BmsClient {
    port: Arc<dyn UartPort>,
    timeout: Duration,
}

impl BmsClient {
    pub fn new(port: Arc<dyn UartPort>, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub async fn poll(&self) -> Result<BmsReading, FirmwareError> {
        self.port.write(&POLL_COMMAND).await?;
        let frame = self.port.read_exact(RESPONSE_LEN, self.timeout).await?;
        debug!(bytes = frame.len(), "bms frame received");
        parse_frame(&frame)
    }
}
