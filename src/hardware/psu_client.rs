#![allow(dead_code)]
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::psu::{parse_frame, PsuReading};
use crate::error::FirmwareError;

use super::uart::UartPort;

const POLL_COMMAND: [u8; 1] = [0x03];
const FRAME_LEN: usize = 22;

/// Protocol client for the PSU: writes the poll command, reads back the
/// 22-byte dual-CRC frame, and decodes it (spec.md §4.4).
pub struct PsuClient {
    port: Arc<dyn UartPort>,
    timeout: Duration,
}

impl PsuClient {
    pub fn new(port: Arc<dyn UartPort>, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub async fn poll(&self) -> Result<PsuReading, FirmwareError> {
        self.port.write(&POLL_COMMAND).await?;
        let frame = self.port.read_exact(FRAME_LEN, self.timeout).await?;
        debug!(bytes = frame.len(), "psu frame received");
        parse_frame(&frame)
    }
}
