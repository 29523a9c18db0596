#![allow(dead_code)]
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FirmwareError;

/// A byte-oriented serial transport used by every peripheral protocol
/// client (BMS/inverter/PSU). Mirrors the request/response shape of a
/// UART: write a command, then read back a fixed-size frame.
#[async_trait]
pub trait UartPort: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<(), FirmwareError>;

    /// Read exactly `len` bytes, failing with [`FirmwareError::NoResponse`]
    /// if nothing arrives within `timeout`.
    async fn read_exact(&self, len: usize, timeout: Duration) -> Result<Vec<u8>, FirmwareError>;
}

/// A canned, in-memory UART used for local runs and tests (the `sim`
/// feature). Replays a fixed response frame for every write.
#[cfg(feature = "sim")]
pub mod sim {
    use super::*;
    use tokio::sync::Mutex;

    pub struct SimulatedUart {
        response: Mutex<Vec<u8>>,
    }

    impl SimulatedUart {
        pub fn new(response: Vec<u8>) -> Self {
            Self {
                response: Mutex::new(response),
            }
        }

        pub async fn set_response(&self, response: Vec<u8>) {
            *self.response.lock().await = response;
        }
    }

    #[async_trait]
    impl UartPort for SimulatedUart {
        async fn write(&self, _data: &[u8]) -> Result<(), FirmwareError> {
            Ok(())
        }

        async fn read_exact(
            &self,
            len: usize,
            _timeout: Duration,
        ) -> Result<Vec<u8>, FirmwareError> {
            let response = self.response.lock().await;
            if response.len() < len {
                return Err(FirmwareError::NoResponse);
            }
            Ok(response[..len].to_vec())
        }
    }

}
