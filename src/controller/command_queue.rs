#![allow(dead_code)]
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::profile::ProfileKey;

/// Which component's history ring `0x01 pull_history` targets (spec.md
/// §4.10): inverter, bms or psu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryTarget {
    Inverter,
    Bms,
    Psu,
}

/// Commands accepted from the wireless surface. A single mpsc channel
/// enforces the single-writer discipline spec.md §4.10 calls for: every
/// wireless write decodes into one of these and is applied from the one
/// task that owns the domain states, instead of each characteristic
/// handler mutating state directly.
#[derive(Debug, Clone)]
pub enum Command {
    ProfileSetBytes { key: ProfileKey, raw: Vec<u8> },
    AtsSetEnabled(bool),
    RequestFullSnapshot,
    PullHistory(HistoryTarget),
    PsuOn,
    PsuOff,
    PsuSetCurrent(u8),
    InverterOn,
    InverterOff,
    OtaUpdate,
    SetLogForwarding(bool),
    Reboot,
}

/// The command queue's producer handle, cloned into every wireless
/// characteristic write handler.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
}

impl CommandSender {
    pub async fn send(&self, command: Command) {
        if self.tx.send(command).await.is_err() {
            warn!("command queue receiver dropped; command lost");
        }
    }
}

pub struct CommandQueue {
    rx: mpsc::Receiver<Command>,
}

impl CommandQueue {
    /// Bounded so a wireless client flooding writes applies backpressure
    /// rather than growing memory unboundedly.
    pub fn new(capacity: usize) -> (CommandSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (CommandSender { tx }, Self { rx })
    }

    pub async fn recv(&mut self) -> Option<Command> {
        let command = self.rx.recv().await;
        if let Some(c) = &command {
            debug!(?c, "command dequeued");
        }
        command
    }
}
