#![allow(dead_code)]
use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::domain::supervised::NotifySink;

/// A non-owning sink every supervised state can push packed wire state to.
/// The real binding writes to a GATT characteristic and notifies connected
/// clients; this one records the last payload per UUID for tests and for
/// the simulator's inspection API (spec.md §4.10).
pub struct SimulatedTransport {
    last_notified: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self {
            last_notified: Mutex::new(HashMap::new()),
        }
    }

    pub fn last_payload(&self, uuid: Uuid) -> Option<Vec<u8>> {
        self.last_notified.lock().get(&uuid).cloned()
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifySink for SimulatedTransport {
    fn notify(&self, uuid: Uuid, payload: Vec<u8>) {
        debug!(%uuid, bytes = payload.len(), "wireless notify");
        self.last_notified.lock().insert(uuid, payload);
    }
}
