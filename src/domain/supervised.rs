#![allow(dead_code)]
use std::collections::HashMap;
use std::time::{Duration, Instant};

use strum::Display;
use tokio::sync::broadcast;
use tracing::debug;

use super::history::{HistoryRing, Metric};

/// Bits of `internal_errors`/`external_errors`, per the taxonomy table.
///
/// Bit 5 is reserved in the source material and intentionally unused here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorBit {
    Timeout = 0,
    Exception = 1,
    NoResponse = 2,
    BadResponse = 3,
    External = 4,
    Pin = 6,
}

/// Which subsystem an event originated from. Used to address callbacks in the
/// coordination fabric without components holding references to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ComponentId {
    Bms,
    Psu,
    Inverter,
    Ats,
    Profile,
    Mcu,
}

/// Event kinds every supervised state can fire. Domain-specific events
/// (`BatteryCharged`/`BatteryDischarged`) live alongside the generic
/// ON/OFF/CHANGE ones rather than in a per-domain enum, because the
/// coordination fabric (spec.md §4.8) dispatches on `(source, kind)` pairs
/// uniformly regardless of which peripheral raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    On,
    Off,
    Change,
    BatteryCharged,
    BatteryDischarged,
}

/// An event broadcast on the system-wide fabric channel. Cheap to clone;
/// carries no borrowed data so it never forms an ownership cycle between
/// components (see spec.md §9, "Callback graphs & potential cycles").
#[derive(Debug, Clone, Copy)]
pub struct SystemEvent {
    pub source: ComponentId,
    pub kind: EventKind,
}

/// A non-owning sink a supervised state can push packed wire state to.
/// Concrete implementation lives in the wireless surface; a GATT server
/// binding implements this by writing to its characteristic and notifying
/// subscribed clients.
pub trait NotifySink: Send + Sync {
    fn notify(&self, uuid: uuid::Uuid, payload: Vec<u8>);
}

type LocalCallback = Box<dyn FnMut() + Send + Sync>;

/// Generic supervised-state base shared by every peripheral (spec.md §3/§4.1).
///
/// Owns the health bookkeeping, the error bitmap, the per-metric history
/// rings and the local callback registry. Domain states embed this as their
/// first field (`base: SupervisedState`) and delegate the base operations to
/// it, the way a `BaseState` subclass did in the original firmware.
pub struct SupervisedState {
    pub component: ComponentId,
    pub active: bool,
    pub internal_errors: u16,
    pub external_errors: u16,
    pub last_exception: Option<String>,

    state_modified_at: Instant,
    history_modified_at: Instant,
    pub state_period: Duration,
    pub history_period: Duration,
    pub grace: Duration,

    pub history: HashMap<Metric, HistoryRing>,
    callbacks: HashMap<EventKind, Vec<LocalCallback>>,

    sink: Option<(uuid::Uuid, std::sync::Arc<dyn NotifySink>)>,
    fabric: Option<broadcast::Sender<SystemEvent>>,
}

impl SupervisedState {
    pub fn new(component: ComponentId, state_period: Duration, history_period: Duration) -> Self {
        let now = Instant::now();
        Self {
            component,
            active: false,
            internal_errors: 0,
            external_errors: 0,
            last_exception: None,
            state_modified_at: now,
            history_modified_at: now,
            state_period,
            history_period,
            grace: Duration::from_secs(5),
            history: HashMap::new(),
            callbacks: HashMap::new(),
            sink: None,
            fabric: None,
        }
    }

    /// Wire this state into the system-wide coordination fabric. Every
    /// `trigger()` call also broadcasts a [`SystemEvent`] on this channel.
    pub fn attach_fabric(&mut self, tx: broadcast::Sender<SystemEvent>) {
        self.fabric = Some(tx);
    }

    /// Bind the wireless transport characteristic this state notifies on.
    pub fn attach_sink(&mut self, uuid: uuid::Uuid, sink: std::sync::Arc<dyn NotifySink>) {
        self.sink = Some((uuid, sink));
    }

    pub fn add_callback(&mut self, event: EventKind, callback: LocalCallback) {
        self.callbacks.entry(event).or_default().push(callback);
    }

    /// Run every local callback registered for `event`, then broadcast it on
    /// the fabric (if attached) so cross-component subscribers react too.
    pub fn trigger(&mut self, event: EventKind) {
        if let Some(cbs) = self.callbacks.get_mut(&event) {
            for cb in cbs.iter_mut() {
                cb();
            }
        }
        if let Some(tx) = &self.fabric {
            let _ = tx.send(SystemEvent {
                source: self.component,
                kind: event,
            });
        }
    }

    pub fn on(&mut self) {
        self.active = true;
        self.trigger(EventKind::On);
        self.trigger(EventKind::Change);
    }

    pub fn off(&mut self) {
        self.active = false;
        self.trigger(EventKind::Off);
        self.trigger(EventKind::Change);
    }

    pub fn set_error(&mut self, bit: ErrorBit) {
        let mask = 1u16 << (bit as u8);
        if self.internal_errors & mask == 0 {
            self.internal_errors |= mask;
            self.trigger(EventKind::Change);
        }
    }

    pub fn reset_error(&mut self, bit: ErrorBit) {
        let mask = 1u16 << (bit as u8);
        if self.internal_errors & mask != 0 {
            self.internal_errors &= !mask;
            self.trigger(EventKind::Change);
        }
    }

    pub fn clear_internal_errors(&mut self) {
        if self.internal_errors != 0 {
            self.internal_errors = 0;
            self.trigger(EventKind::Change);
        }
    }

    pub fn set_external_errors(&mut self, word: u16) {
        if word != 0 {
            self.set_error(ErrorBit::External);
        } else {
            self.reset_error(ErrorBit::External);
        }
        self.external_errors = word;
    }

    pub fn fail(&mut self, exception: impl Into<String>) {
        self.last_exception = Some(exception.into());
        self.set_error(ErrorBit::Exception);
    }

    fn check_health(&mut self) {
        let elapsed = self.state_modified_at.elapsed();
        if elapsed > self.state_period + self.grace {
            self.set_error(ErrorBit::Timeout);
        } else {
            self.reset_error(ErrorBit::Timeout);
        }
    }

    /// Push packed state to the attached transport (if any) and fire CHANGE
    /// callbacks. `pack` builds the wire payload lazily so components that
    /// have no sink attached skip the work entirely.
    pub fn notify(&mut self, pack: impl FnOnce() -> Vec<u8>) {
        if let Some((uuid, sink)) = &self.sink {
            sink.notify(*uuid, pack());
        }
        self.trigger(EventKind::Change);
    }

    /// Must be called once per loop iteration. Updates the health-check
    /// clock and, at `history_period` cadence, signals the caller that a new
    /// history sample should be built (the caller owns the domain-specific
    /// `build_history()` because only it knows which fields to pack).
    pub fn snapshot(&mut self) -> bool {
        self.state_modified_at = Instant::now();
        self.check_health();

        if self.state_modified_at.duration_since(self.history_modified_at) >= self.history_period
        {
            self.history_modified_at = Instant::now();
            debug!(component = %self.component, "history tick");
            true
        } else {
            false
        }
    }
}

/// Convert a nullable value into its "NULL=0, value=v+1" wire encoding.
pub fn pack_nullable(value: Option<u8>) -> u8 {
    value.map(|v| v.saturating_add(1)).unwrap_or(0)
}

/// Same idea for 16-bit nullable values.
pub fn pack_nullable_u16(value: Option<u16>) -> u16 {
    value.map(|v| v.saturating_add(1)).unwrap_or(0)
}

/// NULL/FALSE/TRUE packed as 0/1/2.
pub fn pack_bool(value: Option<bool>) -> u8 {
    match value {
        None => 0x00,
        Some(false) => 0x01,
        Some(true) => 0x02,
    }
}

/// Cell voltage (mV) packed into one byte: `1 + v/10 - 250`, valid for the
/// 2500-4550 mV range a LiFePO4 cell lives in.
pub fn pack_cell_voltage(voltage_mv: Option<u16>) -> u8 {
    match voltage_mv {
        None => 0,
        Some(v) => (1 + (v as i32) / 10 - 250).clamp(0, 255) as u8,
    }
}

/// Version string packed into one byte: `major:1|minor:4|patch:3`.
pub fn pack_version(major: u8, minor: u8, patch: u8) -> u8 {
    ((major & 0x01) << 7) | ((minor & 0x0F) << 3) | (patch & 0x07)
}
