#![allow(dead_code)]
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::FirmwareError;

use super::supervised::{ComponentId, EventKind, SupervisedState};

/// Enumerated profile keys (spec.md §3 "Profile").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileKey {
    AtsEnabled,
    WifiSsid,
    WifiPassword,
    MinCellV,
    MaxCellV,
    PsuTurbo,
    PsuCurrentChannel,
    McuSelfConsumptionAh,
    Model,
}

impl ProfileKey {
    /// The wire opcode byte used by the command surface's `0x40 profile.set` op.
    pub fn wire_id(self) -> u8 {
        match self {
            ProfileKey::AtsEnabled => 0x01,
            ProfileKey::WifiSsid => 0x02,
            ProfileKey::WifiPassword => 0x03,
            ProfileKey::MinCellV => 0x04,
            ProfileKey::MaxCellV => 0x05,
            ProfileKey::PsuTurbo => 0x06,
            ProfileKey::PsuCurrentChannel => 0x07,
            ProfileKey::McuSelfConsumptionAh => 0x08,
            ProfileKey::Model => 0x09,
        }
    }

    pub fn from_wire_id(id: u8) -> Option<Self> {
        Some(match id {
            0x01 => ProfileKey::AtsEnabled,
            0x02 => ProfileKey::WifiSsid,
            0x03 => ProfileKey::WifiPassword,
            0x04 => ProfileKey::MinCellV,
            0x05 => ProfileKey::MaxCellV,
            0x06 => ProfileKey::PsuTurbo,
            0x07 => ProfileKey::PsuCurrentChannel,
            0x08 => ProfileKey::McuSelfConsumptionAh,
            0x09 => ProfileKey::Model,
            _ => return None,
        })
    }

    fn data_type(self) -> ProfileDataType {
        match self {
            ProfileKey::AtsEnabled | ProfileKey::PsuTurbo => ProfileDataType::Bool,
            ProfileKey::PsuCurrentChannel => ProfileDataType::Int8,
            ProfileKey::MinCellV | ProfileKey::MaxCellV | ProfileKey::McuSelfConsumptionAh => {
                ProfileDataType::Float32
            }
            ProfileKey::WifiSsid | ProfileKey::WifiPassword | ProfileKey::Model => {
                ProfileDataType::String
            }
        }
    }
}

enum ProfileDataType {
    Bool,
    Int8,
    Float32,
    String,
}

/// A typed, already-cast profile value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
}

impl ProfileValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ProfileValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ProfileValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self {
            ProfileValue::Int(i) => u8::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ProfileValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Defaults supplied at compile time (HardwareConfig in the boot profile),
/// used when the persisted file is missing (spec.md §4.9).
#[derive(Debug, Clone)]
pub struct ProfileDefaults {
    pub min_cell_v: f32,
    pub max_cell_v: f32,
    pub model: String,
}

/// Cast a raw wire byte string into its typed value per the key's declared type.
fn cast_wire_bytes(key: ProfileKey, raw: &[u8]) -> Result<ProfileValue, FirmwareError> {
    match key.data_type() {
        ProfileDataType::Bool => {
            let b = raw.first().copied().unwrap_or(0);
            Ok(ProfileValue::Bool(b != 0))
        }
        ProfileDataType::Int8 => {
            let v = raw.first().copied().ok_or_else(|| {
                FirmwareError::Unsupported(format!("{:?}: empty INT8 payload", key))
            })?;
            Ok(ProfileValue::Int(v as i32))
        }
        ProfileDataType::Float32 => {
            if raw.len() < 4 {
                return Err(FirmwareError::Unsupported(format!(
                    "{:?}: FLOAT32 payload shorter than 4 bytes",
                    key
                )));
            }
            let bytes: [u8; 4] = raw[0..4].try_into().unwrap();
            Ok(ProfileValue::Float(f32::from_le_bytes(bytes)))
        }
        ProfileDataType::String => {
            let s = std::str::from_utf8(raw)
                .map_err(|e| FirmwareError::Unsupported(format!("{:?}: invalid utf-8: {e}", key)))?;
            Ok(ProfileValue::Str(s.to_string()))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedProfile {
    // Keys are hex-stringified wire ids, per spec.md §6's storage contract.
    entries: HashMap<String, ProfileValue>,
}

/// The supervised profile state: a typed key/value map with CHANGE
/// notification, persisted as a single JSON blob (spec.md §4.9).
pub struct ProfileState {
    pub base: SupervisedState,
    path: PathBuf,
    values: HashMap<ProfileKey, ProfileValue>,
}

impl ProfileState {
    pub fn new(path: PathBuf, defaults: &ProfileDefaults) -> Self {
        let mut values = HashMap::new();
        values.insert(ProfileKey::AtsEnabled, ProfileValue::Bool(false));
        values.insert(ProfileKey::WifiSsid, ProfileValue::Str(String::new()));
        values.insert(ProfileKey::WifiPassword, ProfileValue::Str(String::new()));
        values.insert(ProfileKey::MinCellV, ProfileValue::Float(defaults.min_cell_v));
        values.insert(ProfileKey::MaxCellV, ProfileValue::Float(defaults.max_cell_v));
        values.insert(ProfileKey::PsuTurbo, ProfileValue::Bool(false));
        values.insert(ProfileKey::PsuCurrentChannel, ProfileValue::Int(0));
        values.insert(ProfileKey::McuSelfConsumptionAh, ProfileValue::Float(0.0));
        values.insert(ProfileKey::Model, ProfileValue::Str(defaults.model.clone()));

        Self {
            base: SupervisedState::new(
                ComponentId::Profile,
                std::time::Duration::from_secs(5),
                std::time::Duration::from_secs(60),
            ),
            path,
            values,
        }
    }

    /// Load from disk, falling back to compile-time defaults on a missing file.
    pub async fn load(path: PathBuf, defaults: &ProfileDefaults) -> Self {
        let mut state = Self::new(path.clone(), defaults);
        if let Ok(bytes) = tokio::fs::read(&path).await {
            if let Ok(persisted) = serde_json::from_slice::<PersistedProfile>(&bytes) {
                for (hex_key, value) in persisted.entries {
                    if let Ok(id) = u8::from_str_radix(hex_key.trim_start_matches("0x"), 16) {
                        if let Some(key) = ProfileKey::from_wire_id(id) {
                            state.values.insert(key, value);
                        }
                    }
                }
            }
        }
        state
    }

    pub fn get(&self, key: ProfileKey) -> Option<&ProfileValue> {
        self.values.get(&key)
    }

    /// Set from an already-typed native value (wire `as_bytes=false`).
    pub fn set_native(&mut self, key: ProfileKey, value: ProfileValue) {
        self.values.insert(key, value);
        self.base.notify(|| Vec::new());
    }

    /// Set from a raw byte string received over the wire (`as_bytes=true`).
    pub fn set_bytes(&mut self, key: ProfileKey, raw: &[u8]) -> Result<(), FirmwareError> {
        let value = cast_wire_bytes(key, raw)?;
        self.values.insert(key, value);
        self.base.notify(|| Vec::new());
        Ok(())
    }

    /// Persist the full map atomically: write to a temp file, then rename.
    pub async fn flush(&self) -> Result<(), FirmwareError> {
        let entries = self
            .values
            .iter()
            .map(|(k, v)| (format!("{:#04x}", k.wire_id()), v.clone()))
            .collect();
        let persisted = PersistedProfile { entries };
        let json = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| FirmwareError::Profile(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub fn trigger_change(&mut self) {
        self.base.trigger(EventKind::Change);
    }
}
