#![allow(dead_code)]
use crate::controller::command_queue::{Command, HistoryTarget};
use crate::domain::profile::ProfileKey;
use crate::error::FirmwareError;

const OP_PULL_HISTORY: u8 = 0x01;
const OP_PSU_ON: u8 = 0x10;
const OP_PSU_OFF: u8 = 0x11;
const OP_PSU_SET_CURRENT: u8 = 0x12;
const OP_INVERTER_ON: u8 = 0x20;
const OP_INVERTER_OFF: u8 = 0x21;
const OP_ATS_ENABLE: u8 = 0x30;
const OP_ATS_DISABLE: u8 = 0x31;
const OP_PROFILE_SET: u8 = 0x40;
const OP_OTA_UPDATE: u8 = 0x50;
const OP_LOG_FORWARDING_ENABLE: u8 = 0x60;
const OP_LOG_FORWARDING_DISABLE: u8 = 0x61;
const OP_REBOOT: u8 = 0xF0;

fn history_target(byte: u8) -> Result<HistoryTarget, FirmwareError> {
    match byte {
        0x00 => Ok(HistoryTarget::Inverter),
        0x01 => Ok(HistoryTarget::Bms),
        0x02 => Ok(HistoryTarget::Psu),
        other => Err(FirmwareError::Unsupported(format!(
            "unknown pull_history target {other:#04x}"
        ))),
    }
}

/// Decode one wireless characteristic write (`[opcode][payload...]`) into a
/// [`Command`] for the single-writer queue (spec.md §4.10).
///
/// `0x30`/`0x31` (ats.enable/disable) also imply a profile write
/// (`profile.set(ATS, true/false)`): the caller applies both from the
/// [`Command::AtsSetEnabled`] arm since a persisted `AtsEnabled` write and
/// the live enable flag are kept in lockstep there.
pub fn decode(bytes: &[u8]) -> Result<Command, FirmwareError> {
    let (&opcode, rest) = bytes.split_first().ok_or_else(|| FirmwareError::Parse {
        offset: 0,
        reason: "empty command write".into(),
    })?;

    match opcode {
        OP_PULL_HISTORY => {
            let target_byte = rest.first().copied().ok_or_else(|| FirmwareError::Parse {
                offset: 1,
                reason: "missing pull_history target".into(),
            })?;
            Ok(Command::PullHistory(history_target(target_byte)?))
        }
        OP_PSU_ON => Ok(Command::PsuOn),
        OP_PSU_OFF => Ok(Command::PsuOff),
        OP_PSU_SET_CURRENT => {
            let channel = rest.first().copied().ok_or_else(|| FirmwareError::Parse {
                offset: 1,
                reason: "missing psu current channel".into(),
            })?;
            Ok(Command::PsuSetCurrent(channel))
        }
        OP_INVERTER_ON => Ok(Command::InverterOn),
        OP_INVERTER_OFF => Ok(Command::InverterOff),
        OP_ATS_ENABLE => Ok(Command::AtsSetEnabled(true)),
        OP_ATS_DISABLE => Ok(Command::AtsSetEnabled(false)),
        OP_PROFILE_SET => {
            let (&key_id, raw) = rest.split_first().ok_or_else(|| FirmwareError::Parse {
                offset: 1,
                reason: "missing profile key id".into(),
            })?;
            let key = ProfileKey::from_wire_id(key_id).ok_or_else(|| {
                FirmwareError::Unsupported(format!("unknown profile key id {key_id:#04x}"))
            })?;
            Ok(Command::ProfileSetBytes {
                key,
                raw: raw.to_vec(),
            })
        }
        OP_OTA_UPDATE => Ok(Command::OtaUpdate),
        OP_LOG_FORWARDING_ENABLE => Ok(Command::SetLogForwarding(true)),
        OP_LOG_FORWARDING_DISABLE => Ok(Command::SetLogForwarding(false)),
        OP_REBOOT => Ok(Command::Reboot),
        other => Err(FirmwareError::Unsupported(format!(
            "unknown opcode {other:#04x}"
        ))),
    }
}
