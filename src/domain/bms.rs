#![allow(dead_code)]
use std::time::Duration;

use crate::error::FirmwareError;

use super::history::{HistoryRing, Metric};
use super::supervised::{ComponentId, ErrorBit, EventKind, SupervisedState};

/// TLV descriptor tags, matching the BMS's wire protocol byte-for-byte
/// (spec.md §4.3). Every descriptor except [`descriptor::CELL_BLOCK`] has an
/// implicit, fixed-width value; the cell block alone carries an explicit
/// one-byte length because the number of series cells varies by pack.
mod descriptor {
    pub const CELL_BLOCK: u8 = 0x79;
    pub const MOS_TEMPERATURE: u8 = 0x80;
    pub const SENSOR1_TEMPERATURE: u8 = 0x81;
    pub const SENSOR2_TEMPERATURE: u8 = 0x82;
    pub const PACK_VOLTAGE: u8 = 0x83;
    pub const PACK_CURRENT: u8 = 0x84;
    pub const SOC: u8 = 0x85;
    pub const TEMP_SENSOR_COUNT: u8 = 0x86;
    pub const CYCLES: u8 = 0x87;
    pub const CYCLE_CAPACITY: u8 = 0x89;
    pub const BATTERY_STRINGS: u8 = 0x8A;
    pub const EXTERNAL_ERRORS: u8 = 0x8B;
    pub const STATE: u8 = 0x8C;
    pub const TOTAL_OVER_VOLTAGE_PROTECTION: u8 = 0x8E;
    pub const TOTAL_UNDER_VOLTAGE_PROTECTION: u8 = 0x8F;
    pub const CELL_OVER_VOLTAGE_PROTECTION: u8 = 0x90;
    pub const CELL_OVER_VOLTAGE_RECOVERY: u8 = 0x91;
    pub const CELL_OVER_VOLTAGE_DELAY: u8 = 0x92;
    pub const CELL_UNDER_VOLTAGE_PROTECTION: u8 = 0x93;
    pub const CELL_UNDER_VOLTAGE_RECOVERY: u8 = 0x94;
    pub const CELL_UNDER_VOLTAGE_DELAY: u8 = 0x95;
    pub const CELL_PRESSURE_DIFFERENCE: u8 = 0x96;
    pub const DISCHARGE_OVER_CURRENT: u8 = 0x97;
    pub const DISCHARGE_OVER_CURRENT_DELAY: u8 = 0x98;
    pub const CHARGE_OVER_CURRENT: u8 = 0x99;
    pub const CHARGE_OVER_CURRENT_DELAY: u8 = 0x9A;
    pub const BALANCING_VOLTAGE: u8 = 0x9B;
    pub const BALANCING_PRESSURE_DIFFERENCE: u8 = 0x9C;
    pub const BATTERY_CAPACITY: u8 = 0xAA;
}

/// Cursor over a response frame that asserts each descriptor byte as it
/// reads the value following it, the same way the reference driver's
/// `struct.unpack_from(">Bx", response, offset)` walk does: a mismatched
/// descriptor means the frame's shape diverged from what this firmware
/// expects and the whole reading is untrustworthy.
struct Cursor<'a> {
    frame: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(frame: &'a [u8], offset: usize) -> Self {
        Self { frame, offset }
    }

    fn check_descriptor(&self, descriptor: u8, width: usize) -> Result<(), FirmwareError> {
        let tag = *self
            .frame
            .get(self.offset)
            .ok_or_else(|| FirmwareError::Parse {
                offset: self.offset,
                reason: "truncated frame".into(),
            })?;
        if tag != descriptor {
            return Err(FirmwareError::Parse {
                offset: self.offset,
                reason: format!("expected descriptor {descriptor:#04x}, found {tag:#04x}"),
            });
        }
        if self.offset + width > self.frame.len() {
            return Err(FirmwareError::Parse {
                offset: self.offset,
                reason: "truncated value".into(),
            });
        }
        Ok(())
    }

    fn expect_u8(&mut self, descriptor: u8) -> Result<u8, FirmwareError> {
        self.check_descriptor(descriptor, 2)?;
        let value = self.frame[self.offset + 1];
        self.offset += 2;
        Ok(value)
    }

    fn expect_u16(&mut self, descriptor: u8) -> Result<u16, FirmwareError> {
        self.check_descriptor(descriptor, 3)?;
        let value = u16::from_be_bytes([self.frame[self.offset + 1], self.frame[self.offset + 2]]);
        self.offset += 3;
        Ok(value)
    }

    fn expect_i16(&mut self, descriptor: u8) -> Result<i16, FirmwareError> {
        self.check_descriptor(descriptor, 3)?;
        let value = i16::from_be_bytes([self.frame[self.offset + 1], self.frame[self.offset + 2]]);
        self.offset += 3;
        Ok(value)
    }

    fn expect_u32(&mut self, descriptor: u8) -> Result<u32, FirmwareError> {
        self.check_descriptor(descriptor, 5)?;
        let value = u32::from_be_bytes([
            self.frame[self.offset + 1],
            self.frame[self.offset + 2],
            self.frame[self.offset + 3],
            self.frame[self.offset + 4],
        ]);
        self.offset += 5;
        Ok(value)
    }
}

/// Decode a sign-magnitude word: bit 15 is the sign (set means the pack is
/// discharging), bits 0-14 are the magnitude. Unlike `sensor2_temperature`,
/// the pack current is *not* two's complement.
fn decode_signed_magnitude(raw: u16) -> i32 {
    let magnitude = (raw & 0x7FFF) as i32;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// The ~15 protection thresholds the pack reports back verbatim (descriptors
/// 0x8E-0x9C). Firmware treats these as read-only telemetry; they are
/// programmed into the pack out of band.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectionThresholds {
    pub total_over_voltage_protection: Option<u16>,
    pub total_under_voltage_protection: Option<u16>,
    pub cell_over_voltage_protection: Option<u16>,
    pub cell_over_voltage_recovery: Option<u16>,
    pub cell_over_voltage_delay: Option<u16>,
    pub cell_under_voltage_protection: Option<u16>,
    pub cell_under_voltage_recovery: Option<u16>,
    pub cell_under_voltage_delay: Option<u16>,
    pub cell_pressure_difference: Option<u16>,
    pub discharge_over_current: Option<u16>,
    pub discharge_over_current_delay: Option<u16>,
    pub charge_over_current: Option<u16>,
    pub charge_over_current_delay: Option<u16>,
    pub balancing_voltage: Option<u16>,
    pub balancing_pressure_difference: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BmsReading {
    pub cell_voltages_mv: [Option<u16>; 4],
    pub mos_temperature: Option<u16>,
    pub sensor1_temperature: Option<u16>,
    pub sensor2_temperature: Option<i16>,
    pub pack_voltage_dv: Option<u16>,
    pub current_ca: Option<i32>,
    pub soc: Option<u8>,
    pub temp_sensor_count: Option<u8>,
    pub cycles: Option<u16>,
    pub cycle_capacity: Option<u32>,
    pub battery_strings: Option<u16>,
    pub external_errors: u16,
    pub charge_allowed: bool,
    pub discharge_allowed: bool,
    pub thresholds: ProtectionThresholds,
    pub battery_capacity: Option<u16>,
}

impl BmsReading {
    pub fn is_discharging(&self) -> bool {
        self.current_ca.map(|c| c < 0).unwrap_or(false)
    }

    pub fn pack_voltage_v(&self) -> f32 {
        self.pack_voltage_dv.map(|v| v as f32 / 100.0).unwrap_or(0.0)
    }
}

/// Decode one BMS response frame. The cell-voltage block is located by
/// scanning for its descriptor (the reference driver does the equivalent of
/// `response.find(b"\x79")`); every descriptor after it is read strictly in
/// the order the protocol defines, asserting its tag as it goes.
pub fn parse_frame(frame: &[u8]) -> Result<BmsReading, FirmwareError> {
    let start = frame
        .iter()
        .position(|&b| b == descriptor::CELL_BLOCK)
        .ok_or_else(|| FirmwareError::Parse {
            offset: 0,
            reason: "cell-voltage block descriptor 0x79 not found".into(),
        })?;

    let mut cursor = Cursor::new(frame, start);
    cursor.check_descriptor(descriptor::CELL_BLOCK, 2)?;
    let cell_block_len = cursor.frame[cursor.offset + 1] as usize;
    cursor.offset += 2;
    if cursor.offset + cell_block_len > frame.len() {
        return Err(FirmwareError::Parse {
            offset: cursor.offset,
            reason: "truncated cell-voltage block".into(),
        });
    }

    let mut cell_voltages_mv: [Option<u16>; 4] = [None; 4];
    for triplet in frame[cursor.offset..cursor.offset + cell_block_len].chunks_exact(3) {
        let cell_index = triplet[0] as usize;
        let voltage = u16::from_be_bytes([triplet[1], triplet[2]]);
        if let Some(slot) = cell_voltages_mv.get_mut(cell_index) {
            *slot = Some(voltage);
        }
    }
    cursor.offset += cell_block_len;

    let mos_temperature = cursor.expect_u16(descriptor::MOS_TEMPERATURE)?;
    let sensor1_temperature = cursor.expect_u16(descriptor::SENSOR1_TEMPERATURE)?;
    let sensor2_temperature = cursor.expect_i16(descriptor::SENSOR2_TEMPERATURE)?;
    let pack_voltage_dv = cursor.expect_u16(descriptor::PACK_VOLTAGE)?;
    let raw_current = cursor.expect_u16(descriptor::PACK_CURRENT)?;
    let current_ca = decode_signed_magnitude(raw_current);
    let soc = cursor.expect_u8(descriptor::SOC)?;
    let temp_sensor_count = cursor.expect_u8(descriptor::TEMP_SENSOR_COUNT)?;
    let cycles = cursor.expect_u16(descriptor::CYCLES)?;
    let cycle_capacity = cursor.expect_u32(descriptor::CYCLE_CAPACITY)?;
    let battery_strings = cursor.expect_u16(descriptor::BATTERY_STRINGS)?;
    let external_errors = cursor.expect_u16(descriptor::EXTERNAL_ERRORS)?;
    let state = cursor.expect_u16(descriptor::STATE)?;
    let charge_allowed = state & 0x01 != 0;
    let discharge_allowed = state & 0x02 != 0;

    let thresholds = ProtectionThresholds {
        total_over_voltage_protection: Some(
            cursor.expect_u16(descriptor::TOTAL_OVER_VOLTAGE_PROTECTION)?,
        ),
        total_under_voltage_protection: Some(
            cursor.expect_u16(descriptor::TOTAL_UNDER_VOLTAGE_PROTECTION)?,
        ),
        cell_over_voltage_protection: Some(
            cursor.expect_u16(descriptor::CELL_OVER_VOLTAGE_PROTECTION)?,
        ),
        cell_over_voltage_recovery: Some(
            cursor.expect_u16(descriptor::CELL_OVER_VOLTAGE_RECOVERY)?,
        ),
        cell_over_voltage_delay: Some(cursor.expect_u16(descriptor::CELL_OVER_VOLTAGE_DELAY)?),
        cell_under_voltage_protection: Some(
            cursor.expect_u16(descriptor::CELL_UNDER_VOLTAGE_PROTECTION)?,
        ),
        cell_under_voltage_recovery: Some(
            cursor.expect_u16(descriptor::CELL_UNDER_VOLTAGE_RECOVERY)?,
        ),
        cell_under_voltage_delay: Some(cursor.expect_u16(descriptor::CELL_UNDER_VOLTAGE_DELAY)?),
        cell_pressure_difference: Some(cursor.expect_u16(descriptor::CELL_PRESSURE_DIFFERENCE)?),
        discharge_over_current: Some(cursor.expect_u16(descriptor::DISCHARGE_OVER_CURRENT)?),
        discharge_over_current_delay: Some(
            cursor.expect_u16(descriptor::DISCHARGE_OVER_CURRENT_DELAY)?,
        ),
        charge_over_current: Some(cursor.expect_u16(descriptor::CHARGE_OVER_CURRENT)?),
        charge_over_current_delay: Some(
            cursor.expect_u16(descriptor::CHARGE_OVER_CURRENT_DELAY)?,
        ),
        balancing_voltage: Some(cursor.expect_u16(descriptor::BALANCING_VOLTAGE)?),
        balancing_pressure_difference: Some(
            cursor.expect_u16(descriptor::BALANCING_PRESSURE_DIFFERENCE)?,
        ),
    };

    let battery_capacity = cursor.expect_u16(descriptor::BATTERY_CAPACITY)?;

    Ok(BmsReading {
        cell_voltages_mv,
        mos_temperature: Some(mos_temperature),
        sensor1_temperature: Some(sensor1_temperature),
        sensor2_temperature: Some(sensor2_temperature),
        pack_voltage_dv: Some(pack_voltage_dv),
        current_ca: Some(current_ca),
        soc: Some(soc),
        temp_sensor_count: Some(temp_sensor_count),
        cycles: Some(cycles),
        cycle_capacity: Some(cycle_capacity),
        battery_strings: Some(battery_strings),
        external_errors,
        charge_allowed,
        discharge_allowed,
        thresholds,
        battery_capacity: Some(battery_capacity),
    })
}

/// Consecutive-poll debounce for an independent under/over threshold, so a
/// single noisy sample can't flip an external error bit (spec.md §4.3,
/// property 4).
#[derive(Debug, Default)]
struct ThresholdDebounce {
    under_min: u8,
    over_max: u8,
}

const DEBOUNCE_CONFIRMATIONS: u8 = 3;

impl ThresholdDebounce {
    fn record(&mut self, under_min: bool, over_max: bool) -> (bool, bool) {
        self.under_min = if under_min {
            (self.under_min + 1).min(DEBOUNCE_CONFIRMATIONS)
        } else {
            0
        };
        self.over_max = if over_max {
            (self.over_max + 1).min(DEBOUNCE_CONFIRMATIONS)
        } else {
            0
        };
        (
            self.under_min >= DEBOUNCE_CONFIRMATIONS,
            self.over_max >= DEBOUNCE_CONFIRMATIONS,
        )
    }
}

/// The supervised BMS state: latest reading, its telemetry rings, and the
/// min/max cell-voltage debounce.
pub struct BmsState {
    pub base: SupervisedState,
    latest: BmsReading,
    debounce: ThresholdDebounce,
    min_cell_v: f32,
    max_cell_v: f32,
    was_discharging: bool,
    charge_enabled: bool,
    discharge_enabled: bool,
}

impl BmsState {
    pub fn new(min_cell_v: f32, max_cell_v: f32) -> Self {
        let mut base = SupervisedState::new(
            ComponentId::Bms,
            Duration::from_secs(2),
            Duration::from_secs(10),
        );
        base.history.insert(Metric::BmsSoc, HistoryRing::new(Metric::BmsSoc));
        base.history
            .insert(Metric::BmsCurrent, HistoryRing::new(Metric::BmsCurrent));
        base.history.insert(
            Metric::BmsCell1Voltage,
            HistoryRing::new(Metric::BmsCell1Voltage),
        );
        base.history.insert(
            Metric::BmsCell2Voltage,
            HistoryRing::new(Metric::BmsCell2Voltage),
        );
        base.history.insert(
            Metric::BmsCell3Voltage,
            HistoryRing::new(Metric::BmsCell3Voltage),
        );
        base.history.insert(
            Metric::BmsCell4Voltage,
            HistoryRing::new(Metric::BmsCell4Voltage),
        );

        Self {
            base,
            latest: BmsReading::default(),
            debounce: ThresholdDebounce::default(),
            min_cell_v,
            max_cell_v,
            was_discharging: false,
            charge_enabled: true,
            discharge_enabled: true,
        }
    }

    pub fn latest(&self) -> &BmsReading {
        &self.latest
    }

    pub fn charge_enabled(&self) -> bool {
        self.charge_enabled
    }

    pub fn discharge_enabled(&self) -> bool {
        self.discharge_enabled
    }

    pub fn enable_charge(&mut self) {
        self.charge_enabled = true;
    }

    pub fn disable_charge(&mut self) {
        self.charge_enabled = false;
    }

    pub fn enable_discharge(&mut self) {
        self.discharge_enabled = true;
    }

    pub fn disable_discharge(&mut self) {
        self.discharge_enabled = false;
    }

    /// The pack's reported state of charge, adjusted downward for power the
    /// controller has drawn that the pack's own coulomb counter never saw
    /// directly attributed to "load". `self_consumption_ah` is the MCU's
    /// accumulator (spec.md §4.3, §4.6); the BMS has no opinion on how it is
    /// produced, only on how it discounts the reported SOC.
    pub fn get_soc(&self, self_consumption_ah: f32) -> Option<u8> {
        let soc = self.latest.soc? as i32;
        let capacity = self.latest.battery_capacity? as f32;
        if capacity <= 0.0 {
            return Some(soc.clamp(0, 100) as u8);
        }
        let deduction = (100.0 * self_consumption_ah / capacity).floor() as i32;
        Some((soc - deduction).clamp(0, 100) as u8)
    }

    /// Apply a freshly parsed reading: push telemetry, debounce the
    /// under/over cell-voltage thresholds, and fire BATTERY_CHARGED /
    /// BATTERY_DISCHARGED on a direction transition.
    pub fn apply(&mut self, reading: BmsReading) {
        self.latest = reading;

        if let Some(soc) = reading.soc {
            self.base
                .history
                .get_mut(&Metric::BmsSoc)
                .unwrap()
                .push(soc as u16);
        }
        if let Some(current) = reading.current_ca {
            self.base
                .history
                .get_mut(&Metric::BmsCurrent)
                .unwrap()
                .push(current.unsigned_abs() as u16);
        }
        let cell_metrics = [
            Metric::BmsCell1Voltage,
            Metric::BmsCell2Voltage,
            Metric::BmsCell3Voltage,
            Metric::BmsCell4Voltage,
        ];
        for (metric, voltage) in cell_metrics.into_iter().zip(reading.cell_voltages_mv) {
            if let Some(mv) = voltage {
                self.base.history.get_mut(&metric).unwrap().push(mv);
            }
        }

        self.base.set_external_errors(reading.external_errors);

        let under_min = reading
            .cell_voltages_mv
            .iter()
            .flatten()
            .any(|&mv| (mv as f32 / 1000.0) < self.min_cell_v);
        let over_max = reading
            .cell_voltages_mv
            .iter()
            .flatten()
            .any(|&mv| (mv as f32 / 1000.0) > self.max_cell_v);
        let (under_confirmed, over_confirmed) = self.debounce.record(under_min, over_max);

        let is_discharging = reading.is_discharging();
        if under_confirmed && is_discharging && !self.was_discharging {
            self.base.trigger(EventKind::BatteryDischarged);
        }
        if over_confirmed && !is_discharging && self.was_discharging {
            self.base.trigger(EventKind::BatteryCharged);
        }
        self.was_discharging = is_discharging;

        self.base.notify(|| Vec::new());
    }

    /// Reset to an empty reading and raise NO_RESPONSE, mirroring the
    /// contract for an empty reply or a parse exception (spec.md §4.3): the
    /// whole state is wiped rather than left holding a stale reading.
    pub fn wipe(&mut self) {
        self.latest = BmsReading::default();
        self.base.set_error(ErrorBit::NoResponse);
        self.base.notify(|| Vec::new());
    }

    pub fn on(&mut self) {
        self.base.on();
    }

    pub fn off(&mut self) {
        self.base.off();
    }

    pub fn trigger_change(&mut self) {
        self.base.trigger(EventKind::Change);
    }
}

impl super::mcu::DrawSource for BmsState {
    fn is_discharging(&self) -> bool {
        self.latest.is_discharging()
    }

    fn pack_voltage_v(&self) -> f32 {
        self.latest.pack_voltage_v()
    }

    fn is_active(&self) -> bool {
        self.base.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn push_u8(frame: &mut Vec<u8>, descriptor: u8, value: u8) {
        frame.push(descriptor);
        frame.push(value);
    }

    fn push_u16(frame: &mut Vec<u8>, descriptor: u8, value: u16) {
        frame.push(descriptor);
        frame.extend_from_slice(&value.to_be_bytes());
    }

    fn push_i16(frame: &mut Vec<u8>, descriptor: u8, value: i16) {
        frame.push(descriptor);
        frame.extend_from_slice(&value.to_be_bytes());
    }

    fn push_u32(frame: &mut Vec<u8>, descriptor: u8, value: u32) {
        frame.push(descriptor);
        frame.extend_from_slice(&value.to_be_bytes());
    }

    /// Build a frame with the literal values from spec.md §8 scenario S1:
    /// cells=[3280,3279,3281,3278]mV, soc=67, current=0x0123,
    /// mos_temperature=27, external_errors=0.
    fn s1_frame() -> Vec<u8> {
        let mut f = Vec::new();
        let cells: [u16; 4] = [3280, 3279, 3281, 3278];
        f.push(descriptor::CELL_BLOCK);
        f.push((cells.len() * 3) as u8);
        for (i, mv) in cells.iter().enumerate() {
            f.push(i as u8);
            f.extend_from_slice(&mv.to_be_bytes());
        }
        push_u16(&mut f, descriptor::MOS_TEMPERATURE, 27);
        push_u16(&mut f, descriptor::SENSOR1_TEMPERATURE, 25);
        push_i16(&mut f, descriptor::SENSOR2_TEMPERATURE, 25);
        push_u16(&mut f, descriptor::PACK_VOLTAGE, 13120);
        push_u16(&mut f, descriptor::PACK_CURRENT, 0x0123);
        push_u8(&mut f, descriptor::SOC, 67);
        push_u8(&mut f, descriptor::TEMP_SENSOR_COUNT, 2);
        push_u16(&mut f, descriptor::CYCLES, 12);
        push_u32(&mut f, descriptor::CYCLE_CAPACITY, 20000);
        push_u16(&mut f, descriptor::BATTERY_STRINGS, 4);
        push_u16(&mut f, descriptor::EXTERNAL_ERRORS, 0);
        push_u16(&mut f, descriptor::STATE, 0b11);
        for d in [
            descriptor::TOTAL_OVER_VOLTAGE_PROTECTION,
            descriptor::TOTAL_UNDER_VOLTAGE_PROTECTION,
            descriptor::CELL_OVER_VOLTAGE_PROTECTION,
            descriptor::CELL_OVER_VOLTAGE_RECOVERY,
            descriptor::CELL_OVER_VOLTAGE_DELAY,
            descriptor::CELL_UNDER_VOLTAGE_PROTECTION,
            descriptor::CELL_UNDER_VOLTAGE_RECOVERY,
            descriptor::CELL_UNDER_VOLTAGE_DELAY,
            descriptor::CELL_PRESSURE_DIFFERENCE,
            descriptor::DISCHARGE_OVER_CURRENT,
            descriptor::DISCHARGE_OVER_CURRENT_DELAY,
            descriptor::CHARGE_OVER_CURRENT,
            descriptor::CHARGE_OVER_CURRENT_DELAY,
            descriptor::BALANCING_VOLTAGE,
            descriptor::BALANCING_PRESSURE_DIFFERENCE,
        ] {
            push_u16(&mut f, d, 100);
        }
        push_u16(&mut f, descriptor::BATTERY_CAPACITY, 200);
        f
    }

    #[test]
    fn parses_s1_frame_matching_literal_scenario_values() {
        let reading = parse_frame(&s1_frame()).unwrap();
        assert_eq!(
            reading.cell_voltages_mv,
            [Some(3280), Some(3279), Some(3281), Some(3278)]
        );
        assert_eq!(reading.soc, Some(67));
        assert_eq!(reading.current_ca, Some(291));
        assert!(!reading.is_discharging());
        assert_eq!(reading.mos_temperature, Some(27));
        assert_eq!(reading.external_errors, 0);
        assert_eq!(reading.battery_capacity, Some(200));
    }

    #[test]
    fn pack_current_decodes_sign_magnitude_not_twos_complement() {
        let mut f = s1_frame();
        let current_offset = f
            .iter()
            .position(|&b| b == descriptor::PACK_CURRENT)
            .unwrap();
        f[current_offset + 1..current_offset + 3].copy_from_slice(&0x8064u16.to_be_bytes());
        let reading = parse_frame(&f).unwrap();
        // 0x8064 = sign bit set, magnitude 0x0064 = 100 -> -100, not the
        // two's-complement interpretation (-32668).
        assert_eq!(reading.current_ca, Some(-100));
        assert!(reading.is_discharging());
    }

    #[test]
    fn rejects_frame_with_wrong_descriptor_order() {
        let mut f = s1_frame();
        let cell_block_len = f[1] as usize;
        f[2 + cell_block_len] = 0xFF;
        assert!(parse_frame(&f).is_err());
    }

    #[test]
    fn get_soc_matches_reported_soc_when_self_consumption_is_zero() {
        let mut state = BmsState::new(2.75, 3.65);
        state.apply(parse_frame(&s1_frame()).unwrap());
        assert_eq!(state.get_soc(0.0), Some(67));
    }

    #[test]
    fn get_soc_deducts_self_consumption_ah_scaled_by_capacity() {
        let mut state = BmsState::new(2.75, 3.65);
        state.apply(parse_frame(&s1_frame()).unwrap());
        // battery_capacity=200, self_consumption_ah=4 -> 100*4/200 = 2 deducted
        assert_eq!(state.get_soc(4.0), Some(65));
    }

    #[test]
    fn battery_discharged_fires_once_on_sustained_undervoltage_while_discharging() {
        let mut state = BmsState::new(2.75, 3.65);
        let count = Arc::new(AtomicUsize::new(0));
        let c2 = count.clone();
        state
            .base
            .add_callback(EventKind::BatteryDischarged, Box::new(move || {
                c2.fetch_add(1, Ordering::SeqCst);
            }));

        let mut f = s1_frame();
        f[2] = 0; // cell 0 index
        f[3..5].copy_from_slice(&2700u16.to_be_bytes());
        let current_offset = f
            .iter()
            .position(|&b| b == descriptor::PACK_CURRENT)
            .unwrap();
        f[current_offset + 1..current_offset + 3].copy_from_slice(&0x8032u16.to_be_bytes());

        for _ in 0..5 {
            state.apply(parse_frame(&f).unwrap());
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wipe_clears_reading_and_raises_no_response() {
        let mut state = BmsState::new(2.75, 3.65);
        state.apply(parse_frame(&s1_frame()).unwrap());
        state.wipe();
        assert!(state.latest().soc.is_none());
        assert_ne!(
            state.base.internal_errors & (1 << ErrorBit::NoResponse as u16),
            0
        );
    }
}
