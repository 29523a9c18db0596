#![allow(dead_code)]
use std::collections::VecDeque;

use byteorder::{LittleEndian, WriteBytesExt};

/// Capacity of every telemetry ring buffer (spec.md §4.7).
pub const HISTORY_SIZE: usize = 120;

/// Identifies a telemetry channel. The discriminant doubles as the wire
/// `chart_type` (6 bits, so values must stay below 64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Metric {
    BmsSoc = 0,
    BmsCurrent = 1,
    BmsCell1Voltage = 2,
    BmsCell2Voltage = 3,
    BmsCell3Voltage = 4,
    BmsCell4Voltage = 5,
    InverterPower = 6,
    InverterTemperature = 7,
    PsuVoltage = 8,
    PsuTemperature = 9,
}

/// Element width of a ring buffer's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Byte,
    Word,
}

impl Metric {
    pub const fn data_type(self) -> DataType {
        match self {
            Metric::BmsSoc
            | Metric::BmsCell1Voltage
            | Metric::BmsCell2Voltage
            | Metric::BmsCell3Voltage
            | Metric::BmsCell4Voltage
            | Metric::InverterTemperature
            | Metric::PsuTemperature => DataType::Byte,
            Metric::BmsCurrent | Metric::InverterPower | Metric::PsuVoltage => DataType::Word,
        }
    }
}

/// A single telemetry value, sized per [`Metric::data_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    Byte(u8),
    Word(u16),
}

impl Sample {
    fn to_le_bytes(self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Sample::Byte(v) => out.write_u8(v).unwrap(),
            Sample::Word(v) => out.write_u16::<LittleEndian>(v).unwrap(),
        }
        out
    }
}

/// A 4-byte chunk/update header: `chart_type:6 | data_type:1 | incremental:1 | offset:8 | length:8`,
/// packed into a little-endian u32 (spec.md §4.7).
fn pack_header(metric: Metric, incremental: bool, mut offset: u16, mut length: u16) -> [u8; 4] {
    let overflow = (offset as i32 + length as i32) - HISTORY_SIZE as i32;
    if overflow > 0 {
        length = length.saturating_sub(overflow as u16);
    }

    let chart_type = (metric as u32) & 0b111111;
    let data_type = match metric.data_type() {
        DataType::Byte => 0u32,
        DataType::Word => 1u32,
    };
    let incremental_bit = if incremental { 1u32 } else { 0u32 };
    offset &= 0xFF;
    length &= 0xFF;

    let packed = (chart_type << 18) | (data_type << 17) | (incremental_bit << 16)
        | ((offset as u32) << 8)
        | (length as u32);
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(packed).unwrap();
    out.try_into().unwrap()
}

/// Fixed-capacity deque carrying the most recent [`HISTORY_SIZE`] samples of
/// one metric, plus the chunked wireless streaming protocol over it
/// (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct HistoryRing {
    metric: Metric,
    buffer: VecDeque<Sample>,
}

impl HistoryRing {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            buffer: VecDeque::with_capacity(HISTORY_SIZE),
        }
    }

    pub fn push(&mut self, value: u16) {
        let sample = match self.metric.data_type() {
            DataType::Byte => Sample::Byte(value as u8),
            DataType::Word => Sample::Word(value),
        };
        if self.buffer.len() == HISTORY_SIZE {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);
    }

    pub fn latest(&self) -> Option<Sample> {
        self.buffer.back().copied()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 4-byte header + 1 value, `incremental=1, length=1, offset=0`.
    pub fn incremental_update(&self) -> Option<Vec<u8>> {
        let latest = self.latest()?;
        let mut out = pack_header(self.metric, true, 0, 1).to_vec();
        out.extend(latest.to_le_bytes());
        Some(out)
    }

    /// Full dump as a series of MTU-sized chunks. Each chunk's `offset`
    /// advances by the previous chunk's value count; `incremental=0`.
    pub fn chunked_snapshot(&self, mtu: usize) -> Vec<Vec<u8>> {
        if self.buffer.is_empty() {
            return Vec::new();
        }

        let payload_size = mtu.saturating_sub(4);
        let points_per_chunk = match self.metric.data_type() {
            DataType::Byte => payload_size.max(1),
            DataType::Word => (payload_size / 2).max(1),
        };

        let samples: Vec<Sample> = self.buffer.iter().copied().collect();
        let base_offset = HISTORY_SIZE - samples.len();

        samples
            .chunks(points_per_chunk)
            .enumerate()
            .map(|(i, chunk)| {
                let offset = base_offset + i * points_per_chunk;
                let mut out =
                    pack_header(self.metric, false, offset as u16, chunk.len() as u16).to_vec();
                for s in chunk {
                    out.extend(s.to_le_bytes());
                }
                out
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_at_capacity() {
        let mut r = HistoryRing::new(Metric::BmsSoc);
        for i in 0..(HISTORY_SIZE + 10) {
            r.push((i % 256) as u16);
        }
        assert_eq!(r.len(), HISTORY_SIZE);
        assert_eq!(r.latest(), Some(Sample::Byte(((HISTORY_SIZE + 9) % 256) as u8)));
    }

    #[test]
    fn chunked_snapshot_reconstructs_all_pushed_values() {
        let mut r = HistoryRing::new(Metric::InverterPower);
        let n = 50;
        for i in 0..n {
            r.push(i as u16 * 7);
        }
        let chunks = r.chunked_snapshot(20);

        let mut reconstructed = Vec::new();
        let mut expected_offset = HISTORY_SIZE - n;
        for chunk in &chunks {
            let header = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let offset = (header >> 8) & 0xFF;
            let length = header & 0xFF;
            assert_eq!(offset, expected_offset as u32);
            assert!(offset as usize + length as usize <= HISTORY_SIZE);

            let values = &chunk[4..];
            assert_eq!(values.len(), length as usize * 2);
            for v in values.chunks(2) {
                reconstructed.push(u16::from_le_bytes([v[0], v[1]]));
            }
            expected_offset += length as usize;
        }

        let expected: Vec<u16> = (0..n).map(|i| i as u16 * 7).collect();
        assert_eq!(reconstructed, expected);
    }

    #[test]
    fn no_chunk_overflows_history_size() {
        let mut r = HistoryRing::new(Metric::BmsCell1Voltage);
        for i in 0..HISTORY_SIZE {
            r.push((i % 256) as u16);
        }
        for chunk in r.chunked_snapshot(20) {
            let header = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let offset = (header >> 8) & 0xFF;
            let length = header & 0xFF;
            assert!(offset as usize + length as usize <= HISTORY_SIZE);
        }
    }
}
