use byteorder::{ByteOrder, LittleEndian};
use std::slice::ChunksExact;

use super::constants::{
    ENERGY_OFFSET, FLAGS_OFFSET, FRAME_MARKER_ENERGY, RECORD_SIZE, SATURATED_ENERGY,
    TRIGGER_TIME_OFFSET,
};
use super::error::RecordError;
use super::flags::EventFlags;

/// A single decoded list-mode record.
///
/// On disk each record is 14 little-endian bytes: an 8 byte unsigned trigger time in
/// picoseconds, a 2 byte signed raw energy (ADC code), and a 4 byte unsigned flag field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListEvent {
    pub trigger_time: u64,
    pub energy: i16,
    pub flags: EventFlags,
}

impl ListEvent {
    pub fn new(trigger_time: u64, energy: i16, flags: u32) -> Self {
        Self {
            trigger_time,
            energy,
            flags: EventFlags::classify(flags),
        }
    }

    /// Decode one record. The slice must be exactly one record long.
    pub fn from_record(record: &[u8]) -> Result<Self, RecordError> {
        if record.len() != RECORD_SIZE {
            return Err(RecordError::TruncatedRecord { len: record.len() });
        }
        Ok(Self::decode_unchecked(record))
    }

    // chunks_exact guarantees the length for the iterator path
    fn decode_unchecked(record: &[u8]) -> Self {
        Self {
            trigger_time: LittleEndian::read_u64(&record[TRIGGER_TIME_OFFSET..ENERGY_OFFSET]),
            energy: LittleEndian::read_i16(&record[ENERGY_OFFSET..FLAGS_OFFSET]),
            flags: EventFlags::classify(LittleEndian::read_u32(&record[FLAGS_OFFSET..RECORD_SIZE])),
        }
    }

    /// Encode the event back to its on-disk representation
    pub fn to_record(&self) -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];
        LittleEndian::write_u64(
            &mut record[TRIGGER_TIME_OFFSET..ENERGY_OFFSET],
            self.trigger_time,
        );
        LittleEndian::write_i16(&mut record[ENERGY_OFFSET..FLAGS_OFFSET], self.energy);
        LittleEndian::write_u32(&mut record[FLAGS_OFFSET..RECORD_SIZE], self.flags.bits());
        record
    }

    /// Frame (trigger) boundary marker: zero energy with the fake-event flag
    pub fn is_frame_marker(&self) -> bool {
        self.energy == FRAME_MARKER_ENERGY && self.flags.is_fake()
    }

    /// Energy carries the saturation/discard sentinel
    pub fn is_energy_discarded(&self) -> bool {
        self.energy == SATURATED_ENERGY
    }
}

/// Lazy iterator over the records of a buffer, in file order.
///
/// The iterator is cheap to clone, so a pass can be restarted from the beginning.
#[derive(Debug, Clone)]
pub struct RecordIter<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for RecordIter<'_> {
    type Item = ListEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(ListEvent::decode_unchecked)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for RecordIter<'_> {}

/// Decode a buffer of whole records.
///
/// Fails with TruncatedRecord if the buffer length is not a multiple of the record size;
/// it is the caller's job to only hand over whole records.
pub fn decode_records(buffer: &[u8]) -> Result<RecordIter<'_>, RecordError> {
    if buffer.len() % RECORD_SIZE != 0 {
        return Err(RecordError::TruncatedRecord { len: buffer.len() });
    }
    Ok(RecordIter {
        chunks: buffer.chunks_exact(RECORD_SIZE),
    })
}

/// Encode a sequence of events into a contiguous buffer
pub fn encode_records<'a>(events: impl IntoIterator<Item = &'a ListEvent>) -> Vec<u8> {
    events
        .into_iter()
        .flat_map(|event| event.to_record())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_layout() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1_000_000u64.to_le_bytes());
        bytes.extend_from_slice(&(-12i16).to_le_bytes());
        bytes.extend_from_slice(&0x8008u32.to_le_bytes());
        let event = ListEvent::from_record(&bytes).unwrap();
        assert_eq!(event.trigger_time, 1_000_000);
        assert_eq!(event.energy, -12);
        assert!(event.flags.is_fake());
        assert!(event.flags.is_pile_up());
    }

    #[test]
    fn test_round_trip() {
        let events = vec![
            ListEvent::new(0, 0, 0x8),
            ListEvent::new(1000, 500, 0),
            ListEvent::new(2000, 32767, 0x80),
            ListEvent::new(u64::MAX, i16::MIN, 0xFFFF_FFFF),
        ];
        let bytes = encode_records(&events);
        assert_eq!(bytes.len(), events.len() * RECORD_SIZE);
        let decoded: Vec<ListEvent> = decode_records(&bytes).unwrap().collect();
        assert_eq!(decoded, events);
        assert_eq!(encode_records(&decoded), bytes);
    }

    #[test]
    fn test_truncated_buffer() {
        let bytes = encode_records(&[ListEvent::new(5, 10, 0)]);
        assert_eq!(
            decode_records(&bytes[..RECORD_SIZE - 1]).unwrap_err(),
            RecordError::TruncatedRecord {
                len: RECORD_SIZE - 1
            }
        );
        assert!(ListEvent::from_record(&bytes[..3]).is_err());
        assert_eq!(decode_records(&[]).unwrap().count(), 0);
    }

    #[test]
    fn test_iterator_restartable() {
        let events = vec![ListEvent::new(1, 1, 0), ListEvent::new(2, 2, 0)];
        let bytes = encode_records(&events);
        let iter = decode_records(&bytes).unwrap();
        let first: Vec<ListEvent> = iter.clone().collect();
        let second: Vec<ListEvent> = iter.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_markers() {
        assert!(ListEvent::new(0, 0, 0x8).is_frame_marker());
        assert!(!ListEvent::new(0, 0, 0x0).is_frame_marker());
        assert!(!ListEvent::new(0, 3, 0x8).is_frame_marker());
        assert!(ListEvent::new(0, 32767, 0).is_energy_discarded());
    }
}
