use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};

use super::constants::RECORD_SIZE;

/// A readable, seekable source of list-mode bytes.
///
/// `read_at` may return fewer bytes than requested (for example when the producer is
/// still writing); callers treat a short read as "no new data".
pub trait ByteSource {
    fn size(&mut self) -> std::io::Result<u64>;
    fn read_at(&mut self, offset: u64, len: usize) -> std::io::Result<Vec<u8>>;
}

impl ByteSource for File {
    fn size(&mut self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn read_at(&mut self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::with_capacity(len);
        self.by_ref().take(len as u64).read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {
    fn size(&mut self) -> std::io::Result<u64> {
        Ok(self.get_ref().as_ref().len() as u64)
    }

    fn read_at(&mut self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let data = self.get_ref().as_ref();
        let start = (offset as usize).min(data.len());
        let stop = start.saturating_add(len).min(data.len());
        let buffer = data[start..stop].to_vec();
        self.set_position(stop as u64);
        Ok(buffer)
    }
}

/// Iterator over a complete source in buffers of whole records, front to back.
///
/// A trailing partial record is never returned. If the source comes up short the
/// whole records that did arrive are returned and iteration stops.
#[derive(Debug)]
pub struct RecordChunks<'a, S: ByteSource> {
    source: &'a mut S,
    offset: u64,
    end: u64,
    chunk_bytes: u64,
}

impl<S: ByteSource> Iterator for RecordChunks<'_, S> {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }
        let len = (self.end - self.offset).min(self.chunk_bytes) as usize;
        let mut buffer = match self.source.read_at(self.offset, len) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.offset = self.end;
                return Some(Err(e));
            }
        };
        if buffer.len() < len {
            spdlog::warn!(
                "Source ended early at byte {} (expected {})",
                self.offset + buffer.len() as u64,
                self.end
            );
            buffer.truncate(buffer.len() / RECORD_SIZE * RECORD_SIZE);
            self.end = self.offset;
        }
        self.offset += buffer.len() as u64;
        if buffer.is_empty() {
            None
        } else {
            Some(Ok(buffer))
        }
    }
}

/// Read every whole record of a source, at most `max_records` per buffer
pub fn record_chunks<S: ByteSource>(
    source: &mut S,
    max_records: usize,
) -> std::io::Result<RecordChunks<'_, S>> {
    let size = source.size()?;
    let record_size = RECORD_SIZE as u64;
    if size % record_size != 0 {
        spdlog::warn!(
            "Source size {size} is not a multiple of {RECORD_SIZE}; the trailing {} bytes are ignored",
            size % record_size
        );
    }
    Ok(RecordChunks {
        source,
        offset: 0,
        end: size / record_size * record_size,
        chunk_bytes: (max_records.max(1) * RECORD_SIZE) as u64,
    })
}
