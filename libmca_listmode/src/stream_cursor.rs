use std::fs::{File, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::byte_source::ByteSource;
use super::constants::RECORD_SIZE;
use super::error::CursorError;

/// Which file (and which incarnation of it) is being tailed, and how far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPosition {
    pub file_identity: PathBuf,
    pub byte_offset: u64,
}

/// Why the accumulated state of a channel must be thrown away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// First open of the target (or reopen after it went away)
    Opened,
    /// The operator pointed the channel at a different file
    IdentityChanged,
    /// The file at the target path is no longer the file we hold open
    Replaced,
    /// The end-of-file moved below the cursor
    Truncated,
    /// Explicit reload request
    Reload,
}

/// Result of preparing the cursor for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPoll {
    /// No target, target missing or empty; nothing to read
    Closed,
    /// Open; `available` bytes lie between the cursor and the end-of-file
    Ready {
        reset: Option<ResetReason>,
        available: u64,
    },
}

#[derive(Debug)]
struct OpenStream {
    path: PathBuf,
    file: File,
    byte_offset: u64,
    end_of_file: u64,
}

fn io_error(path: &Path, source: std::io::Error) -> CursorError {
    CursorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(target_family = "unix")]
fn is_same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(target_family = "unix"))]
fn is_same_file(_a: &Metadata, _b: &Metadata) -> bool {
    true
}

/// StreamCursor owns the open list file of a channel and the byte offset reached in it.
///
/// The offset is always a whole number of records, never passes the last observed
/// end-of-file, and only moves backward through a reset. Every IO failure leaves the
/// cursor either closed or at its last good offset, so the next pass can simply retry.
#[derive(Debug, Default)]
pub struct StreamCursor {
    stream: Option<OpenStream>,
}

impl StreamCursor {
    pub fn new() -> Self {
        Self { stream: None }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn position(&self) -> Option<StreamPosition> {
        self.stream.as_ref().map(|stream| StreamPosition {
            file_identity: stream.path.clone(),
            byte_offset: stream.byte_offset,
        })
    }

    pub fn byte_offset(&self) -> Option<u64> {
        self.stream.as_ref().map(|stream| stream.byte_offset)
    }

    /// Release the file handle
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            spdlog::debug!("Closing list file {}", stream.path.display());
        }
    }

    /// Decide between resume and reset for this pass and refresh the end-of-file.
    pub fn prepare(
        &mut self,
        target: Option<&Path>,
        reload: bool,
    ) -> Result<CursorPoll, CursorError> {
        let Some(target) = target else {
            self.close();
            return Ok(CursorPoll::Closed);
        };

        let mut reason = ResetReason::Opened;
        if let Some(stream) = &self.stream {
            if stream.path != target {
                spdlog::info!(
                    "List file changed from {} to {}",
                    stream.path.display(),
                    target.display()
                );
                reason = ResetReason::IdentityChanged;
                self.close();
            } else if reload {
                spdlog::info!("Reloading list file {}", target.display());
                reason = ResetReason::Reload;
                self.close();
            }
        }

        if self.stream.is_none() {
            return self.open(target, reason);
        }
        self.refresh(target)
    }

    fn open(&mut self, target: &Path, reason: ResetReason) -> Result<CursorPoll, CursorError> {
        let file = match File::open(target) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CursorPoll::Closed),
            Err(e) => return Err(io_error(target, e)),
        };
        let end_of_file = file.metadata().map_err(|e| io_error(target, e))?.len();
        if end_of_file == 0 {
            return Ok(CursorPoll::Closed);
        }
        spdlog::info!(
            "Opened list file {} with {}",
            target.display(),
            human_bytes::human_bytes(end_of_file as f64)
        );
        self.stream = Some(OpenStream {
            path: target.to_path_buf(),
            file,
            byte_offset: 0,
            end_of_file,
        });
        Ok(CursorPoll::Ready {
            reset: Some(reason),
            available: end_of_file,
        })
    }

    fn refresh(&mut self, target: &Path) -> Result<CursorPoll, CursorError> {
        let path_meta = match std::fs::metadata(target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                spdlog::warn!("List file {} disappeared", target.display());
                self.close();
                return Ok(CursorPoll::Closed);
            }
            Err(e) => return Err(io_error(target, e)),
        };

        let Some(stream) = self.stream.as_mut() else {
            return Err(CursorError::NotOpen);
        };
        let handle_meta = stream.file.metadata().map_err(|e| io_error(target, e))?;
        if !is_same_file(&path_meta, &handle_meta) {
            spdlog::info!("List file {} was replaced", target.display());
            self.close();
            return self.open(target, ResetReason::Replaced);
        }

        let end_of_file = handle_meta.len();
        if end_of_file == 0 {
            spdlog::info!("List file {} is empty", target.display());
            self.close();
            return Ok(CursorPoll::Closed);
        }

        if end_of_file < stream.byte_offset {
            spdlog::info!(
                "List file {} was truncated to {} below the cursor at {}",
                target.display(),
                end_of_file,
                stream.byte_offset
            );
            stream.byte_offset = 0;
            stream.end_of_file = end_of_file;
            return Ok(CursorPoll::Ready {
                reset: Some(ResetReason::Truncated),
                available: end_of_file,
            });
        }

        stream.end_of_file = end_of_file;
        Ok(CursorPoll::Ready {
            reset: None,
            available: end_of_file - stream.byte_offset,
        })
    }

    /// Read at most `max_bytes` worth of whole records past the cursor.
    ///
    /// Trailing partial records are left for a later pass. A short read from the
    /// source returns an empty buffer. The cursor does not move until `advance`.
    pub fn read_chunk(&mut self, max_bytes: usize) -> Result<Vec<u8>, CursorError> {
        let stream = self.stream.as_mut().ok_or(CursorError::NotOpen)?;
        let record_size = RECORD_SIZE as u64;
        let pending = stream.end_of_file.saturating_sub(stream.byte_offset);
        let whole = pending / record_size * record_size;
        let limit = (max_bytes / RECORD_SIZE * RECORD_SIZE) as u64;
        let len = whole.min(limit) as usize;
        if len == 0 {
            return Ok(Vec::new());
        }

        let buffer = stream
            .file
            .read_at(stream.byte_offset, len)
            .map_err(|e| io_error(&stream.path, e))?;
        if buffer.len() < len {
            spdlog::debug!(
                "Short read of {} bytes (wanted {}) from {}",
                buffer.len(),
                len,
                stream.path.display()
            );
            return Ok(Vec::new());
        }
        Ok(buffer)
    }

    /// Move the cursor past bytes that were fully decoded
    pub fn advance(&mut self, n_bytes: u64) {
        if let Some(stream) = self.stream.as_mut() {
            debug_assert_eq!(n_bytes % RECORD_SIZE as u64, 0);
            debug_assert!(stream.byte_offset + n_bytes <= stream.end_of_file);
            stream.byte_offset += n_bytes;
        }
    }

    /// Reopen a previously saved position without resetting.
    ///
    /// If the file shrank in the meantime the next `prepare` reports the truncation.
    pub fn restore(&mut self, position: StreamPosition) -> Result<(), CursorError> {
        self.close();
        let file = File::open(&position.file_identity)
            .map_err(|e| io_error(&position.file_identity, e))?;
        spdlog::debug!(
            "Restored list file {} at offset {}",
            position.file_identity.display(),
            position.byte_offset
        );
        self.stream = Some(OpenStream {
            path: position.file_identity,
            file,
            byte_offset: position.byte_offset,
            end_of_file: position.byte_offset,
        });
        Ok(())
    }
}
