use std::fs::File;
use std::path::Path;

use super::byte_source::record_chunks;
use super::channel::{Channel, ChannelMode};
use super::constants::{CONVERTER_CHUNK_RECORDS, RECORD_SIZE};
use super::error::{CursorError, ProcessorError};
use super::stream_cursor::{CursorPoll, ResetReason};

/// What a single pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Streaming disabled, or the target is missing or empty
    Idle,
    /// The cursor is already at the end of the file
    NoNewData,
    NewData { records: u64, bytes: u64 },
    /// The channel is showing a replay; live data waits for a reload
    Held,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub outcome: PassOutcome,
    pub reset: Option<ResetReason>,
}

impl PassReport {
    fn new(outcome: PassOutcome, reset: Option<ResetReason>) -> Self {
        Self { outcome, reset }
    }

    /// True when histograms or counters changed during the pass
    pub fn new_data(&self) -> bool {
        matches!(self.outcome, PassOutcome::NewData { .. })
    }
}

/// Run one processing pass over a channel.
///
/// Applies any pending reset, then decodes every whole record appended since the last
/// pass, in bounded chunks, and advances the cursor past them. A pass that finds no new
/// bytes changes nothing. Errors leave the cursor at its last good offset.
pub fn run_pass(channel: &mut Channel) -> Result<PassReport, ProcessorError> {
    if let ChannelMode::Replay(_) = channel.mode {
        return Ok(PassReport::new(PassOutcome::Held, None));
    }

    let reload = std::mem::take(&mut channel.reload_requested);
    let target = channel.config.list_file.clone();
    let poll = match channel.cursor.prepare(target.as_deref(), reload) {
        Ok(poll) => poll,
        Err(e) => {
            // retry the reload next pass
            channel.reload_requested |= reload;
            return Err(e.into());
        }
    };

    let reset = match poll {
        CursorPoll::Closed => {
            if reload {
                channel.state.reset();
                return Ok(PassReport::new(PassOutcome::Idle, Some(ResetReason::Reload)));
            }
            return Ok(PassReport::new(PassOutcome::Idle, None));
        }
        CursorPoll::Ready { reset, .. } => reset,
    };

    if let Some(reason) = reset {
        spdlog::info!(
            "Channel {}: clearing histograms and counters ({reason:?})",
            channel.id()
        );
        channel.state.reset();
    }

    let mut records = 0;
    let mut bytes = 0;
    loop {
        let buffer = channel
            .cursor
            .read_chunk(CONVERTER_CHUNK_RECORDS * RECORD_SIZE)?;
        if buffer.is_empty() {
            break;
        }
        records += channel.state.ingest(&buffer, &channel.config)?;
        channel.cursor.advance(buffer.len() as u64);
        bytes += buffer.len() as u64;
    }

    if bytes == 0 {
        return Ok(PassReport::new(PassOutcome::NoNewData, reset));
    }
    spdlog::debug!(
        "Channel {}: processed {records} records ({})",
        channel.id(),
        human_bytes::human_bytes(bytes as f64)
    );
    Ok(PassReport::new(PassOutcome::NewData { records, bytes }, reset))
}

/// Replay a complete list file into a channel without disturbing the live stream.
///
/// The channel's histograms and counters are replaced by the contents of `path`. The live
/// state and cursor position are set aside, and live passes are held until either
/// `Channel::resume_live`, which picks the live stream up at the saved offset, or
/// `Channel::request_reload`, which rereads the live file from the start.
pub fn replay_file(channel: &mut Channel, path: &Path) -> Result<PassReport, ProcessorError> {
    let saved = channel.cursor.position();
    channel.cursor.close();
    if channel.mode == ChannelMode::Live {
        channel.live_state = Some(Box::new(channel.state.clone()));
    }
    channel.state.reset();
    channel.mode = ChannelMode::Replay(path.to_path_buf());
    spdlog::info!("Channel {}: replaying {}", channel.id(), path.display());

    let result = replay_records(channel, path);

    if let Some(position) = saved {
        if let Err(e) = channel.cursor.restore(position) {
            spdlog::warn!(
                "Channel {}: could not restore live position after replay: {e}",
                channel.id()
            );
        }
    }

    let (records, bytes) = result?;
    spdlog::info!(
        "Channel {}: replayed {records} records ({}) from {}",
        channel.id(),
        human_bytes::human_bytes(bytes as f64),
        path.display()
    );
    let outcome = if bytes > 0 {
        PassOutcome::NewData { records, bytes }
    } else {
        PassOutcome::NoNewData
    };
    Ok(PassReport::new(outcome, Some(ResetReason::Reload)))
}

fn replay_records(channel: &mut Channel, path: &Path) -> Result<(u64, u64), ProcessorError> {
    let io_error = |source| CursorError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_error)?;
    let mut records = 0;
    let mut bytes = 0;
    for chunk in record_chunks(&mut file, CONVERTER_CHUNK_RECORDS).map_err(io_error)? {
        let chunk = chunk.map_err(io_error)?;
        records += channel.state.ingest(&chunk, &channel.config)?;
        bytes += chunk.len() as u64;
    }
    Ok((records, bytes))
}
