use super::stream_cursor::ResetReason;

/// Progress report of a single pass over one channel, sent from the poller to whoever
/// is displaying it.
#[derive(Debug, Clone, Default)]
pub struct PassStatus {
    pub channel: usize,
    pub new_data: bool,
    pub held: bool,
    pub reset: Option<ResetReason>,
    pub events_processed: u64,
    pub frames: u64,
    pub bytes_read: u64,
    pub error: Option<String>,
}

impl PassStatus {
    pub fn new(channel: usize, events_processed: u64, frames: u64) -> Self {
        Self {
            channel,
            events_processed,
            frames,
            ..Default::default()
        }
    }

    pub fn failed(channel: usize, error: String) -> Self {
        Self {
            channel,
            error: Some(error),
            ..Default::default()
        }
    }

    /// True when the published outputs of the channel differ from the previous pass.
    /// A reset clears them even when no whole record was read.
    pub fn changed(&self) -> bool {
        self.new_data || self.reset.is_some()
    }
}
