use serde::{Deserialize, Serialize};

use super::constants::PS_PER_S;
use super::flags::FlagCounts;

/// Per-run statistics of one channel.
///
/// Counters only ever increase during a run; they are zeroed when the stream resets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCounters {
    pub events_processed: u64,
    pub flags: FlagCounts,
    pub frames: u64,
    pub forced_frames: u64,
    pub events_before_first_frame: u64,
    pub energy_discarded: u64,
    pub energy_gated_out: u64,
    pub event_energy_entries: u64,
    pub event_energy_not_binned: u64,
    pub time_of_arrival_entries: u64,
    pub time_of_arrival_not_binned: u64,
    pub time_energy_entries: u64,
    pub time_energy_not_binned: u64,
    pub rate_window_events: u64,
    pub trigger_rate_hz: f64,
    pub max_event_time_ns: f64,
    pub first_trigger_time: Option<u64>,
    pub last_trigger_time: Option<u64>,
}

impl RunCounters {
    pub fn observe_trigger_time(&mut self, trigger_time: u64) {
        if self.first_trigger_time.is_none() {
            self.first_trigger_time = Some(trigger_time);
        }
        self.last_trigger_time = Some(trigger_time);
    }

    /// Trigger rate from the interval between the last two frames (ps)
    pub fn observe_frame_interval(&mut self, interval: u64) {
        if interval > 0 {
            self.trigger_rate_hz = PS_PER_S / interval as f64;
        }
    }

    pub fn observe_event_time(&mut self, time_since_frame_ns: f64) {
        if time_since_frame_ns > self.max_event_time_ns {
            self.max_event_time_ns = time_since_frame_ns;
        }
    }

    /// Acquisition time covered by the decoded records, in seconds
    pub fn elapsed_seconds(&self) -> f64 {
        match (self.first_trigger_time, self.last_trigger_time) {
            (Some(first), Some(last)) if last > first => (last - first) as f64 / PS_PER_S,
            _ => 0.0,
        }
    }

    /// Events inside the rate window per second of acquisition
    pub fn event_rate_hz(&self) -> f64 {
        let elapsed = self.elapsed_seconds();
        if elapsed > 0.0 {
            self.rate_window_events as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Sum of every histogram's "not binned" tally
    pub fn not_binned_total(&self) -> u64 {
        self.event_energy_not_binned + self.time_of_arrival_not_binned + self.time_energy_not_binned
    }
}
