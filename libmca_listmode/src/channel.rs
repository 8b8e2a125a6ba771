use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::config::ChannelConfig;
use super::constants::PS_PER_NS;
use super::counters::RunCounters;
use super::error::RecordError;
use super::event::{decode_records, ListEvent};
use super::frame_tracker::{FrameBoundary, FrameTracker, Observation};
use super::histogram::{Bin, DeviceSpectrum, Histogram1D, TimeEnergySpectrum};
use super::stream_cursor::{StreamCursor, StreamPosition};

/// How the pipeline classified a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// A frame marker from the stream
    FrameMarker(FrameBoundary),
    /// A detector event: positive, unsaturated energy, not fake, inside a frame
    Real {
        time_since_frame: u64,
        forced: Option<FrameBoundary>,
    },
    /// Everything else (fake, saturated, non-positive energy, or before the first frame)
    Other { forced: Option<FrameBoundary> },
}

impl EventClass {
    /// Frame synthesized by the forced trigger at this event
    pub fn forced_frame(&self) -> Option<&FrameBoundary> {
        match self {
            Self::FrameMarker(_) => None,
            Self::Real { forced, .. } | Self::Other { forced } => forced.as_ref(),
        }
    }
}

/// The four histograms of a channel
#[derive(Debug, Clone, PartialEq)]
pub struct Histograms {
    pub event_energy: Histogram1D,
    pub time_of_arrival: Histogram1D,
    pub time_energy: TimeEnergySpectrum,
    pub device_energy: DeviceSpectrum,
}

impl Histograms {
    fn new(config: &ChannelConfig) -> Self {
        Self {
            event_energy: Histogram1D::new(config.event_energy.axis),
            time_of_arrival: Histogram1D::new(config.time_of_arrival),
            time_energy: TimeEnergySpectrum::new(
                config.time_energy.time_axis,
                config.time_energy.energy_bin_group,
                config.time_energy.max_energy_codes,
            ),
            device_energy: DeviceSpectrum::default(),
        }
    }

    fn clear(&mut self) {
        self.event_energy.clear();
        self.time_of_arrival.clear();
        self.time_energy.clear();
        self.device_energy.clear();
    }

    fn warn_invalid(&self) {
        if let Err(e) = self.event_energy.axis().validate() {
            spdlog::warn!("Event energy spectrum: {e}");
        }
        if let Err(e) = self.time_of_arrival.axis().validate() {
            spdlog::warn!("Time of arrival spectrum: {e}");
        }
        if let Err(e) = self.time_energy.validate() {
            spdlog::warn!("Time-energy spectrum: {e}");
        }
    }

    /// Apply a new configuration. Rebuilt histograms start from zero.
    fn reconfigure(&mut self, config: &ChannelConfig) {
        let mut rebuilt = self.event_energy.reconfigure(config.event_energy.axis);
        rebuilt |= self.time_of_arrival.reconfigure(config.time_of_arrival);
        rebuilt |= self.time_energy.reconfigure(
            config.time_energy.time_axis,
            config.time_energy.energy_bin_group,
            config.time_energy.max_energy_codes,
        );
        if rebuilt {
            self.warn_invalid();
        }
    }
}

/// Everything accumulated from the stream of one channel during one run
#[derive(Debug, Clone)]
pub struct ChannelState {
    frames: FrameTracker,
    histograms: Histograms,
    counters: RunCounters,
}

impl ChannelState {
    pub fn new(config: &ChannelConfig) -> Self {
        let histograms = Histograms::new(config);
        histograms.warn_invalid();
        Self {
            frames: FrameTracker::new(config.forced_trigger_gap_ps()),
            histograms,
            counters: RunCounters::default(),
        }
    }

    pub fn histograms(&self) -> &Histograms {
        &self.histograms
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    pub fn frame_tracker(&self) -> &FrameTracker {
        &self.frames
    }

    /// Zero histograms and counters and forget the frame state
    pub fn reset(&mut self) {
        self.frames.reset();
        self.histograms.clear();
        self.counters = RunCounters::default();
    }

    pub fn apply_config(&mut self, config: &ChannelConfig) {
        self.frames.set_forced_gap(config.forced_trigger_gap_ps());
        self.histograms.reconfigure(config);
    }

    pub fn refresh_device_spectrum(&mut self, counts: &[u32]) {
        self.histograms.device_energy.refresh(counts);
    }

    /// Decode a buffer of whole records and accumulate every event.
    /// Returns the number of records processed.
    pub fn ingest(&mut self, buffer: &[u8], config: &ChannelConfig) -> Result<u64, RecordError> {
        let mut n_records = 0;
        for event in decode_records(buffer)? {
            self.accumulate(&event, config);
            n_records += 1;
        }
        Ok(n_records)
    }

    /// Run one event through frame tracking, flag counting and binning.
    pub fn accumulate(&mut self, event: &ListEvent, config: &ChannelConfig) -> EventClass {
        let counters = &mut self.counters;
        counters.events_processed += 1;
        counters.flags.record(event.flags);
        counters.observe_trigger_time(event.trigger_time);

        let (time_since_frame, forced) = match self.frames.observe(event) {
            Observation::Marker(boundary) => {
                counters.frames += 1;
                if let Some(interval) = boundary.interval {
                    counters.observe_frame_interval(interval);
                }
                return EventClass::FrameMarker(boundary);
            }
            Observation::Event {
                time_since_frame,
                forced,
            } => (time_since_frame, forced),
        };

        if let Some(forced) = &forced {
            counters.frames += 1;
            counters.forced_frames += 1;
            if let Some(interval) = forced.interval {
                counters.observe_frame_interval(interval);
            }
        }

        if event.flags.is_fake() {
            return EventClass::Other { forced };
        }
        if event.is_energy_discarded() {
            counters.energy_discarded += 1;
            return EventClass::Other { forced };
        }

        let histograms = &mut self.histograms;
        let Some(time_since_frame) = time_since_frame else {
            counters.events_before_first_frame += 1;
            // not time-relative unless a gate is set
            if !config.event_energy.gate.is_enabled() {
                match histograms.event_energy.fill(event.energy as f64) {
                    Bin::Index(_) => counters.event_energy_entries += 1,
                    Bin::NotBinned => counters.event_energy_not_binned += 1,
                }
            }
            return EventClass::Other { forced };
        };

        let time_ns = time_since_frame as f64 / PS_PER_NS;
        counters.observe_event_time(time_ns);
        if config.rate_window.contains(time_ns) {
            counters.rate_window_events += 1;
        }

        if config.event_energy.gate.contains(time_ns) {
            match histograms.event_energy.fill(event.energy as f64) {
                Bin::Index(_) => counters.event_energy_entries += 1,
                Bin::NotBinned => counters.event_energy_not_binned += 1,
            }
        } else {
            counters.energy_gated_out += 1;
        }

        match histograms.time_of_arrival.fill(time_ns) {
            Bin::Index(_) => counters.time_of_arrival_entries += 1,
            Bin::NotBinned => counters.time_of_arrival_not_binned += 1,
        }

        match histograms.time_energy.fill(time_ns, event.energy) {
            Bin::Index(_) => counters.time_energy_entries += 1,
            Bin::NotBinned => counters.time_energy_not_binned += 1,
        }

        if event.energy > 0 {
            EventClass::Real {
                time_since_frame,
                forced,
            }
        } else {
            EventClass::Other { forced }
        }
    }

    /// Flat arrays and counters as published after each pass
    pub fn snapshot(&self, config: &ChannelConfig) -> ChannelSnapshot {
        let histograms = &self.histograms;
        ChannelSnapshot {
            event_energy_x: histograms.event_energy.axis().values(),
            event_energy: histograms.event_energy.counts().to_vec(),
            time_of_arrival_x: histograms.time_of_arrival.axis().values(),
            time_of_arrival: histograms.time_of_arrival.counts().to_vec(),
            time_energy_time: histograms.time_energy.time_values(),
            time_energy_energy: histograms.time_energy.energy_values(),
            time_energy_transposed: config.time_energy.transpose,
            time_energy: histograms
                .time_energy
                .flattened(config.time_energy.transpose),
            device_energy: histograms.device_energy.counts().to_vec(),
            event_rate_hz: self.counters.event_rate_hz(),
            not_binned_total: self.counters.not_binned_total(),
            counters: self.counters.clone(),
        }
    }
}

/// The published outputs of a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub event_energy_x: Vec<f64>,
    pub event_energy: Vec<u64>,
    pub time_of_arrival_x: Vec<f64>,
    pub time_of_arrival: Vec<u64>,
    pub time_energy_time: Vec<f64>,
    pub time_energy_energy: Vec<f64>,
    pub time_energy_transposed: bool,
    pub time_energy: Vec<u64>,
    pub device_energy: Vec<u32>,
    pub event_rate_hz: f64,
    pub not_binned_total: u64,
    pub counters: RunCounters,
}

/// Live or replaying
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMode {
    Live,
    /// Showing the contents of a replayed file; live passes are held until the channel
    /// resumes or reloads
    Replay(PathBuf),
}

/// One physical digitizer channel: its configuration, stream cursor and accumulated state.
#[derive(Debug)]
pub struct Channel {
    id: usize,
    pub(crate) config: ChannelConfig,
    pub(crate) cursor: StreamCursor,
    pub(crate) state: ChannelState,
    pub(crate) reload_requested: bool,
    pub(crate) mode: ChannelMode,
    /// Live histograms and counters set aside while a replay is shown
    pub(crate) live_state: Option<Box<ChannelState>>,
}

impl Channel {
    pub fn new(id: usize, config: ChannelConfig) -> Self {
        let state = ChannelState::new(&config);
        Self {
            id,
            config,
            cursor: StreamCursor::new(),
            state,
            reload_requested: false,
            mode: ChannelMode::Live,
            live_state: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn target(&self) -> Option<&Path> {
        self.config.list_file.as_deref()
    }

    /// Replace the configuration. A new list file takes effect on the next pass.
    pub fn set_config(&mut self, config: ChannelConfig) {
        self.state.apply_config(&config);
        self.config = config;
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn mode(&self) -> &ChannelMode {
        &self.mode
    }

    pub fn position(&self) -> Option<StreamPosition> {
        self.cursor.position()
    }

    /// Request a reset and re-read of the live file on the next pass.
    /// Also ends a replay, discarding the live state it set aside.
    pub fn request_reload(&mut self) {
        self.reload_requested = true;
        self.mode = ChannelMode::Live;
        self.live_state = None;
    }

    /// End a replay and go back to the live stream where it was left. The live histograms
    /// and counters come back and the next pass reads only what was appended since.
    /// Returns false when the channel was not replaying.
    pub fn resume_live(&mut self) -> bool {
        if self.mode == ChannelMode::Live {
            return false;
        }
        self.mode = ChannelMode::Live;
        match self.live_state.take() {
            Some(state) => {
                self.state = *state;
                self.state.apply_config(&self.config);
            }
            None => self.state.reset(),
        }
        true
    }

    pub fn refresh_device_spectrum(&mut self, counts: &[u32]) {
        self.state.refresh_device_spectrum(counts);
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        self.state.snapshot(&self.config)
    }
}
