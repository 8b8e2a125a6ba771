use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::byte_source::{record_chunks, ByteSource};
use super::channel::{ChannelSnapshot, ChannelState, EventClass};
use super::config::ChannelConfig;
use super::constants::{CONVERTER_CHUNK_RECORDS, PS_PER_NS, PS_PER_S};
use super::error::ConverterError;
use super::event::{decode_records, ListEvent};
use super::frame_tracker::{FrameBoundary, FrameTracker, Observation};

/// Events grouped by frame, laid out as a NeXus event table.
///
/// The frame columns (`frame_number`, `event_index`, `event_time_zero`) have one entry per
/// frame; `event_index` is the row of the frame's first event in the event columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTable {
    pub frame_number: Vec<i64>,
    pub event_index: Vec<u64>,
    /// Frame start in seconds since the first record of the file
    pub event_time_zero: Vec<f64>,
    /// ns since the start of the event's frame
    pub event_time_offset: Vec<f64>,
    pub event_energy_raw: Vec<i16>,
    pub event_energy: Vec<f64>,
    pub event_flags: Vec<u32>,
}

impl EventTable {
    pub fn n_frames(&self) -> usize {
        self.frame_number.len()
    }

    pub fn n_events(&self) -> usize {
        self.event_time_offset.len()
    }

    fn push_frame(&mut self, boundary: &FrameBoundary, time_zero: u64) {
        self.frame_number.push(boundary.frame_index);
        self.event_index.push(self.n_events() as u64);
        self.event_time_zero
            .push(boundary.frame_start_time.saturating_sub(time_zero) as f64 / PS_PER_S);
    }

    fn push_event(&mut self, event: &ListEvent, time_since_frame: u64, config: &ChannelConfig) {
        self.event_time_offset
            .push(time_since_frame as f64 / PS_PER_NS);
        self.event_energy_raw.push(event.energy);
        self.event_energy
            .push(config.energy_calibration.apply(event.energy));
        self.event_flags.push(event.flags.bits());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub raw_records: u64,
    pub bytes: u64,
    pub frames: u64,
    pub real_events: u64,
    pub other_events: u64,
}

/// Everything produced from one list file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedRun {
    pub summary: ConversionSummary,
    pub events: EventTable,
    pub spectra: ChannelSnapshot,
}

impl ConvertedRun {
    pub fn write_yaml(&self, path: &Path) -> Result<(), ConverterError> {
        let file = File::create(path)?;
        serde_yaml::to_writer(file, self)?;
        Ok(())
    }
}

/// Run a complete source through the decode pipeline in batch.
pub fn convert_source<S: ByteSource>(
    source: &mut S,
    config: &ChannelConfig,
) -> Result<ConvertedRun, ConverterError> {
    let mut state = ChannelState::new(config);
    let mut table = EventTable::default();
    let mut summary = ConversionSummary::default();
    let mut first_trigger = None;

    for chunk in record_chunks(source, CONVERTER_CHUNK_RECORDS)? {
        let chunk = chunk?;
        summary.bytes += chunk.len() as u64;
        for event in decode_records(&chunk)? {
            summary.raw_records += 1;
            let time_zero = *first_trigger.get_or_insert(event.trigger_time);
            let class = state.accumulate(&event, config);
            if let Some(forced) = class.forced_frame() {
                table.push_frame(forced, time_zero);
            }
            match class {
                EventClass::FrameMarker(boundary) => table.push_frame(&boundary, time_zero),
                EventClass::Real {
                    time_since_frame, ..
                } => {
                    summary.real_events += 1;
                    table.push_event(&event, time_since_frame, config);
                }
                EventClass::Other { .. } => summary.other_events += 1,
            }
        }
    }

    summary.frames = state.counters().frames;
    spdlog::info!(
        "Converted {} records ({}): {} frames, {} real events, {} other events",
        summary.raw_records,
        human_bytes::human_bytes(summary.bytes as f64),
        summary.frames,
        summary.real_events,
        summary.other_events
    );
    Ok(ConvertedRun {
        summary,
        events: table,
        spectra: state.snapshot(config),
    })
}

pub fn convert_file(path: &Path, config: &ChannelConfig) -> Result<ConvertedRun, ConverterError> {
    if !path.exists() {
        return Err(ConverterError::BadFilePath(path.to_path_buf()));
    }
    spdlog::info!("Converting list file {}", path.display());
    let mut file = File::open(path)?;
    convert_source(&mut file, config)
}

/// Print every record as `<frame>: <trigger_time> <time_since_frame> <energy> (<flags>)`.
///
/// Records before the first frame marker show `-` for the time since frame. Returns the
/// number of records written.
pub fn dump_records<S: ByteSource, W: Write>(
    source: &mut S,
    out: &mut W,
) -> Result<u64, ConverterError> {
    let mut tracker = FrameTracker::new(None);
    let mut n_records = 0;
    for chunk in record_chunks(source, CONVERTER_CHUNK_RECORDS)? {
        let chunk = chunk?;
        for event in decode_records(&chunk)? {
            let time_since_frame = match tracker.observe(&event) {
                Observation::Marker(_) => Some(0),
                Observation::Event {
                    time_since_frame, ..
                } => time_since_frame,
            };
            let time_since_frame = match time_since_frame {
                Some(dt) => dt.to_string(),
                None => String::from("-"),
            };
            writeln!(
                out,
                "{}: {} {} {} ({})",
                tracker.frame_index(),
                event.trigger_time,
                time_since_frame,
                event.energy,
                event.flags.describe()
            )?;
            n_records += 1;
        }
    }
    Ok(n_records)
}
