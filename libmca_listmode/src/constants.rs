// List-mode record layout
pub const RECORD_SIZE: usize = 14; // trigger time (8) + energy (2) + flags (4), no padding
pub const TRIGGER_TIME_OFFSET: usize = 0;
pub const ENERGY_OFFSET: usize = 8;
pub const FLAGS_OFFSET: usize = 10;

// Energy sentinels
pub const FRAME_MARKER_ENERGY: i16 = 0;
pub const SATURATED_ENERGY: i16 = 32767;
pub const DEFAULT_ENERGY_CODES: usize = 16384;

// Largest number of bins a single histogram allocates, 2-D spectra included
pub const MAX_HISTOGRAM_BINS: usize = 1 << 24;

// Time conversions, the stream is in picoseconds
pub const PS_PER_NS: f64 = 1.0e3;
pub const PS_PER_S: f64 = 1.0e12;

// Records decoded per read, bounds the memory of a single pass
pub const CONVERTER_CHUNK_RECORDS: usize = 100_000;

// Channels on a typical digitizer
pub const DEFAULT_NUMBER_OF_CHANNELS: usize = 2;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
