//! # mca_listmode
//!
//! mca_listmode reads the list-mode data written by CAEN multichannel analysers, written in
//! Rust. A list file is a flat stream of fixed 14-byte records, one per detected event, which
//! the digitizer keeps appending to while acquiring. mca_listmode tails these files, follows
//! the frame (trigger) markers embedded in the stream, and accumulates per-channel energy,
//! time-of-arrival and time-energy spectra along with a set of run counters.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, see the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installing the tool chain.
//!
//! To build and install the CLI use `cargo install --path ./mca_listmode_cli` from the top
//! level repository. To use the CLI see the `mca_listmode_cli` README.
//!
//! ## Record Format
//!
//! Every record is little-endian with no padding:
//!
//! ```text
//! offset  size  field
//! 0       8     trigger_time   picoseconds
//! 8       2     energy         raw ADC code (signed); 0 with flag 0x8 is a frame marker,
//!                              32767 is saturated
//! 10      4     flags          bitfield, see EventFlags
//! ```
//!
//! ## Configuration
//!
//! Configurations are YAML files. Every channel has its own entry; a channel whose
//! `list_file` is `null` is not streamed. All times are in nanoseconds since the start of
//! the frame. A window with `t_min >= t_max` is disabled and lets everything through.
//!
//! ```yml
//! poll_interval_ms: 1000
//! channels:
//! - list_file: /data/run_19_ch000.dat
//!   event_energy:
//!     axis:
//!       min: 0.0
//!       max: 16384.0
//!       n_bins: 16384
//!     gate:
//!       t_min: 0.0
//!       t_max: 0.0
//!   time_of_arrival:
//!     min: 0.0
//!     max: 20000000.0
//!     n_bins: 1000
//!   time_energy:
//!     time_axis:
//!       min: 0.0
//!       max: 20000000.0
//!       n_bins: 100
//!     energy_bin_group: 64
//!     max_energy_codes: 16384
//!     transpose: false
//!   rate_window:
//!     t_min: 0.0
//!     t_max: 0.0
//!   forced_trigger_gap_ns: null
//!   energy_calibration:
//!     slope: 1.0
//!     offset: 0.0
//! ```
//!
//! An axis with a non-positive bin count or an inverted range disables that histogram:
//! a warning is logged and every event lands in its "not binned" counter.
pub mod byte_source;
pub mod channel;
pub mod config;
pub mod constants;
pub mod converter;
pub mod counters;
pub mod error;
pub mod event;
pub mod flags;
pub mod frame_tracker;
pub mod histogram;
pub mod pass_status;
pub mod poller;
pub mod run_controller;
pub mod stream_cursor;
