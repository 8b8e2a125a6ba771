use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use libmca_listmode::channel::Channel;
use libmca_listmode::config::{ChannelConfig, Config};
use libmca_listmode::event::{encode_records, ListEvent};
use libmca_listmode::histogram::Axis;
use libmca_listmode::poller::Poller;
use libmca_listmode::run_controller::{replay_file, run_pass, PassOutcome};
use libmca_listmode::stream_cursor::ResetReason;

fn append(path: &Path, events: &[ListEvent]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(&encode_records(events)).unwrap();
}

/// 1 ns time bins so that a time since frame of 1000 ps lands in bin 1
fn fine_config(path: &Path) -> ChannelConfig {
    let mut config = ChannelConfig::default().with_list_file(path);
    config.event_energy.axis = Axis::new(0.0, 1024.0, 1024);
    config.time_of_arrival = Axis::new(0.0, 100.0, 100);
    config.time_energy.time_axis = Axis::new(0.0, 100.0, 100);
    config
}

fn scenario() -> [ListEvent; 3] {
    [
        ListEvent::new(0, 0, 0x8),
        ListEvent::new(1000, 500, 0),
        ListEvent::new(2000, 32767, 0),
    ]
}

#[test]
fn three_record_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run_ch000.dat");
    append(&path, &scenario());

    let mut channel = Channel::new(0, fine_config(&path));
    let report = run_pass(&mut channel).unwrap();
    assert!(report.new_data());

    let snapshot = channel.snapshot();
    let counters = &snapshot.counters;
    assert_eq!(counters.frames, 1);
    assert_eq!(counters.events_processed, 3);
    assert_eq!(counters.energy_discarded, 1);
    assert_eq!(snapshot.event_energy.iter().sum::<u64>(), 1);
    assert_eq!(snapshot.event_energy[500], 1);
    assert_eq!(snapshot.time_of_arrival.iter().sum::<u64>(), 1);
    assert_eq!(snapshot.time_of_arrival[1], 1);
    assert_eq!(snapshot.time_of_arrival_x[1], 1.0);
    assert_eq!(snapshot.time_energy.iter().sum::<u64>(), 1);
}

#[test]
fn polling_without_growth_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run_ch000.dat");
    append(&path, &scenario());
    // a partial record waiting for the rest of its bytes
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();

    let mut channel = Channel::new(0, fine_config(&path));
    run_pass(&mut channel).unwrap();
    let snapshot = channel.snapshot();
    let position = channel.position();

    for _ in 0..3 {
        let report = run_pass(&mut channel).unwrap();
        assert_eq!(report.outcome, PassOutcome::NoNewData);
        assert!(!report.new_data());
        assert_eq!(channel.snapshot(), snapshot);
        assert_eq!(channel.position(), position);
    }
}

#[test]
fn truncation_resets_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run_ch000.dat");
    append(&path, &scenario());
    append(&path, &[ListEvent::new(3000, 10, 0x8000)]);

    let mut channel = Channel::new(0, fine_config(&path));
    run_pass(&mut channel).unwrap();
    assert_eq!(channel.state().counters().events_processed, 4);

    // recreated by the producer with a single event and no frame yet
    std::fs::write(&path, encode_records(&[ListEvent::new(50, 20, 0)])).unwrap();
    let report = run_pass(&mut channel).unwrap();
    assert_eq!(report.reset, Some(ResetReason::Truncated));

    let counters = channel.state().counters();
    assert_eq!(counters.events_processed, 1);
    assert_eq!(counters.frames, 0);
    assert_eq!(counters.flags.pile_up, 0);
    assert_eq!(counters.events_before_first_frame, 1);
    assert_eq!(channel.snapshot().time_of_arrival.iter().sum::<u64>(), 0);
    assert_eq!(channel.position().unwrap().byte_offset, 14);
}

#[test]
fn retargeting_resets_and_reads_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("run_ch000.dat");
    let second = dir.path().join("run_ch001.dat");
    append(&first, &scenario());
    append(&second, &[ListEvent::new(0, 0, 0x8)]);

    let mut channel = Channel::new(0, fine_config(&first));
    run_pass(&mut channel).unwrap();
    channel.set_config(fine_config(&second));
    let report = run_pass(&mut channel).unwrap();
    assert_eq!(report.reset, Some(ResetReason::IdentityChanged));
    assert_eq!(channel.state().counters().events_processed, 1);
    assert_eq!(channel.state().counters().frames, 1);
}

#[test]
fn replay_keeps_live_offset() {
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("live.dat");
    let offline = dir.path().join("offline.dat");
    append(&live, &scenario());
    append(&offline, &[ListEvent::new(0, 0, 0x8), ListEvent::new(100, 7, 0)]);

    let mut channel = Channel::new(0, fine_config(&live));
    run_pass(&mut channel).unwrap();
    let offset = channel.position().unwrap().byte_offset;

    replay_file(&mut channel, &offline).unwrap();
    assert_eq!(channel.position().unwrap().byte_offset, offset);
    assert_eq!(channel.snapshot().event_energy[7], 1);
    assert_eq!(channel.snapshot().event_energy[500], 0);
}

#[test]
fn stream_without_frames_stays_out_of_time_histograms() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run_ch000.dat");
    let events: Vec<ListEvent> = (0..20)
        .map(|i| ListEvent::new(i * 1000, 100 + i as i16, 0))
        .collect();
    append(&path, &events);

    let mut channel = Channel::new(0, fine_config(&path));
    run_pass(&mut channel).unwrap();
    let snapshot = channel.snapshot();
    assert_eq!(snapshot.counters.events_before_first_frame, 20);
    assert_eq!(snapshot.time_of_arrival.iter().sum::<u64>(), 0);
    assert_eq!(snapshot.time_energy.iter().sum::<u64>(), 0);
    assert_eq!(snapshot.counters.time_of_arrival_not_binned, 0);
}

#[test]
fn invalid_binning_counts_not_binned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run_ch000.dat");
    append(&path, &scenario());

    let mut config = fine_config(&path);
    config.time_of_arrival = Axis::new(100.0, 0.0, 100);
    config.time_energy.time_axis = Axis::new(0.0, 100.0, -1);
    let mut channel = Channel::new(0, config);
    run_pass(&mut channel).unwrap();

    let snapshot = channel.snapshot();
    assert!(snapshot.time_of_arrival.is_empty());
    assert!(snapshot.time_energy.is_empty());
    assert_eq!(snapshot.counters.time_of_arrival_not_binned, 1);
    assert_eq!(snapshot.counters.time_energy_not_binned, 1);
    assert_eq!(snapshot.not_binned_total, 2);
    assert_eq!(snapshot.event_energy[500], 1);
}

#[test]
fn poller_keeps_channels_independent() {
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("run_ch001.dat");
    append(&present, &scenario());

    let mut config = Config::default();
    config.channels[0] = fine_config(&dir.path().join("run_ch000.dat"));
    config.channels[1] = fine_config(&present);
    let poller = Poller::new(&config);

    let statuses = poller.poll_once();
    assert!(!statuses[0].new_data);
    assert!(statuses[0].error.is_none());
    assert!(statuses[1].new_data);
    assert_eq!(statuses[1].reset, Some(ResetReason::Opened));

    // the missing file appears later
    append(&dir.path().join("run_ch000.dat"), &scenario());
    let statuses = poller.poll_once();
    assert!(statuses[0].new_data);
    assert!(!statuses[1].new_data);
    assert_eq!(
        poller.snapshot(0).unwrap().counters,
        poller.snapshot(1).unwrap().counters
    );
}
