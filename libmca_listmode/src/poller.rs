use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::channel::{Channel, ChannelSnapshot};
use super::config::{ChannelConfig, Config};
use super::error::ProcessorError;
use super::pass_status::PassStatus;
use super::run_controller::{replay_file, run_pass, PassOutcome, PassReport};

/// Poller drives every channel of an instrument, one pass per channel per tick.
///
/// Each channel sits behind its own lock, so a slow or failing channel never holds up
/// the others and readers can take snapshots between passes.
#[derive(Debug)]
pub struct Poller {
    channels: Vec<Mutex<Channel>>,
    interval: Duration,
}

impl Poller {
    pub fn new(config: &Config) -> Self {
        Self {
            channels: config
                .channels
                .iter()
                .enumerate()
                .map(|(id, channel)| Mutex::new(Channel::new(id, channel.clone())))
                .collect(),
            interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock(&self, channel: usize) -> Result<MutexGuard<'_, Channel>, ProcessorError> {
        self.channels
            .get(channel)
            .ok_or(ProcessorError::InvalidChannel(channel))?
            .lock()
            .map_err(|_| ProcessorError::ChannelPoisoned(channel))
    }

    /// Run one pass on a single channel
    pub fn poll_channel(&self, channel: usize) -> Result<PassReport, ProcessorError> {
        let mut guard = self.lock(channel)?;
        run_pass(&mut guard)
    }

    /// Run one pass on every channel in order. A failing channel is logged and
    /// reported in its status; the remaining channels still run.
    pub fn poll_once(&self) -> Vec<PassStatus> {
        (0..self.channels.len())
            .map(|channel| self.poll_status(channel))
            .collect()
    }

    fn poll_status(&self, channel: usize) -> PassStatus {
        let mut guard = match self.lock(channel) {
            Ok(guard) => guard,
            Err(e) => {
                spdlog::error!("{e}");
                return PassStatus::failed(channel, e.to_string());
            }
        };
        let result = run_pass(&mut guard);
        let counters = guard.state().counters();
        let mut status = PassStatus::new(channel, counters.events_processed, counters.frames);
        match result {
            Ok(report) => {
                status.new_data = report.new_data();
                status.held = report.outcome == PassOutcome::Held;
                status.reset = report.reset;
                if let PassOutcome::NewData { bytes, .. } = report.outcome {
                    status.bytes_read = bytes;
                }
            }
            Err(e) => {
                spdlog::warn!("Channel {channel}: pass failed, retrying next tick: {e}");
                status.error = Some(e.to_string());
            }
        }
        status
    }

    /// Poll all channels every interval until `stop` is raised, sending one status per
    /// channel per tick.
    pub fn run(&self, stop: &AtomicBool, tx: &Sender<PassStatus>) -> Result<(), ProcessorError> {
        spdlog::info!(
            "Polling {} channels every {} ms",
            self.channels.len(),
            self.interval.as_millis()
        );
        while !stop.load(Ordering::Relaxed) {
            for status in self.poll_once() {
                tx.send(status)?;
            }
            std::thread::sleep(self.interval);
        }
        spdlog::info!("Polling stopped");
        Ok(())
    }

    /// Clear the channel and reread its live file from the start on the next pass
    pub fn request_reload(&self, channel: usize) -> Result<(), ProcessorError> {
        self.lock(channel)?.request_reload();
        Ok(())
    }

    /// End a replay and continue the live stream from where it was left
    pub fn resume_live(&self, channel: usize) -> Result<bool, ProcessorError> {
        Ok(self.lock(channel)?.resume_live())
    }

    pub fn replay(&self, channel: usize, path: &Path) -> Result<PassReport, ProcessorError> {
        let mut guard = self.lock(channel)?;
        replay_file(&mut guard, path)
    }

    pub fn set_channel_config(
        &self,
        channel: usize,
        config: ChannelConfig,
    ) -> Result<(), ProcessorError> {
        self.lock(channel)?.set_config(config);
        Ok(())
    }

    pub fn refresh_device_spectrum(
        &self,
        channel: usize,
        counts: &[u32],
    ) -> Result<(), ProcessorError> {
        self.lock(channel)?.refresh_device_spectrum(counts);
        Ok(())
    }

    pub fn snapshot(&self, channel: usize) -> Result<ChannelSnapshot, ProcessorError> {
        Ok(self.lock(channel)?.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{encode_records, ListEvent};
    use crate::histogram::Axis;
    use crate::stream_cursor::ResetReason;

    #[test]
    fn test_failing_channel_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.dat");
        std::fs::write(
            &good,
            encode_records(&[ListEvent::new(0, 0, 0x8), ListEvent::new(5, 42, 0)]),
        )
        .unwrap();
        // a directory cannot be read as a list file
        let bad = dir.path().join("bad.dat");
        std::fs::create_dir(&bad).unwrap();

        let mut config = Config::default();
        config.channels[0] = ChannelConfig::default().with_list_file(&bad);
        config.channels[1] = ChannelConfig::default().with_list_file(&good);
        let poller = Poller::new(&config);

        let statuses = poller.poll_once();
        assert_eq!(statuses.len(), 2);
        assert!(!statuses[0].new_data);
        assert!(statuses[1].new_data);
        assert_eq!(statuses[1].events_processed, 2);
        assert_eq!(statuses[1].bytes_read, 28);
        assert_eq!(poller.snapshot(1).unwrap().event_energy[42], 1);
    }

    #[test]
    fn test_reset_without_records_reports_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dat");
        std::fs::write(
            &path,
            encode_records(&[ListEvent::new(0, 0, 0x8), ListEvent::new(5, 42, 0)]),
        )
        .unwrap();
        let mut config = Config::default();
        config.channels[0] = ChannelConfig::default().with_list_file(&path);
        let poller = Poller::new(&config);
        assert!(poller.poll_once()[0].new_data);

        // rewritten with only part of a record
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let status = &poller.poll_once()[0];
        assert!(!status.new_data);
        assert_eq!(status.reset, Some(ResetReason::Truncated));
        assert!(status.changed());
        assert_eq!(status.events_processed, 0);
        assert_eq!(poller.snapshot(0).unwrap().event_energy[42], 0);
    }

    #[test]
    fn test_resume_live_and_oversized_config() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live.dat");
        let offline = dir.path().join("offline.dat");
        std::fs::write(
            &live,
            encode_records(&[ListEvent::new(0, 0, 0x8), ListEvent::new(5, 42, 0)]),
        )
        .unwrap();
        std::fs::write(&offline, encode_records(&[ListEvent::new(0, 7, 0)])).unwrap();
        let mut config = Config::default();
        config.channels[0] = ChannelConfig::default().with_list_file(&live);
        let poller = Poller::new(&config);
        poller.poll_once();

        poller.replay(0, &offline).unwrap();
        assert!(poller.poll_once()[0].held);
        assert!(poller.resume_live(0).unwrap());
        assert_eq!(poller.snapshot(0).unwrap().event_energy[42], 1);

        let mut huge = ChannelConfig::default().with_list_file(&live);
        huge.time_of_arrival = Axis::new(0.0, 1.0, i64::MAX);
        poller.set_channel_config(0, huge).unwrap();
        let status = &poller.poll_once()[0];
        assert!(status.error.is_none());
        assert!(poller.snapshot(0).unwrap().time_of_arrival.is_empty());
    }

    #[test]
    fn test_invalid_channel() {
        let poller = Poller::new(&Config::default());
        assert!(matches!(
            poller.request_reload(5),
            Err(ProcessorError::InvalidChannel(5))
        ));
    }

    #[test]
    fn test_run_until_stopped() {
        let mut config = Config::default();
        config.poll_interval_ms = 1;
        let poller = Poller::new(&config);
        let stop = AtomicBool::new(false);
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::scope(|s| {
            s.spawn(|| poller.run(&stop, &tx).unwrap());
            let first = rx.recv().unwrap();
            assert!(!first.new_data);
            stop.store(true, Ordering::Relaxed);
        });
    }
}
