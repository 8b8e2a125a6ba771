use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{
    DEFAULT_ENERGY_CODES, DEFAULT_NUMBER_OF_CHANNELS, DEFAULT_POLL_INTERVAL_MS, PS_PER_NS,
};
use super::error::ConfigError;
use super::histogram::Axis;

/// A `[t_min, t_max)` window on time-since-frame, in ns. Disabled (everything passes)
/// when `t_min >= t_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub t_min: f64,
    pub t_max: f64,
}

impl WindowConfig {
    pub fn disabled() -> Self {
        Self {
            t_min: 0.0,
            t_max: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.t_min < self.t_max
    }

    pub fn contains(&self, time_ns: f64) -> bool {
        !self.is_enabled() || (time_ns >= self.t_min && time_ns < self.t_max)
    }
}

/// Raw energy spectrum of list-mode events, gated on time-since-frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventEnergyConfig {
    pub axis: Axis,
    pub gate: WindowConfig,
}

/// Time-since-frame versus grouped raw energy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeEnergyConfig {
    pub time_axis: Axis,
    pub energy_bin_group: i64,
    pub max_energy_codes: usize,
    pub transpose: bool,
}

/// energy = slope * raw + offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub slope: f64,
    pub offset: f64,
}

impl Calibration {
    pub fn apply(&self, raw: i16) -> f64 {
        self.slope * raw as f64 + self.offset
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            slope: 1.0,
            offset: 0.0,
        }
    }
}

/// Everything needed to process one digitizer channel.
///
/// `list_file` is the identity of the stream being tailed; None disables streaming for
/// the channel. All times are in ns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub list_file: Option<PathBuf>,
    pub event_energy: EventEnergyConfig,
    pub time_of_arrival: Axis,
    pub time_energy: TimeEnergyConfig,
    pub rate_window: WindowConfig,
    pub forced_trigger_gap_ns: Option<f64>,
    pub energy_calibration: Calibration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            list_file: None,
            event_energy: EventEnergyConfig {
                axis: Axis::new(0.0, DEFAULT_ENERGY_CODES as f64, DEFAULT_ENERGY_CODES as i64),
                gate: WindowConfig::disabled(),
            },
            time_of_arrival: Axis::new(0.0, 20.0e6, 1000),
            time_energy: TimeEnergyConfig {
                time_axis: Axis::new(0.0, 20.0e6, 100),
                energy_bin_group: 64,
                max_energy_codes: DEFAULT_ENERGY_CODES,
                transpose: false,
            },
            rate_window: WindowConfig::disabled(),
            forced_trigger_gap_ns: None,
            energy_calibration: Calibration::default(),
        }
    }
}

impl ChannelConfig {
    /// Forced trigger gap in the stream's time unit (ps)
    pub fn forced_trigger_gap_ps(&self) -> Option<u64> {
        self.forced_trigger_gap_ns
            .filter(|gap| gap.is_finite() && *gap > 0.0)
            .map(|gap| (gap * PS_PER_NS) as u64)
    }

    pub fn with_list_file(mut self, path: &Path) -> Self {
        self.list_file = Some(path.to_path_buf());
        self
    }
}

/// Structure representing the application configuration.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub poll_interval_ms: u64,
    pub channels: Vec<ChannelConfig>,
}

impl Default for Config {
    /// Two channels with streaming disabled
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            channels: vec![ChannelConfig::default(); DEFAULT_NUMBER_OF_CHANNELS],
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    pub fn channel(&self, channel: usize) -> Result<&ChannelConfig, ConfigError> {
        self.channels
            .get(channel)
            .ok_or(ConfigError::InvalidChannel(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window() {
        let window = WindowConfig {
            t_min: 10.0,
            t_max: 20.0,
        };
        assert!(window.contains(10.0));
        assert!(!window.contains(20.0));
        assert!(!window.contains(5.0));
        let disabled = WindowConfig {
            t_min: 20.0,
            t_max: 10.0,
        };
        assert!(disabled.contains(-1.0));
        assert!(WindowConfig::disabled().contains(1e12));
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut config = Config::default();
        config.channels[1].list_file = Some(PathBuf::from("/data/run_ch001.dat"));
        config.channels[1].forced_trigger_gap_ns = Some(20.0e6);
        config.write_config_file(&path).unwrap();
        let loaded = Config::read_config_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.channel(1).unwrap().forced_trigger_gap_ps(),
            Some(20_000_000_000)
        );
        assert!(matches!(
            loaded.channel(7),
            Err(ConfigError::InvalidChannel(7))
        ));
    }

    #[test]
    fn test_missing_config() {
        assert!(matches!(
            Config::read_config_file(Path::new("/no/such/config.yml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
