use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::constants::MAX_HISTOGRAM_BINS;
use super::error::HistogramError;

/// Result of placing a value on an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bin {
    Index(usize),
    NotBinned,
}

/// A uniformly binned range `[min, max)` split into `n_bins` bins.
///
/// An axis with `max <= min`, `n_bins <= 0` or more than `MAX_HISTOGRAM_BINS` bins is kept
/// as configured but disables binning: every value is reported as NotBinned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub n_bins: i64,
}

impl Axis {
    pub fn new(min: f64, max: f64, n_bins: i64) -> Self {
        Self { min, max, n_bins }
    }

    pub fn is_valid(&self) -> bool {
        self.n_bins > 0
            && self.n_bins as u64 <= MAX_HISTOGRAM_BINS as u64
            && self.min.is_finite()
            && self.max.is_finite()
            && self.max > self.min
    }

    pub fn validate(&self) -> Result<(), HistogramError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(HistogramError::InvalidAxis {
                min: self.min,
                max: self.max,
                n_bins: self.n_bins,
            })
        }
    }

    /// Number of bins actually allocated; zero for a disabled axis
    pub fn len(&self) -> usize {
        if self.is_valid() {
            self.n_bins as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bin_width(&self) -> f64 {
        if self.is_valid() {
            (self.max - self.min) / self.n_bins as f64
        } else {
            0.0
        }
    }

    /// floor((value - min) / bin_width), or NotBinned outside [min, max)
    pub fn bin(&self, value: f64) -> Bin {
        if !self.is_valid() || value.is_nan() || value < self.min || value >= self.max {
            return Bin::NotBinned;
        }
        let index = ((value - self.min) / self.bin_width()).floor() as usize;
        // rounding at the upper edge can land one past the end
        if index < self.len() {
            Bin::Index(index)
        } else {
            Bin::NotBinned
        }
    }

    /// Low edge of every bin: min + i * bin_width
    pub fn values(&self) -> Vec<f64> {
        let width = self.bin_width();
        (0..self.len())
            .map(|i| self.min + i as f64 * width)
            .collect()
    }
}

/// A one dimensional histogram of u64 counts
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    axis: Axis,
    counts: Vec<u64>,
}

impl Histogram1D {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            counts: vec![0; axis.len()],
        }
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn fill(&mut self, value: f64) -> Bin {
        let bin = self.axis.bin(value);
        if let Bin::Index(i) = bin {
            self.counts[i] += 1;
        }
        bin
    }

    pub fn clear(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    /// Change the binning. Counts are discarded if the axis actually changed.
    /// Returns true when the histogram was rebuilt.
    pub fn reconfigure(&mut self, axis: Axis) -> bool {
        if axis == self.axis {
            return false;
        }
        *self = Self::new(axis);
        true
    }
}

/// Time-since-frame versus coarsened raw energy.
///
/// Rows are time bins, columns are groups of `energy_bin_group` consecutive energy codes,
/// covering `max_energy_codes / energy_bin_group` groups. A spectrum of more than
/// `MAX_HISTOGRAM_BINS` bins is not allocated and bins nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEnergySpectrum {
    time_axis: Axis,
    energy_bin_group: i64,
    max_energy_codes: usize,
    counts: Array2<u64>,
}

impl TimeEnergySpectrum {
    pub fn new(time_axis: Axis, energy_bin_group: i64, max_energy_codes: usize) -> Self {
        let n_groups = Self::n_groups(energy_bin_group, max_energy_codes);
        let shape = match time_axis.len().checked_mul(n_groups) {
            Some(bins) if bins <= MAX_HISTOGRAM_BINS => (time_axis.len(), n_groups),
            _ => (0, 0),
        };
        Self {
            time_axis,
            energy_bin_group,
            max_energy_codes,
            counts: Array2::zeros(shape),
        }
    }

    fn n_groups(energy_bin_group: i64, max_energy_codes: usize) -> usize {
        if energy_bin_group > 0 {
            max_energy_codes / energy_bin_group as usize
        } else {
            0
        }
    }

    pub fn validate(&self) -> Result<(), HistogramError> {
        self.time_axis.validate()?;
        if self.energy_bin_group <= 0 {
            return Err(HistogramError::InvalidEnergyGroup(self.energy_bin_group));
        }
        let time_bins = self.time_axis.len();
        let energy_groups = Self::n_groups(self.energy_bin_group, self.max_energy_codes);
        if time_bins
            .checked_mul(energy_groups)
            .map_or(true, |bins| bins > MAX_HISTOGRAM_BINS)
        {
            return Err(HistogramError::TooManyBins {
                time_bins,
                energy_groups,
                max: MAX_HISTOGRAM_BINS,
            });
        }
        Ok(())
    }

    pub fn time_axis(&self) -> &Axis {
        &self.time_axis
    }

    pub fn energy_bin_group(&self) -> i64 {
        self.energy_bin_group
    }

    pub fn n_time_bins(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_energy_groups(&self) -> usize {
        self.counts.ncols()
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    pub fn fill(&mut self, time_since_frame: f64, raw_energy: i16) -> Bin {
        let Bin::Index(row) = self.time_axis.bin(time_since_frame) else {
            return Bin::NotBinned;
        };
        if raw_energy < 0 || self.energy_bin_group <= 0 {
            return Bin::NotBinned;
        }
        let col = raw_energy as usize / self.energy_bin_group as usize;
        if row >= self.n_time_bins() || col >= self.n_energy_groups() {
            return Bin::NotBinned;
        }
        self.counts[[row, col]] += 1;
        Bin::Index(row * self.n_energy_groups() + col)
    }

    pub fn clear(&mut self) {
        self.counts.fill(0);
    }

    pub fn reconfigure(
        &mut self,
        time_axis: Axis,
        energy_bin_group: i64,
        max_energy_codes: usize,
    ) -> bool {
        if time_axis == self.time_axis
            && energy_bin_group == self.energy_bin_group
            && max_energy_codes == self.max_energy_codes
        {
            return false;
        }
        *self = Self::new(time_axis, energy_bin_group, max_energy_codes);
        true
    }

    /// Flattened counts. Time-major (one row per time bin) by default,
    /// energy-major when transposed.
    pub fn flattened(&self, transpose: bool) -> Vec<u64> {
        if transpose {
            self.counts.t().iter().copied().collect()
        } else {
            self.counts.iter().copied().collect()
        }
    }

    pub fn time_values(&self) -> Vec<f64> {
        self.time_axis.values()
    }

    /// First raw energy code of every group
    pub fn energy_values(&self) -> Vec<f64> {
        (0..self.n_energy_groups())
            .map(|i| (i as i64 * self.energy_bin_group) as f64)
            .collect()
    }
}

/// The instrument's own energy spectrum, refreshed verbatim each pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSpectrum {
    counts: Vec<u32>,
}

impl DeviceSpectrum {
    pub fn refresh(&mut self, counts: &[u32]) {
        self.counts.clear();
        self.counts.extend_from_slice(counts);
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_edges() {
        let axis = Axis::new(0.0, 100.0, 10);
        assert_eq!(axis.bin_width(), 10.0);
        assert_eq!(axis.bin(0.0), Bin::Index(0));
        assert_eq!(axis.bin(9.999), Bin::Index(0));
        assert_eq!(axis.bin(10.0), Bin::Index(1));
        assert_eq!(axis.bin(99.9), Bin::Index(9));
        assert_eq!(axis.bin(100.0), Bin::NotBinned);
        assert_eq!(axis.bin(-0.1), Bin::NotBinned);
        assert_eq!(axis.bin(f64::NAN), Bin::NotBinned);
    }

    #[test]
    fn test_invalid_axis_never_bins() {
        for axis in [
            Axis::new(10.0, 10.0, 5),
            Axis::new(10.0, 0.0, 5),
            Axis::new(0.0, 10.0, 0),
            Axis::new(0.0, 10.0, -3),
        ] {
            assert!(axis.validate().is_err());
            assert_eq!(axis.len(), 0);
            let mut hist = Histogram1D::new(axis);
            for v in [-1.0, 0.0, 5.0, 10.0, 1e9] {
                assert_eq!(hist.fill(v), Bin::NotBinned);
            }
            assert!(hist.counts().is_empty());
        }
    }

    #[test]
    fn test_values() {
        let axis = Axis::new(100.0, 200.0, 4);
        assert_eq!(axis.values(), vec![100.0, 125.0, 150.0, 175.0]);
    }

    #[test]
    fn test_histogram_accumulates_and_reconfigures() {
        let mut hist = Histogram1D::new(Axis::new(0.0, 10.0, 10));
        hist.fill(3.0);
        hist.fill(3.5);
        assert_eq!(hist.counts()[3], 2);
        assert!(!hist.reconfigure(Axis::new(0.0, 10.0, 10)));
        assert_eq!(hist.total(), 2);
        assert!(hist.reconfigure(Axis::new(0.0, 20.0, 10)));
        assert_eq!(hist.total(), 0);
        assert_eq!(hist.counts().len(), 10);
    }

    #[test]
    fn test_time_energy_flatten() {
        let mut spectrum = TimeEnergySpectrum::new(Axis::new(0.0, 20.0, 2), 4, 8);
        assert_eq!(spectrum.n_time_bins(), 2);
        assert_eq!(spectrum.n_energy_groups(), 2);
        assert_eq!(spectrum.fill(5.0, 5), Bin::Index(1));
        assert_eq!(spectrum.fill(15.0, 1), Bin::Index(2));
        assert_eq!(spectrum.fill(15.0, 8), Bin::NotBinned);
        assert_eq!(spectrum.fill(25.0, 1), Bin::NotBinned);
        assert_eq!(spectrum.fill(5.0, -1), Bin::NotBinned);
        assert_eq!(spectrum.flattened(false), vec![0, 1, 1, 0]);
        assert_eq!(spectrum.flattened(true), vec![0, 1, 1, 0]);
        spectrum.fill(5.0, 0);
        assert_eq!(spectrum.flattened(false), vec![1, 1, 1, 0]);
        spectrum.fill(15.0, 4);
        spectrum.fill(5.0, 7);
        assert_eq!(spectrum.flattened(false), vec![1, 2, 1, 1]);
        assert_eq!(spectrum.flattened(true), vec![1, 1, 2, 1]);
        assert_eq!(spectrum.energy_values(), vec![0.0, 4.0]);
    }

    #[test]
    fn test_time_energy_invalid_group() {
        let mut spectrum = TimeEnergySpectrum::new(Axis::new(0.0, 20.0, 2), 0, 8);
        assert!(spectrum.validate().is_err());
        assert_eq!(spectrum.fill(5.0, 5), Bin::NotBinned);
        assert!(spectrum.flattened(false).is_empty());
    }

    #[test]
    fn test_oversized_axis_disabled() {
        let axis = Axis::new(0.0, 1.0, i64::MAX);
        assert!(matches!(
            axis.validate(),
            Err(HistogramError::InvalidAxis { .. })
        ));
        let mut hist = Histogram1D::new(axis);
        assert!(hist.counts().is_empty());
        assert_eq!(hist.fill(0.5), Bin::NotBinned);
        assert!(axis.values().is_empty());

        let limit = Axis::new(0.0, 1.0, MAX_HISTOGRAM_BINS as i64);
        assert!(limit.validate().is_ok());
        assert!(Axis::new(0.0, 1.0, MAX_HISTOGRAM_BINS as i64 + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_time_energy_too_many_bins() {
        let mut spectrum = TimeEnergySpectrum::new(Axis::new(0.0, 10.0, 10), 1, usize::MAX);
        assert!(matches!(
            spectrum.validate(),
            Err(HistogramError::TooManyBins { .. })
        ));
        assert_eq!(spectrum.n_time_bins(), 0);
        assert_eq!(spectrum.n_energy_groups(), 0);
        assert_eq!(spectrum.fill(5.0, 5), Bin::NotBinned);
        assert!(spectrum.flattened(false).is_empty());
        assert!(spectrum.energy_values().is_empty());

        // product over the limit even though each axis alone fits
        let spectrum = TimeEnergySpectrum::new(
            Axis::new(0.0, 10.0, 1 << 13),
            1,
            MAX_HISTOGRAM_BINS >> 12,
        );
        assert!(spectrum.validate().is_err());
        assert!(spectrum.counts().is_empty());
    }

    #[test]
    fn test_device_spectrum() {
        let mut dev = DeviceSpectrum::default();
        dev.refresh(&[1, 2, 3]);
        dev.refresh(&[4, 5]);
        assert_eq!(dev.counts(), &[4, 5]);
        dev.clear();
        assert!(dev.counts().is_empty());
    }
}
