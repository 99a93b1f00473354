//! Waveform analysis of raw FADC samples: pedestal estimation, smoothing, and peak
//! finding.
use serde::{Deserialize, Serialize};

use super::fadc250_event::{Fadc250Data, Pedestal, Peak};

/// Parameters of the waveform analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Half width of the triangular smoothing kernel; 1 disables smoothing
    pub resolution: usize,
    /// Minimum distance from the pedestal for a peak, in ADC counts
    pub threshold: f64,
    /// Number of samples in the pedestal window
    pub n_pedestal: usize,
    /// Maximum spread (max - min) of a window accepted as flat baseline
    pub flatness: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            resolution: 3,
            threshold: 20.0,
            n_pedestal: 8,
            flatness: 1.0,
        }
    }
}

/// Smooth a spectrum with a triangular kernel of half width `res`.
///
/// Sample `i` is averaged with the pairs `(i - j, i + j)` weighted by `(res - j) / res`.
/// A pair is used only if both of its samples exist, so the kernel stays symmetric
/// at the edges.
pub fn smooth_spectrum(samples: &[u16], res: usize) -> Vec<f64> {
    if res <= 1 {
        return samples.iter().map(|s| *s as f64).collect();
    }
    let n = samples.len();
    let mut smoothed = Vec::with_capacity(n);
    for i in 0..n {
        let mut value = samples[i] as f64;
        let mut weights = 1.0;
        for j in 1..res {
            if j > i || i + j >= n {
                continue;
            }
            let weight = (res - j) as f64 / res as f64;
            value += weight * (samples[i - j] as f64 + samples[i + j] as f64);
            weights += 2.0 * weight;
        }
        smoothed.push(value / weights);
    }
    smoothed
}

fn window_spread(window: &[u16]) -> u16 {
    let (min, max) = window
        .iter()
        .fold((u16::MAX, u16::MIN), |(min, max), s| (min.min(*s), max.max(*s)));
    max.saturating_sub(min)
}

fn window_pedestal(window: &[u16]) -> Pedestal {
    let n = window.len() as f64;
    let mean = window.iter().map(|s| *s as f64).sum::<f64>() / n;
    let err = if window.len() < 3 {
        window_spread(window) as f64 / 2.0
    } else {
        let var = window
            .iter()
            .map(|s| (*s as f64 - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        (var / n).sqrt()
    };
    Pedestal { mean, err }
}

/// The waveform analyzer.
///
/// Stateless apart from its configuration, so one analyzer may be shared by every
/// channel of every module in a worker.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyze a waveform, returning a fresh channel record
    pub fn analyze(&self, samples: &[u16]) -> Fadc250Data {
        let mut data = Fadc250Data {
            raw: samples.to_vec(),
            ..Default::default()
        };
        self.analyze_into(&mut data);
        data
    }

    /// Fill the pedestal and peaks of a channel from its raw samples
    pub fn analyze_into(&self, data: &mut Fadc250Data) {
        data.peaks.clear();
        data.ped = self.find_pedestal(&data.raw);
        if data.raw.is_empty() {
            return;
        }
        let smoothed = smooth_spectrum(&data.raw, self.config.resolution);
        self.find_peaks_into(&data.raw, &smoothed, &data.ped, &mut data.peaks);
    }

    /// Estimate the pedestal from the first flat window of `n_pedestal` samples.
    ///
    /// If no window is flat the flattest one is used, the earliest winning ties.
    /// Traces shorter than the window use every sample.
    pub fn find_pedestal(&self, samples: &[u16]) -> Pedestal {
        if samples.is_empty() {
            return Pedestal::default();
        }
        let width = self.config.n_pedestal.clamp(1, samples.len());
        let mut best: Option<(&[u16], u16)> = None;
        for window in samples.windows(width) {
            let spread = window_spread(window);
            if (spread as f64) < self.config.flatness {
                return window_pedestal(window);
            }
            if best.map_or(true, |(_, best_spread)| spread < best_spread) {
                best = Some((window, spread));
            }
        }
        match best {
            Some((window, _)) => window_pedestal(window),
            None => window_pedestal(samples),
        }
    }

    /// Find the peaks of a waveform given its smoothed form and pedestal
    pub fn find_peaks(&self, raw: &[u16], smoothed: &[f64], ped: &Pedestal) -> Vec<Peak> {
        let mut peaks = Vec::new();
        self.find_peaks_into(raw, smoothed, ped, &mut peaks);
        peaks
    }

    fn find_peaks_into(&self, raw: &[u16], smoothed: &[f64], ped: &Pedestal, peaks: &mut Vec<Peak>) {
        let threshold = self.config.threshold;
        let n = raw.len().min(smoothed.len());
        let mut i = 0;
        while i < n {
            let deviation = smoothed[i] - ped.mean;
            if deviation.abs() <= threshold {
                i += 1;
                continue;
            }

            // One excursion: consecutive smoothed samples beyond threshold on one side
            let positive = deviation > 0.0;
            let beyond = |value: f64| {
                let dev = value - ped.mean;
                dev.abs() > threshold && (dev > 0.0) == positive
            };
            let start = i;
            while i < n && beyond(smoothed[i]) {
                i += 1;
            }

            let pos = (start..i).fold(start, |best, j| {
                let more_extreme = if positive {
                    raw[j] > raw[best]
                } else {
                    raw[j] < raw[best]
                };
                if more_extreme {
                    j
                } else {
                    best
                }
            });
            let height = raw[pos] as f64 - ped.mean;
            if height.abs() <= threshold || (height > 0.0) != positive {
                continue;
            }

            let above = |value: u16| {
                let dev = value as f64 - ped.mean;
                if positive {
                    dev > 0.0
                } else {
                    dev < 0.0
                }
            };
            let mut left = pos;
            while left > 0 && above(raw[left - 1]) {
                left -= 1;
            }
            let mut right = pos;
            while right + 1 < n && above(raw[right + 1]) {
                right += 1;
            }

            let mut peak = Peak {
                pos,
                left,
                right,
                height,
                integral: 0.0,
            };
            // Excursions sharing one pulse body are merged into the larger peak
            if let Some(last) = peaks.last().copied() {
                if (last.height > 0.0) == positive && peak.left <= last.right {
                    if peak.height.abs() <= last.height.abs() {
                        peak.pos = last.pos;
                        peak.height = last.height;
                    }
                    peak.left = peak.left.min(last.left);
                    peak.right = peak.right.max(last.right);
                    peaks.pop();
                }
            }
            peak.integral = raw[peak.left..=peak.right]
                .iter()
                .map(|s| *s as f64 - ped.mean)
                .sum();
            peaks.push(peak);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn analyzer(resolution: usize, threshold: f64, n_pedestal: usize, flatness: f64) -> Analyzer {
        Analyzer::new(AnalyzerConfig {
            resolution,
            threshold,
            n_pedestal,
            flatness,
        })
    }

    #[test]
    fn test_single_pulse() {
        let samples = [100, 101, 100, 102, 101, 150, 140, 120, 101, 100];
        let data = analyzer(3, 20.0, 4, 5.0).analyze(&samples);
        assert_approx_eq!(data.ped.mean, 100.75);
        assert_eq!(data.peaks.len(), 1);
        let peak = data.peaks[0];
        assert_eq!(peak.pos, 5);
        assert_approx_eq!(peak.height, 49.25);
        assert_eq!(peak.left, 3);
        assert_eq!(peak.right, 8);
        assert_approx_eq!(peak.integral, 714.0 - 6.0 * 100.75);
        assert_eq!(data.raw, samples);
    }

    #[test]
    fn test_empty_waveform() {
        let data = analyzer(3, 20.0, 4, 5.0).analyze(&[]);
        assert_eq!(data.ped, Pedestal::default());
        assert!(data.peaks.is_empty());
    }

    #[test]
    fn test_negative_pulse() {
        let samples = [200, 200, 200, 200, 150, 120, 160, 200, 200, 200];
        let data = analyzer(1, 20.0, 4, 5.0).analyze(&samples);
        assert_approx_eq!(data.ped.mean, 200.0);
        assert_approx_eq!(data.ped.err, 0.0);
        assert_eq!(data.peaks.len(), 1);
        let peak = data.peaks[0];
        assert_eq!(peak.pos, 5);
        assert_approx_eq!(peak.height, -80.0);
        assert_eq!((peak.left, peak.right), (4, 6));
        assert_approx_eq!(peak.integral, -170.0);
    }

    #[test]
    fn test_peaks_are_ordered() {
        let samples = [
            100, 100, 100, 100, 60, 100, 100, 100, 160, 100, 100, 130, 100, 100,
        ];
        let data = analyzer(1, 20.0, 4, 1.0).analyze(&samples);
        let positions: Vec<usize> = data.peaks.iter().map(|p| p.pos).collect();
        assert_eq!(positions, vec![4, 8, 11]);
        assert!(data.peaks[0].height < 0.0);
        assert_approx_eq!(data.peaks[1].height, 60.0);
        assert_approx_eq!(data.peaks[2].height, 30.0);
    }

    #[test]
    fn test_tie_takes_earliest() {
        let samples = [10, 10, 10, 50, 50, 10, 10];
        let data = analyzer(1, 20.0, 3, 1.0).analyze(&samples);
        assert_eq!(data.peaks.len(), 1);
        assert_eq!(data.peaks[0].pos, 3);
        assert_eq!((data.peaks[0].left, data.peaks[0].right), (3, 4));
    }

    #[test]
    fn test_find_peaks_against_given_pedestal() {
        let raw = [10, 10, 10, 50, 50, 10, 10];
        let smoothed: Vec<f64> = raw.iter().map(|s| *s as f64).collect();
        let ped = Pedestal { mean: 10.0, err: 0.0 };
        let peaks = analyzer(1, 20.0, 3, 1.0).find_peaks(&raw, &smoothed, &ped);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].pos, 3);
        assert_approx_eq!(peaks[0].height, 40.0);
        assert_approx_eq!(peaks[0].integral, 80.0);

        // the same trace is flat against a pedestal just under its pulse
        let ped = Pedestal { mean: 40.0, err: 0.0 };
        assert!(analyzer(1, 35.0, 3, 1.0)
            .find_peaks(&raw, &smoothed, &ped)
            .is_empty());
    }

    #[test]
    fn test_merge_shared_pulse_body() {
        // two excursions beyond threshold that never return to baseline between them
        let samples = [100, 100, 100, 100, 150, 110, 140, 100, 100];
        let data = analyzer(1, 20.0, 4, 1.0).analyze(&samples);
        assert_eq!(data.peaks.len(), 1);
        let peak = data.peaks[0];
        assert_eq!(peak.pos, 4);
        assert_eq!((peak.left, peak.right), (4, 6));
        assert_approx_eq!(peak.integral, 100.0);
    }

    #[test]
    fn test_pedestal_falls_back_to_flattest() {
        let samples = [100, 110, 104, 107, 105, 130];
        let ped = analyzer(3, 20.0, 3, 1.0).find_pedestal(&samples);
        // windows spread 10, 6, 3, 25; [104, 107, 105] is flattest
        assert_approx_eq!(ped.mean, 316.0 / 3.0);

        let short = [10, 14];
        let ped = analyzer(3, 20.0, 8, 1.0).find_pedestal(&short);
        assert_approx_eq!(ped.mean, 12.0);
        assert_approx_eq!(ped.err, 2.0);
    }

    #[test]
    fn test_smoothing() {
        let flat = [7u16; 6];
        for value in smooth_spectrum(&flat, 3) {
            assert_approx_eq!(value, 7.0);
        }
        assert_eq!(smooth_spectrum(&[1, 2, 3], 1), vec![1.0, 2.0, 3.0]);

        // edges keep only the sample itself, the middle uses one pair at weight 2/3
        let smoothed = smooth_spectrum(&[0, 30, 0], 3);
        assert_approx_eq!(smoothed[0], 0.0);
        assert_approx_eq!(smoothed[1], 30.0 / (1.0 + 4.0 / 3.0));
        assert_approx_eq!(smoothed[2], 0.0);
    }
}
