//! Summary metrics scored by the FASTER detectors.
//!
//! Every metric is a pure function of a signal block.  [`Metric`] names them
//! and dispatches per detection [`Level`]:
//!
//! | level | block | scores |
//! |---|---|---|
//! | channels | `[n_ch, n_times]` (epochs concatenated) | one per channel |
//! | epochs | `[n_epochs, n_ch, n_times]` | one per epoch (channel mean) |
//! | channels in epochs | `[n_epochs, n_ch, n_times]` | `[n_epochs, n_ch]` |
//! | components | `[n_components, n_times]` | one per component |
use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{FasterError, Result};
use crate::welch::{efficient_welch, Psd};

/// Mains frequencies whose power makes up the `line_noise` score.
pub const LINE_NOISE_FREQS: [f64; 2] = [50.0, 60.0];

// ── Metric names ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Variance,
    Correlation,
    Hurst,
    Kurtosis,
    LineNoise,
    Amplitude,
    Deviation,
    MedianGradient,
    PowerGradient,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Variance,
        Metric::Correlation,
        Metric::Hurst,
        Metric::Kurtosis,
        Metric::LineNoise,
        Metric::Amplitude,
        Metric::Deviation,
        Metric::MedianGradient,
        Metric::PowerGradient,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Variance => "variance",
            Metric::Correlation => "correlation",
            Metric::Hurst => "hurst",
            Metric::Kurtosis => "kurtosis",
            Metric::LineNoise => "line_noise",
            Metric::Amplitude => "amplitude",
            Metric::Deviation => "deviation",
            Metric::MedianGradient => "median_gradient",
            Metric::PowerGradient => "power_gradient",
        }
    }

    fn not_in(self, level: Level) -> FasterError {
        FasterError::MetricNotInCatalog {
            metric: self,
            level: level.as_str(),
            available: level
                .catalog()
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// One score per channel of `data` ([n_ch, n_times]).
    pub fn channel_scores(self, data: ArrayView2<f64>, sfreq: f64) -> Result<Array1<f64>> {
        match self {
            Metric::Variance => Ok(variance(data)),
            Metric::Correlation => correlation(data),
            Metric::Hurst => Ok(hurst(data)),
            Metric::Kurtosis => Ok(kurtosis(data)),
            Metric::LineNoise => line_noise(data, sfreq),
            _ => Err(self.not_in(Level::Channels)),
        }
    }

    /// One score per epoch of `data` ([n_epochs, n_ch, n_times]).
    pub fn epoch_scores(self, data: ArrayView3<f64>) -> Result<Array1<f64>> {
        let per_channel = match self {
            Metric::Amplitude => peak_to_peak(data),
            Metric::Variance => epoch_variance(data),
            Metric::Deviation => deviation(data),
            _ => return Err(self.not_in(Level::Epochs)),
        };
        Ok(channel_mean(per_channel))
    }

    /// `[n_epochs, n_ch]` score surface of `data` ([n_epochs, n_ch, n_times]).
    pub fn channel_in_epoch_scores(self, data: ArrayView3<f64>, sfreq: f64) -> Result<Array2<f64>> {
        match self {
            Metric::Amplitude => Ok(peak_to_peak(data)),
            Metric::Variance => Ok(epoch_variance(data)),
            Metric::Deviation => Ok(deviation(data)),
            Metric::MedianGradient => Ok(median_gradient(data)),
            Metric::LineNoise => epoch_line_noise(data, sfreq),
            _ => Err(self.not_in(Level::ChannelsInEpochs)),
        }
    }

    /// One score per row of `sources` ([n_components, n_times]).
    pub fn component_scores(
        self,
        sources: ArrayView2<f64>,
        sfreq: f64,
        power_gradient_range: (f64, f64),
    ) -> Result<Array1<f64>> {
        match self {
            Metric::Kurtosis => Ok(kurtosis(sources)),
            Metric::Hurst => Ok(hurst(sources)),
            Metric::MedianGradient => Ok(sources.map_axis(Axis(1), median_abs_diff)),
            Metric::PowerGradient => power_gradient(sources, sfreq, power_gradient_range),
            _ => Err(self.not_in(Level::Components)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = FasterError;

    fn from_str(s: &str) -> Result<Self> {
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| FasterError::UnknownMetric(s.to_string()))
    }
}

// ── Detection levels ─────────────────────────────────────────────────────

/// Granularity a detector works at; each has a fixed metric catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Channels,
    Epochs,
    ChannelsInEpochs,
    Components,
}

impl Level {
    pub fn catalog(self) -> &'static [Metric] {
        match self {
            Level::Channels => &[
                Metric::Variance,
                Metric::Correlation,
                Metric::Hurst,
                Metric::Kurtosis,
                Metric::LineNoise,
            ],
            Level::Epochs => &[Metric::Amplitude, Metric::Variance, Metric::Deviation],
            Level::ChannelsInEpochs => &[
                Metric::Amplitude,
                Metric::Variance,
                Metric::Deviation,
                Metric::MedianGradient,
                Metric::LineNoise,
            ],
            Level::Components => &[
                Metric::Kurtosis,
                Metric::Hurst,
                Metric::MedianGradient,
                Metric::PowerGradient,
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Channels => "bad channel",
            Level::Epochs => "bad epoch",
            Level::ChannelsInEpochs => "bad channel-in-epoch",
            Level::Components => "bad component",
        }
    }

    /// Fail unless every metric belongs to this level's catalog.
    pub fn check(self, metrics: &[Metric]) -> Result<()> {
        match metrics.iter().find(|m| !self.catalog().contains(m)) {
            Some(m) => Err(m.not_in(self)),
            None => Ok(()),
        }
    }
}

// ── Time-domain metrics over rows ────────────────────────────────────────

/// Population variance of each row.
pub fn variance(data: ArrayView2<f64>) -> Array1<f64> {
    data.var_axis(Axis(1), 0.0)
}

/// Mean correlation of each row with every *other* row.
///
/// Pairs involving a flat row have no defined correlation and are left out
/// of the average; a row with no defined pair at all scores `0.0`.
pub fn correlation(data: ArrayView2<f64>) -> Result<Array1<f64>> {
    let n_ch = data.nrows();
    if n_ch < 2 {
        return Err(FasterError::InvalidPicks(
            "the correlation metric needs at least two channels of the same type".into(),
        ));
    }
    let means = data.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(n_ch));
    let centred = &data - &means.insert_axis(Axis(1));
    let norms = centred.map_axis(Axis(1), |r| r.dot(&r).sqrt());
    let cov = centred.dot(&centred.t());

    Ok(Array1::from_iter((0..n_ch).map(|i| {
        let (sum, n) = (0..n_ch)
            .filter(|&j| j != i)
            .map(|j| cov[[i, j]] / (norms[i] * norms[j]))
            .filter(|r| r.is_finite())
            .fold((0.0, 0usize), |(s, n), r| (s + r, n + 1));
        if n == 0 { 0.0 } else { sum / n as f64 }
    })))
}

/// Hurst exponent estimate from second-order discrete derivatives.
///
/// `y = cumsum(diff(x))` is filtered with `[1, -2, 1]` and the wider
/// `[1, 0, -2, 0, 1]`; the first `len(b) - 1` and the last output of each are
/// dropped, and `H = ½·log2(mean(y2²) / mean(y1²))`.
pub fn hurst(data: ArrayView2<f64>) -> Array1<f64> {
    data.map_axis(Axis(1), |row| {
        let x0 = row.first().copied().unwrap_or(0.0);
        let y: Vec<f64> = row.iter().skip(1).map(|&v| v - x0).collect();
        let s1 = mean_square_second_diff(&y, 1);
        let s2 = mean_square_second_diff(&y, 2);
        0.5 * (s2 / s1).log2()
    })
}

/// Mean of `(y[k] - 2·y[k-h] + y[k-2h])²` over `k in 2h .. len-1`.
fn mean_square_second_diff(y: &[f64], h: usize) -> f64 {
    let end = y.len().saturating_sub(1);
    let terms: Vec<f64> = (2 * h..end)
        .map(|k| {
            let d = y[k] - 2.0 * y[k - h] + y[k - 2 * h];
            d * d
        })
        .collect();
    if terms.is_empty() {
        f64::NAN
    } else {
        terms.iter().sum::<f64>() / terms.len() as f64
    }
}

/// Fisher (excess) kurtosis of each row, biased estimator.
///
/// A flat row has undefined kurtosis and scores NaN.
pub fn kurtosis(data: ArrayView2<f64>) -> Array1<f64> {
    data.map_axis(Axis(1), |row| {
        let mean = row.mean().unwrap_or(0.0);
        let (m2, m4) = row.iter().fold((0.0, 0.0), |(m2, m4), &v| {
            let d2 = (v - mean) * (v - mean);
            (m2 + d2, m4 + d2 * d2)
        });
        let n = row.len() as f64;
        let (m2, m4) = (m2 / n, m4 / n);
        if m2 == 0.0 {
            f64::NAN
        } else {
            m4 / (m2 * m2) - 3.0
        }
    })
}

fn median_abs_diff(row: ArrayView1<f64>) -> f64 {
    let mut grads: Vec<f64> = row
        .windows(2)
        .into_iter()
        .map(|w| (w[1] - w[0]).abs())
        .collect();
    median(&mut grads)
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

// ── Frequency-domain metrics ─────────────────────────────────────────────

/// Summed power at each of `freqs`, taken from the first bin at or above it.
fn freqs_power(psd: &Psd, freqs: &[f64], sfreq: f64) -> Result<Array1<f64>> {
    let mut total = Array1::<f64>::zeros(psd.power.nrows());
    for &f in freqs {
        let bin = psd.bin_at(f);
        if bin >= psd.n_freqs() {
            return Err(FasterError::InsufficientResolution {
                metric: Metric::LineNoise,
                freq: f,
                sfreq,
                fmax: psd.fmax(),
                n_freqs: psd.n_freqs(),
                hint: "use the metric selection to disable 'line_noise'",
            });
        }
        total += &psd.power.column(bin);
    }
    Ok(total)
}

/// Power at 50 Hz plus power at 60 Hz for each row.
pub fn line_noise(data: ArrayView2<f64>, sfreq: f64) -> Result<Array1<f64>> {
    let psd = efficient_welch(data, sfreq);
    freqs_power(&psd, &LINE_NOISE_FREQS, sfreq)
}

/// Mean slope of the power spectrum between `range.0` and `range.1` Hz.
///
/// In FASTER the range is the passband edge of the lowpass filter, where
/// muscle and other broadband artifacts flatten the spectrum.
///
/// Fails when `range.0` lies beyond the spectrum.  A band holding fewer than
/// two bins has no slope and scores NaN, which the outlier selector skips.
pub fn power_gradient(data: ArrayView2<f64>, sfreq: f64, range: (f64, f64)) -> Result<Array1<f64>> {
    let psd = efficient_welch(data, sfreq);
    let (start, stop) = (psd.bin_at(range.0), psd.bin_at(range.1));
    let insufficient = |freq| FasterError::InsufficientResolution {
        metric: Metric::PowerGradient,
        freq,
        sfreq,
        fmax: psd.fmax(),
        n_freqs: psd.n_freqs(),
        hint: "tweak 'power_gradient_range' or disable 'power_gradient'",
    };
    if start >= psd.n_freqs() {
        return Err(insufficient(range.0));
    }
    if stop < start + 2 {
        return Ok(Array1::from_elem(data.nrows(), f64::NAN));
    }
    let band = psd.power.slice(s![.., start..stop]);
    let n_steps = (stop - start - 1) as f64;
    Ok(band.map_axis(Axis(1), |row| (row[row.len() - 1] - row[0]) / n_steps))
}

// ── Per (epoch, channel) metrics ─────────────────────────────────────────

/// Peak-to-peak range, `[n_epochs, n_ch]`.
pub fn peak_to_peak(data: ArrayView3<f64>) -> Array2<f64> {
    data.map_axis(Axis(2), |row| {
        let (lo, hi) = row
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        hi - lo
    })
}

/// Population variance over time, `[n_epochs, n_ch]`.
pub fn epoch_variance(data: ArrayView3<f64>) -> Array2<f64> {
    data.var_axis(Axis(2), 0.0)
}

/// Each epoch's channel means relative to that channel's mean over epochs.
///
/// The `[n_epochs, n_ch]` channel means are computed once and reused.
pub fn deviation(data: ArrayView3<f64>) -> Array2<f64> {
    let (n_e, n_ch, _) = data.dim();
    let ch_mean = data.mean_axis(Axis(2)).unwrap_or_else(|| Array2::zeros((n_e, n_ch)));
    let grand = ch_mean.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_ch));
    ch_mean - &grand
}

/// Median absolute sample-to-sample difference, `[n_epochs, n_ch]`.
pub fn median_gradient(data: ArrayView3<f64>) -> Array2<f64> {
    data.map_axis(Axis(2), median_abs_diff)
}

/// Line-noise power of every channel in every epoch, `[n_epochs, n_ch]`.
pub fn epoch_line_noise(data: ArrayView3<f64>, sfreq: f64) -> Result<Array2<f64>> {
    let (n_e, n_ch, _) = data.dim();
    let mut out = Array2::<f64>::zeros((n_e, n_ch));
    for (epoch, mut row) in data.outer_iter().zip(out.outer_iter_mut()) {
        row.assign(&line_noise(epoch, sfreq)?);
    }
    Ok(out)
}

fn channel_mean(per_channel: Array2<f64>) -> Array1<f64> {
    let n_e = per_channel.nrows();
    per_channel
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::from_elem(n_e, f64::NAN))
}
