//! Fast, coarse Welch power spectral density.
//!
//! Matches `scipy.signal.welch(x, sfreq, nperseg=n, noverlap=0)` with its
//! defaults: periodic Hann window, constant detrend per segment, one-sided
//! density scaling, mean over segments.
//!
//! The segment length is the power of two just above a 10 s window,
//! clamped to the signal length.  Segments never overlap, which trades
//! variance of the estimate for speed on long recordings.
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

/// Frequency axis plus one spectrum per input row.
#[derive(Debug, Clone)]
pub struct Psd {
    /// `[n_freqs]` in Hz, ascending from 0.
    pub freqs: Array1<f64>,
    /// `[n_rows, n_freqs]` in units²/Hz.
    pub power: Array2<f64>,
}

impl Psd {
    /// Index of the first bin at or above `freq` (`np.searchsorted`, left).
    ///
    /// May equal `n_freqs` when `freq` lies beyond the spectrum.
    pub fn bin_at(&self, freq: f64) -> usize {
        self.freqs.iter().take_while(|&&f| f < freq).count()
    }

    pub fn n_freqs(&self) -> usize {
        self.freqs.len()
    }

    /// Highest resolvable frequency.
    pub fn fmax(&self) -> f64 {
        self.freqs.last().copied().unwrap_or(0.0)
    }
}

/// Segment length: `2^(floor(log2(10 · sfreq)) + 1)`, at most `n_samples`.
pub fn segment_len(n_samples: usize, sfreq: f64) -> usize {
    let pow = (10.0 * sfreq).log2().floor().max(0.0) as u32 + 1;
    let full = 1usize.checked_shl(pow).unwrap_or(usize::MAX);
    full.min(n_samples).max(1)
}

/// Periodic Hann window (`scipy.signal.get_window('hann', n)`).
fn hann_periodic(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect()
}

/// Welch PSD of every row of `data` ([rows, n_samples]).
pub fn efficient_welch(data: ArrayView2<f64>, sfreq: f64) -> Psd {
    let (n_rows, n_t) = data.dim();
    let nperseg = segment_len(n_t, sfreq);
    let n_freqs = nperseg / 2 + 1;
    let n_segments = n_t / nperseg;
    debug!(nperseg, n_segments, n_freqs, "welch window");

    let window = hann_periodic(nperseg);
    let scale = 1.0 / (sfreq * window.iter().map(|w| w * w).sum::<f64>());

    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fft = planner.plan_fft_forward(nperseg);

    let mut power = Array2::<f64>::zeros((n_rows, n_freqs));
    let mut buf = vec![Complex::<f64>::default(); nperseg];
    for (row, mut out) in data.outer_iter().zip(power.outer_iter_mut()) {
        for seg in 0..n_segments {
            let start = seg * nperseg;
            let segment = row.slice(s![start..start + nperseg]);
            fill_detrended(&mut buf, segment, &window);
            fft.process(&mut buf);
            for (o, b) in out.iter_mut().zip(buf.iter()) {
                *o += b.norm_sqr();
            }
        }
        out.mapv_inplace(|v| v * scale / n_segments as f64);
        // One-sided spectrum: double everything except DC and (even) Nyquist.
        let last = if nperseg % 2 == 0 { n_freqs - 1 } else { n_freqs };
        out.slice_mut(s![1..last]).mapv_inplace(|v| v * 2.0);
    }

    let freqs = Array1::from_iter((0..n_freqs).map(|k| k as f64 * sfreq / nperseg as f64));
    Psd { freqs, power }
}

fn fill_detrended(buf: &mut [Complex<f64>], segment: ArrayView1<f64>, window: &[f64]) {
    let mean = segment.mean().unwrap_or(0.0);
    for ((b, &x), &w) in buf.iter_mut().zip(segment.iter()).zip(window) {
        *b = Complex { re: (x - mean) * w, im: 0.0 };
    }
}
