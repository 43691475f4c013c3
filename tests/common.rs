/// Shared helpers for synthetic epochs.
///
/// Samples are small integers with every row summing to exactly zero, so
/// channel means are exact and the `deviation` metric is identically 0.
use faster::{ChannelInfo, ChannelKind, Epochs};
use ndarray::{s, Array1, Array3};

/// xorshift64; deterministic across platforms.
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Rng(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform integer in `-k..=k`.
    pub fn int(&mut self, k: i64) -> f64 {
        (self.next_u64() % (2 * k as u64 + 1)) as f64 - k as f64
    }
}

#[allow(unused)]
/// Integer noise in `-20..=20` whose second half mirrors the negated first.
pub fn zero_mean_row(n_t: usize, rng: &mut Rng) -> Array1<f64> {
    let half: Vec<f64> = (0..n_t / 2).map(|_| rng.int(20)).collect();
    let mut row = Array1::<f64>::zeros(n_t);
    for (i, &v) in half.iter().enumerate() {
        row[i] = v;
        row[n_t - 1 - i] = -v;
    }
    row
}

#[allow(unused)]
/// Independent zero-mean noise in every (epoch, channel).
pub fn noise_epochs(n_e: usize, n_ch: usize, n_t: usize, seed: u64) -> Array3<f64> {
    let mut rng = Rng::new(seed);
    let mut data = Array3::<f64>::zeros((n_e, n_ch, n_t));
    for e in 0..n_e {
        for c in 0..n_ch {
            data.slice_mut(s![e, c, ..]).assign(&zero_mean_row(n_t, &mut rng));
        }
    }
    data
}

#[allow(unused)]
/// One zero-mean row copied into every (epoch, channel), so every channel
/// and epoch scores identically until an artifact is injected.
pub fn template_epochs(n_e: usize, n_ch: usize, n_t: usize, seed: u64) -> Array3<f64> {
    let row = zero_mean_row(n_t, &mut Rng::new(seed));
    let mut data = Array3::<f64>::zeros((n_e, n_ch, n_t));
    for e in 0..n_e {
        for c in 0..n_ch {
            data.slice_mut(s![e, c, ..]).assign(&row);
        }
    }
    data
}

#[allow(unused)]
/// `EEG001`, `EEG002`, … without geometry.
pub fn eeg_channels(n: usize) -> Vec<ChannelInfo> {
    (1..=n).map(|i| ChannelInfo::new(format!("EEG{i:03}"), ChannelKind::Eeg)).collect()
}

#[allow(unused)]
/// EEG channels at the given angles (radians) from a reference at the vertex.
pub fn sphere_channels(angles: &[f64]) -> Vec<ChannelInfo> {
    angles
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            ChannelInfo::new(format!("EEG{:03}", i + 1), ChannelKind::Eeg)
                .with_position([0.09 * a.sin(), 0.0, 0.09 * a.cos()], [0.0, 0.0, 0.09])
        })
        .collect()
}

#[allow(unused)]
/// Multiply one channel of one epoch (or of every epoch with `None`).
pub fn scale(data: &mut Array3<f64>, epoch: Option<usize>, ch: usize, factor: f64) {
    match epoch {
        Some(e) => data.slice_mut(s![e, ch, ..]).mapv_inplace(|v| v * factor),
        None => data.slice_mut(s![.., ch, ..]).mapv_inplace(|v| v * factor),
    }
}

#[allow(unused)]
pub fn eeg_epochs(data: Array3<f64>, sfreq: f64) -> Epochs {
    let n_ch = data.dim().1;
    Epochs::new(data, sfreq, eeg_channels(n_ch)).unwrap()
}

#[allow(unused)]
/// Alternating EEG and gradiometer channels (`EEG00`, `GRAD01`, …), with
/// the gradiometer rows of `data` scaled down to field-sensor magnitudes.
pub fn mixed_epochs(mut data: Array3<f64>, sfreq: f64) -> Epochs {
    let n_ch = data.dim().1;
    let chs = (0..n_ch)
        .map(|c| match c % 2 {
            0 => ChannelInfo::new(format!("EEG{c:02}"), ChannelKind::Eeg),
            _ => ChannelInfo::new(format!("GRAD{c:02}"), ChannelKind::Grad),
        })
        .collect();
    for c in (1..n_ch).step_by(2) {
        scale(&mut data, None, c, 1e-3);
    }
    Epochs::new(data, sfreq, chs).unwrap()
}
