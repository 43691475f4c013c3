//! Channel metadata and the epoched data container the detectors read from.
//!
//! Only the fields FASTER needs are kept: channel name, sensor kind and the
//! 12-float `loc` vector in MNE's layout.
//!
//! ```text
//! loc[0..3]   sensor position       (x, y, z)  metres
//! loc[3..6]   EEG reference position (x, y, z) metres
//! loc[6..12]  coil orientation (MEG only)
//! ```
use std::fmt;

use ndarray::Array3;
use serde::Serialize;

use crate::error::{FasterError, Result};

// ── FIFF channel kind / unit codes ────────────────────────────────────────
//
// Mirrors `mne/_fiff/constants.py` so files written by MNE can be mapped
// without a lookup table on the Python side.

pub const FIFFV_MEG_CH: i32 = 1;
pub const FIFFV_EEG_CH: i32 = 2;
pub const FIFFV_STIM_CH: i32 = 3;
pub const FIFFV_EOG_CH: i32 = 202;
pub const FIFFV_EMG_CH: i32 = 302;
pub const FIFFV_ECG_CH: i32 = 402;
pub const FIFFV_MISC_CH: i32 = 502;

/// Tesla (magnetometers).
pub const FIFF_UNIT_T: i32 = 112;
/// Tesla per metre (planar gradiometers).
pub const FIFF_UNIT_T_M: i32 = 201;
/// Volt.
pub const FIFF_UNIT_V: i32 = 107;

// ── Channel kind ─────────────────────────────────────────────────────────

/// Sensor modality of a channel.  Channels of different kinds are never
/// scored together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Mag,
    Grad,
    Eeg,
    Eog,
    Ecg,
    Emg,
    Stim,
    Misc,
}

impl ChannelKind {
    /// Data-channel kinds in the order groups are processed.
    pub const DATA_KINDS: [ChannelKind; 3] = [ChannelKind::Mag, ChannelKind::Grad, ChannelKind::Eeg];

    /// Map a FIFF `kind` code (plus `unit` to split MEG sensors) to a kind.
    ///
    /// Unknown codes map to [`ChannelKind::Misc`].
    pub fn from_fiff(kind: i32, unit: i32) -> Self {
        match kind {
            FIFFV_MEG_CH if unit == FIFF_UNIT_T_M => ChannelKind::Grad,
            FIFFV_MEG_CH => ChannelKind::Mag,
            FIFFV_EEG_CH => ChannelKind::Eeg,
            FIFFV_EOG_CH => ChannelKind::Eog,
            FIFFV_ECG_CH => ChannelKind::Ecg,
            FIFFV_EMG_CH => ChannelKind::Emg,
            FIFFV_STIM_CH => ChannelKind::Stim,
            _ => ChannelKind::Misc,
        }
    }

    /// `(kind, unit)` FIFF codes; inverse of [`ChannelKind::from_fiff`].
    pub fn to_fiff(self) -> (i32, i32) {
        match self {
            ChannelKind::Mag => (FIFFV_MEG_CH, FIFF_UNIT_T),
            ChannelKind::Grad => (FIFFV_MEG_CH, FIFF_UNIT_T_M),
            ChannelKind::Eeg => (FIFFV_EEG_CH, FIFF_UNIT_V),
            ChannelKind::Eog => (FIFFV_EOG_CH, FIFF_UNIT_V),
            ChannelKind::Ecg => (FIFFV_ECG_CH, FIFF_UNIT_V),
            ChannelKind::Emg => (FIFFV_EMG_CH, FIFF_UNIT_V),
            ChannelKind::Stim => (FIFFV_STIM_CH, 0),
            ChannelKind::Misc => (FIFFV_MISC_CH, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Mag => "mag",
            ChannelKind::Grad => "grad",
            ChannelKind::Eeg => "eeg",
            ChannelKind::Eog => "eog",
            ChannelKind::Ecg => "ecg",
            ChannelKind::Emg => "emg",
            ChannelKind::Stim => "stim",
            ChannelKind::Misc => "misc",
        }
    }

    /// MEG or EEG.
    pub fn is_data(self) -> bool {
        Self::DATA_KINDS.contains(&self)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Channel info ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: ChannelKind,
    /// Position, reference position and orientation; see module docs.
    pub loc: [f64; 12],
}

impl ChannelInfo {
    /// A channel without any geometry.
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self { name: name.into(), kind, loc: [0.0; 12] }
    }

    /// Builder-style setter for sensor and reference positions.
    pub fn with_position(mut self, pos: [f64; 3], ref_pos: [f64; 3]) -> Self {
        self.loc[..3].copy_from_slice(&pos);
        self.loc[3..6].copy_from_slice(&ref_pos);
        self
    }

    pub fn pos(&self) -> [f64; 3] {
        [self.loc[0], self.loc[1], self.loc[2]]
    }

    pub fn ref_pos(&self) -> [f64; 3] {
        [self.loc[3], self.loc[4], self.loc[5]]
    }
}

// ── Epochs ───────────────────────────────────────────────────────────────

/// Epoched recording: `data` is `[n_epochs, n_channels, n_samples]`.
///
/// Channel order in `data` matches `chs`.  `bads` lists channel names that
/// were already marked bad upstream; only bad-epoch detection honours it
/// when choosing default picks.
#[derive(Debug, Clone)]
pub struct Epochs {
    data: Array3<f64>,
    sfreq: f64,
    chs: Vec<ChannelInfo>,
    bads: Vec<String>,
}

impl Epochs {
    /// Validates that `chs` describes every channel of `data` and that the
    /// sample rate is usable.
    pub fn new(data: Array3<f64>, sfreq: f64, chs: Vec<ChannelInfo>) -> Result<Self> {
        let (_, n_ch, n_t) = data.dim();
        if n_ch != chs.len() {
            return Err(FasterError::Shape(format!(
                "data has {n_ch} channels but {} channel infos were given",
                chs.len()
            )));
        }
        if n_t == 0 {
            return Err(FasterError::Shape("epochs have no samples".into()));
        }
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(FasterError::InvalidParam {
                name: "sfreq",
                reason: format!("must be positive and finite, got {sfreq}"),
            });
        }
        Ok(Self { data, sfreq, chs, bads: Vec::new() })
    }

    /// Record channels already known to be bad.
    pub fn with_bads(mut self, bads: Vec<String>) -> Self {
        self.bads = bads;
        self
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    pub fn chs(&self) -> &[ChannelInfo] {
        &self.chs
    }

    pub fn bads(&self) -> &[String] {
        &self.bads
    }

    pub fn n_epochs(&self) -> usize {
        self.data.dim().0
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.chs.iter().map(|c| c.name.as_str()).collect()
    }

    /// Indices of all MEG and EEG channels, optionally skipping `bads`.
    pub fn pick_data_channels(&self, exclude_bads: bool) -> Vec<usize> {
        self.chs
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.kind.is_data())
            .filter(|(_, ch)| !exclude_bads || !self.bads.contains(&ch.name))
            .map(|(i, _)| i)
            .collect()
    }

    /// Check picks against the channel count; rejects empty and duplicate
    /// selections.
    pub fn validate_picks(&self, picks: &[usize]) -> Result<()> {
        if picks.is_empty() {
            return Err(FasterError::InvalidPicks("no channels selected".into()));
        }
        let n_ch = self.chs.len();
        for (i, &p) in picks.iter().enumerate() {
            if p >= n_ch {
                return Err(FasterError::InvalidPicks(format!(
                    "channel index {p} out of range for {n_ch} channels"
                )));
            }
            if picks[..i].contains(&p) {
                return Err(FasterError::InvalidPicks(format!("channel index {p} picked twice")));
            }
        }
        Ok(())
    }
}

/// A set of picked channels sharing one sensor kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelGroup {
    pub kind: ChannelKind,
    /// Positions *within the picks* (not raw channel indices).
    pub members: Vec<usize>,
}

/// Partition `picks` by channel kind.
///
/// Data kinds come first in mag, grad, eeg order, followed by any other kind
/// present; member order follows pick order.
pub fn picks_by_type(chs: &[ChannelInfo], picks: &[usize]) -> Vec<ChannelGroup> {
    let mut kinds: Vec<ChannelKind> = picks.iter().map(|&p| chs[p].kind).collect();
    kinds.sort();
    kinds.dedup();

    kinds
        .into_iter()
        .map(|kind| ChannelGroup {
            kind,
            members: picks
                .iter()
                .enumerate()
                .filter(|&(_, &p)| chs[p].kind == kind)
                .map(|(i, _)| i)
                .collect(),
        })
        .collect()
}
