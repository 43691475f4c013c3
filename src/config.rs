//! Detection parameters.
//!
//! One record per detection level.  Every field has the FASTER default, so a
//! partial override is just struct-update syntax:
//!
//! ```
//! use faster::BadChannelsParams;
//!
//! let params = BadChannelsParams {
//!     thresh: 2.5,          // stricter than the paper's 3 SD
//!     eeg_ref_corr: true,   // single-electrode reference
//!     ..BadChannelsParams::default()
//! };
//! params.validate().unwrap();
//! ```
//!
//! The records also deserialize from partial JSON (`{"thresh": 2.5}`), with
//! missing fields taking their defaults.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FasterError, Result};
use crate::metrics::{Level, Metric};
use crate::outliers::Tail;

/// Detection algorithm.  FASTER is the only one implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Faster,
}

impl FromStr for Method {
    type Err = FasterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "faster" => Ok(Method::Faster),
            _ => Err(FasterError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Faster => f.write_str("faster"),
        }
    }
}

fn check_threshold(thresh: f64) -> Result<()> {
    if !(thresh.is_finite() && thresh > 0.0) {
        return Err(FasterError::InvalidParam {
            name: "thresh",
            reason: format!("must be a positive number of standard deviations, got {thresh}"),
        });
    }
    Ok(())
}

fn resolve(use_metrics: &Option<Vec<Metric>>, level: Level) -> Vec<Metric> {
    match use_metrics {
        Some(m) => m.clone(),
        None => level.catalog().to_vec(),
    }
}

fn check_metrics(use_metrics: &Option<Vec<Metric>>, level: Level) -> Result<()> {
    if let Some(m) = use_metrics {
        level.check(m)?;
        if let Some(dup) = m.iter().enumerate().find(|&(i, x)| m[..i].contains(x)) {
            return Err(FasterError::InvalidParam {
                name: "use_metrics",
                reason: format!("'{}' listed twice", dup.1),
            });
        }
    }
    Ok(())
}

// ── Bad channels ─────────────────────────────────────────────────────────

/// Parameters for [`find_bad_channels`](crate::find_bad_channels).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BadChannelsParams {
    /// Metrics to score with.  `None` selects all of `variance`,
    /// `correlation`, `hurst`, `kurtosis` and `line_noise`.
    pub use_metrics: Option<Vec<Metric>>,

    /// Outlier threshold in standard deviations.
    ///
    /// Default: `3.0`.
    pub thresh: f64,

    /// Maximum number of outlier passes.  The FASTER paper uses one.
    ///
    /// Default: `1`.
    pub max_iter: usize,

    /// Side of the score distribution treated as outlying.
    ///
    /// Default: [`Tail::Both`].
    pub tail: Tail,

    /// Regress out the angular distance of each electrode to the reference
    /// before thresholding.  Only for data recorded against a single
    /// reference electrode; requires sensor and reference positions on
    /// every picked channel.
    ///
    /// Default: `false`.
    pub eeg_ref_corr: bool,
}

impl Default for BadChannelsParams {
    fn default() -> Self {
        Self {
            use_metrics: None,
            thresh: 3.0,
            max_iter: 1,
            tail: Tail::Both,
            eeg_ref_corr: false,
        }
    }
}

impl BadChannelsParams {
    pub fn metrics(&self) -> Vec<Metric> {
        resolve(&self.use_metrics, Level::Channels)
    }

    pub fn validate(&self) -> Result<()> {
        check_threshold(self.thresh)?;
        check_metrics(&self.use_metrics, Level::Channels)
    }
}

// ── Bad epochs ───────────────────────────────────────────────────────────

/// Parameters for [`find_bad_epochs`](crate::find_bad_epochs).
///
/// No reference correction here: epoch scores are averaged over channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BadEpochsParams {
    /// `None` selects `amplitude`, `variance` and `deviation`.
    pub use_metrics: Option<Vec<Metric>>,
    pub thresh: f64,
    pub max_iter: usize,
    pub tail: Tail,
}

impl Default for BadEpochsParams {
    fn default() -> Self {
        Self { use_metrics: None, thresh: 3.0, max_iter: 1, tail: Tail::Both }
    }
}

impl BadEpochsParams {
    pub fn metrics(&self) -> Vec<Metric> {
        resolve(&self.use_metrics, Level::Epochs)
    }

    pub fn validate(&self) -> Result<()> {
        check_threshold(self.thresh)?;
        check_metrics(&self.use_metrics, Level::Epochs)
    }
}

// ── Bad channels in epochs ───────────────────────────────────────────────

/// Parameters for
/// [`find_bad_channels_in_epochs`](crate::find_bad_channels_in_epochs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BadChannelsInEpochsParams {
    /// `None` selects `amplitude`, `variance`, `deviation`,
    /// `median_gradient` and `line_noise`.
    pub use_metrics: Option<Vec<Metric>>,
    pub thresh: f64,
    pub max_iter: usize,
    pub tail: Tail,
    /// See [`BadChannelsParams::eeg_ref_corr`].  Applied to every epoch's
    /// channel scores separately.
    pub eeg_ref_corr: bool,
}

impl Default for BadChannelsInEpochsParams {
    fn default() -> Self {
        Self {
            use_metrics: None,
            thresh: 3.0,
            max_iter: 1,
            tail: Tail::Both,
            eeg_ref_corr: false,
        }
    }
}

impl BadChannelsInEpochsParams {
    pub fn metrics(&self) -> Vec<Metric> {
        resolve(&self.use_metrics, Level::ChannelsInEpochs)
    }

    pub fn validate(&self) -> Result<()> {
        check_threshold(self.thresh)?;
        check_metrics(&self.use_metrics, Level::ChannelsInEpochs)
    }
}

// ── Components ───────────────────────────────────────────────────────────

/// Parameters for [`find_bad_components`](crate::find_bad_components).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComponentParams {
    /// `None` selects `kurtosis`, `hurst`, `median_gradient` and
    /// `power_gradient`.
    pub use_metrics: Option<Vec<Metric>>,
    pub thresh: f64,
    pub max_iter: usize,
    pub tail: Tail,

    /// `(low, high)` band in Hz for the `power_gradient` metric.  FASTER sets
    /// this to the passband edge of the lowpass filter.
    ///
    /// Default: `(25.0, 45.0)`.
    pub power_gradient_range: (f64, f64),
}

impl Default for ComponentParams {
    fn default() -> Self {
        Self {
            use_metrics: None,
            thresh: 3.0,
            max_iter: 1,
            tail: Tail::Both,
            power_gradient_range: (25.0, 45.0),
        }
    }
}

impl ComponentParams {
    pub fn metrics(&self) -> Vec<Metric> {
        resolve(&self.use_metrics, Level::Components)
    }

    pub fn validate(&self) -> Result<()> {
        check_threshold(self.thresh)?;
        check_metrics(&self.use_metrics, Level::Components)?;
        let (lo, hi) = self.power_gradient_range;
        if !(lo.is_finite() && hi.is_finite() && 0.0 <= lo && lo < hi) {
            return Err(FasterError::InvalidParam {
                name: "power_gradient_range",
                reason: format!("need 0 <= low < high, got ({lo}, {hi})"),
            });
        }
        Ok(())
    }
}
